//! # Tween 模块
//!
//! 单个补间实例：在 `duration` 内把目标对象的若干属性插值到目标值。
//!
//! 补间由所属时间轴按**局部时间**定位（seek），而不是自行累加 dt，
//! 这样时间轴跳帧时也能精确落到最终值。

use std::fmt;
use std::rc::Rc;

use crate::animatable::Animatable;
use crate::easing::EasingFunction;

/// 补间状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TweenState {
    /// 等待开始（尚未到达起始时间）
    #[default]
    Pending,
    /// 正在播放
    Playing,
    /// 已完成
    Completed,
}

impl TweenState {
    /// 是否为活跃状态（需要更新）
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Playing)
    }
}

/// 单个属性的补间目标
///
/// `from` 为 `None` 时，在补间第一次定位时从目标对象读取当前值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyTarget {
    pub property: &'static str,
    pub from: Option<f32>,
    pub to: f32,
}

impl PropertyTarget {
    /// 从当前值补间到 `to`
    pub fn to(property: &'static str, to: f32) -> Self {
        Self {
            property,
            from: None,
            to,
        }
    }

    /// 从 `from` 补间到 `to`
    pub fn from_to(property: &'static str, from: f32, to: f32) -> Self {
        Self {
            property,
            from: Some(from),
            to,
        }
    }
}

/// 补间实例
pub struct Tween {
    target: Rc<dyn Animatable>,
    props: Vec<PropertyTarget>,
    /// 第一次定位时解析出的起始值
    starts: Vec<f32>,
    duration: f32,
    easing: EasingFunction,
    state: TweenState,
    /// 当前进度（0.0 - 1.0，已应用缓动）
    progress: f32,
}

impl Tween {
    /// 创建补间
    pub fn new(target: Rc<dyn Animatable>, props: Vec<PropertyTarget>, duration: f32) -> Self {
        Self {
            target,
            props,
            starts: Vec::new(),
            duration: duration.max(0.0),
            easing: EasingFunction::default(),
            state: TweenState::Pending,
            progress: 0.0,
        }
    }

    /// 设置缓动函数
    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.easing = easing;
        self
    }

    /// 第一个在目标上不存在的属性
    pub fn missing_property(&self) -> Option<&'static str> {
        self.props
            .iter()
            .map(|p| p.property)
            .find(|p| self.target.get_property(p).is_none())
    }

    /// 定位到局部时间 `local`（相对补间起点，秒）
    ///
    /// # 返回
    /// - `true`: 补间仍在进行中
    /// - `false`: 补间已结束
    pub fn seek(&mut self, local: f32) -> bool {
        if self.state == TweenState::Completed {
            return false;
        }
        if local < 0.0 {
            return true;
        }

        if self.state == TweenState::Pending {
            self.starts = self
                .props
                .iter()
                .map(|p| {
                    p.from
                        .or_else(|| self.target.get_property(p.property))
                        .unwrap_or(p.to)
                })
                .collect();
            self.state = TweenState::Playing;
        }

        let raw = if self.duration <= 0.0 {
            1.0
        } else {
            local / self.duration
        };
        let finished = raw >= 1.0;
        self.progress = if finished { 1.0 } else { self.easing.apply(raw) };

        for (prop, start) in self.props.iter().zip(&self.starts) {
            let value = if finished {
                prop.to
            } else {
                start + (prop.to - start) * self.progress
            };
            self.target.set_property(prop.property, value);
        }

        if finished {
            self.state = TweenState::Completed;
        }
        !finished
    }

    pub fn state(&self) -> TweenState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn is_finished(&self) -> bool {
        self.state == TweenState::Completed
    }
}

impl fmt::Debug for Tween {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tween")
            .field("props", &self.props)
            .field("duration", &self.duration)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .finish()
    }
}
