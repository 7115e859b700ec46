//! # Transition 模块
//!
//! 效果 `animate` 使用的多阶段属性过渡。
//!
//! 一个过渡由若干顺序执行的阶段组成，每个阶段按权重分得总时长的一部分，
//! 并把属性集合中的若干值补间到目标值（例如：先放大、再提亮、最后淡出）。
//! 过渡随效果的 `update` 推进，不依赖补间引擎。

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::animatable::Animatable;
use crate::easing::EasingFunction;
use crate::tween::{PropertyTarget, Tween};

/// 过渡完成回调
pub type OnComplete = Box<dyn FnOnce()>;

/// 过渡阶段
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// 占总时长的权重
    pub weight: f32,
    pub targets: Vec<PropertyTarget>,
    pub easing: EasingFunction,
}

impl Stage {
    pub fn new(weight: f32) -> Self {
        Self {
            weight: weight.max(0.0),
            targets: Vec::new(),
            easing: EasingFunction::default(),
        }
    }

    pub fn to(mut self, property: &'static str, value: f32) -> Self {
        self.targets.push(PropertyTarget::to(property, value));
        self
    }

    pub fn from_to(mut self, property: &'static str, from: f32, to: f32) -> Self {
        self.targets.push(PropertyTarget::from_to(property, from, to));
        self
    }

    pub fn ease(mut self, easing: EasingFunction) -> Self {
        self.easing = easing;
        self
    }
}

#[derive(Debug, Default)]
struct TransitionState {
    progress: Cell<f32>,
    finished: Cell<bool>,
    superseded: Cell<bool>,
}

/// 过渡的只读观察句柄
#[derive(Debug, Clone)]
pub struct TransitionHandle {
    state: Rc<TransitionState>,
}

impl TransitionHandle {
    /// 不对应任何过渡的句柄（效果已销毁时返回）
    pub fn inert() -> Self {
        let state = TransitionState::default();
        state.superseded.set(true);
        Self {
            state: Rc::new(state),
        }
    }

    /// 整体进度（0.0 - 1.0，线性时间）
    pub fn progress(&self) -> f32 {
        self.state.progress.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.get()
    }

    /// 是否被新的过渡取代
    pub fn is_superseded(&self) -> bool {
        self.state.superseded.get()
    }
}

/// 多阶段过渡
///
/// `on_complete` 只在过渡自然完成时触发，且恰好一次；
/// 被 [`supersede`](Self::supersede) 或随效果一起销毁时不会触发。
pub struct StagedTransition {
    stages: Vec<(f32, Tween)>,
    duration: f32,
    elapsed: f32,
    state: Rc<TransitionState>,
    on_complete: Option<OnComplete>,
}

impl StagedTransition {
    pub fn new(
        target: Rc<dyn Animatable>,
        stages: Vec<Stage>,
        duration: f32,
        on_complete: Option<OnComplete>,
    ) -> Self {
        let duration = duration.max(0.0);
        let total_weight: f32 = stages.iter().map(|s| s.weight).sum();

        let mut offset = 0.0;
        let stages = stages
            .into_iter()
            .map(|stage| {
                let share = if total_weight > 0.0 {
                    duration * stage.weight / total_weight
                } else {
                    0.0
                };
                let tween = Tween::new(target.clone(), stage.targets, share).with_easing(stage.easing);
                let start = offset;
                offset += share;
                (start, tween)
            })
            .collect();

        Self {
            stages,
            duration,
            elapsed: 0.0,
            state: Rc::new(TransitionState::default()),
            on_complete,
        }
    }

    pub fn handle(&self) -> TransitionHandle {
        TransitionHandle {
            state: self.state.clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.get()
    }

    /// 推进 `dt` 秒
    ///
    /// # 返回
    /// 过渡是否仍在进行
    pub fn advance(&mut self, dt: f32) -> bool {
        if self.state.finished.get() || self.state.superseded.get() {
            return false;
        }
        self.elapsed += dt.max(0.0);

        let mut running = false;
        for (start, tween) in &mut self.stages {
            if self.elapsed < *start {
                running = true;
                break;
            }
            if tween.is_finished() {
                continue;
            }
            if tween.seek(self.elapsed - *start) {
                running = true;
                break;
            }
        }

        let progress = if self.duration > 0.0 {
            (self.elapsed / self.duration).min(1.0)
        } else {
            1.0
        };
        self.state.progress.set(if running { progress } else { 1.0 });

        if !running {
            self.state.finished.set(true);
            if let Some(hook) = self.on_complete.take() {
                hook();
            }
        }
        running
    }

    /// 标记为被取代，丢弃完成回调
    pub fn supersede(&mut self) {
        if !self.state.finished.get() {
            self.state.superseded.set(true);
        }
        self.on_complete = None;
    }
}

impl fmt::Debug for StagedTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedTransition")
            .field("stages", &self.stages.len())
            .field("duration", &self.duration)
            .field("elapsed", &self.elapsed)
            .field("finished", &self.state.finished.get())
            .finish()
    }
}
