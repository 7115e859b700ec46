//! # Timeline 模块
//!
//! 阶段时间轴：按编写顺序排列的补间项与零时长调用项。
//!
//! ## 生命周期
//!
//! 1. 使用 [`TimelineBuilder`] 编写，`build` 时把位置表达式解析为绝对偏移并校验
//! 2. 交给 [`TweenEngine`](crate::engine::TweenEngine) 播放，得到 [`TimelineHandle`]
//! 3. 构建之后唯一允许的修改是通过句柄注入一次 destroy 钩子
//!
//! ## 失败策略
//!
//! - 补间的 `on_update` 失败属于表现层失败：记录并上报，时间轴继续
//! - 调用项失败属于结构性失败：时间轴被终止，并触发注入的 destroy 钩子

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use tracing::{debug, error, warn};

use crate::animatable::Animatable;
use crate::easing::EasingFunction;
use crate::error::{CameraError, EffectError, FxError, TimelineError};
use crate::report::Reporter;
use crate::tween::{PropertyTarget, Tween};

/// 补间步回调，参数为补间当前进度
pub type UpdateHook = Box<dyn FnMut(f32) -> Result<(), CameraError>>;
/// 调用项回调
pub type CallHook = Box<dyn FnMut() -> Result<(), EffectError>>;
/// 时间轴完成回调
pub type CompleteHook = Box<dyn FnOnce()>;
/// destroy 钩子：调用项失败时由时间轴触发
pub type DestroyHook = Box<dyn FnOnce(FxError)>;

/// 时间轴项的位置
///
/// ## 字符串语法
///
/// | 表达式 | 含义 |
/// |--------|------|
/// | `"2.5"` | 绝对时间 2.5 秒 |
/// | `"+=0.5"` / `"-=1"` | 相对前一项的结束时间 |
/// | `">"` | 紧接前一项结束 |
/// | `"<"` / `"<0.2"` | 相对前一项的开始时间 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    /// 绝对时间
    At(f32),
    /// 前一项结束时间 + 偏移
    AfterPrevious(f32),
    /// 前一项开始时间 + 偏移
    WithPrevious(f32),
}

impl Default for Position {
    fn default() -> Self {
        Self::AfterPrevious(0.0)
    }
}

impl Position {
    fn resolve(self, previous_start: f32, previous_end: f32) -> f32 {
        match self {
            Self::At(t) => t,
            Self::AfterPrevious(d) => previous_end + d,
            Self::WithPrevious(d) => previous_start + d,
        }
    }
}

impl FromStr for Position {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || TimelineError::InvalidPosition(s.to_string());
        let number = |text: &str| -> Result<f32, TimelineError> {
            let value: f32 = text.trim().parse().map_err(|_| invalid())?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(invalid())
            }
        };

        if trimmed == ">" {
            return Ok(Self::AfterPrevious(0.0));
        }
        if let Some(rest) = trimmed.strip_prefix('<') {
            if rest.is_empty() {
                return Ok(Self::WithPrevious(0.0));
            }
            return number(rest).map(Self::WithPrevious);
        }
        if let Some(rest) = trimmed.strip_prefix("+=") {
            return number(rest).map(Self::AfterPrevious);
        }
        if let Some(rest) = trimmed.strip_prefix("-=") {
            return number(rest).map(|d| Self::AfterPrevious(-d));
        }

        let at = number(trimmed)?;
        if at < 0.0 {
            return Err(invalid());
        }
        Ok(Self::At(at))
    }
}

/// 补间项描述
pub struct TweenSpec {
    target: Rc<dyn Animatable>,
    props: Vec<PropertyTarget>,
    duration: f32,
    easing: EasingFunction,
    position: Position,
    stage: String,
    on_update: Option<UpdateHook>,
}

impl TweenSpec {
    pub fn new(target: Rc<dyn Animatable>, duration: f32) -> Self {
        Self {
            target,
            props: Vec::new(),
            duration,
            easing: EasingFunction::default(),
            position: Position::default(),
            stage: "tween".to_string(),
            on_update: None,
        }
    }

    /// 从当前值补间到 `value`
    pub fn to(mut self, property: &'static str, value: f32) -> Self {
        self.props.push(PropertyTarget::to(property, value));
        self
    }

    /// 从 `from` 补间到 `to`
    pub fn from_to(mut self, property: &'static str, from: f32, to: f32) -> Self {
        self.props.push(PropertyTarget::from_to(property, from, to));
        self
    }

    pub fn ease(mut self, easing: EasingFunction) -> Self {
        self.easing = easing;
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// 阶段标签（用于日志和错误上报）
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// 每个补间步之后执行的回调
    pub fn on_update(mut self, hook: UpdateHook) -> Self {
        self.on_update = Some(hook);
        self
    }
}

impl fmt::Debug for TweenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TweenSpec")
            .field("props", &self.props)
            .field("duration", &self.duration)
            .field("position", &self.position)
            .field("stage", &self.stage)
            .finish()
    }
}

enum Entry {
    Tween(TweenSpec),
    Call {
        stage: String,
        position: Position,
        hook: CallHook,
    },
}

/// 时间轴构建器
#[derive(Default)]
pub struct TimelineBuilder {
    label: String,
    entries: Vec<Entry>,
    on_complete: Option<CompleteHook>,
    reporter: Option<Reporter>,
}

impl TimelineBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// 追加补间项
    pub fn tween(mut self, spec: TweenSpec) -> Self {
        self.entries.push(Entry::Tween(spec));
        self
    }

    /// 追加零时长调用项
    pub fn call(
        mut self,
        stage: impl Into<String>,
        position: Position,
        hook: impl FnMut() -> Result<(), EffectError> + 'static,
    ) -> Self {
        self.entries.push(Entry::Call {
            stage: stage.into(),
            position,
            hook: Box::new(hook),
        });
        self
    }

    /// 时间轴完成回调（至多触发一次）
    pub fn on_complete(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// 失败上报通道
    pub fn report_to(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 解析位置并校验，生成不可变的时间轴
    pub fn build(self) -> Result<Timeline, TimelineError> {
        let mut steps = Vec::with_capacity(self.entries.len());
        let mut previous_start = 0.0_f32;
        let mut previous_end = 0.0_f32;
        let mut total = 0.0_f32;

        for (index, entry) in self.entries.into_iter().enumerate() {
            let (position, duration) = match &entry {
                Entry::Tween(spec) => (spec.position, spec.duration),
                Entry::Call { position, .. } => (*position, 0.0),
            };

            let start = position.resolve(previous_start, previous_end);
            if !start.is_finite() || start < previous_start {
                return Err(TimelineError::NonMonotonicOffset {
                    index,
                    offset: start,
                    previous: previous_start,
                });
            }
            if !duration.is_finite() || duration < 0.0 {
                return Err(TimelineError::InvalidDuration { index, duration });
            }

            let kind = match entry {
                Entry::Tween(spec) => {
                    let tween = Tween::new(spec.target, spec.props, spec.duration)
                        .with_easing(spec.easing);
                    if let Some(property) = tween.missing_property() {
                        return Err(TimelineError::UnknownProperty {
                            index,
                            property: property.to_string(),
                        });
                    }
                    StepKind::Tween {
                        tween,
                        stage: spec.stage,
                        on_update: spec.on_update,
                    }
                }
                Entry::Call { stage, hook, .. } => StepKind::Call {
                    stage,
                    hook,
                    fired: false,
                },
            };

            previous_start = start;
            previous_end = start + duration;
            total = total.max(previous_end);
            steps.push(Step { start, kind });
        }

        debug!(timeline = %self.label, steps = steps.len(), duration = total, "时间轴构建完成");

        Ok(Timeline {
            label: self.label,
            steps,
            time: 0.0,
            on_complete: self.on_complete,
            reporter: self.reporter,
            shared: Rc::new(TimelineShared {
                time: Cell::new(0.0),
                duration: total,
                finished: Cell::new(false),
                killed: Cell::new(false),
                destroy: RefCell::new(None),
                destroy_injected: Cell::new(false),
            }),
        })
    }
}

impl fmt::Debug for TimelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineBuilder")
            .field("label", &self.label)
            .field("entries", &self.entries.len())
            .finish()
    }
}

struct Step {
    start: f32,
    kind: StepKind,
}

enum StepKind {
    Tween {
        tween: Tween,
        stage: String,
        on_update: Option<UpdateHook>,
    },
    Call {
        stage: String,
        hook: CallHook,
        fired: bool,
    },
}

/// 时间轴与句柄共享的状态
struct TimelineShared {
    time: Cell<f32>,
    duration: f32,
    finished: Cell<bool>,
    killed: Cell<bool>,
    destroy: RefCell<Option<DestroyHook>>,
    destroy_injected: Cell<bool>,
}

/// 单次推进的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineStep {
    /// 仍在播放
    Running,
    /// 自然播放完毕
    Finished,
    /// 被终止（外部 kill 或调用项失败）
    Killed,
}

/// 已构建的时间轴
pub struct Timeline {
    label: String,
    steps: Vec<Step>,
    time: f32,
    on_complete: Option<CompleteHook>,
    reporter: Option<Reporter>,
    shared: Rc<TimelineShared>,
}

impl Timeline {
    /// 获取控制句柄
    pub fn handle(&self) -> TimelineHandle {
        TimelineHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn duration(&self) -> f32 {
        self.shared.duration
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// 推进 `dt` 秒
    pub fn advance(&mut self, dt: f32) -> TimelineStep {
        if self.shared.killed.get() {
            return TimelineStep::Killed;
        }
        if self.shared.finished.get() {
            return TimelineStep::Finished;
        }

        self.time += dt.max(0.0);
        let now = self.time;
        let mut failure = None;

        for step in &mut self.steps {
            if step.start > now {
                break;
            }
            match &mut step.kind {
                StepKind::Tween {
                    tween,
                    stage,
                    on_update,
                } => {
                    if tween.is_finished() {
                        continue;
                    }
                    tween.seek(now - step.start);
                    if let Some(hook) = on_update
                        && let Err(e) = hook(tween.progress())
                    {
                        let err = FxError::cosmetic(stage.as_str(), e);
                        match &self.reporter {
                            Some(reporter) => reporter.cosmetic(&err),
                            None => warn!(timeline = %self.label, error = %err, "补间回调失败"),
                        }
                    }
                }
                StepKind::Call { stage, hook, fired } => {
                    if *fired {
                        continue;
                    }
                    *fired = true;
                    if let Err(e) = hook() {
                        failure = Some(FxError::structural(stage.as_str(), e));
                        break;
                    }
                }
            }
            if self.shared.killed.get() {
                return TimelineStep::Killed;
            }
        }

        if let Some(err) = failure {
            self.fail(err);
            return TimelineStep::Killed;
        }

        self.shared.time.set(now.min(self.shared.duration));
        if now >= self.shared.duration {
            self.shared.finished.set(true);
            debug!(timeline = %self.label, "时间轴播放完毕");
            if let Some(hook) = self.on_complete.take() {
                hook();
            }
            return TimelineStep::Finished;
        }
        TimelineStep::Running
    }

    fn fail(&mut self, err: FxError) {
        self.shared.killed.set(true);
        let hook = self.shared.destroy.borrow_mut().take();
        match hook {
            Some(hook) => hook(err),
            None => match &self.reporter {
                Some(reporter) => {
                    reporter.fatal(&err);
                }
                None => error!(timeline = %self.label, error = %err, "时间轴调用项失败"),
            },
        }
    }
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("label", &self.label)
            .field("steps", &self.steps.len())
            .field("time", &self.time)
            .field("duration", &self.shared.duration)
            .finish()
    }
}

/// 时间轴控制句柄
#[derive(Clone)]
pub struct TimelineHandle {
    shared: Rc<TimelineShared>,
}

impl TimelineHandle {
    /// 当前播放时间
    pub fn time(&self) -> f32 {
        self.shared.time.get()
    }

    /// 总时长
    pub fn duration(&self) -> f32 {
        self.shared.duration
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.get()
    }

    pub fn is_killed(&self) -> bool {
        self.shared.killed.get()
    }

    /// 是否仍需要推进
    pub fn is_active(&self) -> bool {
        !self.is_finished() && !self.is_killed()
    }

    /// 注入 destroy 钩子
    ///
    /// 只能注入一次；时间轴已被终止时钩子会被直接丢弃。
    pub fn inject_destroy(&self, hook: DestroyHook) -> Result<(), TimelineError> {
        if self.shared.destroy_injected.replace(true) {
            return Err(TimelineError::DestroyAlreadyInjected);
        }
        if self.shared.killed.get() {
            debug!("时间轴已终止，丢弃 destroy 钩子");
            return Ok(());
        }
        *self.shared.destroy.borrow_mut() = Some(hook);
        Ok(())
    }

    /// 终止时间轴，不触发 destroy 钩子
    pub fn kill(&self) {
        self.shared.killed.set(true);
        // 钩子通常持有播放句柄，这里释放以断开引用环
        let hook = self.shared.destroy.borrow_mut().take();
        drop(hook);
    }
}

impl fmt::Debug for TimelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineHandle")
            .field("time", &self.time())
            .field("duration", &self.duration())
            .field("finished", &self.is_finished())
            .field("killed", &self.is_killed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animatable::PropertyBag;
    use crate::error::FailureClass;
    use crate::report::PlaybackCallbacks;

    fn bag() -> Rc<PropertyBag> {
        Rc::new(PropertyBag::new(&[("x", 0.0), ("y", 0.0)]))
    }

    fn recording_reporter() -> (Reporter, Rc<RefCell<Vec<(FailureClass, String)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let reporter = Reporter::new(
            "test",
            PlaybackCallbacks::new(
                |_| {},
                move |err, stage| sink.borrow_mut().push((err.class(), stage.to_string())),
            ),
        );
        (reporter, log)
    }

    // ========== 位置表达式 ==========

    #[test]
    fn test_position_parse() {
        assert_eq!("2.5".parse::<Position>().unwrap(), Position::At(2.5));
        assert_eq!("+=0.5".parse::<Position>().unwrap(), Position::AfterPrevious(0.5));
        assert_eq!("-=1".parse::<Position>().unwrap(), Position::AfterPrevious(-1.0));
        assert_eq!(">".parse::<Position>().unwrap(), Position::AfterPrevious(0.0));
        assert_eq!("<".parse::<Position>().unwrap(), Position::WithPrevious(0.0));
        assert_eq!("<0.2".parse::<Position>().unwrap(), Position::WithPrevious(0.2));
        assert!("-2".parse::<Position>().is_err());
        assert!("soon".parse::<Position>().is_err());
        assert!("+=inf".parse::<Position>().is_err());
    }

    // ========== 构建 ==========

    #[test]
    fn test_build_resolves_offsets() {
        let target = bag();
        let timeline = TimelineBuilder::new("t")
            .tween(TweenSpec::new(target.clone(), 2.0).to("x", 1.0))
            .tween(
                TweenSpec::new(target.clone(), 1.0)
                    .to("y", 1.0)
                    .at(Position::AfterPrevious(-0.5)),
            )
            .tween(
                TweenSpec::new(target, 3.0)
                    .to("x", 2.0)
                    .at(Position::WithPrevious(0.5)),
            )
            .build()
            .unwrap();

        let starts: Vec<f32> = timeline.steps.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0.0, 1.5, 2.0]);
        assert_eq!(timeline.duration(), 5.0);
    }

    #[test]
    fn test_build_rejects_decreasing_offset() {
        let target = bag();
        let result = TimelineBuilder::new("t")
            .tween(TweenSpec::new(target.clone(), 1.0).to("x", 1.0).at(Position::At(2.0)))
            .tween(TweenSpec::new(target, 1.0).to("y", 1.0).at(Position::At(1.0)))
            .build();

        assert_eq!(
            result.unwrap_err(),
            TimelineError::NonMonotonicOffset {
                index: 1,
                offset: 1.0,
                previous: 2.0,
            }
        );
    }

    #[test]
    fn test_build_rejects_unknown_property_and_bad_duration() {
        let result = TimelineBuilder::new("t")
            .tween(TweenSpec::new(bag(), 1.0).to("glow", 1.0))
            .build();
        assert!(matches!(
            result,
            Err(TimelineError::UnknownProperty { index: 0, .. })
        ));

        let result = TimelineBuilder::new("t")
            .tween(TweenSpec::new(bag(), f32::NAN).to("x", 1.0))
            .build();
        assert!(matches!(
            result,
            Err(TimelineError::InvalidDuration { index: 0, .. })
        ));
    }

    // ========== 推进 ==========

    #[test]
    fn test_advance_drives_tweens_and_calls() {
        let target = bag();
        let calls = Rc::new(Cell::new(0));
        let completed = Rc::new(Cell::new(0));
        let (c, done) = (calls.clone(), completed.clone());

        let mut timeline = TimelineBuilder::new("t")
            .tween(
                TweenSpec::new(target.clone(), 2.0)
                    .to("x", 4.0)
                    .ease(EasingFunction::Linear),
            )
            .call("phase:climax", Position::At(1.0), move || {
                c.set(c.get() + 1);
                Ok(())
            })
            .on_complete(move || done.set(done.get() + 1))
            .build()
            .unwrap();
        let handle = timeline.handle();

        assert_eq!(timeline.advance(0.0), TimelineStep::Running);
        assert_eq!(timeline.advance(0.5), TimelineStep::Running);
        assert!((target.get_or("x", 0.0) - 1.0).abs() < 1e-6);
        assert_eq!(calls.get(), 0);

        assert_eq!(timeline.advance(0.6), TimelineStep::Running);
        assert_eq!(calls.get(), 1);

        assert_eq!(timeline.advance(5.0), TimelineStep::Finished);
        assert_eq!(target.get_or("x", 0.0), 4.0);
        assert_eq!(calls.get(), 1);
        assert_eq!(completed.get(), 1);
        assert!(handle.is_finished());
        assert_eq!(handle.time(), 2.0);

        assert_eq!(timeline.advance(1.0), TimelineStep::Finished);
        assert_eq!(completed.get(), 1);
    }

    #[test]
    fn test_update_hook_failure_is_cosmetic() {
        let (reporter, log) = recording_reporter();
        let mut timeline = TimelineBuilder::new("t")
            .tween(
                TweenSpec::new(bag(), 1.0)
                    .to("x", 1.0)
                    .stage("camera:dolly")
                    .on_update(Box::new(|_| Err(CameraError::ControlsDisposed))),
            )
            .report_to(reporter.clone())
            .build()
            .unwrap();

        assert_eq!(timeline.advance(0.5), TimelineStep::Running);
        assert_eq!(timeline.advance(0.6), TimelineStep::Finished);
        assert_eq!(
            *log.borrow(),
            vec![
                (FailureClass::Cosmetic, "camera:dolly".to_string()),
                (FailureClass::Cosmetic, "camera:dolly".to_string()),
            ]
        );
        assert!(!reporter.is_settled());
    }

    #[test]
    fn test_call_failure_fires_destroy_hook() {
        let aborted = Rc::new(RefCell::new(None));
        let sink = aborted.clone();
        let mut timeline = TimelineBuilder::new("t")
            .call("phase:warmup", Position::At(0.5), || {
                Err(EffectError::AnimateFailed {
                    effect: "rings".into(),
                    message: "boom".into(),
                })
            })
            .tween(TweenSpec::new(bag(), 2.0).to("x", 1.0))
            .build()
            .unwrap();
        let handle = timeline.handle();
        handle
            .inject_destroy(Box::new(move |err| {
                *sink.borrow_mut() = Some(err.stage().to_string());
            }))
            .unwrap();

        assert_eq!(timeline.advance(0.6), TimelineStep::Killed);
        assert_eq!(aborted.borrow().as_deref(), Some("phase:warmup"));
        assert!(handle.is_killed());
        assert_eq!(timeline.advance(0.1), TimelineStep::Killed);
    }

    #[test]
    fn test_call_failure_without_hook_reports_fatal() {
        let (reporter, log) = recording_reporter();
        let mut timeline = TimelineBuilder::new("t")
            .call("phase:coda", Position::At(0.0), || {
                Err(EffectError::Busy {
                    effect: "field".into(),
                })
            })
            .report_to(reporter.clone())
            .build()
            .unwrap();

        assert_eq!(timeline.advance(0.0), TimelineStep::Killed);
        assert!(reporter.is_failed());
        assert_eq!(
            *log.borrow(),
            vec![(FailureClass::Structural, "phase:coda".to_string())]
        );
    }

    // ========== 句柄 ==========

    #[test]
    fn test_destroy_injected_once() {
        let timeline = TimelineBuilder::new("t").build().unwrap();
        let handle = timeline.handle();
        assert!(handle.inject_destroy(Box::new(|_| {})).is_ok());
        assert_eq!(
            handle.inject_destroy(Box::new(|_| {})),
            Err(TimelineError::DestroyAlreadyInjected)
        );
    }

    #[test]
    fn test_kill_drops_hook_without_firing() {
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        let mut timeline = TimelineBuilder::new("t")
            .tween(TweenSpec::new(bag(), 1.0).to("x", 1.0))
            .build()
            .unwrap();
        let handle = timeline.handle();
        handle
            .inject_destroy(Box::new(move |_| flag.set(true)))
            .unwrap();

        handle.kill();
        assert_eq!(timeline.advance(0.5), TimelineStep::Killed);
        assert!(!fired.get());
        assert!(handle.shared.destroy.borrow().is_none());
    }
}
