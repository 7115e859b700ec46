//! # Coordinator 模块
//!
//! 播放协调器：逐帧驱动活跃效果、在阈值处切换效果，并在结束时统一清理。
//!
//! ## 每帧流程
//!
//! 1. 第一帧记录 `start_time`，之后 `elapsed = now - start_time`
//! 2. `elapsed >= total_duration` 时执行终止清理并上报完成，不再请求帧
//! 3. 依次应用所有 `elapsed` 已超过的切换阈值（一帧内可越过多个）
//! 4. 按插入顺序调用活跃效果的 `update`，失败即终止
//! 5. 渲染一次
//! 6. 请求下一帧
//!
//! ## 终止清理
//!
//! 无论是自然完成、外部取消还是中途失败，都会对**所有**曾经构造的效果调用 `destroy`，
//! 终止时间轴并脱离帧循环。`destroy` 由 [`EffectHandle`] 保证只派发一次。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::camera::Camera;
use crate::effect::EffectHandle;
use crate::error::{EffectError, FxError, ScheduleError};
use crate::frame::{FrameRequestId, FrameScheduler};
use crate::report::{PlaybackResult, Reporter};
use crate::scene::SceneGraph;
use crate::timeline::TimelineHandle;

// ========== 切换计划 ==========

/// 切换动作
#[derive(Debug, Clone)]
pub enum SwitchAction {
    /// 追加一个效果
    Add(EffectHandle),
    /// 用新集合替换当前集合，不在新集合中的效果被销毁
    Replace(Vec<EffectHandle>),
}

/// 切换点
#[derive(Debug, Clone)]
pub struct SwitchPoint {
    /// 阈值（秒，相对播放开始）
    pub at: f32,
    pub action: SwitchAction,
    /// 进入的效果是否调用 `animate(duration)`
    pub animate: Option<f32>,
}

impl SwitchPoint {
    pub fn add(at: f32, effect: EffectHandle) -> Self {
        Self {
            at,
            action: SwitchAction::Add(effect),
            animate: None,
        }
    }

    pub fn replace(at: f32, effects: Vec<EffectHandle>) -> Self {
        Self {
            at,
            action: SwitchAction::Replace(effects),
            animate: None,
        }
    }

    /// 进入时启动 `duration` 秒的过渡
    pub fn animated(mut self, duration: f32) -> Self {
        self.animate = Some(duration);
        self
    }
}

/// 活跃效果集合与切换游标
///
/// 游标只前进不后退，每个阈值至多应用一次。
#[derive(Debug)]
pub struct HandOff {
    active: Vec<EffectHandle>,
    switches: Vec<SwitchPoint>,
    cursor: usize,
    /// 曾经进入过活跃集合的全部效果
    admitted: Vec<EffectHandle>,
    /// 替换切换时派发的销毁数量
    replaced: usize,
}

impl HandOff {
    /// 校验阈值并创建集合
    pub fn new(initial: Vec<EffectHandle>, switches: Vec<SwitchPoint>) -> Result<Self, ScheduleError> {
        let mut previous: Option<f32> = None;
        for (index, switch) in switches.iter().enumerate() {
            if !switch.at.is_finite() || switch.at < 0.0 {
                return Err(ScheduleError::InvalidThreshold {
                    index,
                    at: switch.at,
                });
            }
            if let Some(previous) = previous
                && switch.at <= previous
            {
                return Err(ScheduleError::NonIncreasingThreshold {
                    index,
                    at: switch.at,
                    previous,
                });
            }
            previous = Some(switch.at);
        }

        let mut handoff = Self {
            active: Vec::new(),
            switches,
            cursor: 0,
            admitted: Vec::new(),
            replaced: 0,
        };
        for effect in initial {
            handoff.admit(effect);
        }
        Ok(handoff)
    }

    pub fn active(&self) -> &[EffectHandle] {
        &self.active
    }

    pub fn admitted(&self) -> &[EffectHandle] {
        &self.admitted
    }

    /// 已应用的切换数量
    pub fn crossed(&self) -> usize {
        self.cursor
    }

    /// 尚未应用的切换数量
    pub fn remaining(&self) -> usize {
        self.switches.len() - self.cursor
    }

    /// 替换切换中已经销毁的效果数量
    pub fn replaced(&self) -> usize {
        self.replaced
    }

    fn admit(&mut self, effect: EffectHandle) -> bool {
        if self.active.iter().any(|e| e.same_effect(&effect)) {
            return false;
        }
        if !self.admitted.iter().any(|e| e.same_effect(&effect)) {
            self.admitted.push(effect.clone());
        }
        self.active.push(effect);
        true
    }

    /// 应用所有 `elapsed` 已经超过的切换（`elapsed > at`）
    ///
    /// 恰好落在阈值上的帧不算越过，切换在下一帧生效。
    ///
    /// # 返回
    /// 本次应用的切换数量；进入效果的 `animate` 失败时返回结构性错误
    pub fn advance(&mut self, elapsed: f32) -> Result<usize, FxError> {
        let mut applied = 0;
        while let Some(switch) = self.switches.get(self.cursor) {
            if elapsed <= switch.at {
                break;
            }
            let at = switch.at;
            let animate = switch.animate;
            let action = switch.action.clone();
            self.cursor += 1;
            applied += 1;

            let entering = match action {
                SwitchAction::Add(effect) => {
                    if self.admit(effect.clone()) {
                        vec![effect]
                    } else {
                        Vec::new()
                    }
                }
                SwitchAction::Replace(next) => {
                    for effect in &self.active {
                        if !next.iter().any(|n| n.same_effect(effect)) && effect.destroy() {
                            self.replaced += 1;
                            debug!(effect = %effect.name(), at, "切换时销毁效果");
                        }
                    }
                    let previous = std::mem::take(&mut self.active);
                    let mut entering = Vec::new();
                    for effect in next {
                        if !previous.iter().any(|p| p.same_effect(&effect)) {
                            entering.push(effect.clone());
                        }
                        self.admit(effect);
                    }
                    entering
                }
            };
            debug!(at, entering = entering.len(), active = self.active.len(), "越过切换阈值");

            if let Some(duration) = animate {
                for effect in &entering {
                    effect.animate(duration, None).map_err(|e| {
                        FxError::structural(format!("handoff:animate:{}", effect.name()), e)
                    })?;
                }
            }
        }
        Ok(applied)
    }

    /// 销毁曾经进入过的全部效果
    ///
    /// # 返回
    /// 本次实际派发销毁的数量
    pub fn teardown(&mut self) -> usize {
        self.active.clear();
        self.admitted.iter().filter(|e| e.destroy()).count()
    }
}

// ========== 单次运行 ==========

/// 运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub animation: String,
    /// 总时长（秒）
    pub total_duration: f32,
    /// 传给 `update` 的固定步长
    pub fixed_delta: f32,
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// 单帧结果
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// 继续请求下一帧
    Continue,
    /// 自然完成
    Finished(PlaybackResult),
    /// 结构性失败
    Failed(FxError),
    /// 运行已结束，本帧不做任何事
    Idle,
}

/// 一次动画模块调用对应的运行状态
pub struct CoordinatorRun {
    config: RunConfig,
    state: RunState,
    start_time: Option<f32>,
    elapsed: f32,
    frames: u64,
    handoff: HandOff,
    /// 模块构造的全部效果（包括从未进入活跃集合的）
    owned: Vec<EffectHandle>,
    timeline: Option<TimelineHandle>,
    scene: Rc<dyn SceneGraph>,
    camera: Rc<Camera>,
    pending: Option<FrameRequestId>,
    effects_destroyed: usize,
}

impl CoordinatorRun {
    pub fn new(
        config: RunConfig,
        handoff: HandOff,
        owned: Vec<EffectHandle>,
        timeline: Option<TimelineHandle>,
        scene: Rc<dyn SceneGraph>,
        camera: Rc<Camera>,
    ) -> Result<Self, ScheduleError> {
        if !config.total_duration.is_finite() || config.total_duration <= 0.0 {
            return Err(ScheduleError::InvalidTotalDuration(config.total_duration));
        }
        Ok(Self {
            config,
            state: RunState::Running,
            start_time: None,
            elapsed: 0.0,
            frames: 0,
            handoff,
            owned,
            timeline,
            scene,
            camera,
            pending: None,
            effects_destroyed: 0,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn handoff(&self) -> &HandOff {
        &self.handoff
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// 执行一帧
    pub fn frame(&mut self, now: f32) -> FrameOutcome {
        if self.state.is_terminal() {
            return FrameOutcome::Idle;
        }
        let start = *self.start_time.get_or_insert(now);
        self.elapsed = (now - start).max(0.0);
        self.frames += 1;

        if self.elapsed >= self.config.total_duration {
            self.terminate(RunState::Completed);
            return FrameOutcome::Finished(self.result());
        }

        if let Err(err) = self.handoff.advance(self.elapsed) {
            self.terminate(RunState::Failed);
            return FrameOutcome::Failed(err);
        }

        let mut failure = None;
        for effect in self.handoff.active() {
            if let Err(e) = effect.update(self.config.fixed_delta, self.elapsed) {
                failure = Some(FxError::structural(
                    format!("effect:update:{}", effect.name()),
                    e,
                ));
                break;
            }
        }
        if failure.is_none()
            && let Err(e) = self.scene.render_frame(&self.camera.state())
        {
            failure = Some(FxError::structural("render", EffectError::Scene(e)));
        }
        if let Some(err) = failure {
            self.terminate(RunState::Failed);
            return FrameOutcome::Failed(err);
        }

        FrameOutcome::Continue
    }

    /// 外部取消
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.terminate(RunState::Cancelled);
        true
    }

    /// 时间轴等外部来源导致的失败
    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.terminate(RunState::Failed);
        true
    }

    fn terminate(&mut self, state: RunState) {
        self.state = state;
        self.pending = None;

        let mut destroyed = self.handoff.teardown();
        destroyed += self.owned.iter().filter(|e| e.destroy()).count();
        self.effects_destroyed = self.handoff.replaced() + destroyed;

        if let Some(timeline) = &self.timeline {
            timeline.kill();
        }
        info!(
            animation = %self.config.animation,
            state = ?state,
            frames = self.frames,
            elapsed = self.elapsed,
            destroyed,
            "播放结束，已清理全部效果"
        );
    }

    fn result(&self) -> PlaybackResult {
        PlaybackResult {
            animation: self.config.animation.clone(),
            frames: self.frames,
            elapsed: self.elapsed,
            effects_destroyed: self.effects_destroyed,
            timeline_completed: self.timeline.as_ref().is_none_or(|t| t.is_finished()),
        }
    }
}

impl fmt::Debug for CoordinatorRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorRun")
            .field("animation", &self.config.animation)
            .field("state", &self.state)
            .field("elapsed", &self.elapsed)
            .field("frames", &self.frames)
            .field("active", &self.handoff.active().len())
            .finish()
    }
}

// ========== 播放句柄 ==========

/// 帧回调之外也能读取的播放状态
///
/// 每帧结束、取消和终止后刷新；帧回调执行期间读到的是上一次刷新的值。
/// 帧回调期间收到的取消和失败请求也暂存在这里，本帧结束后生效。
struct Status {
    state: Cell<RunState>,
    elapsed: Cell<f32>,
    frames: Cell<u64>,
    active: RefCell<Vec<String>>,
    cancel_requested: Cell<bool>,
    abort_requested: RefCell<Option<FxError>>,
}

impl Status {
    fn new(run: &CoordinatorRun) -> Self {
        let status = Self {
            state: Cell::new(run.state()),
            elapsed: Cell::new(0.0),
            frames: Cell::new(0),
            active: RefCell::new(Vec::new()),
            cancel_requested: Cell::new(false),
            abort_requested: RefCell::new(None),
        };
        status.refresh(run);
        status
    }

    fn refresh(&self, run: &CoordinatorRun) {
        self.state.set(run.state());
        self.elapsed.set(run.elapsed());
        self.frames.set(run.frames());
        *self.active.borrow_mut() = run
            .handoff()
            .active()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
    }

    fn clear_requests(&self) {
        self.cancel_requested.set(false);
        self.abort_requested.borrow_mut().take();
    }
}

/// 正在进行的播放
///
/// 可以克隆；`dispose` 幂等，在自然完成或失败之后调用是空操作。
/// 丢弃句柄不会取消播放。
#[derive(Clone)]
pub struct Playback {
    run: Rc<RefCell<CoordinatorRun>>,
    status: Rc<Status>,
    scheduler: Rc<dyn FrameScheduler>,
    reporter: Reporter,
}

impl Playback {
    /// 挂到帧循环上开始播放
    pub fn start(run: CoordinatorRun, scheduler: Rc<dyn FrameScheduler>, reporter: Reporter) -> Self {
        info!(
            animation = %run.config.animation,
            total = run.config.total_duration,
            "开始播放"
        );
        let playback = Self {
            status: Rc::new(Status::new(&run)),
            run: Rc::new(RefCell::new(run)),
            scheduler,
            reporter,
        };
        playback.schedule();
        playback
    }

    fn schedule(&self) {
        let me = self.clone();
        let id = self
            .scheduler
            .request_frame(Box::new(move |now| me.on_frame(now)));
        match self.run.try_borrow_mut() {
            Ok(mut run) => run.pending = Some(id),
            Err(_) => {
                error!("播放状态被占用，无法登记帧请求");
                self.scheduler.cancel_frame(id);
            }
        }
    }

    fn on_frame(&self, now: f32) {
        let outcome = match self.run.try_borrow_mut() {
            Ok(mut run) => {
                run.pending = None;
                let outcome = run.frame(now);
                self.status.refresh(&run);
                outcome
            }
            Err(_) => {
                error!("播放状态被占用，跳过本帧");
                return;
            }
        };
        match outcome {
            FrameOutcome::Continue => {
                if !self.settle_requests() {
                    self.schedule();
                }
            }
            FrameOutcome::Finished(result) => {
                self.status.clear_requests();
                self.reporter.complete(result);
            }
            FrameOutcome::Failed(err) => {
                self.status.clear_requests();
                self.reporter.fatal(&err);
            }
            FrameOutcome::Idle => self.status.clear_requests(),
        }
    }

    /// 执行帧回调期间积压的失败或取消请求
    ///
    /// # 返回
    /// 播放是否已经结束（此时不再请求帧）
    fn settle_requests(&self) -> bool {
        let abort = self.status.abort_requested.borrow_mut().take();
        let cancel = self.status.cancel_requested.replace(false);
        if abort.is_none() && !cancel {
            return false;
        }

        let (terminated, finished) = match self.run.try_borrow_mut() {
            Ok(mut run) => {
                let terminated = if abort.is_some() { run.fail() } else { run.cancel() };
                self.status.refresh(&run);
                (terminated, run.state().is_terminal())
            }
            Err(_) => {
                error!("播放状态被占用，无法执行积压的终止请求");
                return false;
            }
        };
        debug!(cancel, aborted = abort.is_some(), "本帧结束后终止播放");
        if terminated && let Some(err) = abort {
            self.reporter.fatal(&err);
        }
        finished
    }

    /// 取消播放：取消挂起的帧并执行终止清理，不上报完成或错误
    ///
    /// 可以在任何时候调用。在帧回调执行期间（例如效果的 `update` 中）调用时，
    /// 本帧结束后立即执行终止清理，不会再请求下一帧。
    ///
    /// # 返回
    /// 本次调用是否取消（或登记取消）了播放
    pub fn dispose(&self) -> bool {
        let Ok(mut run) = self.run.try_borrow_mut() else {
            if self.status.state.get().is_terminal() || self.status.cancel_requested.replace(true) {
                return false;
            }
            debug!("播放正在执行帧回调，本帧结束后取消");
            return true;
        };
        if run.state().is_terminal() {
            return false;
        }
        if let Some(id) = run.pending.take() {
            self.scheduler.cancel_frame(id);
        }
        let cancelled = run.cancel();
        self.status.refresh(&run);
        cancelled
    }

    /// 由外部失败（时间轴调用项）终止播放并上报
    ///
    /// 帧回调执行期间调用时，本帧结束后终止。
    pub fn abort(&self, err: FxError) {
        let terminated = match self.run.try_borrow_mut() {
            Ok(mut run) => {
                if let Some(id) = run.pending.take() {
                    self.scheduler.cancel_frame(id);
                }
                let terminated = run.fail();
                self.status.refresh(&run);
                terminated
            }
            Err(_) => {
                let mut pending = self.status.abort_requested.borrow_mut();
                if pending.is_none() && !self.status.state.get().is_terminal() {
                    warn!(error = %err, "播放正在执行帧回调，本帧结束后终止");
                    *pending = Some(err);
                }
                return;
            }
        };
        if terminated {
            self.reporter.fatal(&err);
        }
    }

    pub fn state(&self) -> RunState {
        match self.run.try_borrow() {
            Ok(run) => run.state(),
            Err(_) => self.status.state.get(),
        }
    }

    pub fn elapsed(&self) -> f32 {
        match self.run.try_borrow() {
            Ok(run) => run.elapsed(),
            Err(_) => self.status.elapsed.get(),
        }
    }

    pub fn frames(&self) -> u64 {
        match self.run.try_borrow() {
            Ok(run) => run.frames(),
            Err(_) => self.status.frames.get(),
        }
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// 活跃效果名称（按插入顺序）
    pub fn active_effects(&self) -> Vec<String> {
        match self.run.try_borrow() {
            Ok(run) => run
                .handoff()
                .active()
                .iter()
                .map(|e| e.name().to_string())
                .collect(),
            Err(_) => self.status.active.borrow().clone(),
        }
    }
}

impl fmt::Debug for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.run.try_borrow() {
            Ok(run) => fmt::Debug::fmt(&*run, f),
            Err(_) => f.write_str("Playback { <running> }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::testing::{Trace, Tracer, tracer_handle};
    use crate::error::FailureClass;
    use crate::frame::testing::ManualScheduler;
    use crate::report::PlaybackCallbacks;
    use crate::scene::testing::CountingScene;

    struct Harness {
        scheduler: Rc<ManualScheduler>,
        scene: Rc<CountingScene>,
        trace: Trace,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                scheduler: Rc::new(ManualScheduler::default()),
                scene: Rc::new(CountingScene::default()),
                trace: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn tracer(&self, id: u64, name: &str) -> (EffectHandle, Rc<RefCell<Tracer>>) {
            tracer_handle(id, Tracer::new(name, self.trace.clone()))
        }

        fn reporter(&self) -> Reporter {
            let done = self.trace.clone();
            let failed = self.trace.clone();
            Reporter::new(
                "scenario",
                PlaybackCallbacks::new(
                    move |r| {
                        done.borrow_mut().push(format!(
                            "complete:frames={}:destroyed={}",
                            r.frames, r.effects_destroyed
                        ))
                    },
                    move |err, stage| {
                        let class = match err.class() {
                            FailureClass::Cosmetic => "cosmetic",
                            FailureClass::Structural => "structural",
                            FailureClass::Construction => "construction",
                        };
                        failed.borrow_mut().push(format!("error:{class}:{stage}"))
                    },
                ),
            )
        }

        fn start(
            &self,
            total: f32,
            initial: Vec<EffectHandle>,
            switches: Vec<SwitchPoint>,
            owned: Vec<EffectHandle>,
        ) -> Playback {
            let handoff = HandOff::new(initial, switches).unwrap();
            let run = CoordinatorRun::new(
                RunConfig {
                    animation: "scenario".into(),
                    total_duration: total,
                    fixed_delta: 1.0 / 60.0,
                },
                handoff,
                owned,
                None,
                self.scene.clone(),
                Rc::new(Camera::default()),
            )
            .unwrap();
            Playback::start(run, self.scheduler.clone(), self.reporter())
        }

        fn events(&self) -> Vec<String> {
            self.trace.borrow().clone()
        }
    }

    // ========== 切换计划校验 ==========

    #[test]
    fn test_thresholds_must_increase() {
        let h = Harness::new();
        let (a, _) = h.tracer(1, "a");
        let (b, _) = h.tracer(2, "b");
        let result = HandOff::new(
            vec![],
            vec![SwitchPoint::add(2.0, a), SwitchPoint::add(2.0, b)],
        );
        assert_eq!(
            result.unwrap_err(),
            ScheduleError::NonIncreasingThreshold {
                index: 1,
                at: 2.0,
                previous: 2.0,
            }
        );

        let (c, _) = h.tracer(3, "c");
        let result = HandOff::new(vec![], vec![SwitchPoint::add(f32::NAN, c)]);
        assert!(matches!(
            result,
            Err(ScheduleError::InvalidThreshold { index: 0, .. })
        ));
    }

    #[test]
    fn test_total_duration_must_be_positive() {
        let h = Harness::new();
        let result = CoordinatorRun::new(
            RunConfig {
                animation: "x".into(),
                total_duration: 0.0,
                fixed_delta: 0.1,
            },
            HandOff::new(vec![], vec![]).unwrap(),
            vec![],
            None,
            h.scene.clone(),
            Rc::new(Camera::default()),
        );
        assert!(matches!(
            result,
            Err(ScheduleError::InvalidTotalDuration(_))
        ));
    }

    // ========== 播放 ==========

    #[test]
    fn test_example_scenario() {
        let h = Harness::new();
        let (a, ta) = h.tracer(1, "a");
        let (b, tb) = h.tracer(2, "b");
        let (c, tc) = h.tracer(3, "c");

        let playback = h.start(
            9.0,
            vec![a.clone()],
            vec![
                SwitchPoint::add(2.0, b.clone()).animated(1.0),
                SwitchPoint::replace(4.5, vec![c.clone()]).animated(1.0),
            ],
            vec![a, b, c],
        );

        for second in 0..=9 {
            h.scheduler.tick(100.0 + second as f32);
            if second == 3 {
                assert_eq!(playback.active_effects(), vec!["a", "b"]);
            }
            if second == 5 {
                assert_eq!(playback.active_effects(), vec!["c"]);
            }
        }

        insta::assert_debug_snapshot!(h.events(), @r#"
        [
            "b:animate",
            "a:destroy",
            "b:destroy",
            "c:animate",
            "c:destroy",
            "complete:frames=10:destroyed=3",
        ]
        "#);

        assert_eq!(playback.state(), RunState::Completed);
        assert_eq!(h.scheduler.pending(), 0);
        // 阈值在 elapsed 超过后才生效：A 在 0-4 秒更新 5 次，B 在 3-4 秒更新 2 次，C 在 5-8 秒更新 4 次
        assert_eq!(ta.borrow().updates, 5);
        assert_eq!(tb.borrow().updates, 2);
        assert_eq!(tc.borrow().updates, 4);
        for tracer in [&ta, &tb, &tc] {
            assert_eq!(tracer.borrow().destroys, 1);
        }
        assert_eq!(h.scene.state.borrow().renders, 9);
    }

    #[test]
    fn test_several_thresholds_in_one_frame() {
        let h = Harness::new();
        let (a, _) = h.tracer(1, "a");
        let (b, _) = h.tracer(2, "b");
        let (c, _) = h.tracer(3, "c");

        let playback = h.start(
            9.0,
            vec![a.clone()],
            vec![
                SwitchPoint::add(2.0, b.clone()),
                SwitchPoint::replace(4.5, vec![c.clone()]),
            ],
            vec![a, b, c],
        );

        h.scheduler.tick(0.0);
        h.scheduler.tick(6.0);
        assert_eq!(playback.active_effects(), vec!["c"]);
        assert_eq!(h.events(), vec!["a:destroy", "b:destroy"]);
    }

    #[test]
    fn test_update_failure_cleans_up_everything() {
        let h = Harness::new();
        let (a, ta) = h.tracer(1, "a");
        let mut failing = Tracer::new("b", h.trace.clone());
        failing.fail_update_at = Some(3.0);
        let (b, tb) = tracer_handle(2, failing);
        // 从未进入活跃集合的效果也要被清理
        let (c, tc) = h.tracer(3, "c");

        let playback = h.start(
            9.0,
            vec![a.clone(), b.clone()],
            vec![SwitchPoint::add(6.0, c.clone())],
            vec![a, b, c],
        );

        for second in 0..5 {
            h.scheduler.tick(second as f32);
        }

        assert_eq!(playback.state(), RunState::Failed);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(
            h.events(),
            vec![
                "a:destroy",
                "b:destroy",
                "c:destroy",
                "error:structural:effect:update:b",
            ]
        );
        for tracer in [&ta, &tb, &tc] {
            assert_eq!(tracer.borrow().destroys, 1);
        }

        // 终止后不再上报任何内容
        assert!(!playback.dispose());
        assert_eq!(h.events().len(), 4);
    }

    #[test]
    fn test_panic_in_update_is_structural() {
        let h = Harness::new();
        let mut panicking = Tracer::new("a", h.trace.clone());
        panicking.panic_update_at = Some(1.0);
        let (a, _) = tracer_handle(1, panicking);

        let playback = h.start(5.0, vec![a.clone()], vec![], vec![a]);
        h.scheduler.tick(0.0);
        h.scheduler.tick(1.0);

        assert_eq!(playback.state(), RunState::Failed);
        assert_eq!(
            h.events(),
            vec!["a:destroy", "error:structural:effect:update:a"]
        );
    }

    #[test]
    fn test_animate_failure_on_entry_is_structural() {
        let h = Harness::new();
        let (a, _) = h.tracer(1, "a");
        let mut failing = Tracer::new("b", h.trace.clone());
        failing.fail_animate = true;
        let (b, _) = tracer_handle(2, failing);

        let playback = h.start(
            5.0,
            vec![a.clone()],
            vec![SwitchPoint::add(1.0, b.clone()).animated(0.5)],
            vec![a, b],
        );
        h.scheduler.tick(0.0);
        h.scheduler.tick(1.5);

        assert_eq!(playback.state(), RunState::Failed);
        assert_eq!(
            h.events(),
            vec![
                "b:animate",
                "a:destroy",
                "b:destroy",
                "error:structural:handoff:animate:b",
            ]
        );
    }

    #[test]
    fn test_render_failure_is_structural() {
        let h = Harness::new();
        let (a, _) = h.tracer(1, "a");
        h.scene.state.borrow_mut().fail_render = true;

        let playback = h.start(5.0, vec![a.clone()], vec![], vec![a]);
        h.scheduler.tick(0.0);

        assert_eq!(playback.state(), RunState::Failed);
        assert_eq!(h.events(), vec!["a:destroy", "error:structural:render"]);
    }

    #[test]
    fn test_dispose_is_idempotent_and_silent() {
        let h = Harness::new();
        let (a, ta) = h.tracer(1, "a");
        let playback = h.start(5.0, vec![a.clone()], vec![], vec![a]);

        h.scheduler.tick(0.0);
        assert_eq!(h.scheduler.pending(), 1);

        assert!(playback.dispose());
        assert!(!playback.dispose());
        assert_eq!(playback.state(), RunState::Cancelled);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(ta.borrow().destroys, 1);
        assert_eq!(h.events(), vec!["a:destroy"]);
    }

    #[test]
    fn test_abort_reports_once() {
        let h = Harness::new();
        let (a, _) = h.tracer(1, "a");
        let playback = h.start(5.0, vec![a.clone()], vec![], vec![a]);
        h.scheduler.tick(0.0);

        let err = FxError::structural(
            "phase:climax",
            EffectError::Busy {
                effect: "a".into(),
            },
        );
        playback.abort(err.clone());
        playback.abort(err);
        h.scheduler.tick(1.0);

        assert_eq!(playback.state(), RunState::Failed);
        assert_eq!(
            h.events(),
            vec!["a:destroy", "error:structural:phase:climax"]
        );
    }

    #[test]
    fn test_stale_frame_after_abort_is_idle() {
        let h = Harness::new();
        let (a, ta) = h.tracer(1, "a");
        let mut run = CoordinatorRun::new(
            RunConfig {
                animation: "x".into(),
                total_duration: 5.0,
                fixed_delta: 0.1,
            },
            HandOff::new(vec![a.clone()], vec![]).unwrap(),
            vec![a],
            None,
            h.scene.clone(),
            Rc::new(Camera::default()),
        )
        .unwrap();

        assert_eq!(run.frame(0.0), FrameOutcome::Continue);
        assert!(run.fail());
        assert_eq!(run.frame(0.5), FrameOutcome::Idle);
        assert_eq!(ta.borrow().updates, 1);
    }

    #[test]
    fn test_threshold_on_frame_boundary_applies_next_frame() {
        let h = Harness::new();
        let (a, _) = h.tracer(1, "a");
        let (b, _) = h.tracer(2, "b");
        let (c, _) = h.tracer(3, "c");

        let playback = h.start(
            5.0,
            vec![a.clone()],
            vec![SwitchPoint::add(0.0, b.clone()), SwitchPoint::add(1.0, c.clone())],
            vec![a, b, c],
        );

        let mut seen = Vec::new();
        for now in [0.0, 0.5, 1.0, 1.5] {
            h.scheduler.tick(now);
            seen.push(playback.active_effects().join(","));
        }
        assert_eq!(seen, vec!["a", "a,b", "a,b", "a,b,c"]);
    }

    // ========== 帧回调中使用播放句柄 ==========

    type Slot = Rc<RefCell<Option<Playback>>>;

    /// 在 `update` 中拿到播放句柄的效果
    fn with_playback_hook(
        h: &Harness,
        hook: impl FnMut(&Playback, f32) + 'static,
    ) -> (EffectHandle, Rc<RefCell<Tracer>>, Slot) {
        let slot: Slot = Rc::new(RefCell::new(None));
        let inner = slot.clone();
        let mut hook = hook;
        let mut tracer = Tracer::new("a", h.trace.clone());
        tracer.on_update = Some(Box::new(move |elapsed| {
            if let Some(playback) = inner.borrow().as_ref() {
                hook(playback, elapsed);
            }
        }));
        let (handle, tracer) = tracer_handle(1, tracer);
        (handle, tracer, slot)
    }

    #[test]
    fn test_dispose_inside_update_cancels_after_frame() {
        let h = Harness::new();
        let answers = Rc::new(RefCell::new(Vec::new()));
        let sink = answers.clone();
        let (a, ta, slot) = with_playback_hook(&h, move |playback, elapsed| {
            if elapsed >= 1.0 {
                sink.borrow_mut().push(playback.dispose());
                sink.borrow_mut().push(playback.dispose());
            }
        });
        let playback = h.start(5.0, vec![a.clone()], vec![], vec![a]);
        *slot.borrow_mut() = Some(playback.clone());

        for second in 0..=5 {
            h.scheduler.tick(second as f32);
        }

        // 第一次登记取消，第二次是空操作；本帧结束后立即清理，不再请求帧
        assert_eq!(*answers.borrow(), vec![true, false]);
        assert_eq!(playback.state(), RunState::Cancelled);
        assert_eq!(playback.frames(), 2);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(ta.borrow().updates, 2);
        // 没有完成或错误上报
        assert_eq!(h.events(), vec!["a:destroy"]);
        assert!(!playback.dispose());
    }

    #[test]
    fn test_status_queries_inside_update() {
        let h = Harness::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let (a, _, slot) = with_playback_hook(&h, move |playback, _| {
            sink.borrow_mut().push(format!(
                "{:?}:{}:{}",
                playback.state(),
                playback.frames(),
                playback.active_effects().join(",")
            ));
        });
        let playback = h.start(3.0, vec![a.clone()], vec![], vec![a]);
        *slot.borrow_mut() = Some(playback.clone());

        for second in 0..=3 {
            h.scheduler.tick(second as f32);
        }

        // 帧内读到的是上一帧结束时的状态
        assert_eq!(
            *seen.borrow(),
            vec!["Running:0:a", "Running:1:a", "Running:2:a"]
        );
        assert_eq!(playback.state(), RunState::Completed);
        assert_eq!(
            h.events(),
            vec!["a:destroy", "complete:frames=4:destroyed=1"]
        );
    }

    #[test]
    fn test_abort_inside_update_fails_after_frame() {
        let h = Harness::new();
        let (a, _, slot) = with_playback_hook(&h, |playback, elapsed| {
            if elapsed >= 1.0 {
                playback.abort(FxError::structural(
                    "phase:climax",
                    EffectError::Busy {
                        effect: "a".into(),
                    },
                ));
            }
        });
        let playback = h.start(5.0, vec![a.clone()], vec![], vec![a]);
        *slot.borrow_mut() = Some(playback.clone());

        for second in 0..=5 {
            h.scheduler.tick(second as f32);
        }

        assert_eq!(playback.state(), RunState::Failed);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(
            h.events(),
            vec!["a:destroy", "error:structural:phase:climax"]
        );
    }
}
