//! # Module 模块
//!
//! 动画模块（组合根）与启动流程。
//!
//! 动画模块负责构造效果、编写阶段时间轴和切换计划；
//! [`launch`] 负责把这些交给补间引擎和播放协调器，并保证任何一步失败时
//! 已经构造的效果都会被销毁。

use std::fmt;

use tracing::{debug, info, warn};

use crate::coordinator::{CoordinatorRun, HandOff, Playback, RunConfig, SwitchPoint};
use crate::effect::{Effect, EffectHandle, EffectId};
use crate::error::{ConstructionError, EffectError, FxError};
use crate::context::RenderContext;
use crate::report::{PlaybackCallbacks, Reporter};
use crate::timeline::TimelineBuilder;

/// 模块组合结果
pub struct Composition {
    /// 总时长（秒）
    pub total_duration: f32,
    /// 初始活跃效果
    pub initial: Vec<EffectHandle>,
    /// 切换计划（阈值严格递增）
    pub switches: Vec<SwitchPoint>,
    /// 阶段时间轴
    pub timeline: TimelineBuilder,
}

impl Composition {
    pub fn new(total_duration: f32, timeline: TimelineBuilder) -> Self {
        Self {
            total_duration,
            initial: Vec::new(),
            switches: Vec::new(),
            timeline,
        }
    }

    pub fn with_initial(mut self, effect: EffectHandle) -> Self {
        self.initial.push(effect);
        self
    }

    pub fn switch(mut self, point: SwitchPoint) -> Self {
        self.switches.push(point);
        self
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("total_duration", &self.total_duration)
            .field("initial", &self.initial)
            .field("switches", &self.switches)
            .field("timeline", &self.timeline)
            .finish()
    }
}

/// 效果构造登记
///
/// 模块通过它创建效果；启动失败时据此销毁已构造的全部效果。
#[derive(Debug, Default)]
pub struct EffectKit {
    next_id: u64,
    handles: Vec<EffectHandle>,
}

impl EffectKit {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记已构造的效果
    pub fn add<E: Effect + 'static>(&mut self, effect: E) -> EffectHandle {
        self.next_id += 1;
        let handle = EffectHandle::new(EffectId(self.next_id), effect);
        debug!(effect = %handle.name(), id = %handle.id(), "效果已构造");
        self.handles.push(handle.clone());
        handle
    }

    /// 构造并登记效果
    pub fn build<E, F>(&mut self, construct: F) -> Result<EffectHandle, EffectError>
    where
        E: Effect + 'static,
        F: FnOnce() -> Result<E, EffectError>,
    {
        match construct() {
            Ok(effect) => Ok(self.add(effect)),
            Err(e) => {
                warn!(error = %e, built = self.handles.len(), "效果构造失败");
                Err(e)
            }
        }
    }

    pub fn handles(&self) -> &[EffectHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 销毁已登记的全部效果
    pub fn destroy_all(&mut self) -> usize {
        self.handles.drain(..).filter(|h| h.destroy()).count()
    }

    pub fn into_handles(self) -> Vec<EffectHandle> {
        self.handles
    }
}

/// 动画模块
pub trait AnimationModule {
    /// 注册表中的标识
    fn id(&self) -> &str;

    /// 展示名称
    fn title(&self) -> &str;

    /// 构造效果并编写时间轴
    ///
    /// 通过 `kit` 构造的效果在返回 `Err` 时会被统一销毁。
    fn compose(&self, ctx: &RenderContext, kit: &mut EffectKit) -> Result<Composition, FxError>;
}

/// 启动动画模块
///
/// 1. 检查渲染表面
/// 2. 组合模块；失败时销毁已构造的效果并上报构造错误
/// 3. 构建时间轴和协调器
/// 4. 在补间引擎上播放时间轴
/// 5. 启动协调器
/// 6. 向时间轴注入 destroy 钩子
pub fn launch(
    module: &dyn AnimationModule,
    ctx: &RenderContext,
    callbacks: PlaybackCallbacks,
) -> Result<Playback, FxError> {
    let reporter = Reporter::new(module.id(), callbacks);
    let fail = |kit: &mut EffectKit, err: FxError| -> FxError {
        let destroyed = kit.destroy_all();
        if destroyed > 0 {
            debug!(animation = %module.id(), destroyed, "已销毁部分构造的效果");
        }
        reporter.fatal(&err);
        err
    };

    let mut kit = EffectKit::new();
    if let Err(e) = ctx.require_surface() {
        return Err(fail(&mut kit, e.into()));
    }

    let composition = match module.compose(ctx, &mut kit) {
        Ok(composition) => composition,
        Err(e) => return Err(fail(&mut kit, e)),
    };
    let Composition {
        total_duration,
        initial,
        switches,
        timeline,
    } = composition;

    let handoff = match HandOff::new(initial, switches) {
        Ok(handoff) => handoff,
        Err(e) => return Err(fail(&mut kit, e.into())),
    };
    let timeline = match timeline.report_to(reporter.clone()).build() {
        Ok(timeline) => timeline,
        Err(e) => return Err(fail(&mut kit, e.into())),
    };

    let config = RunConfig {
        animation: module.id().to_string(),
        total_duration,
        fixed_delta: ctx.fixed_delta,
    };
    let owned = kit.handles().to_vec();
    let run = match CoordinatorRun::new(
        config,
        handoff,
        owned,
        Some(timeline.handle()),
        ctx.scene.clone(),
        ctx.camera.clone(),
    ) {
        Ok(run) => run,
        Err(e) => return Err(fail(&mut kit, e.into())),
    };

    let handle = ctx.tweens.play(timeline);
    let playback = Playback::start(run, ctx.scheduler.clone(), reporter.clone());

    let aborter = playback.clone();
    if let Err(e) = handle.inject_destroy(Box::new(move |err| aborter.abort(err))) {
        playback.dispose();
        let err: FxError = ConstructionError::from(e).into();
        reporter.fatal(&err);
        return Err(err);
    }

    info!(
        animation = %module.id(),
        title = %module.title(),
        effects = kit.len(),
        "动画模块已启动"
    );
    Ok(playback)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::context::Surface;
    use crate::coordinator::RunState;
    use crate::effect::EffectPhase;
    use crate::effect::testing::{Trace, Tracer};
    use crate::frame::testing::ManualScheduler;
    use crate::scene::testing::CountingScene;
    use crate::timeline::{Position, TweenSpec};

    struct Fixture {
        scheduler: Rc<ManualScheduler>,
        ctx: RenderContext,
        trace: Trace,
    }

    fn fixture(surface: bool) -> Fixture {
        let scheduler = Rc::new(ManualScheduler::default());
        let mut ctx = RenderContext::new(Rc::new(CountingScene::default()), scheduler.clone());
        if surface {
            ctx = ctx.with_surface(Surface::new(640, 360));
        }
        Fixture {
            scheduler,
            ctx,
            trace: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn callbacks(trace: &Trace) -> PlaybackCallbacks {
        let done = trace.clone();
        let failed = trace.clone();
        PlaybackCallbacks::new(
            move |_| done.borrow_mut().push("complete".to_string()),
            move |err, stage| {
                failed
                    .borrow_mut()
                    .push(format!("error:{:?}:{stage}", err.class()))
            },
        )
    }

    /// 构造两个效果后在第三个上失败
    struct BrokenModule {
        trace: Trace,
    }

    impl AnimationModule for BrokenModule {
        fn id(&self) -> &str {
            "broken"
        }

        fn title(&self) -> &str {
            "Broken"
        }

        fn compose(&self, _ctx: &RenderContext, kit: &mut EffectKit) -> Result<Composition, FxError> {
            kit.add(Tracer::new("a", self.trace.clone()));
            kit.add(Tracer::new("b", self.trace.clone()));
            kit.build(|| -> Result<Tracer, EffectError> {
                Err(EffectError::BuildFailed {
                    effect: "c".into(),
                    message: "shader".into(),
                })
            })?;
            Ok(Composition::new(1.0, TimelineBuilder::new("broken")))
        }
    }

    /// 时间轴调用项驱动阶段切换
    struct PhasedModule {
        trace: Trace,
        fail_call: bool,
    }

    impl AnimationModule for PhasedModule {
        fn id(&self) -> &str {
            "phased"
        }

        fn title(&self) -> &str {
            "Phased"
        }

        fn compose(&self, ctx: &RenderContext, kit: &mut EffectKit) -> Result<Composition, FxError> {
            let a = kit.add(Tracer::new("a", self.trace.clone()));
            let climax = a.clone();
            let fail_call = self.fail_call;

            let timeline = TimelineBuilder::new("phased")
                .tween(
                    TweenSpec::new(ctx.camera.clone(), 2.0)
                        .to("position.z", 4.0)
                        .stage("camera:dolly"),
                )
                .call("phase:climax", Position::At(1.0), move || {
                    if fail_call {
                        return Err(EffectError::AnimateFailed {
                            effect: "a".into(),
                            message: "injected".into(),
                        });
                    }
                    climax.set_phase(EffectPhase::Climax)
                });

            Ok(Composition::new(3.0, timeline).with_initial(a))
        }
    }

    #[test]
    fn test_missing_surface_is_construction_error() {
        let f = fixture(false);
        let module = PhasedModule {
            trace: f.trace.clone(),
            fail_call: false,
        };
        let err = launch(&module, &f.ctx, callbacks(&f.trace)).unwrap_err();
        assert_eq!(err, FxError::Construction(ConstructionError::NoRenderSurface));
        assert_eq!(*f.trace.borrow(), vec!["error:Construction:construct"]);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_partial_construction_is_cleaned_up() {
        let f = fixture(true);
        let module = BrokenModule {
            trace: f.trace.clone(),
        };
        let err = launch(&module, &f.ctx, callbacks(&f.trace)).unwrap_err();
        assert!(matches!(
            err,
            FxError::Construction(ConstructionError::Effect(EffectError::BuildFailed { .. }))
        ));
        assert_eq!(
            *f.trace.borrow(),
            vec!["a:destroy", "b:destroy", "error:Construction:construct"]
        );
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_timeline_calls_drive_phases() {
        let f = fixture(true);
        let module = PhasedModule {
            trace: f.trace.clone(),
            fail_call: false,
        };
        let playback = launch(&module, &f.ctx, callbacks(&f.trace)).unwrap();

        // 引擎与协调器各请求一帧
        assert_eq!(f.scheduler.pending(), 2);
        for step in 0..=4 {
            f.scheduler.tick(step as f32);
        }

        assert_eq!(playback.state(), RunState::Completed);
        assert_eq!(*f.trace.borrow(), vec!["a:destroy", "complete"]);
        assert_eq!(f.ctx.camera.position().z, 4.0);
        assert_eq!(f.ctx.tweens.active_count(), 0);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_failed_call_aborts_playback() {
        let f = fixture(true);
        let module = PhasedModule {
            trace: f.trace.clone(),
            fail_call: true,
        };
        let playback = launch(&module, &f.ctx, callbacks(&f.trace)).unwrap();

        f.scheduler.tick(0.0);
        f.scheduler.tick(1.0);
        f.scheduler.tick(2.0);

        assert_eq!(playback.state(), RunState::Failed);
        assert_eq!(
            *f.trace.borrow(),
            vec!["a:destroy", "error:Structural:phase:climax"]
        );
        assert_eq!(f.scheduler.pending(), 0);
    }
}
