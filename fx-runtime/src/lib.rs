//! # FX Runtime
//!
//! 视觉效果画廊的效果生命周期与播放协调核心。
//!
//! ## 架构概述
//!
//! `fx-runtime` 是纯逻辑核心，不依赖任何渲染后端或 IO。
//! 场景图、帧调度等外部协作者都以 trait 的形式约定，由宿主层提供实现：
//!
//! ```text
//! Host                                  Runtime
//!   │                                      │
//!   │── AnimationModule + RenderContext ─►│ launch()
//!   │                                      │
//!   │── FrameScheduler 帧回调 ───────────►│ TweenEngine / Playback
//!   │                                      │
//!   │◄── SceneGraph 调用 ─────────────────│ 效果挂载/更新/释放子树
//!   │◄── on_complete / on_error ──────────│ Reporter
//! ```
//!
//! ## 组件（从叶到根）
//!
//! - [`Effect`]：效果实例约定，通过 [`EffectHandle`] 受保护地调用
//! - [`Timeline`]：阶段时间轴，运行在 [`TweenEngine`] 自己的帧回调上
//! - [`Playback`]：播放协调器，逐帧驱动效果、按阈值切换、统一清理
//! - [`AnimationModule`]：组合根，[`launch`] 负责启动与部分构造的清理
//!
//! ## 失败分类
//!
//! - 表现层失败（相机回调）：记录并上报，播放继续
//! - 结构性失败（效果 `update`/`animate`、渲染、时间轴调用项）：立即终止并清理
//! - 构造失败：清理已构造的效果，协调器不启动
//!
//! ## 模块结构
//!
//! - [`math`] / [`easing`] / [`animatable`] / [`tween`]：补间基础
//! - [`timeline`] / [`engine`]：阶段时间轴与补间引擎
//! - [`scene`] / [`camera`] / [`frame`] / [`compute`] / [`context`]：外部协作者约定
//! - [`effect`] / [`transition`]：效果约定与多阶段过渡
//! - [`coordinator`] / [`module`] / [`report`]：播放协调与组合根
//! - [`error`]：错误类型定义

pub mod animatable;
pub mod camera;
pub mod compute;
pub mod context;
pub mod coordinator;
pub mod easing;
pub mod effect;
pub mod engine;
pub mod error;
pub mod frame;
pub mod math;
pub mod module;
pub mod report;
pub mod scene;
pub mod timeline;
pub mod transition;
pub mod tween;

// 重导出核心类型
pub use animatable::{Animatable, PropertyBag};
pub use camera::{Camera, CameraControls, CameraState, camera_step};
pub use compute::{ComputeCapability, ComputeError, ComputeRuntime, ComputeService};
pub use context::{DEFAULT_FIXED_DELTA, RenderContext, Surface};
pub use coordinator::{
    CoordinatorRun, FrameOutcome, HandOff, Playback, RunConfig, RunState, SwitchAction,
    SwitchPoint,
};
pub use easing::{EaseDirection, EasingFunction, UnknownEasing};
pub use effect::{Effect, EffectHandle, EffectId, EffectPhase, Lifecycle};
pub use engine::TweenEngine;
pub use error::{
    CameraError, ConstructionError, EffectError, FailureClass, FxError, FxResult, SceneError,
    ScheduleError, TimelineError,
};
pub use frame::{FrameCallback, FrameRequestId, FrameScheduler};
pub use math::{NodeTransform, Vec3};
pub use module::{AnimationModule, Composition, EffectKit, launch};
pub use report::{PlaybackCallbacks, PlaybackResult, Reporter};
pub use scene::{NodeDesc, NodeId, OwnedSubtree, ResourceDesc, ResourceId, ResourceKind, SceneGraph};
pub use timeline::{Position, Timeline, TimelineBuilder, TimelineHandle, TimelineStep, TweenSpec};
pub use transition::{OnComplete, Stage, StagedTransition, TransitionHandle};
pub use tween::{PropertyTarget, Tween, TweenState};
