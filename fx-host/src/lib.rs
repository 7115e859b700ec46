//! # FX Host
//!
//! 视觉效果画廊的宿主层。
//!
//! ## 架构说明
//!
//! Host 层负责提供 `fx-runtime` 约定的外部协作者，并在其上实现具体内容：
//! - 内存场景图（资源记账 + 故障注入）
//! - 模拟时钟帧循环
//! - 具体效果与动画模块
//! - 动画注册表
//! - 配置、日志与 headless 播放
//!
//! Host 层不包含播放协调逻辑，协调、清理与失败分类都在 `fx-runtime` 中完成。

pub mod config;
pub mod effects;
pub mod frame_loop;
pub mod logging;
pub mod modules;
pub mod player;
pub mod registry;
pub mod scene;

pub use config::{AppConfig, ComputeConfig, ConfigError, LogConfig, PlaybackConfig, SurfaceConfig};
pub use effects::{ParticleField, RingPulse, ShaderSurface};
pub use frame_loop::FrameLoop;
pub use modules::{AuroraOrbit, NebulaDive, WarpTunnel};
pub use player::{HeadlessPlayer, PlayOptions, PlayOutcome, PlaySummary, ReportedError};
pub use registry::{AnimationInfo, AnimationRegistry, RegistryError};
pub use scene::{MemoryScene, SceneStats};
