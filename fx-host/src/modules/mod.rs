//! # Modules 模块
//!
//! 画廊内置的动画模块（组合根）。
//!
//! 每个模块构造自己的效果、编写阶段时间轴和切换计划，
//! 由 [`launch`](fx_runtime::launch) 启动。
//!
//! | 标识 | 模块 | 切换方式 |
//! |------|------|----------|
//! | `nebula-dive` | [`NebulaDive`] | 追加后整体替换 |
//! | `aurora-orbit` | [`AuroraOrbit`] | 只追加 |
//! | `warp-tunnel` | [`WarpTunnel`] | 延迟加载，阶段调用项驱动 |

mod aurora_orbit;
mod nebula_dive;
mod warp_tunnel;

pub use aurora_orbit::AuroraOrbit;
pub use nebula_dive::NebulaDive;
pub use warp_tunnel::WarpTunnel;

use fx_runtime::{RenderContext, TweenSpec, camera_step};

/// 相机补间：每步之后重新 `look_at` 并同步控制器
pub(crate) fn camera_tween(ctx: &RenderContext, duration: f32, stage: &str) -> TweenSpec {
    TweenSpec::new(ctx.camera.clone(), duration)
        .stage(format!("camera:{stage}"))
        .on_update(camera_step(ctx.camera.clone(), ctx.controls.clone()))
}
