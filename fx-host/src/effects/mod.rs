//! # Effects 模块
//!
//! 画廊使用的具体效果。
//!
//! 每个效果都通过 [`OwnedSubtree`](fx_runtime::OwnedSubtree) 独占自己的节点与资源，
//! 内嵌 [`Lifecycle`](fx_runtime::Lifecycle) 负责阶段和过渡，
//! 构造中途失败时已创建的部分由子树的 `Drop` 释放。
//!
//! - [`ParticleField`]：按计算能力确定规模的粒子云，每帧上传顶点
//! - [`ShaderSurface`]：全屏着色器面片，每帧写入 uniform
//! - [`RingPulse`]：向外扩散的环形脉冲

mod particle_field;
mod ring_pulse;
mod shader_surface;

pub use particle_field::{ParticleConfig, ParticleField, ParticleVertex};
pub use ring_pulse::{RingConfig, RingPulse};
pub use shader_surface::{ShaderConfig, ShaderSurface, SurfaceUniforms};

use fx_runtime::{EffectError, EffectPhase, SceneError};

/// 各效果的默认参数
///
/// 模块里需要默认值的地方都应使用这些常量。
pub mod defaults {
    /// 没有计算服务时的粒子数量
    pub const CPU_PARTICLES: usize = 2_048;
    /// 有计算服务时请求的粒子数量（还会受服务上限约束）
    pub const GPU_PARTICLES: usize = 12_000;
    /// 粒子云半径
    pub const PARTICLE_RADIUS: f32 = 6.0;
    /// 环数量
    pub const RING_COUNT: usize = 6;
    /// 环的最大半径
    pub const RING_MAX_RADIUS: f32 = 8.0;
    /// 单个环从出现到消失的周期（秒）
    pub const RING_PERIOD: f32 = 1.6;
    /// 默认过渡时长（秒）
    pub const ANIMATE_DURATION: f32 = 1.2;
}

/// 阶段对模拟速度的倍率
pub(crate) fn phase_gain(phase: EffectPhase) -> f32 {
    match phase {
        EffectPhase::Idle => 0.5,
        EffectPhase::Warmup => 0.8,
        EffectPhase::Active => 1.0,
        EffectPhase::Intensify => 1.6,
        EffectPhase::Climax => 2.4,
        EffectPhase::Coda => 0.6,
    }
}

/// 构造期间的场景错误转换为构造失败
pub(crate) fn build_failed(effect: &str, err: SceneError) -> EffectError {
    EffectError::BuildFailed {
        effect: effect.to_string(),
        message: err.to_string(),
    }
}

/// 逐帧更新期间的场景错误转换为更新失败
pub(crate) fn update_failed(effect: &str, err: SceneError) -> EffectError {
    EffectError::UpdateFailed {
        effect: effect.to_string(),
        message: err.to_string(),
    }
}
