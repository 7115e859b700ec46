//! 星云俯冲

use fx_runtime::{
    AnimationModule, Composition, EasingFunction, EffectKit, EffectPhase, FxError, Position,
    RenderContext, SwitchPoint, TimelineBuilder,
};

use super::camera_tween;
use crate::effects::{
    ParticleConfig, ParticleField, RingConfig, RingPulse, ShaderConfig, ShaderSurface,
};

/// 星云俯冲
///
/// 9 秒。粒子云从 0 秒开始；2 秒时追加着色器面纱；
/// 4.5 秒时整体替换为环形脉冲（粒子云和面纱在此销毁）。
/// 相机全程向星云中心推进。
#[derive(Debug, Default, Clone, Copy)]
pub struct NebulaDive;

impl NebulaDive {
    pub const ID: &'static str = "nebula-dive";
    pub const DURATION: f32 = 9.0;
    /// 追加面纱的阈值
    pub const VEIL_AT: f32 = 2.0;
    /// 替换为环形脉冲的阈值
    pub const BURST_AT: f32 = 4.5;
}

impl AnimationModule for NebulaDive {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Nebula Dive"
    }

    fn compose(&self, ctx: &RenderContext, kit: &mut EffectKit) -> Result<Composition, FxError> {
        let core = kit.build(|| {
            ParticleField::new(
                ctx,
                ParticleConfig::new("nebula-core").with_color([0.62, 0.38, 1.0, 1.0]),
            )
        })?;
        let veil = kit.build(|| {
            ShaderSurface::new(
                ctx,
                ShaderConfig::new("nebula-veil", "nebula").with_tint([0.3, 0.5, 1.0, 0.8]),
            )
        })?;
        let burst = kit.build(|| RingPulse::new(ctx, RingConfig::new("ring-burst")))?;

        let warmup = core.clone();
        let intensify = (core.clone(), veil.clone());
        let climax = burst.clone();
        let coda = burst.clone();

        let timeline = TimelineBuilder::new(Self::ID)
            .call("phase:warmup", Position::At(0.0), move || {
                warmup.set_phase(EffectPhase::Warmup)?;
                warmup.animate(Self::VEIL_AT, None).map(drop)
            })
            .tween(
                camera_tween(ctx, Self::BURST_AT, "approach")
                    .to("position.z", 6.0)
                    .to("fov", 55.0)
                    .ease(EasingFunction::power2_in_out())
                    .at(Position::At(0.0)),
            )
            .call("phase:intensify", Position::At(3.0), move || {
                intensify.0.set_phase(EffectPhase::Intensify)?;
                intensify.1.set_phase(EffectPhase::Active)
            })
            .tween(
                camera_tween(ctx, 3.0, "dive")
                    .to("position.z", 2.5)
                    .to("position.y", 1.0)
                    .ease(EasingFunction::power3_out())
                    .at(Position::At(Self::BURST_AT)),
            )
            .call("phase:climax", Position::WithPrevious(0.0), move || {
                climax.set_phase(EffectPhase::Climax)
            })
            .call("phase:coda", Position::At(7.5), move || {
                coda.set_phase(EffectPhase::Coda)
            })
            .tween(
                camera_tween(ctx, 1.5, "settle")
                    .to("fov", 70.0)
                    .ease(EasingFunction::sine_in_out())
                    .at(Position::WithPrevious(0.0)),
            );

        Ok(Composition::new(Self::DURATION, timeline)
            .with_initial(core)
            .switch(SwitchPoint::add(Self::VEIL_AT, veil).animated(1.5))
            .switch(SwitchPoint::replace(Self::BURST_AT, vec![burst]).animated(1.2)))
    }
}
