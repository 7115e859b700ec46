//! 极光环绕

use std::f32::consts::FRAC_PI_2;

use fx_runtime::{
    AnimationModule, Composition, EasingFunction, EffectKit, EffectPhase, FxError, Position,
    RenderContext, SwitchPoint, TimelineBuilder,
};

use super::camera_tween;
use crate::effects::{
    ParticleConfig, ParticleField, RingConfig, RingPulse, ShaderConfig, ShaderSurface, defaults,
};

/// 极光环绕
///
/// 8 秒，只追加不替换：极光天幕常驻，1.5 秒加入光尘，4 秒加入光环。
/// 相机沿半径 10 的圆环绕一周。
#[derive(Debug, Default, Clone, Copy)]
pub struct AuroraOrbit;

impl AuroraOrbit {
    pub const ID: &'static str = "aurora-orbit";
    pub const DURATION: f32 = 8.0;
    pub const MOTES_AT: f32 = 1.5;
    pub const HALO_AT: f32 = 4.0;
    /// 环绕半径
    const ORBIT_RADIUS: f32 = 10.0;
    /// 环绕分段数
    const ORBIT_SEGMENTS: usize = 4;
}

impl AnimationModule for AuroraOrbit {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Aurora Orbit"
    }

    fn compose(&self, ctx: &RenderContext, kit: &mut EffectKit) -> Result<Composition, FxError> {
        let sky = kit.build(|| {
            ShaderSurface::new(
                ctx,
                ShaderConfig::new("aurora-sky", "aurora").with_tint([0.2, 1.0, 0.6, 1.0]),
            )
        })?;
        let motes = kit.build(|| {
            ParticleField::new(
                ctx,
                ParticleConfig::new("aurora-motes")
                    .with_counts(defaults::CPU_PARTICLES / 2, defaults::GPU_PARTICLES / 2)
                    .with_color([0.7, 1.0, 0.9, 0.8]),
            )
        })?;
        let halo = kit.build(|| RingPulse::new(ctx, RingConfig::new("ring-halo").with_count(3)))?;

        let rise = sky.clone();
        let peak = [sky.clone(), motes.clone(), halo.clone()];

        let mut timeline = TimelineBuilder::new(Self::ID).call(
            "phase:rise",
            Position::At(0.0),
            move || {
                rise.set_phase(EffectPhase::Active)?;
                rise.animate(Self::MOTES_AT, None).map(drop)
            },
        );

        let segment = Self::DURATION / Self::ORBIT_SEGMENTS as f32;
        for i in 1..=Self::ORBIT_SEGMENTS {
            let angle = FRAC_PI_2 * i as f32;
            timeline = timeline.tween(
                camera_tween(ctx, segment, &format!("orbit-{i}"))
                    .to("position.x", Self::ORBIT_RADIUS * angle.sin())
                    .to("position.z", Self::ORBIT_RADIUS * angle.cos())
                    .ease(EasingFunction::power1_in_out()),
            );
        }

        let timeline = timeline.call("phase:peak", Position::At(6.0), move || {
            peak.iter()
                .try_for_each(|effect| effect.set_phase(EffectPhase::Climax))
        });

        Ok(Composition::new(Self::DURATION, timeline)
            .with_initial(sky)
            .switch(SwitchPoint::add(Self::MOTES_AT, motes).animated(2.0))
            .switch(SwitchPoint::add(Self::HALO_AT, halo).animated(1.0)))
    }
}
