//! 曲速隧道

use fx_runtime::{
    AnimationModule, Composition, EasingFunction, EffectHandle, EffectKit, EffectPhase, FxError,
    Position, RenderContext, SwitchPoint, TimelineBuilder,
};

use super::camera_tween;
use crate::effects::{
    ParticleConfig, ParticleField, RingConfig, RingPulse, ShaderConfig, ShaderSurface,
};

/// 曲速隧道
///
/// 6 秒，延迟加载。隧道环和流光从 0 秒开始，阶段完全由时间轴调用项推进：
/// warmup → active → intensify，3 秒时替换为白光闪屏进入 climax，5 秒进入 coda。
#[derive(Debug, Default, Clone, Copy)]
pub struct WarpTunnel;

impl WarpTunnel {
    pub const ID: &'static str = "warp-tunnel";
    pub const DURATION: f32 = 6.0;
    /// 替换为闪屏的阈值
    pub const FLASH_AT: f32 = 3.0;
}

/// 把同一个阶段设置到一组效果上
fn set_all(effects: &[EffectHandle], phase: EffectPhase) -> Result<(), fx_runtime::EffectError> {
    effects.iter().try_for_each(|effect| effect.set_phase(phase))
}

impl AnimationModule for WarpTunnel {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Warp Tunnel"
    }

    fn compose(&self, ctx: &RenderContext, kit: &mut EffectKit) -> Result<Composition, FxError> {
        let rings = kit.build(|| {
            RingPulse::new(ctx, RingConfig::new("ring-tunnel").with_count(12))
        })?;
        let streaks = kit.build(|| {
            ParticleField::new(
                ctx,
                ParticleConfig::new("warp-streaks").with_color([0.85, 0.9, 1.0, 1.0]),
            )
        })?;
        let flash = kit.build(|| {
            ShaderSurface::new(ctx, ShaderConfig::new("warp-flash", "flash"))
        })?;

        let tunnel = vec![rings.clone(), streaks.clone()];
        let warmup = tunnel.clone();
        let active = tunnel.clone();
        let intensify = tunnel;
        let climax = flash.clone();
        let coda = flash.clone();

        let timeline = TimelineBuilder::new(Self::ID)
            .call("phase:warmup", Position::At(0.0), move || {
                set_all(&warmup, EffectPhase::Warmup)?;
                warmup
                    .iter()
                    .try_for_each(|effect| effect.animate(1.0, None).map(drop))
            })
            .tween(
                camera_tween(ctx, Self::FLASH_AT, "accelerate")
                    .to("fov", 100.0)
                    .to("position.z", 4.0)
                    .ease(EasingFunction::expo_in())
                    .at(Position::At(0.0)),
            )
            .call("phase:active", Position::At(1.0), move || {
                set_all(&active, EffectPhase::Active)
            })
            .call("phase:intensify", Position::At(2.0), move || {
                set_all(&intensify, EffectPhase::Intensify)
            })
            .call("phase:climax", Position::At(Self::FLASH_AT), move || {
                climax.set_phase(EffectPhase::Climax)
            })
            .tween(
                camera_tween(ctx, 2.0, "decelerate")
                    .to("fov", 60.0)
                    .to("position.z", 10.0)
                    .ease(EasingFunction::power3_out())
                    .at(Position::WithPrevious(0.0)),
            )
            .call("phase:coda", Position::At(5.0), move || {
                coda.set_phase(EffectPhase::Coda)
            });

        Ok(Composition::new(Self::DURATION, timeline)
            .with_initial(rings)
            .with_initial(streaks)
            .switch(SwitchPoint::replace(Self::FLASH_AT, vec![flash]).animated(0.8)))
    }
}
