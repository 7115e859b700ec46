//! 环形脉冲效果

use std::rc::Rc;

use tracing::debug;

use fx_runtime::{
    EasingFunction, Effect, EffectError, EffectPhase, Lifecycle, NodeDesc, NodeId, NodeTransform,
    OnComplete, OwnedSubtree, PropertyBag, RenderContext, ResourceDesc, Stage, StagedTransition,
    TransitionHandle, Vec3,
};

use super::{build_failed, defaults, phase_gain, update_failed};

/// 环形脉冲参数
#[derive(Debug, Clone, PartialEq)]
pub struct RingConfig {
    /// 资源标签前缀（默认 `ring`）
    pub label: String,
    pub count: usize,
    pub max_radius: f32,
    /// 单个环的生命周期（秒）
    pub period: f32,
    /// 每个环的线段数
    pub segments: usize,
}

impl RingConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: defaults::RING_COUNT,
            max_radius: defaults::RING_MAX_RADIUS,
            period: defaults::RING_PERIOD,
            segments: 96,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::new("ring")
    }
}

/// 向外扩散的环形脉冲
///
/// 每个环有独立的几何体，共享一个材质。环按相位错开，
/// 半径从 0 增长到 `max_radius` 的同时淡出，然后从中心重新出现。
pub struct RingPulse {
    life: Lifecycle,
    config: RingConfig,
    subtree: OwnedSubtree,
    rings: Vec<NodeId>,
    props: Rc<PropertyBag>,
    clock: f32,
}

impl RingPulse {
    pub fn new(ctx: &RenderContext, config: RingConfig) -> Result<Self, EffectError> {
        let name = config.label.as_str();
        if config.count == 0 || !config.period.is_finite() || config.period <= 0.0 {
            return Err(EffectError::BuildFailed {
                effect: name.to_string(),
                message: format!("无效的环参数: count={}, period={}", config.count, config.period),
            });
        }

        let mut subtree = OwnedSubtree::new(ctx.scene.clone());
        let material = subtree
            .resource(ResourceDesc::material(format!("{name}-material"), "ring"))
            .map_err(|e| build_failed(name, e))?;

        let mut rings = Vec::with_capacity(config.count);
        for i in 0..config.count {
            let geometry = subtree
                .resource(ResourceDesc::geometry(format!("{name}-{i}"), config.segments))
                .map_err(|e| build_failed(name, e))?;
            let node = subtree
                .node(
                    NodeDesc::mesh(format!("{name}-{i}"), geometry, material)
                        .with_transform(NodeTransform::identity().scaled(0.0)),
                )
                .map_err(|e| build_failed(name, e))?;
            rings.push(node);
        }
        debug!(effect = %name, rings = rings.len(), "环形脉冲已构造");

        Ok(Self {
            life: Lifecycle::new(name),
            subtree,
            rings,
            props: Rc::new(PropertyBag::new(&[("amplitude", 0.0), ("opacity", 0.0)])),
            clock: 0.0,
            config,
        })
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    pub fn properties(&self) -> Rc<PropertyBag> {
        self.props.clone()
    }

    /// 第 `index` 个环在当前时钟下的变换
    fn ring_transform(&self, index: usize) -> NodeTransform {
        let offset = index as f32 / self.rings.len() as f32;
        let age = (self.clock / self.config.period + offset).fract();
        let amplitude = self.props.get_or("amplitude", 1.0);
        let opacity = self.props.get_or("opacity", 1.0) * (1.0 - age);

        NodeTransform {
            scale: Vec3::splat(age * self.config.max_radius * amplitude),
            rotation: Vec3::new(std::f32::consts::FRAC_PI_2, 0.0, 0.0),
            ..NodeTransform::with_opacity(opacity)
        }
    }
}

impl Effect for RingPulse {
    fn name(&self) -> &str {
        self.life.name()
    }

    fn phase(&self) -> EffectPhase {
        self.life.phase()
    }

    fn set_phase(&mut self, phase: EffectPhase) {
        self.life.set_phase(phase);
    }

    fn is_destroyed(&self) -> bool {
        self.life.is_destroyed()
    }

    fn animate(
        &mut self,
        duration: f32,
        on_complete: Option<OnComplete>,
    ) -> Result<TransitionHandle, EffectError> {
        if self.life.is_destroyed() {
            return Ok(TransitionHandle::inert());
        }
        self.life.check_duration(duration)?;
        let transition = StagedTransition::new(
            self.props.clone(),
            vec![
                Stage::new(1.0)
                    .from_to("opacity", 0.0, 1.0)
                    .ease(EasingFunction::Linear),
                Stage::new(2.0)
                    .from_to("amplitude", 0.0, 1.0)
                    .ease(EasingFunction::BackOut),
            ],
            duration,
            on_complete,
        );
        Ok(self.life.begin(transition))
    }

    fn update(&mut self, dt: f32, _elapsed: f32) -> Result<(), EffectError> {
        if self.life.is_destroyed() {
            return Ok(());
        }
        self.life.advance(dt);
        self.clock += dt * phase_gain(self.life.phase());

        for (index, node) in self.rings.iter().enumerate() {
            let transform = self.ring_transform(index);
            self.subtree
                .update(*node, &transform)
                .map_err(|e| update_failed(self.life.name(), e))?;
        }
        Ok(())
    }

    fn destroy(&mut self) {
        if self.life.mark_destroyed() {
            let released = self.subtree.release();
            self.rings.clear();
            debug!(effect = %self.life.name(), released, "环形脉冲已销毁");
        }
    }
}

#[cfg(test)]
mod tests {
    use fx_runtime::Animatable;

    use super::*;
    use crate::frame_loop::FrameLoop;
    use crate::scene::MemoryScene;

    fn context() -> (Rc<MemoryScene>, RenderContext) {
        let scene = Rc::new(MemoryScene::new());
        let ctx = RenderContext::new(scene.clone(), Rc::new(FrameLoop::new(60)));
        (scene, ctx)
    }

    #[test]
    fn test_builds_one_node_per_ring() {
        let (scene, ctx) = context();
        let pulse = RingPulse::new(&ctx, RingConfig::default().with_count(3)).unwrap();
        assert_eq!(pulse.ring_count(), 3);
        assert_eq!(scene.live_node_labels(), vec!["ring-0", "ring-1", "ring-2"]);
        // 3 个几何体 + 1 个材质
        assert_eq!(scene.stats().live_resources, 4);
    }

    #[test]
    fn test_rings_expand_and_fade() {
        let (scene, ctx) = context();
        let mut pulse = RingPulse::new(&ctx, RingConfig::default().with_count(2)).unwrap();
        pulse.set_phase(EffectPhase::Active);
        let props = pulse.properties();
        props.set_property("amplitude", 1.0);
        props.set_property("opacity", 1.0);

        pulse.update(0.4, 0.4).unwrap();
        let first = scene.node_transform(pulse.rings[0]).unwrap();
        // age = 0.4 / 1.6
        assert!((first.scale.x - 0.25 * defaults::RING_MAX_RADIUS).abs() < 1e-5);
        assert!((first.opacity - 0.75).abs() < 1e-5);
    }

    #[test]
    fn test_failure_mid_construction_releases_built_rings() {
        let (scene, ctx) = context();
        scene.fail_resources_with_prefix("ring-2");
        let result = RingPulse::new(&ctx, RingConfig::default().with_count(4));
        assert!(matches!(result, Err(EffectError::BuildFailed { .. })));
        assert!(scene.is_clean());
    }

    #[test]
    fn test_calls_after_destroy_are_noops() {
        let (scene, ctx) = context();
        let mut pulse = RingPulse::new(&ctx, RingConfig::default()).unwrap();
        pulse.destroy();
        assert!(pulse.update(0.1, 0.1).is_ok());
        assert!(pulse.animate(1.0, None).unwrap().is_superseded());
        pulse.destroy();
        assert!(scene.is_clean());
        assert_eq!(scene.stats().double_disposals, 0);
    }
}
