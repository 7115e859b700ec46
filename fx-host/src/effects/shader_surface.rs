//! 全屏着色器面片

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use fx_runtime::{
    EasingFunction, Effect, EffectError, EffectPhase, Lifecycle, NodeDesc, NodeId, NodeTransform,
    OnComplete, OwnedSubtree, PropertyBag, RenderContext, ResourceDesc, ResourceId, Stage,
    StagedTransition, TransitionHandle,
};

use super::{build_failed, phase_gain, update_failed};

/// 着色器 uniform 块（std140 兼容，16 字节对齐）
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SurfaceUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub intensity: f32,
    pub tint: [f32; 4],
    pub warp: f32,
    pub opacity: f32,
    pub phase: u32,
    pub _pad: u32,
}

/// 着色器面片参数
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderConfig {
    pub label: String,
    /// 材质使用的着色器名称
    pub shader: String,
    pub tint: [f32; 4],
}

impl ShaderConfig {
    pub fn new(label: impl Into<String>, shader: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            shader: shader.into(),
            tint: [1.0, 1.0, 1.0, 1.0],
        }
    }

    pub fn with_tint(mut self, tint: [f32; 4]) -> Self {
        self.tint = tint;
        self
    }
}

/// 全屏着色器面片
///
/// 构造时需要渲染表面（uniform 里的分辨率取自表面尺寸）。
/// 可过渡属性：`intensity`、`warp`、`opacity`。
pub struct ShaderSurface {
    life: Lifecycle,
    subtree: OwnedSubtree,
    uniforms_buffer: ResourceId,
    node: NodeId,
    uniforms: SurfaceUniforms,
    props: Rc<PropertyBag>,
    /// 着色器时间，受阶段倍率影响
    clock: f32,
}

impl ShaderSurface {
    pub fn new(ctx: &RenderContext, config: ShaderConfig) -> Result<Self, EffectError> {
        let name = config.label.as_str();
        let surface = ctx.require_surface().map_err(|e| EffectError::BuildFailed {
            effect: name.to_string(),
            message: e.to_string(),
        })?;

        let mut subtree = OwnedSubtree::new(ctx.scene.clone());
        let quad = subtree
            .resource(ResourceDesc::geometry(format!("{name}-quad"), 4))
            .map_err(|e| build_failed(name, e))?;
        let material = subtree
            .resource(ResourceDesc::material(format!("{name}-material"), config.shader.as_str()))
            .map_err(|e| build_failed(name, e))?;
        let uniforms_buffer = subtree
            .resource(ResourceDesc::buffer(
                format!("{name}-uniforms"),
                size_of::<SurfaceUniforms>(),
            ))
            .map_err(|e| build_failed(name, e))?;
        let node = subtree
            .node(NodeDesc::mesh(name, quad, material).with_transform(NodeTransform::with_opacity(0.0)))
            .map_err(|e| build_failed(name, e))?;

        let uniforms = SurfaceUniforms {
            resolution: [surface.width as f32, surface.height as f32],
            tint: config.tint,
            ..SurfaceUniforms::default()
        };
        subtree
            .write(uniforms_buffer, bytemuck::bytes_of(&uniforms))
            .map_err(|e| build_failed(name, e))?;
        debug!(effect = %name, shader = %config.shader, "着色器面片已构造");

        Ok(Self {
            life: Lifecycle::new(name),
            subtree,
            uniforms_buffer,
            node,
            uniforms,
            props: Rc::new(PropertyBag::new(&[
                ("intensity", 0.0),
                ("warp", 0.0),
                ("opacity", 0.0),
            ])),
            clock: 0.0,
        })
    }

    /// 最近一次写入的 uniform
    pub fn uniforms(&self) -> SurfaceUniforms {
        self.uniforms
    }

    pub fn properties(&self) -> Rc<PropertyBag> {
        self.props.clone()
    }
}

fn phase_index(phase: EffectPhase) -> u32 {
    match phase {
        EffectPhase::Idle => 0,
        EffectPhase::Warmup => 1,
        EffectPhase::Active => 2,
        EffectPhase::Intensify => 3,
        EffectPhase::Climax => 4,
        EffectPhase::Coda => 5,
    }
}

impl Effect for ShaderSurface {
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
                Stage::new(1.0).to("opacity", 1.0).ease(EasingFunction::sine_in_out()),
                Stage::new(1.0)
                    .to("intensity", 1.0)
                    .to("warp", 0.35)
                    .ease(EasingFunction::power2_in_out()),
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
        let phase = self.life.phase();
        self.clock += dt * phase_gain(phase);

        self.uniforms.time = self.clock;
        self.uniforms.intensity = self.props.get_or("intensity", 0.0);
        self.uniforms.warp = self.props.get_or("warp", 0.0);
        self.uniforms.opacity = self.props.get_or("opacity", 1.0);
        self.uniforms.phase = phase_index(phase);

        let name = self.life.name();
        self.subtree
            .write(self.uniforms_buffer, bytemuck::bytes_of(&self.uniforms))
            .map_err(|e| update_failed(name, e))?;
        self.subtree
            .update(self.node, &NodeTransform::with_opacity(self.uniforms.opacity))
            .map_err(|e| update_failed(name, e))
    }

    fn destroy(&mut self) {
        if self.life.mark_destroyed() {
            let released = self.subtree.release();
            debug!(effect = %self.life.name(), released, "着色器面片已销毁");
        }
    }
}
