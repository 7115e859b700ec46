//! 粒子云效果

use std::f32::consts::{PI, TAU};
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use fx_runtime::{
    EasingFunction, Effect, EffectError, EffectPhase, Lifecycle, NodeDesc, NodeId, NodeTransform,
    OnComplete, OwnedSubtree, PropertyBag, RenderContext, ResourceDesc, ResourceId, Stage,
    StagedTransition, TransitionHandle, Vec3,
};

use super::{build_failed, defaults, phase_gain, update_failed};

/// 上传到顶点缓冲区的粒子顶点
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
}

/// 粒子云参数
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleConfig {
    /// 效果名称，也是资源标签前缀
    pub label: String,
    /// 无计算服务时的粒子数量
    pub cpu_particles: usize,
    /// 有计算服务时请求的粒子数量
    pub gpu_particles: usize,
    pub radius: f32,
    /// 绕 Y 轴的角速度（弧度/秒）
    pub spin: f32,
    pub color: [f32; 4],
}

impl ParticleConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cpu_particles: defaults::CPU_PARTICLES,
            gpu_particles: defaults::GPU_PARTICLES,
            radius: defaults::PARTICLE_RADIUS,
            spin: 0.35,
            color: [0.55, 0.4, 1.0, 1.0],
        }
    }

    pub fn with_counts(mut self, cpu: usize, gpu: usize) -> Self {
        self.cpu_particles = cpu;
        self.gpu_particles = gpu;
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Particle {
    home: Vec3,
    /// 径向呼吸的相位
    phase: f32,
}

/// 粒子云
///
/// 粒子数量在构造时由计算服务的能力决定：服务可用时取请求数量与服务上限的较小值，
/// 否则退回 CPU 数量。模拟在 CPU 上积分，每帧把顶点整块上传。
///
/// ## 可过渡属性
///
/// - `intensity`：亮度与速度倍率
/// - `spread`：相对半径
/// - `opacity`
pub struct ParticleField {
    life: Lifecycle,
    config: ParticleConfig,
    subtree: OwnedSubtree,
    buffer: ResourceId,
    node: NodeId,
    particles: Vec<Particle>,
    vertices: Vec<ParticleVertex>,
    props: Rc<PropertyBag>,
    angle: f32,
    gpu: bool,
}

impl ParticleField {
    pub fn new(ctx: &RenderContext, config: ParticleConfig) -> Result<Self, EffectError> {
        let capability = ctx.compute.capability();
        let count = if capability.is_available() {
            config
                .gpu_particles
                .min(capability.particle_budget(config.gpu_particles))
        } else {
            config.cpu_particles
        };
        if count == 0 {
            return Err(EffectError::BuildFailed {
                effect: config.label.clone(),
                message: "粒子数量为 0".to_string(),
            });
        }

        let name = config.label.as_str();
        let mut subtree = OwnedSubtree::new(ctx.scene.clone());
        let buffer = subtree
            .resource(ResourceDesc::geometry(format!("{name}-points"), count))
            .map_err(|e| build_failed(name, e))?;
        let material = subtree
            .resource(ResourceDesc::material(format!("{name}-material"), "points"))
            .map_err(|e| build_failed(name, e))?;
        let node = subtree
            .node(NodeDesc::mesh(name, buffer, material))
            .map_err(|e| build_failed(name, e))?;

        let particles = scatter(count, config.radius);
        debug!(effect = %name, count, gpu = capability.is_available(), "粒子云已构造");

        Ok(Self {
            life: Lifecycle::new(name),
            subtree,
            buffer,
            node,
            vertices: vec![ParticleVertex::default(); particles.len()],
            particles,
            props: Rc::new(PropertyBag::new(&[
                ("intensity", 0.0),
                ("spread", 0.2),
                ("opacity", 0.0),
            ])),
            angle: 0.0,
            gpu: capability.is_available(),
            config,
        })
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// 是否按计算服务的能力确定规模
    pub fn uses_compute(&self) -> bool {
        self.gpu
    }

    pub fn properties(&self) -> Rc<PropertyBag> {
        self.props.clone()
    }

    fn fill_vertices(&mut self, elapsed: f32) {
        let intensity = self.props.get_or("intensity", 0.0);
        let spread = self.props.get_or("spread", 1.0);
        let opacity = self.props.get_or("opacity", 1.0);
        let [r, g, b, a] = self.config.color;

        for (vertex, particle) in self.vertices.iter_mut().zip(&self.particles) {
            let breathe = 1.0 + 0.08 * (elapsed * 1.5 + particle.phase).sin();
            let position = (particle.home * (spread * breathe)).rotate_y(self.angle);
            *vertex = ParticleVertex {
                position: position.to_array(),
                size: 0.04 + 0.06 * intensity,
                color: [r, g, b, a * opacity],
            };
        }
    }
}

/// 在球体内确定性地分布粒子（斐波那契球面 + 分层半径）
fn scatter(count: usize, radius: f32) -> Vec<Particle> {
    let golden = PI * (3.0 - 5.0_f32.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let ring = (1.0 - y * y).max(0.0).sqrt();
            let theta = golden * i as f32;
            let shell = ((i % 7) + 1) as f32 / 7.0;
            Particle {
                home: Vec3::new(theta.cos() * ring, y, theta.sin() * ring) * (radius * shell),
                phase: (i as f32 * 0.618).fract() * TAU,
            }
        })
        .collect()
}

impl Effect for ParticleField {
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
                    .to("opacity", 1.0)
                    .to("spread", 0.6)
                    .ease(EasingFunction::power2_in_out()),
                Stage::new(2.0)
                    .to("spread", 1.0)
                    .to("intensity", 1.0)
                    .ease(EasingFunction::power3_out()),
            ],
            duration,
            on_complete,
        );
        Ok(self.life.begin(transition))
    }

    fn update(&mut self, dt: f32, elapsed: f32) -> Result<(), EffectError> {
        if self.life.is_destroyed() {
            return Ok(());
        }
        self.life.advance(dt);

        let gain = phase_gain(self.life.phase()) * (0.5 + self.props.get_or("intensity", 0.0));
        self.angle = (self.angle + self.config.spin * gain * dt) % TAU;
        self.fill_vertices(elapsed);

        let name = self.life.name();
        self.subtree
            .write(self.buffer, bytemuck::cast_slice(&self.vertices))
            .map_err(|e| update_failed(name, e))?;
        let transform = NodeTransform::with_opacity(self.props.get_or("opacity", 1.0));
        self.subtree
            .update(self.node, &transform)
            .map_err(|e| update_failed(name, e))
    }

    fn destroy(&mut self) {
        if self.life.mark_destroyed() {
            let released = self.subtree.release();
            self.particles.clear();
            self.vertices.clear();
            debug!(effect = %self.life.name(), released, "粒子云已销毁");
        }
    }
}
