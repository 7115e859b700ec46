//! # Context 模块
//!
//! 动画模块构造效果时可用的协作者集合。

use std::rc::Rc;

use serde::Serialize;

use crate::camera::{Camera, CameraControls};
use crate::compute::ComputeService;
use crate::engine::TweenEngine;
use crate::error::ConstructionError;
use crate::frame::FrameScheduler;
use crate::scene::SceneGraph;

/// 默认固定步长（60 FPS）
pub const DEFAULT_FIXED_DELTA: f32 = 1.0 / 60.0;

/// 渲染表面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// 渲染上下文
///
/// 场景根是唯一共享的可变对象，效果只能在上面挂载/移除自己的子树。
#[derive(Clone)]
pub struct RenderContext {
    pub scene: Rc<dyn SceneGraph>,
    pub camera: Rc<Camera>,
    pub controls: Option<Rc<CameraControls>>,
    pub scheduler: Rc<dyn FrameScheduler>,
    pub tweens: Rc<TweenEngine>,
    pub compute: Rc<ComputeService>,
    pub surface: Option<Surface>,
    /// 每帧传给 `update` 的固定步长（秒）
    pub fixed_delta: f32,
}

impl RenderContext {
    /// 使用默认相机、禁用的计算服务创建上下文（尚无渲染表面）
    pub fn new(scene: Rc<dyn SceneGraph>, scheduler: Rc<dyn FrameScheduler>) -> Self {
        let tweens = TweenEngine::new(scheduler.clone());
        Self {
            scene,
            camera: Rc::new(Camera::default()),
            controls: None,
            scheduler,
            tweens,
            compute: Rc::new(ComputeService::disabled()),
            surface: None,
            fixed_delta: DEFAULT_FIXED_DELTA,
        }
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_camera(mut self, camera: Rc<Camera>) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_controls(mut self, controls: Rc<CameraControls>) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn with_compute(mut self, compute: Rc<ComputeService>) -> Self {
        self.compute = compute;
        self
    }

    pub fn with_fixed_delta(mut self, fixed_delta: f32) -> Self {
        if fixed_delta.is_finite() && fixed_delta > 0.0 {
            self.fixed_delta = fixed_delta;
        }
        self
    }

    /// 模块边界上的渲染表面检查
    pub fn require_surface(&self) -> Result<Surface, ConstructionError> {
        self.surface.ok_or(ConstructionError::NoRenderSurface)
    }
}
