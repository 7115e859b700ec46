//! # Camera 模块
//!
//! 可补间的透视相机与相机控制器。
//!
//! 相机朝向不参与插值：每个补间步之后都要重新执行 `look_at`，
//! 再把结果同步给控制器。[`camera_step`] 把这两步封装成时间轴的 `on_update` 回调。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::animatable::Animatable;
use crate::error::CameraError;
use crate::math::Vec3;
use crate::timeline::UpdateHook;

/// 相机状态快照（渲染时传给场景图）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// 相机位置
    pub position: Vec3,
    /// 注视点
    pub target: Vec3,
    /// 上方向
    pub up: Vec3,
    /// 垂直视野角（度）
    pub fov: f32,
    /// 由 `look_at` 推导的前方向
    pub forward: Vec3,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::zero(),
            up: Vec3::up(),
            fov: 60.0,
            forward: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

/// 可补间的透视相机
///
/// ## 支持的属性
///
/// - `"position.x"` / `"position.y"` / `"position.z"`
/// - `"target.x"` / `"target.y"` / `"target.z"`
/// - `"fov"`：垂直视野角（度），写入时限制在 1 - 179
#[derive(Debug, Default)]
pub struct Camera {
    state: RefCell<CameraState>,
}

impl Camera {
    /// 支持的属性列表
    pub const PROPERTIES: &'static [&'static str] = &[
        "position.x",
        "position.y",
        "position.z",
        "target.x",
        "target.y",
        "target.z",
        "fov",
    ];

    /// 在指定位置创建相机并注视目标
    pub fn new(position: Vec3, target: Vec3, fov: f32) -> Self {
        let camera = Self {
            state: RefCell::new(CameraState {
                position,
                target,
                fov: fov.clamp(1.0, 179.0),
                ..CameraState::default()
            }),
        };
        camera.look_at();
        camera
    }

    /// 当前状态快照
    pub fn state(&self) -> CameraState {
        *self.state.borrow()
    }

    pub fn position(&self) -> Vec3 {
        self.state.borrow().position
    }

    pub fn target(&self) -> Vec3 {
        self.state.borrow().target
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.borrow_mut().position = position;
    }

    pub fn set_target(&self, target: Vec3) {
        self.state.borrow_mut().target = target;
    }

    /// 设置视野角
    pub fn set_fov(&self, fov: f32) -> Result<(), CameraError> {
        if !fov.is_finite() || fov <= 0.0 || fov >= 180.0 {
            return Err(CameraError::InvalidFov(fov));
        }
        self.state.borrow_mut().fov = fov;
        Ok(())
    }

    /// 根据位置和注视点重新计算前方向
    pub fn look_at(&self) {
        let mut state = self.state.borrow_mut();
        let forward = (state.target - state.position).normalize();
        if forward != Vec3::zero() {
            state.forward = forward;
        }
    }
}

impl Animatable for Camera {
    fn get_property(&self, property: &str) -> Option<f32> {
        let s = self.state.borrow();
        match property {
            "position.x" => Some(s.position.x),
            "position.y" => Some(s.position.y),
            "position.z" => Some(s.position.z),
            "target.x" => Some(s.target.x),
            "target.y" => Some(s.target.y),
            "target.z" => Some(s.target.z),
            "fov" => Some(s.fov),
            _ => None,
        }
    }

    fn set_property(&self, property: &str, value: f32) -> bool {
        let mut s = self.state.borrow_mut();
        match property {
            "position.x" => s.position.x = value,
            "position.y" => s.position.y = value,
            "position.z" => s.position.z = value,
            "target.x" => s.target.x = value,
            "target.y" => s.target.y = value,
            "target.z" => s.target.z = value,
            "fov" => s.fov = value.clamp(1.0, 179.0),
            _ => return false,
        }
        true
    }

    fn property_list(&self) -> &[&'static str] {
        Self::PROPERTIES
    }
}

/// 相机控制器（轨道控制等）
///
/// 控制器在页面离开时可能先于动画被销毁，此后 `apply` 返回
/// [`CameraError::ControlsDisposed`]。
#[derive(Debug, Default)]
pub struct CameraControls {
    target: Cell<Vec3>,
    disposed: Cell<bool>,
    applied: Cell<u64>,
}

impl CameraControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把相机注视点同步到控制器
    pub fn apply(&self, camera: &Camera) -> Result<(), CameraError> {
        if self.disposed.get() {
            return Err(CameraError::ControlsDisposed);
        }
        self.target.set(camera.target());
        self.applied.set(self.applied.get() + 1);
        Ok(())
    }

    pub fn target(&self) -> Vec3 {
        self.target.get()
    }

    /// 已成功同步的次数
    pub fn applied_count(&self) -> u64 {
        self.applied.get()
    }

    pub fn dispose(&self) {
        self.disposed.set(true);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

/// 相机补间步回调：重新 `look_at` 并同步控制器
pub fn camera_step(camera: Rc<Camera>, controls: Option<Rc<CameraControls>>) -> UpdateHook {
    Box::new(move |_progress| {
        camera.look_at();
        match &controls {
            Some(controls) => controls.apply(&camera),
            None => Ok(()),
        }
    })
}
