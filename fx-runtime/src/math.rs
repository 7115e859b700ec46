//! # Math 模块
//!
//! 三维向量与节点变换，供相机、效果和场景图共用。

use std::ops::{Add, Mul, Sub};

/// 三维向量
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// 创建新的向量
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// 零向量
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// 单位缩放 (1, 1, 1)
    pub const fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    /// 世界坐标上方向
    pub const fn up() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    /// 各分量相同的向量
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// 线性插值
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// 归一化；零向量保持为零
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::zero()
        } else {
            self * (1.0 / len)
        }
    }

    /// 绕 Y 轴旋转（弧度）
    pub fn rotate_y(self, angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            x: self.x * c + self.z * s,
            y: self.y,
            z: -self.x * s + self.z * c,
        }
    }

    /// 转为数组（用于上传顶点数据）
    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<(f32, f32, f32)> for Vec3 {
    fn from((x, y, z): (f32, f32, f32)) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// 节点变换状态
///
/// 场景图中一个节点的完整变换：位置、缩放、欧拉角旋转和透明度。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    /// 位置
    pub position: Vec3,
    /// 缩放因子
    pub scale: Vec3,
    /// 旋转（弧度，XYZ 欧拉角）
    pub rotation: Vec3,
    /// 透明度 (0.0 - 1.0)
    pub opacity: f32,
    /// 是否可见
    pub visible: bool,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            scale: Vec3::one(),
            rotation: Vec3::zero(),
            opacity: 1.0,
            visible: true,
        }
    }
}

impl NodeTransform {
    /// 默认变换（原点、无缩放、无旋转、完全不透明）
    pub fn identity() -> Self {
        Self::default()
    }

    /// 只有透明度的变换
    pub fn with_opacity(opacity: f32) -> Self {
        Self {
            opacity: opacity.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// 只有位置的变换
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// 设置统一缩放
    pub fn scaled(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }
}
