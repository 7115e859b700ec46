//! # Error 模块
//!
//! 定义 fx-runtime 中使用的错误类型。
//!
//! 失败分为三类（见 [`FailureClass`]）：
//! - **Cosmetic**：相机变换等表现层失败，记录后继续播放
//! - **Structural**：效果 `update` / `animate` / 渲染失败，立即终止整次播放并清理全部效果
//! - **Construction**：模块构造效果失败，清理已构造的部分后上报，协调器不会启动

use thiserror::Error;

use crate::scene::{NodeId, ResourceId};

/// 场景图错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// 资源创建失败
    #[error("创建资源 '{label}' 失败: {message}")]
    ResourceCreation { label: String, message: String },

    /// 资源不存在（或已被释放）
    #[error("资源不存在: {0}")]
    UnknownResource(ResourceId),

    /// 节点不存在（或已被移除）
    #[error("节点不存在: {0}")]
    UnknownNode(NodeId),

    /// 子树已释放，不能再挂载新内容
    #[error("子树已释放")]
    SubtreeReleased,

    /// 渲染失败
    #[error("渲染失败: {0}")]
    RenderFailed(String),
}

/// 相机错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    /// 相机控制器已销毁
    #[error("相机控制器已销毁")]
    ControlsDisposed,

    /// 无效的视野角
    #[error("无效的视野角: {0}")]
    InvalidFov(f32),
}

/// 效果实例错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    /// `update` 失败
    #[error("效果 '{effect}' 更新失败: {message}")]
    UpdateFailed { effect: String, message: String },

    /// `animate` 失败
    #[error("效果 '{effect}' 启动过渡失败: {message}")]
    AnimateFailed { effect: String, message: String },

    /// 构造失败
    #[error("效果 '{effect}' 构造失败: {message}")]
    BuildFailed { effect: String, message: String },

    /// 调用过程中发生 panic
    #[error("效果 '{effect}' 发生 panic: {message}")]
    Panicked { effect: String, message: String },

    /// 重入调用（效果正在被借用）
    #[error("效果 '{effect}' 正在使用中，拒绝重入调用")]
    Busy { effect: String },

    /// 场景图操作失败
    #[error("场景图错误: {0}")]
    Scene(#[from] SceneError),
}

/// 时间轴错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    /// 起始偏移早于前一项（按编写顺序必须单调不减）
    #[error("第 {index} 项的起始偏移 {offset} 早于前一项的 {previous}")]
    NonMonotonicOffset {
        index: usize,
        offset: f32,
        previous: f32,
    },

    /// 时长无效
    #[error("第 {index} 项的时长无效: {duration}")]
    InvalidDuration { index: usize, duration: f32 },

    /// 目标上不存在该属性
    #[error("第 {index} 项：目标上不存在属性 '{property}'")]
    UnknownProperty { index: usize, property: String },

    /// 无法解析的位置表达式
    #[error("无效的位置表达式: '{0}'")]
    InvalidPosition(String),

    /// destroy 钩子重复注入
    #[error("destroy 钩子只能注入一次")]
    DestroyAlreadyInjected,
}

/// 切换计划错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// 总时长无效
    #[error("总时长无效: {0}")]
    InvalidTotalDuration(f32),

    /// 阈值不是有限的非负数
    #[error("第 {index} 个切换阈值无效: {at}")]
    InvalidThreshold { index: usize, at: f32 },

    /// 阈值没有严格递增
    #[error("切换阈值必须严格递增：第 {index} 个阈值 {at} 不大于 {previous}")]
    NonIncreasingThreshold { index: usize, at: f32, previous: f32 },
}

/// 构造错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    /// 没有可用的渲染表面
    #[error("没有可用的渲染表面")]
    NoRenderSurface,

    /// 延迟加载的模块不可用
    #[error("模块 '{module}' 加载失败: {message}")]
    ModuleLoad { module: String, message: String },

    /// 效果构造失败
    #[error(transparent)]
    Effect(#[from] EffectError),

    /// 时间轴构建失败
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// 切换计划无效
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// 表现层失败，不中断播放
    Cosmetic,
    /// 结构性失败，终止播放
    Structural,
    /// 构造失败，播放未启动
    Construction,
}

/// fx-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FxError {
    /// 相机等表现层失败
    #[error("[{stage}] 相机更新失败: {source}")]
    Cosmetic {
        stage: String,
        #[source]
        source: CameraError,
    },

    /// 效果或渲染失败
    #[error("[{stage}] {source}")]
    Structural {
        stage: String,
        #[source]
        source: EffectError,
    },

    /// 构造失败
    #[error("构造失败: {0}")]
    Construction(#[from] ConstructionError),
}

impl FxError {
    /// 创建表现层错误
    pub fn cosmetic(stage: impl Into<String>, source: CameraError) -> Self {
        Self::Cosmetic {
            stage: stage.into(),
            source,
        }
    }

    /// 创建结构性错误
    pub fn structural(stage: impl Into<String>, source: EffectError) -> Self {
        Self::Structural {
            stage: stage.into(),
            source,
        }
    }

    /// 失败分类
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Cosmetic { .. } => FailureClass::Cosmetic,
            Self::Structural { .. } => FailureClass::Structural,
            Self::Construction(_) => FailureClass::Construction,
        }
    }

    /// 失败所在阶段的标签
    pub fn stage(&self) -> &str {
        match self {
            Self::Cosmetic { stage, .. } | Self::Structural { stage, .. } => stage,
            Self::Construction(_) => "construct",
        }
    }

    /// 是否会终止播放
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cosmetic { .. })
    }
}

impl From<EffectError> for FxError {
    fn from(e: EffectError) -> Self {
        Self::Construction(ConstructionError::Effect(e))
    }
}

impl From<TimelineError> for FxError {
    fn from(e: TimelineError) -> Self {
        Self::Construction(ConstructionError::Timeline(e))
    }
}

impl From<ScheduleError> for FxError {
    fn from(e: ScheduleError) -> Self {
        Self::Construction(ConstructionError::Schedule(e))
    }
}

/// Result 类型别名
pub type FxResult<T> = Result<T, FxError>;
