//! # Config 模块
//!
//! 宿主配置管理，集中管理所有配置项。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (fx.json)
//! 3. 默认值（最低）

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// 宿主配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 渲染表面配置
    #[serde(default)]
    pub surface: SurfaceConfig,

    /// 播放配置
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// 计算服务配置
    #[serde(default)]
    pub compute: ComputeConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 未指定动画时播放的默认动画
    #[serde(default = "default_animation")]
    pub default_animation: String,
}

/// 渲染表面配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// 是否提供渲染表面（关闭时模块会以构造错误失败）
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_surface_width")]
    pub width: u32,

    #[serde(default = "default_surface_height")]
    pub height: u32,
}

/// 播放配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// 模拟时钟帧率
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// 传给效果 `update` 的固定步长（秒）；未设置时取 `1 / fps`
    #[serde(default)]
    pub fixed_delta: Option<f32>,

    /// 单次播放的最长模拟时间（秒），防止失控
    #[serde(default = "default_max_seconds")]
    pub max_seconds: f32,
}

/// 计算服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// 是否启用 GPU 计算
    #[serde(default)]
    pub enabled: bool,

    /// 单次调度最大粒子数
    #[serde(default = "default_max_particles")]
    pub max_particles: usize,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 最大日志级别（off / error / warn / info / debug / trace）
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 ANSI 颜色
    #[serde(default = "default_true")]
    pub ansi: bool,
}

// 默认值函数
fn default_true() -> bool {
    true
}

fn default_surface_width() -> u32 {
    1280
}

fn default_surface_height() -> u32 {
    720
}

fn default_fps() -> u32 {
    60
}

fn default_max_seconds() -> f32 {
    120.0
}

fn default_max_particles() -> usize {
    16_384
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_animation() -> String {
    "nebula-dive".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surface: SurfaceConfig::default(),
            playback: PlaybackConfig::default(),
            compute: ComputeConfig::default(),
            logging: LogConfig::default(),
            default_animation: default_animation(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: default_surface_width(),
            height: default_surface_height(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            fixed_delta: None,
            max_seconds: default_max_seconds(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_particles: default_max_particles(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
        }
    }
}

impl PlaybackConfig {
    /// 模拟时钟的帧间隔（秒）
    pub fn frame_interval(&self) -> f32 {
        1.0 / self.fps.max(1) as f32
    }

    /// 实际使用的固定步长
    pub fn effective_fixed_delta(&self) -> f32 {
        self.fixed_delta.unwrap_or_else(|| self.frame_interval())
    }
}

impl AppConfig {
    /// 加载配置文件
    ///
    /// 如果文件不存在或解析失败，返回默认配置并记录警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = ?path, "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    info!(path = ?path, "配置文件加载成功");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationFailed(e.to_string()))?;

        fs::write(path, json).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.surface.enabled && (self.surface.width == 0 || self.surface.height == 0) {
            return Err(ConfigError::ValidationFailed(
                "渲染表面尺寸必须大于 0".to_string(),
            ));
        }

        if self.playback.fps == 0 || self.playback.fps > 1000 {
            return Err(ConfigError::ValidationFailed(
                "帧率必须在 1 - 1000 之间".to_string(),
            ));
        }

        if let Some(delta) = self.playback.fixed_delta
            && !(delta.is_finite() && delta > 0.0)
        {
            return Err(ConfigError::ValidationFailed(format!(
                "固定步长必须为正数: {delta}"
            )));
        }

        if !(self.playback.max_seconds.is_finite() && self.playback.max_seconds > 0.0) {
            return Err(ConfigError::ValidationFailed(
                "最长播放时间必须为正数".to_string(),
            ));
        }

        if self.compute.enabled && self.compute.max_particles == 0 {
            return Err(ConfigError::ValidationFailed(
                "启用计算服务时粒子上限必须大于 0".to_string(),
            ));
        }

        if self
            .logging
            .level
            .parse::<tracing::level_filters::LevelFilter>()
            .is_err()
        {
            return Err(ConfigError::ValidationFailed(format!(
                "未知的日志级别: {}",
                self.logging.level
            )));
        }

        if self.default_animation.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "必须配置 default_animation".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 序列化失败
    #[error("配置序列化失败: {0}")]
    SerializationFailed(String),

    /// IO 错误
    #[error("配置 IO 错误: {0}")]
    IoError(String),

    /// 验证失败
    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}
