//! # Player 模块
//!
//! headless 播放：在模拟时钟上完整跑一遍动画，并汇总播放结果和资源记账。
//!
//! CLI 的 `play` 子命令、xtask 的 `anim-check` 和集成测试都通过它运行动画。

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, info, warn};

use fx_runtime::{
    CameraControls, ComputeService, FailureClass, FxError, PlaybackCallbacks, PlaybackResult,
    RenderContext, Surface,
};

use crate::config::AppConfig;
use crate::frame_loop::FrameLoop;
use crate::registry::{AnimationRegistry, RegistryError};
use crate::scene::{MemoryScene, SceneStats};

/// 播放选项
#[derive(Debug, Clone, PartialEq)]
pub struct PlayOptions {
    /// 模拟时钟帧率
    pub fps: u32,
    /// 传给效果 `update` 的固定步长；`None` 时取帧间隔
    pub fixed_delta: Option<f32>,
    /// 在该模拟时间（秒）调用 `dispose` 取消播放
    pub cancel_at: Option<f32>,
    /// 最长模拟时间（秒），超过后强制取消
    pub max_seconds: f32,
    /// 渲染表面；`None` 表示没有可用表面
    pub surface: Option<Surface>,
    /// 计算服务粒子上限；`None` 表示不启用
    pub compute: Option<usize>,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PlayOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fps: config.playback.fps,
            fixed_delta: config.playback.fixed_delta,
            cancel_at: None,
            max_seconds: config.playback.max_seconds,
            surface: config
                .surface
                .enabled
                .then(|| Surface::new(config.surface.width, config.surface.height)),
            compute: config
                .compute
                .enabled
                .then_some(config.compute.max_particles),
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn cancel_at(mut self, seconds: f32) -> Self {
        self.cancel_at = Some(seconds);
        self
    }

    fn fixed_delta(&self) -> f32 {
        self.fixed_delta
            .unwrap_or_else(|| 1.0 / self.fps.max(1) as f32)
    }
}

/// 播放结局
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayOutcome {
    /// 自然播放完毕
    Completed,
    /// 结构性或构造失败
    Failed {
        class: FailureClass,
        stage: String,
        message: String,
    },
    /// 被 `dispose` 取消
    Cancelled { at: f32 },
    /// 超过最长模拟时间被强制取消
    TimedOut { at: f32 },
}

impl PlayOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// 通过 `on_error` 收到的一条错误
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportedError {
    pub class: FailureClass,
    pub stage: String,
    pub message: String,
}

impl From<(&FxError, &str)> for ReportedError {
    fn from((err, stage): (&FxError, &str)) -> Self {
        Self {
            class: err.class(),
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }
}

/// 播放汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaySummary {
    pub animation: String,
    pub outcome: PlayOutcome,
    /// 协调器执行的帧数
    pub frames: u64,
    /// 结束时的播放时长（秒）
    pub elapsed: f32,
    /// 自然完成时本次运行销毁的效果总数
    pub effects_destroyed: Option<usize>,
    /// 时间轴是否走完
    pub timeline_completed: bool,
    /// 结束后的场景记账
    pub scene: SceneStats,
    /// 结束后仍挂在场景上的节点
    pub leaked_nodes: usize,
    /// 结束后仍未释放的资源
    pub leaked_resources: usize,
    /// `on_error` 收到的全部错误（按顺序）
    pub errors: Vec<ReportedError>,
}

impl PlaySummary {
    /// 没有泄漏也没有重复释放
    pub fn is_clean(&self) -> bool {
        self.leaked_nodes == 0 && self.leaked_resources == 0 && self.scene.double_disposals == 0
    }

    /// 表现层失败的次数
    pub fn cosmetic_errors(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.class == FailureClass::Cosmetic)
            .count()
    }
}

impl fmt::Display for PlaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match &self.outcome {
            PlayOutcome::Completed => "完成".to_string(),
            PlayOutcome::Failed { stage, message, .. } => format!("失败 [{stage}] {message}"),
            PlayOutcome::Cancelled { at } => format!("取消于 {at:.2}s"),
            PlayOutcome::TimedOut { at } => format!("超时于 {at:.2}s"),
        };
        writeln!(f, "动画: {}", self.animation)?;
        writeln!(f, "结局: {outcome}")?;
        writeln!(f, "帧数: {} (渲染 {})", self.frames, self.scene.renders)?;
        writeln!(f, "时长: {:.3}s", self.elapsed)?;
        if let Some(destroyed) = self.effects_destroyed {
            writeln!(f, "销毁效果: {destroyed}")?;
        }
        writeln!(
            f,
            "资源: 创建 {} / 释放 {} / 上传 {} 字节",
            self.scene.created_resources, self.scene.disposed_resources, self.scene.bytes_uploaded
        )?;
        writeln!(
            f,
            "泄漏: 节点 {} / 资源 {} / 重复释放 {}",
            self.leaked_nodes, self.leaked_resources, self.scene.double_disposals
        )?;
        write!(f, "错误上报: {}", self.errors.len())
    }
}

#[derive(Default)]
struct Recorder {
    result: Option<PlaybackResult>,
    errors: Vec<ReportedError>,
}

/// headless 播放器
#[derive(Debug)]
pub struct HeadlessPlayer {
    registry: AnimationRegistry,
    options: PlayOptions,
}

impl HeadlessPlayer {
    pub fn new(registry: AnimationRegistry, options: PlayOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &AnimationRegistry {
        &self.registry
    }

    pub fn options(&self) -> &PlayOptions {
        &self.options
    }

    /// 在新的内存场景上播放
    pub fn play(&self, id: &str) -> Result<PlaySummary, RegistryError> {
        self.play_on(id, Rc::new(MemoryScene::new()))
    }

    /// 在指定场景上播放（可以预先设置故障注入）
    ///
    /// 只有标识未注册时返回 `Err`；加载、构造和播放中的失败都体现在汇总的结局里。
    pub fn play_on(&self, id: &str, scene: Rc<MemoryScene>) -> Result<PlaySummary, RegistryError> {
        if !self.registry.contains(id) {
            return Err(RegistryError::UnknownAnimation(id.to_string()));
        }

        let options = &self.options;
        let frame_loop = Rc::new(FrameLoop::new(options.fps));
        let controls = Rc::new(CameraControls::new());
        let compute = match options.compute {
            Some(max_particles) => ComputeService::with_capacity(max_particles),
            None => ComputeService::disabled(),
        };
        let mut ctx = RenderContext::new(scene.clone(), frame_loop.clone())
            .with_controls(controls.clone())
            .with_compute(Rc::new(compute))
            .with_fixed_delta(options.fixed_delta());
        if let Some(surface) = options.surface {
            ctx = ctx.with_surface(surface);
        }

        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let on_complete = recorder.clone();
        let on_error = recorder.clone();
        let callbacks = PlaybackCallbacks::new(
            move |result| on_complete.borrow_mut().result = Some(result),
            move |err, stage| on_error.borrow_mut().errors.push((err, stage).into()),
        );

        info!(animation = %id, fps = options.fps, "开始 headless 播放");
        let playback = match self.registry.launch(id, &ctx, callbacks) {
            Ok(playback) => Some(playback),
            Err(RegistryError::Launch(e)) => {
                debug!(animation = %id, error = %e, "动画未能启动");
                None
            }
            Err(e) => return Err(e),
        };

        let mut interrupted = None;
        if let Some(playback) = &playback {
            frame_loop.fire();
            while !frame_loop.is_idle() {
                let now = frame_loop.now();
                if options.cancel_at.is_some_and(|at| now >= at) {
                    playback.dispose();
                    interrupted = Some(PlayOutcome::Cancelled { at: now });
                    break;
                }
                if now >= options.max_seconds {
                    warn!(animation = %id, at = now, "超过最长播放时间，强制取消");
                    playback.dispose();
                    interrupted = Some(PlayOutcome::TimedOut { at: now });
                    break;
                }
                frame_loop.step();
            }
            // 让补间引擎处理掉被终止的时间轴
            frame_loop.run_until_idle(1.0);
        }
        controls.dispose();

        let recorder = recorder.borrow();
        let outcome = if let Some(outcome) = interrupted {
            outcome
        } else if recorder.result.is_some() {
            PlayOutcome::Completed
        } else {
            match recorder.errors.iter().rev().find(|e| e.class != FailureClass::Cosmetic) {
                Some(fatal) => PlayOutcome::Failed {
                    class: fatal.class,
                    stage: fatal.stage.clone(),
                    message: fatal.message.clone(),
                },
                None => PlayOutcome::TimedOut {
                    at: frame_loop.now(),
                },
            }
        };

        let stats = scene.stats();
        let summary = PlaySummary {
            animation: id.to_string(),
            outcome,
            frames: playback.as_ref().map_or(0, |p| p.frames()),
            elapsed: playback.as_ref().map_or(0.0, |p| p.elapsed()),
            effects_destroyed: recorder.result.as_ref().map(|r| r.effects_destroyed),
            timeline_completed: recorder
                .result
                .as_ref()
                .is_some_and(|r| r.timeline_completed),
            scene: stats,
            leaked_nodes: stats.live_nodes,
            leaked_resources: stats.live_resources,
            errors: recorder.errors.clone(),
        };
        info!(
            animation = %id,
            frames = summary.frames,
            clean = summary.is_clean(),
            "headless 播放结束"
        );
        Ok(summary)
    }

    /// 依次播放注册表中的全部动画
    pub fn play_all(&self) -> Vec<PlaySummary> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.play(id).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.surface.enabled = false;
        config.compute.enabled = true;
        config.compute.max_particles = 100;

        let options = PlayOptions::from_config(&config).with_fps(30);
        assert_eq!(options.surface, None);
        assert_eq!(options.compute, Some(100));
        assert!((options.fixed_delta() - 1.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_animation() {
        let player = HeadlessPlayer::new(AnimationRegistry::builtin(), PlayOptions::default());
        assert_eq!(
            player.play("missing").unwrap_err(),
            RegistryError::UnknownAnimation("missing".to_string())
        );
    }

    #[test]
    fn test_summary_display() {
        let summary = PlaySummary {
            animation: "nebula-dive".to_string(),
            outcome: PlayOutcome::Cancelled { at: 1.5 },
            frames: 91,
            elapsed: 1.5,
            effects_destroyed: None,
            timeline_completed: false,
            scene: SceneStats::default(),
            leaked_nodes: 0,
            leaked_resources: 0,
            errors: Vec::new(),
        };
        let text = summary.to_string();
        assert!(text.contains("结局: 取消于 1.50s"));
        assert!(text.contains("泄漏: 节点 0 / 资源 0 / 重复释放 0"));
        assert!(summary.is_clean());
    }
}
