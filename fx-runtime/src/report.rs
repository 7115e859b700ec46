//! # Report 模块
//!
//! 完成/错误通道。
//!
//! 每次启动动画模块时调用方提供一对回调 `{ on_complete, on_error }`：
//! - `on_complete` 至多触发一次，且只在自然播放完毕时触发
//! - `on_error` 对每次表现层失败触发一次；结构性失败或构造失败作为终止信号恰好触发一次
//! - 终止之后（完成或致命错误）通道关闭，不再上报任何内容

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::FxError;

/// 自然播放完毕时的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackResult {
    /// 动画标识
    pub animation: String,
    /// 执行过的帧数
    pub frames: u64,
    /// 结束时的播放时长（秒）
    pub elapsed: f32,
    /// 本次运行派发的销毁总数（切换替换与终止清理之和）
    pub effects_destroyed: usize,
    /// 时间轴是否在播放结束前自然走完
    pub timeline_completed: bool,
}

/// 完成回调
pub type CompleteCallback = Box<dyn FnMut(PlaybackResult)>;
/// 错误回调，第二个参数为阶段标签
pub type ErrorCallback = Box<dyn FnMut(&FxError, &str)>;

/// 调用方提供的回调对
pub struct PlaybackCallbacks {
    pub on_complete: CompleteCallback,
    pub on_error: ErrorCallback,
}

impl PlaybackCallbacks {
    pub fn new(
        on_complete: impl FnMut(PlaybackResult) + 'static,
        on_error: impl FnMut(&FxError, &str) + 'static,
    ) -> Self {
        Self {
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }

    /// 忽略所有通知（只依赖日志）
    pub fn silent() -> Self {
        Self::new(|_| {}, |_, _| {})
    }
}

struct ReporterInner {
    animation: String,
    callbacks: RefCell<PlaybackCallbacks>,
    completed: Cell<bool>,
    fatal: Cell<bool>,
    cosmetic: Cell<u32>,
}

/// 通道的共享句柄
///
/// 负责保证上报次数约束，并在上报前写日志。
#[derive(Clone)]
pub struct Reporter {
    inner: Rc<ReporterInner>,
}

impl Reporter {
    pub fn new(animation: impl Into<String>, callbacks: PlaybackCallbacks) -> Self {
        Self {
            inner: Rc::new(ReporterInner {
                animation: animation.into(),
                callbacks: RefCell::new(callbacks),
                completed: Cell::new(false),
                fatal: Cell::new(false),
                cosmetic: Cell::new(0),
            }),
        }
    }

    pub fn animation(&self) -> &str {
        &self.inner.animation
    }

    /// 通道是否已关闭
    pub fn is_settled(&self) -> bool {
        self.inner.completed.get() || self.inner.fatal.get()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.get()
    }

    pub fn is_failed(&self) -> bool {
        self.inner.fatal.get()
    }

    /// 已上报的表现层失败次数
    pub fn cosmetic_count(&self) -> u32 {
        self.inner.cosmetic.get()
    }

    /// 上报表现层失败，不关闭通道
    pub fn cosmetic(&self, err: &FxError) {
        if self.is_settled() {
            debug!(animation = %self.inner.animation, error = %err, "通道已关闭，忽略表现层失败");
            return;
        }
        warn!(
            animation = %self.inner.animation,
            stage = %err.stage(),
            error = %err,
            "表现层失败，继续播放"
        );
        self.inner.cosmetic.set(self.inner.cosmetic.get() + 1);
        self.dispatch_error(err);
    }

    /// 上报致命失败并关闭通道
    ///
    /// # 返回
    /// 通道已关闭时返回 `false`，不会重复上报
    pub fn fatal(&self, err: &FxError) -> bool {
        if self.is_settled() {
            debug!(animation = %self.inner.animation, error = %err, "通道已关闭，忽略致命失败");
            return false;
        }
        self.inner.fatal.set(true);
        error!(
            animation = %self.inner.animation,
            stage = %err.stage(),
            class = ?err.class(),
            error = %err,
            "播放终止"
        );
        self.dispatch_error(err);
        true
    }

    /// 上报自然完成并关闭通道
    pub fn complete(&self, result: PlaybackResult) -> bool {
        if self.is_settled() {
            return false;
        }
        self.inner.completed.set(true);
        info!(
            animation = %self.inner.animation,
            frames = result.frames,
            elapsed = result.elapsed,
            "播放完成"
        );
        match self.inner.callbacks.try_borrow_mut() {
            Ok(mut callbacks) => (callbacks.on_complete)(result),
            Err(_) => error!(animation = %self.inner.animation, "完成回调重入，已丢弃"),
        }
        true
    }

    fn dispatch_error(&self, err: &FxError) {
        match self.inner.callbacks.try_borrow_mut() {
            Ok(mut callbacks) => (callbacks.on_error)(err, err.stage()),
            Err(_) => error!(animation = %self.inner.animation, "错误回调重入，已丢弃"),
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("animation", &self.inner.animation)
            .field("completed", &self.inner.completed.get())
            .field("fatal", &self.inner.fatal.get())
            .field("cosmetic", &self.inner.cosmetic.get())
            .finish()
    }
}
