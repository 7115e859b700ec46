//! # FrameLoop 模块
//!
//! 模拟时钟的帧循环，实现 [`FrameScheduler`]。
//!
//! 每次 [`step`](FrameLoop::step) 推进一个帧间隔，并按请求顺序执行本帧之前登记的回调；
//! 回调中新请求的帧在下一次 `step` 执行。

use std::cell::RefCell;
use std::fmt;

use tracing::trace;

use fx_runtime::{FrameCallback, FrameRequestId, FrameScheduler};

#[derive(Default)]
struct LoopInner {
    next_id: u64,
    queue: Vec<(FrameRequestId, FrameCallback)>,
    now: f32,
    frames: u64,
    cancelled: u64,
}

/// 模拟时钟帧循环
pub struct FrameLoop {
    interval: f32,
    inner: RefCell<LoopInner>,
}

impl FrameLoop {
    /// 以固定帧率创建
    pub fn new(fps: u32) -> Self {
        Self::with_start(fps, 0.0)
    }

    /// 指定起始时间戳（时间戳不必从 0 开始）
    pub fn with_start(fps: u32, start: f32) -> Self {
        Self {
            interval: 1.0 / fps.max(1) as f32,
            inner: RefCell::new(LoopInner {
                now: start,
                ..LoopInner::default()
            }),
        }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    /// 当前时间戳
    pub fn now(&self) -> f32 {
        self.inner.borrow().now
    }

    /// 已执行的帧数
    pub fn frames(&self) -> u64 {
        self.inner.borrow().frames
    }

    /// 挂起的回调数量
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// 被取消的回调数量
    pub fn cancelled(&self) -> u64 {
        self.inner.borrow().cancelled
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// 以当前时间戳执行一帧，不推进时钟
    pub fn fire(&self) -> usize {
        let (now, due) = {
            let mut inner = self.inner.borrow_mut();
            inner.frames += 1;
            (inner.now, std::mem::take(&mut inner.queue))
        };
        let count = due.len();
        trace!(now, callbacks = count, "帧");
        for (_, callback) in due {
            callback(now);
        }
        count
    }

    /// 推进一个帧间隔后执行一帧
    pub fn step(&self) -> usize {
        self.inner.borrow_mut().now += self.interval;
        self.fire()
    }

    /// 持续推进直到没有挂起的回调，或模拟时间超过 `max_seconds`
    ///
    /// # 返回
    /// 是否在时限内进入空闲
    pub fn run_until_idle(&self, max_seconds: f32) -> bool {
        let deadline = self.now() + max_seconds;
        if !self.is_idle() {
            self.fire();
        }
        while !self.is_idle() {
            if self.now() >= deadline {
                return false;
            }
            self.step();
        }
        true
    }
}

impl FrameScheduler for FrameLoop {
    fn request_frame(&self, callback: FrameCallback) -> FrameRequestId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = FrameRequestId(inner.next_id);
        inner.queue.push((id, callback));
        id
    }

    fn cancel_frame(&self, id: FrameRequestId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.queue.len();
        inner.queue.retain(|(queued, _)| *queued != id);
        let removed = inner.queue.len() != before;
        if removed {
            inner.cancelled += 1;
        }
        removed
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("FrameLoop")
            .field("interval", &self.interval)
            .field("now", &inner.now)
            .field("frames", &inner.frames)
            .field("pending", &inner.queue.len())
            .finish()
    }
}
