//! # Frame 模块
//!
//! 宿主帧回调原语的接口约定。
//!
//! 语义与浏览器的 `requestAnimationFrame` 相同：回调是一次性的，
//! 需要持续运行的一方在每帧回调里重新请求下一帧。
//! 时间戳单位为秒，由宿主单调递增地提供。

use std::fmt;

/// 帧请求 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequestId(pub u64);

impl fmt::Display for FrameRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// 帧回调，参数为当前帧时间戳（秒）
pub type FrameCallback = Box<dyn FnOnce(f32)>;

/// 帧调度器
///
/// 实现方必须保证：
/// - 回调按请求顺序在同一帧内依次执行，互不重叠
/// - 回调内部可以再次调用 `request_frame` / `cancel_frame`（只影响后续帧）
pub trait FrameScheduler {
    /// 请求在下一帧执行回调
    fn request_frame(&self, callback: FrameCallback) -> FrameRequestId;

    /// 取消尚未执行的回调
    ///
    /// # 返回
    /// - `true`: 回调被取消
    /// - `false`: 回调不存在或已执行
    fn cancel_frame(&self, id: FrameRequestId) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    //! 单元测试用的手动帧调度器

    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    pub struct ManualScheduler {
        inner: RefCell<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        next_id: u64,
        queue: Vec<(FrameRequestId, FrameCallback)>,
    }

    impl ManualScheduler {
        /// 执行当前排队的所有回调，返回执行数量
        pub fn tick(&self, now: f32) -> usize {
            let due = std::mem::take(&mut self.inner.borrow_mut().queue);
            let count = due.len();
            for (_, callback) in due {
                callback(now);
            }
            count
        }

        pub fn pending(&self) -> usize {
            self.inner.borrow().queue.len()
        }
    }

    impl FrameScheduler for ManualScheduler {
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
            inner.queue.len() != before
        }
    }
}
