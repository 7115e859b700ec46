//! # Engine 模块
//!
//! 补间引擎：在自己的帧回调里推进所有活跃时间轴。
//!
//! 引擎与播放协调器共享同一个 [`FrameScheduler`]，但各自请求帧；
//! 没有活跃时间轴时引擎不再请求帧。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::frame::{FrameRequestId, FrameScheduler};
use crate::timeline::{Timeline, TimelineHandle, TimelineStep};

struct Slot {
    timeline: Timeline,
    /// 上一次推进时的时间戳
    last: Option<f32>,
}

/// 补间引擎
pub struct TweenEngine {
    scheduler: Rc<dyn FrameScheduler>,
    slots: RefCell<Vec<Slot>>,
    pending: Cell<Option<FrameRequestId>>,
    me: Weak<TweenEngine>,
}

impl TweenEngine {
    pub fn new(scheduler: Rc<dyn FrameScheduler>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            scheduler,
            slots: RefCell::new(Vec::new()),
            pending: Cell::new(None),
            me: me.clone(),
        })
    }

    /// 开始播放时间轴
    ///
    /// 时间轴在下一次引擎帧开始推进，第一帧的 dt 为 0。
    pub fn play(&self, timeline: Timeline) -> TimelineHandle {
        let handle = timeline.handle();
        self.slots.borrow_mut().push(Slot {
            timeline,
            last: None,
        });
        self.ensure_ticking();
        handle
    }

    /// 活跃时间轴数量
    pub fn active_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// 引擎是否已请求下一帧
    pub fn is_ticking(&self) -> bool {
        self.pending.get().is_some()
    }

    fn ensure_ticking(&self) {
        if self.pending.get().is_some() {
            return;
        }
        let me = self.me.clone();
        let id = self.scheduler.request_frame(Box::new(move |now| {
            if let Some(engine) = me.upgrade() {
                engine.tick(now);
            }
        }));
        self.pending.set(Some(id));
    }

    fn tick(&self, now: f32) {
        self.pending.set(None);

        // 推进期间时间轴回调可能再次调用 play，先取出当前列表
        let mut running = std::mem::take(&mut *self.slots.borrow_mut());
        running.retain_mut(|slot| {
            let dt = slot.last.map_or(0.0, |last| (now - last).max(0.0));
            slot.last = Some(now);
            slot.timeline.advance(dt) == TimelineStep::Running
        });

        let live = {
            let mut slots = self.slots.borrow_mut();
            running.append(&mut slots);
            *slots = running;
            slots.len()
        };
        trace!(now, live, "补间引擎帧");

        if live > 0 {
            self.ensure_ticking();
        }
    }
}

impl fmt::Debug for TweenEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TweenEngine")
            .field("active", &self.active_count())
            .field("pending", &self.pending.get())
            .finish()
    }
}
