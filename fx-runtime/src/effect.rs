//! # Effect 模块
//!
//! 效果实例的接口约定与生命周期保护。
//!
//! ## 约定
//!
//! - `animate` 启动（或重新启动）一个自包含的多阶段过渡
//! - `update` 推进逐帧模拟，跳帧是安全的
//! - `destroy` 幂等：每个自有资源恰好释放一次，自有节点从场景中移除
//! - 销毁之后，除 `destroy` 之外的方法都是空操作
//! - 效果之间互不访问对方的状态
//!
//! 协调器和时间轴不直接持有效果，而是通过 [`EffectHandle`] 调用：
//! 句柄把 `Err` 返回和 panic 统一转换为 [`EffectError`]，并保证 `destroy` 只派发一次。

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, error};

use crate::error::EffectError;
use crate::transition::{OnComplete, StagedTransition, TransitionHandle};

/// 效果实例 ID（在一次模块组合内唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EffectId(pub u64);

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fx#{}", self.0)
    }
}

/// 效果阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectPhase {
    #[default]
    Idle,
    Warmup,
    Active,
    Intensify,
    Climax,
    Coda,
}

impl EffectPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Warmup => "warmup",
            Self::Active => "active",
            Self::Intensify => "intensify",
            Self::Climax => "climax",
            Self::Coda => "coda",
        }
    }
}

impl fmt::Display for EffectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 效果实例接口
pub trait Effect {
    /// 调试名称
    fn name(&self) -> &str;

    fn phase(&self) -> EffectPhase;

    /// 切换阶段，销毁后为空操作
    fn set_phase(&mut self, phase: EffectPhase);

    /// 是否已销毁（单调 false → true）
    fn is_destroyed(&self) -> bool;

    /// 启动多阶段过渡，再次调用会取代进行中的过渡
    fn animate(
        &mut self,
        duration: f32,
        on_complete: Option<OnComplete>,
    ) -> Result<TransitionHandle, EffectError>;

    /// 推进逐帧模拟
    fn update(&mut self, dt: f32, elapsed: f32) -> Result<(), EffectError>;

    /// 释放全部资源（幂等）
    fn destroy(&mut self);
}

/// 效果实现共用的生命周期状态
///
/// 负责阶段、销毁标记和当前过渡；具体效果把它作为字段嵌入，
/// 在每个方法开头检查 `is_destroyed`。
#[derive(Debug)]
pub struct Lifecycle {
    name: String,
    phase: EffectPhase,
    destroyed: bool,
    transition: Option<StagedTransition>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: EffectPhase::Idle,
            destroyed: false,
            transition: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> EffectPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: EffectPhase) {
        if self.destroyed {
            return;
        }
        if self.phase != phase {
            debug!(effect = %self.name, from = %self.phase, to = %phase, "效果阶段切换");
            self.phase = phase;
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// 校验过渡时长
    pub fn check_duration(&self, duration: f32) -> Result<(), EffectError> {
        if duration.is_finite() && duration >= 0.0 {
            Ok(())
        } else {
            Err(EffectError::AnimateFailed {
                effect: self.name.clone(),
                message: format!("无效的过渡时长: {duration}"),
            })
        }
    }

    /// 开始新过渡，取代进行中的过渡
    pub fn begin(&mut self, transition: StagedTransition) -> TransitionHandle {
        if self.destroyed {
            return TransitionHandle::inert();
        }
        if let Some(mut previous) = self.transition.take() {
            previous.supersede();
        }
        let handle = transition.handle();
        self.transition = Some(transition);
        handle
    }

    /// 推进当前过渡
    pub fn advance(&mut self, dt: f32) {
        if self.destroyed {
            return;
        }
        let settled = match &mut self.transition {
            Some(transition) => !transition.advance(dt),
            None => false,
        };
        if settled {
            self.transition = None;
        }
    }

    /// 是否有进行中的过渡
    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// 标记为已销毁
    ///
    /// # 返回
    /// 第一次调用返回 `true`，调用方据此释放资源
    pub fn mark_destroyed(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        if let Some(mut transition) = self.transition.take() {
            transition.supersede();
        }
        true
    }
}

/// 效果实例句柄
///
/// 由创建效果的模块组合持有，可以被协调器和时间轴调用项共享。
#[derive(Clone)]
pub struct EffectHandle {
    id: EffectId,
    name: Rc<str>,
    inner: Rc<RefCell<dyn Effect>>,
    destroy_dispatched: Rc<Cell<bool>>,
    /// 销毁请求到达时效果正被借用，等调用返回后再执行
    destroy_deferred: Rc<Cell<bool>>,
}

impl EffectHandle {
    pub fn new<E: Effect + 'static>(id: EffectId, effect: E) -> Self {
        let name: Rc<str> = Rc::from(effect.name());
        Self {
            id,
            name,
            inner: Rc::new(RefCell::new(effect)),
            destroy_dispatched: Rc::new(Cell::new(false)),
            destroy_deferred: Rc::new(Cell::new(false)),
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前阶段；效果正被借用时返回 `None`
    pub fn phase(&self) -> Option<EffectPhase> {
        self.inner.try_borrow().ok().map(|e| e.phase())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroy_dispatched.get()
            || self
                .inner
                .try_borrow()
                .map(|e| e.is_destroyed())
                .unwrap_or(false)
    }

    pub fn set_phase(&self, phase: EffectPhase) -> Result<(), EffectError> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.guarded(|effect| {
            effect.set_phase(phase);
            Ok(())
        })
    }

    /// 受保护的 `animate`
    pub fn animate(
        &self,
        duration: f32,
        on_complete: Option<OnComplete>,
    ) -> Result<TransitionHandle, EffectError> {
        if self.is_destroyed() {
            return Ok(TransitionHandle::inert());
        }
        self.guarded(|effect| effect.animate(duration, on_complete))
    }

    /// 受保护的 `update`
    pub fn update(&self, dt: f32, elapsed: f32) -> Result<(), EffectError> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.guarded(|effect| effect.update(dt, elapsed))
    }

    /// 派发 `destroy`
    ///
    /// # 返回
    /// - `true`: 本次调用派发了销毁
    /// - `false`: 之前已经派发过
    pub fn destroy(&self) -> bool {
        if self.destroy_dispatched.replace(true) {
            return false;
        }
        if self.inner.try_borrow_mut().is_err() {
            debug!(effect = %self.name, "效果正在使用中，延迟销毁");
            self.destroy_deferred.set(true);
            return true;
        }
        self.run_destroy();
        true
    }

    /// 两个句柄是否指向同一个效果
    pub fn same_effect(&self, other: &EffectHandle) -> bool {
        Rc::ptr_eq(&self.destroy_dispatched, &other.destroy_dispatched)
    }

    fn run_destroy(&self) {
        let Ok(mut effect) = self.inner.try_borrow_mut() else {
            self.destroy_deferred.set(true);
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| effect.destroy())) {
            error!(
                effect = %self.name,
                message = %panic_message(&*payload),
                "效果销毁时发生 panic"
            );
        }
    }

    fn guarded<T>(
        &self,
        call: impl FnOnce(&mut dyn Effect) -> Result<T, EffectError>,
    ) -> Result<T, EffectError> {
        let result = {
            let mut effect = self.inner.try_borrow_mut().map_err(|_| EffectError::Busy {
                effect: self.name.to_string(),
            })?;
            match panic::catch_unwind(AssertUnwindSafe(|| call(&mut *effect))) {
                Ok(result) => result,
                Err(payload) => Err(EffectError::Panicked {
                    effect: self.name.to_string(),
                    message: panic_message(&*payload),
                }),
            }
        };
        if self.destroy_deferred.take() {
            self.run_destroy();
        }
        result
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// 提取 panic 负载中的消息
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Trace, Tracer, tracer_handle};
    use super::*;

    fn trace() -> Trace {
        Rc::new(RefCell::new(Vec::new()))
    }

    // ========== 生命周期 ==========

    #[test]
    fn test_destroy_is_idempotent() {
        let (handle, tracer) = tracer_handle(1, Tracer::new("a", trace()));
        assert!(handle.destroy());
        assert!(!handle.destroy());
        assert!(handle.is_destroyed());
        assert_eq!(tracer.borrow().destroys, 1);

        // 直接重复调用实现的 destroy 也不会重复释放
        tracer.borrow_mut().destroy();
        assert_eq!(*tracer.borrow().trace.borrow(), vec!["a:destroy"]);
    }

    #[test]
    fn test_calls_after_destroy_are_noops() {
        let (handle, tracer) = tracer_handle(1, Tracer::new("a", trace()));
        handle.destroy();

        assert!(handle.update(0.016, 1.0).is_ok());
        let transition = handle.animate(1.0, None).unwrap();
        assert!(transition.is_superseded());
        handle.set_phase(EffectPhase::Climax).unwrap();

        let tracer = tracer.borrow();
        assert_eq!(tracer.updates, 0);
        assert_eq!(tracer.phase(), EffectPhase::Idle);
    }

    #[test]
    fn test_update_error_and_panic_are_captured() {
        let mut failing = Tracer::new("a", trace());
        failing.fail_update_at = Some(0.0);
        let (handle, _) = tracer_handle(1, failing);
        assert!(matches!(
            handle.update(0.016, 0.5),
            Err(EffectError::UpdateFailed { .. })
        ));

        let mut panicking = Tracer::new("b", trace());
        panicking.panic_update_at = Some(0.0);
        let (handle, _) = tracer_handle(2, panicking);
        match handle.update(0.016, 0.5) {
            Err(EffectError::Panicked { message, .. }) => assert_eq!(message, "injected panic"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_reentrant_call_is_busy() {
        let (handle, _) = tracer_handle(1, Tracer::new("a", trace()));
        let _borrow = handle.inner.borrow_mut();
        assert!(matches!(
            handle.update(0.016, 0.0),
            Err(EffectError::Busy { .. })
        ));
    }

    #[test]
    fn test_destroy_during_call_is_deferred() {
        let (handle, tracer) = tracer_handle(1, Tracer::new("a", trace()));
        let inner = handle.clone();
        let result = handle.guarded(move |_| {
            assert!(inner.destroy());
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(tracer.borrow().destroys, 1);
        assert!(handle.is_destroyed());
    }

    // ========== 过渡 ==========

    #[test]
    fn test_animate_restart_supersedes() {
        let (handle, tracer) = tracer_handle(1, Tracer::new("a", trace()));
        let done = Rc::new(Cell::new(0));
        let (d1, d2) = (done.clone(), done.clone());

        let first = handle
            .animate(1.0, Some(Box::new(move || d1.set(d1.get() + 1))))
            .unwrap();
        handle.update(0.5, 0.5).unwrap();
        let second = handle
            .animate(1.0, Some(Box::new(move || d2.set(d2.get() + 10))))
            .unwrap();
        handle.update(2.0, 2.5).unwrap();

        assert!(first.is_superseded());
        assert!(second.is_finished());
        assert_eq!(done.get(), 10);
        assert_eq!(tracer.borrow().props.get_or("scale", 0.0), 1.0);
    }

    #[test]
    fn test_invalid_duration_fails_animate() {
        let (handle, _) = tracer_handle(1, Tracer::new("a", trace()));
        assert!(matches!(
            handle.animate(f32::NAN, None),
            Err(EffectError::AnimateFailed { .. })
        ));
    }
}
