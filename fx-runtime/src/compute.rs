//! # Compute 模块
//!
//! 可选的 GPU 计算能力（粒子模拟等）。
//!
//! 以显式注入的服务提供：第一次查询时初始化，之后缓存结果。
//! 初始化失败时降级为 [`ComputeCapability::Unavailable`]，只警告一次，
//! 依赖它的效果改用 CPU 路径。

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

/// 计算服务错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    /// 配置中禁用
    #[error("计算服务已禁用")]
    Disabled,

    /// 初始化失败
    #[error("计算服务初始化失败: {0}")]
    InitFailed(String),
}

/// 已初始化的计算运行时
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeRuntime {
    /// 单次调度可模拟的最大粒子数
    pub max_particles: usize,
}

/// 计算能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeCapability {
    Unavailable,
    Available { max_particles: usize },
}

impl ComputeCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// 可用时返回上限，否则返回 `fallback`
    pub fn particle_budget(&self, fallback: usize) -> usize {
        match self {
            Self::Available { max_particles } => *max_particles,
            Self::Unavailable => fallback,
        }
    }
}

type ComputeInit = Box<dyn FnOnce() -> Result<ComputeRuntime, ComputeError>>;

/// 惰性初始化的计算服务
pub struct ComputeService {
    init: RefCell<Option<ComputeInit>>,
    runtime: OnceCell<Option<ComputeRuntime>>,
    attempts: Cell<u32>,
}

impl ComputeService {
    pub fn new(init: impl FnOnce() -> Result<ComputeRuntime, ComputeError> + 'static) -> Self {
        Self {
            init: RefCell::new(Some(Box::new(init))),
            runtime: OnceCell::new(),
            attempts: Cell::new(0),
        }
    }

    /// 固定容量的服务
    pub fn with_capacity(max_particles: usize) -> Self {
        Self::new(move || Ok(ComputeRuntime { max_particles }))
    }

    /// 始终不可用的服务
    pub fn disabled() -> Self {
        Self::new(|| Err(ComputeError::Disabled))
    }

    fn runtime(&self) -> Option<&ComputeRuntime> {
        self.runtime
            .get_or_init(|| {
                self.attempts.set(self.attempts.get() + 1);
                let init = self.init.borrow_mut().take();
                let result = match init {
                    Some(init) => init(),
                    None => Err(ComputeError::InitFailed("初始化函数缺失".into())),
                };
                match result {
                    Ok(runtime) => {
                        info!(max_particles = runtime.max_particles, "计算服务已就绪");
                        Some(runtime)
                    }
                    Err(e) => {
                        warn!(error = %e, "计算服务不可用，降级为 CPU 路径");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// 初始化（如尚未进行）并返回是否可用
    pub fn ready(&self) -> bool {
        self.runtime().is_some()
    }

    pub fn capability(&self) -> ComputeCapability {
        match self.runtime() {
            Some(runtime) => ComputeCapability::Available {
                max_particles: runtime.max_particles,
            },
            None => ComputeCapability::Unavailable,
        }
    }

    /// 初始化尝试次数（始终不超过 1）
    pub fn init_attempts(&self) -> u32 {
        self.attempts.get()
    }
}

impl Default for ComputeService {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for ComputeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeService")
            .field("runtime", &self.runtime.get())
            .field("attempts", &self.attempts.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialises_once() {
        let service = ComputeService::with_capacity(4096);
        assert_eq!(service.init_attempts(), 0);
        assert!(service.ready());
        assert!(service.ready());
        assert_eq!(
            service.capability(),
            ComputeCapability::Available {
                max_particles: 4096
            }
        );
        assert_eq!(service.init_attempts(), 1);
    }

    #[test]
    fn test_failure_degrades() {
        let service = ComputeService::new(|| Err(ComputeError::InitFailed("no adapter".into())));
        assert!(!service.ready());
        assert_eq!(service.capability(), ComputeCapability::Unavailable);
        assert_eq!(service.capability().particle_budget(512), 512);
        assert_eq!(service.init_attempts(), 1);
    }
}
