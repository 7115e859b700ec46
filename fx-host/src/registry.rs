//! # Registry 模块
//!
//! 动画注册表：字符串标识到动画模块入口的映射。
//!
//! 条目分两种：
//! - 就绪条目：注册时已经构造好的模块
//! - 延迟条目：首次启动时才调用加载函数，结果（包括失败）被缓存，不会重试
//!
//! 加载失败作为构造失败经由调用方的 `on_error` 上报，协调器不会启动。

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use fx_runtime::{
    AnimationModule, ConstructionError, FxError, Playback, PlaybackCallbacks, RenderContext,
    Reporter, launch,
};

use crate::modules::{AuroraOrbit, NebulaDive, WarpTunnel};

/// 延迟加载函数
pub type ModuleLoader = Box<dyn FnOnce() -> Result<Rc<dyn AnimationModule>, String>>;

/// 注册表错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// 标识未注册
    #[error("未知的动画: '{0}'")]
    UnknownAnimation(String),

    /// 标识重复注册
    #[error("动画 '{0}' 已注册")]
    DuplicateId(String),

    /// 加载或启动失败（已经通过 `on_error` 上报）
    #[error(transparent)]
    Launch(#[from] FxError),
}

enum EntryKind {
    Ready(Rc<dyn AnimationModule>),
    Deferred {
        loader: RefCell<Option<ModuleLoader>>,
        loaded: OnceCell<Result<Rc<dyn AnimationModule>, String>>,
    },
}

struct Entry {
    id: String,
    title: String,
    kind: EntryKind,
}

impl Entry {
    /// 取得模块；延迟条目在第一次调用时加载
    fn module(&self) -> Result<Rc<dyn AnimationModule>, ConstructionError> {
        let loaded = match &self.kind {
            EntryKind::Ready(module) => return Ok(module.clone()),
            EntryKind::Deferred { loader, loaded } => loaded.get_or_init(|| {
                let Some(load) = loader.borrow_mut().take() else {
                    return Err("加载函数缺失".to_string());
                };
                debug!(animation = %self.id, "加载延迟模块");
                let result = load();
                match &result {
                    Ok(_) => info!(animation = %self.id, "延迟模块加载完成"),
                    Err(e) => warn!(animation = %self.id, error = %e, "延迟模块加载失败"),
                }
                result
            }),
        };
        loaded.clone().map_err(|message| ConstructionError::ModuleLoad {
            module: self.id.clone(),
            message,
        })
    }

    fn info(&self) -> AnimationInfo {
        let (deferred, loaded) = match &self.kind {
            EntryKind::Ready(_) => (false, true),
            EntryKind::Deferred { loaded, .. } => {
                (true, loaded.get().is_some_and(|result| result.is_ok()))
            }
        };
        AnimationInfo {
            id: self.id.clone(),
            title: self.title.clone(),
            deferred,
            loaded,
        }
    }
}

/// 注册表条目的展示信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnimationInfo {
    pub id: String,
    pub title: String,
    /// 是否延迟加载
    pub deferred: bool,
    /// 模块是否已可用
    pub loaded: bool,
}

/// 动画注册表
#[derive(Default)]
pub struct AnimationRegistry {
    entries: Vec<Entry>,
}

impl AnimationRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置动画
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let entries: [Result<(), RegistryError>; 3] = [
            registry.register(Rc::new(NebulaDive)),
            registry.register(Rc::new(AuroraOrbit)),
            registry.register_deferred(WarpTunnel::ID, "Warp Tunnel", || {
                Ok(Rc::new(WarpTunnel) as Rc<dyn AnimationModule>)
            }),
        ];
        for result in entries {
            if let Err(e) = result {
                warn!(error = %e, "内置动画注册失败");
            }
        }
        registry
    }

    /// 注册就绪模块
    pub fn register(&mut self, module: Rc<dyn AnimationModule>) -> Result<(), RegistryError> {
        let id = module.id().to_string();
        self.ensure_unique(&id)?;
        self.entries.push(Entry {
            title: module.title().to_string(),
            id,
            kind: EntryKind::Ready(module),
        });
        Ok(())
    }

    /// 注册延迟模块
    pub fn register_deferred(
        &mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        loader: impl FnOnce() -> Result<Rc<dyn AnimationModule>, String> + 'static,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        self.ensure_unique(&id)?;
        self.entries.push(Entry {
            id,
            title: title.into(),
            kind: EntryKind::Deferred {
                loader: RefCell::new(Some(Box::new(loader))),
                loaded: OnceCell::new(),
            },
        });
        Ok(())
    }

    fn ensure_unique(&self, id: &str) -> Result<(), RegistryError> {
        if self.contains(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    fn entry(&self, id: &str) -> Result<&Entry, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| RegistryError::UnknownAnimation(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// 按注册顺序的全部标识
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// 按注册顺序的条目信息
    pub fn list(&self) -> Vec<AnimationInfo> {
        self.entries.iter().map(Entry::info).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 解析模块（必要时加载）
    pub fn resolve(&self, id: &str) -> Result<Rc<dyn AnimationModule>, RegistryError> {
        let entry = self.entry(id)?;
        entry
            .module()
            .map_err(|e| RegistryError::Launch(e.into()))
    }

    /// 解析并启动动画
    ///
    /// 加载失败和启动失败都会先通过 `callbacks.on_error` 上报构造错误，再返回 `Err`。
    pub fn launch(
        &self,
        id: &str,
        ctx: &RenderContext,
        callbacks: PlaybackCallbacks,
    ) -> Result<Playback, RegistryError> {
        let entry = self.entry(id)?;
        let module = match entry.module() {
            Ok(module) => module,
            Err(e) => {
                let err = FxError::from(e);
                Reporter::new(id, callbacks).fatal(&err);
                return Err(err.into());
            }
        };
        Ok(launch(module.as_ref(), ctx, callbacks)?)
    }
}

impl fmt::Debug for AnimationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
