//! # Scene 模块
//!
//! 内存场景图：不做真实渲染，只记账。
//!
//! 记录存活的节点/资源、上传的字节数、渲染次数以及重复释放次数，
//! 供 headless 播放和测试检查资源是否恰好释放一次。
//! 同时提供故障注入，用于复现资源创建失败和渲染失败。

use std::cell::RefCell;
use std::collections::HashMap;

use serde::Serialize;
use tracing::trace;

use fx_runtime::{
    CameraState, NodeDesc, NodeId, NodeTransform, ResourceDesc, ResourceId, SceneError, SceneGraph,
};

/// 资源统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SceneStats {
    /// 当前存活的节点
    pub live_nodes: usize,
    /// 当前存活的资源
    pub live_resources: usize,
    /// 累计创建的资源
    pub created_resources: u64,
    /// 累计释放的资源
    pub disposed_resources: u64,
    /// 对已释放句柄的重复释放次数
    pub double_disposals: u64,
    /// 累计上传字节数
    pub bytes_uploaded: u64,
    /// 渲染次数
    pub renders: u64,
}

#[derive(Debug)]
struct NodeEntry {
    label: String,
    transform: NodeTransform,
}

#[derive(Debug, Default)]
struct SceneInner {
    next_id: u64,
    nodes: HashMap<NodeId, NodeEntry>,
    resources: HashMap<ResourceId, ResourceDesc>,
    stats: SceneStats,
    last_camera: Option<CameraState>,
    /// 标签以此前缀开头的资源创建会失败
    fail_resource_prefix: Option<String>,
    /// 第 N 次渲染（从 1 开始）失败
    fail_render_at: Option<u64>,
}

/// 内存场景图
#[derive(Debug, Default)]
pub struct MemoryScene {
    inner: RefCell<SceneInner>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前统计
    pub fn stats(&self) -> SceneStats {
        let inner = self.inner.borrow();
        SceneStats {
            live_nodes: inner.nodes.len(),
            live_resources: inner.resources.len(),
            ..inner.stats
        }
    }

    /// 是否没有任何残留
    pub fn is_clean(&self) -> bool {
        let stats = self.stats();
        stats.live_nodes == 0 && stats.live_resources == 0 && stats.double_disposals == 0
    }

    /// 存活节点的标签（排序后）
    pub fn live_node_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .inner
            .borrow()
            .nodes
            .values()
            .map(|n| n.label.clone())
            .collect();
        labels.sort();
        labels
    }

    /// 节点当前变换
    pub fn node_transform(&self, id: NodeId) -> Option<NodeTransform> {
        self.inner.borrow().nodes.get(&id).map(|n| n.transform)
    }

    /// 最近一次渲染使用的相机
    pub fn last_camera(&self) -> Option<CameraState> {
        self.inner.borrow().last_camera
    }

    /// 让标签以 `prefix` 开头的资源创建失败
    pub fn fail_resources_with_prefix(&self, prefix: impl Into<String>) {
        self.inner.borrow_mut().fail_resource_prefix = Some(prefix.into());
    }

    /// 让第 `n` 次渲染失败
    pub fn fail_render_at(&self, n: u64) {
        self.inner.borrow_mut().fail_render_at = Some(n);
    }

    fn next_id(inner: &mut SceneInner) -> u64 {
        inner.next_id += 1;
        inner.next_id
    }
}

impl SceneGraph for MemoryScene {
    fn create_resource(&self, desc: ResourceDesc) -> Result<ResourceId, SceneError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(prefix) = &inner.fail_resource_prefix
            && desc.label.starts_with(prefix.as_str())
        {
            return Err(SceneError::ResourceCreation {
                label: desc.label,
                message: "注入的创建失败".to_string(),
            });
        }
        let id = ResourceId(Self::next_id(&mut inner));
        trace!(resource = %id, label = %desc.label, "创建资源");
        inner.resources.insert(id, desc);
        inner.stats.created_resources += 1;
        Ok(id)
    }

    fn write_resource(&self, id: ResourceId, bytes: &[u8]) -> Result<(), SceneError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.resources.contains_key(&id) {
            return Err(SceneError::UnknownResource(id));
        }
        inner.stats.bytes_uploaded += bytes.len() as u64;
        Ok(())
    }

    fn dispose_resource(&self, id: ResourceId) -> Result<(), SceneError> {
        let mut inner = self.inner.borrow_mut();
        if inner.resources.remove(&id).is_some() {
            inner.stats.disposed_resources += 1;
            Ok(())
        } else {
            inner.stats.double_disposals += 1;
            Err(SceneError::UnknownResource(id))
        }
    }

    fn add_node(&self, desc: NodeDesc) -> Result<NodeId, SceneError> {
        let mut inner = self.inner.borrow_mut();
        for resource in [desc.geometry, desc.material].into_iter().flatten() {
            if !inner.resources.contains_key(&resource) {
                return Err(SceneError::UnknownResource(resource));
            }
        }
        let id = NodeId(Self::next_id(&mut inner));
        inner.nodes.insert(
            id,
            NodeEntry {
                label: desc.label,
                transform: desc.transform,
            },
        );
        Ok(id)
    }

    fn update_node(&self, id: NodeId, transform: &NodeTransform) -> Result<(), SceneError> {
        match self.inner.borrow_mut().nodes.get_mut(&id) {
            Some(node) => {
                node.transform = *transform;
                Ok(())
            }
            None => Err(SceneError::UnknownNode(id)),
        }
    }

    fn remove_node(&self, id: NodeId) -> Result<(), SceneError> {
        match self.inner.borrow_mut().nodes.remove(&id) {
            Some(_) => Ok(()),
            None => Err(SceneError::UnknownNode(id)),
        }
    }

    fn render_frame(&self, camera: &CameraState) -> Result<(), SceneError> {
        let mut inner = self.inner.borrow_mut();
        let n = inner.stats.renders + 1;
        if inner.fail_render_at == Some(n) {
            return Err(SceneError::RenderFailed(format!("注入的第 {n} 次渲染失败")));
        }
        inner.stats.renders = n;
        inner.last_camera = Some(*camera);
        Ok(())
    }
}
