//! # Scene 模块
//!
//! 场景图渲染器的接口约定，以及效果用来管理自身子树的 [`OwnedSubtree`]。
//!
//! 场景图本身是外部协作者：fx-runtime 只规定它必须提供的操作，
//! 具体实现由宿主层提供（见 fx-host 的 `MemoryScene`）。
//!
//! ## 所有权约定
//!
//! - 每个效果通过自己的 `OwnedSubtree` 独占其节点与资源
//! - 场景根是唯一共享的对象，对它唯一允许的修改是挂载/移除自己的子树
//! - 每个资源句柄在 `release` 中恰好释放一次

use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::camera::CameraState;
use crate::error::SceneError;
use crate::math::NodeTransform;

/// 场景节点 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// GPU/CPU 资源 ID（几何体、材质、灯光、缓冲区）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// 资源类型
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    /// 几何体缓冲区
    Geometry { vertices: usize },
    /// 材质（着色器程序）
    Material { shader: String },
    /// 灯光
    Light { intensity: f32 },
    /// uniform / 数据缓冲区
    Buffer { size: usize },
}

/// 资源描述
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDesc {
    /// 调试标签
    pub label: String,
    /// 资源类型
    pub kind: ResourceKind,
}

impl ResourceDesc {
    pub fn geometry(label: impl Into<String>, vertices: usize) -> Self {
        Self {
            label: label.into(),
            kind: ResourceKind::Geometry { vertices },
        }
    }

    pub fn material(label: impl Into<String>, shader: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ResourceKind::Material {
                shader: shader.into(),
            },
        }
    }

    pub fn light(label: impl Into<String>, intensity: f32) -> Self {
        Self {
            label: label.into(),
            kind: ResourceKind::Light { intensity },
        }
    }

    pub fn buffer(label: impl Into<String>, size: usize) -> Self {
        Self {
            label: label.into(),
            kind: ResourceKind::Buffer { size },
        }
    }
}

/// 节点描述
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDesc {
    /// 调试标签
    pub label: String,
    /// 引用的几何体
    pub geometry: Option<ResourceId>,
    /// 引用的材质
    pub material: Option<ResourceId>,
    /// 初始变换
    pub transform: NodeTransform,
}

impl NodeDesc {
    /// 网格节点（几何体 + 材质）
    pub fn mesh(label: impl Into<String>, geometry: ResourceId, material: ResourceId) -> Self {
        Self {
            label: label.into(),
            geometry: Some(geometry),
            material: Some(material),
            transform: NodeTransform::identity(),
        }
    }

    /// 空节点（分组或灯光挂点）
    pub fn group(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            geometry: None,
            material: None,
            transform: NodeTransform::identity(),
        }
    }

    pub fn with_transform(mut self, transform: NodeTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// 场景图渲染器接口
///
/// 所有方法都接收 `&self`：实现方自行使用内部可变性，
/// 这样多个效果可以共享同一个 `Rc<dyn SceneGraph>`。
pub trait SceneGraph {
    /// 创建资源
    fn create_resource(&self, desc: ResourceDesc) -> Result<ResourceId, SceneError>;

    /// 写入资源数据（顶点、uniform 等）
    fn write_resource(&self, id: ResourceId, bytes: &[u8]) -> Result<(), SceneError>;

    /// 释放资源；每个句柄只能释放一次
    fn dispose_resource(&self, id: ResourceId) -> Result<(), SceneError>;

    /// 向场景根挂载节点
    fn add_node(&self, desc: NodeDesc) -> Result<NodeId, SceneError>;

    /// 更新节点变换
    fn update_node(&self, id: NodeId, transform: &NodeTransform) -> Result<(), SceneError>;

    /// 从场景根移除节点
    fn remove_node(&self, id: NodeId) -> Result<(), SceneError>;

    /// 渲染一帧
    fn render_frame(&self, camera: &CameraState) -> Result<(), SceneError>;
}

/// 效果独占的渲染子树
///
/// 记录效果创建的所有节点和资源。`release` 幂等：先按逆序移除节点，
/// 再按逆序释放资源，每个句柄恰好处理一次。
///
/// 实现了 `Drop`：构造中途失败（`?` 提前返回）时，已创建的部分会被自动释放，
/// 不会在场景中残留。
pub struct OwnedSubtree {
    scene: Rc<dyn SceneGraph>,
    nodes: Vec<NodeId>,
    resources: Vec<ResourceId>,
    released: bool,
}

impl OwnedSubtree {
    /// 创建空子树
    pub fn new(scene: Rc<dyn SceneGraph>) -> Self {
        Self {
            scene,
            nodes: Vec::new(),
            resources: Vec::new(),
            released: false,
        }
    }

    /// 创建并登记资源
    pub fn resource(&mut self, desc: ResourceDesc) -> Result<ResourceId, SceneError> {
        if self.released {
            return Err(SceneError::SubtreeReleased);
        }
        let id = self.scene.create_resource(desc)?;
        self.resources.push(id);
        Ok(id)
    }

    /// 挂载并登记节点
    pub fn node(&mut self, desc: NodeDesc) -> Result<NodeId, SceneError> {
        if self.released {
            return Err(SceneError::SubtreeReleased);
        }
        let id = self.scene.add_node(desc)?;
        self.nodes.push(id);
        Ok(id)
    }

    /// 写入自有资源
    pub fn write(&self, id: ResourceId, bytes: &[u8]) -> Result<(), SceneError> {
        if self.released {
            return Err(SceneError::SubtreeReleased);
        }
        self.scene.write_resource(id, bytes)
    }

    /// 更新自有节点的变换
    pub fn update(&self, id: NodeId, transform: &NodeTransform) -> Result<(), SceneError> {
        if self.released {
            return Err(SceneError::SubtreeReleased);
        }
        self.scene.update_node(id, transform)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// 释放整个子树
    ///
    /// # 返回
    /// 本次实际处理的句柄数量；重复调用返回 0
    pub fn release(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;

        let mut handled = 0;
        for id in self.nodes.drain(..).rev() {
            if let Err(e) = self.scene.remove_node(id) {
                warn!(node = %id, error = %e, "移除节点失败");
            }
            handled += 1;
        }
        for id in self.resources.drain(..).rev() {
            if let Err(e) = self.scene.dispose_resource(id) {
                warn!(resource = %id, error = %e, "释放资源失败");
            }
            handled += 1;
        }
        handled
    }
}

impl Drop for OwnedSubtree {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for OwnedSubtree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedSubtree")
            .field("nodes", &self.nodes.len())
            .field("resources", &self.resources.len())
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 单元测试用的最小场景图实现

    use std::cell::RefCell;
    use std::collections::HashSet;

    use super::*;

    #[derive(Default)]
    pub struct CountingScene {
        pub state: RefCell<CountingState>,
    }

    #[derive(Default)]
    pub struct CountingState {
        pub next_id: u64,
        pub live_nodes: HashSet<NodeId>,
        pub live_resources: HashSet<ResourceId>,
        pub disposals: u64,
        pub double_disposals: u64,
        pub renders: u64,
        pub fail_label: Option<String>,
        pub fail_render: bool,
    }

    impl CountingScene {
        pub fn live_nodes(&self) -> usize {
            self.state.borrow().live_nodes.len()
        }

        pub fn live_resources(&self) -> usize {
            self.state.borrow().live_resources.len()
        }
    }

    impl SceneGraph for CountingScene {
        fn create_resource(&self, desc: ResourceDesc) -> Result<ResourceId, SceneError> {
            let mut s = self.state.borrow_mut();
            if s.fail_label.as_deref() == Some(desc.label.as_str()) {
                return Err(SceneError::ResourceCreation {
                    label: desc.label,
                    message: "injected".into(),
                });
            }
            s.next_id += 1;
            let id = ResourceId(s.next_id);
            s.live_resources.insert(id);
            Ok(id)
        }

        fn write_resource(&self, id: ResourceId, _bytes: &[u8]) -> Result<(), SceneError> {
            if self.state.borrow().live_resources.contains(&id) {
                Ok(())
            } else {
                Err(SceneError::UnknownResource(id))
            }
        }

        fn dispose_resource(&self, id: ResourceId) -> Result<(), SceneError> {
            let mut s = self.state.borrow_mut();
            if s.live_resources.remove(&id) {
                s.disposals += 1;
                Ok(())
            } else {
                s.double_disposals += 1;
                Err(SceneError::UnknownResource(id))
            }
        }

        fn add_node(&self, _desc: NodeDesc) -> Result<NodeId, SceneError> {
            let mut s = self.state.borrow_mut();
            s.next_id += 1;
            let id = NodeId(s.next_id);
            s.live_nodes.insert(id);
            Ok(id)
        }

        fn update_node(&self, id: NodeId, _t: &NodeTransform) -> Result<(), SceneError> {
            if self.state.borrow().live_nodes.contains(&id) {
                Ok(())
            } else {
                Err(SceneError::UnknownNode(id))
            }
        }

        fn remove_node(&self, id: NodeId) -> Result<(), SceneError> {
            if self.state.borrow_mut().live_nodes.remove(&id) {
                Ok(())
            } else {
                Err(SceneError::UnknownNode(id))
            }
        }

        fn render_frame(&self, _camera: &CameraState) -> Result<(), SceneError> {
            let mut s = self.state.borrow_mut();
            if s.fail_render {
                return Err(SceneError::RenderFailed("injected".into()));
            }
            s.renders += 1;
            Ok(())
        }
    }
}
