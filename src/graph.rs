use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Mesh name of the controller ray lines, resolved by the renderer.
pub const BUILTIN_RAY_MESH: &str = "builtin:ray";
/// Mesh name of the teleport marker, resolved by the renderer.
pub const BUILTIN_MARKER_MESH: &str = "builtin:marker";
/// Unit cube stand-in for entries that name no mesh of their own.
pub const BUILTIN_CUBE_MESH: &str = "builtin:cube";

/// Local TRS transform of a scene graph node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }
}

/// Index into the node registry. Nodes are never destroyed during a
/// session, so ids stay valid for the graph's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    transform: Transform,
    color: Vec3,
    opacity: f32,
    transparent: bool,
    visible: bool,
    mesh: Option<String>,
}

impl Node {
    fn new(name: String, parent: Option<NodeId>, transform: Transform) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            transform,
            color: Vec3::ONE,
            opacity: 1.0,
            transparent: false,
            visible: true,
            mesh: None,
        }
    }
}

/// Well-known nodes created when the graph is built.
#[derive(Debug, Clone, Copy)]
pub struct Wells {
    pub root: NodeId,
    /// Group of objects eligible for ray-grab.
    pub interactables: NodeId,
    /// Group of teleport destination surfaces, never mutated by the
    /// interaction loop.
    pub teleport_surfaces: NodeId,
    pub controllers: [NodeId; 2],
    pub ray_lines: [NodeId; 2],
    pub marker: NodeId,
}

#[derive(Debug)]
struct Inner {
    nodes: Vec<Node>,
    wells: Wells,
}

/// Thread-safe scene graph handle. Clones share the same graph, mirroring
/// how loader threads and the frame loop both mutate it between callbacks.
#[derive(Debug)]
pub struct SceneGraph {
    inner: Arc<RwLock<Inner>>,
}

impl Clone for SceneGraph {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only copy of a node's renderable state.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub name: String,
    pub parent: Option<NodeId>,
    pub transform: Transform,
    pub color: Vec3,
    pub opacity: f32,
    pub transparent: bool,
    pub visible: bool,
    pub mesh: Option<String>,
}

/// Mutable node fields exposed to [`SceneGraph::update`]. Every field is
/// written back; parenthood only changes through [`SceneGraph::attach`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub name: String,
    pub transform: Transform,
    pub color: Vec3,
    pub opacity: f32,
    pub transparent: bool,
    pub visible: bool,
    pub mesh: Option<String>,
}

/// Flattened renderable instance produced by [`SceneGraph::draw_list`].
#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    pub mesh: Option<String>,
    pub world: Mat4,
    pub color: Vec3,
    pub opacity: f32,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Builds a graph holding the session's fixed scaffolding: the two
    /// interaction groups, both controller frames with their ray lines and
    /// the (initially hidden) teleport marker.
    pub fn new() -> Self {
        let mut nodes = Vec::new();
        let mut push = |name: &str, parent: Option<NodeId>| {
            let id = NodeId(nodes.len() as u32);
            nodes.push(Node::new(name.to_string(), parent, Transform::IDENTITY));
            if let Some(parent) = parent {
                let index = parent.index();
                let node: &mut Node = &mut nodes[index];
                node.children.push(id);
            }
            id
        };

        let root = push("Scene", None);
        let interactables = push("Interactables", Some(root));
        let teleport_surfaces = push("TeleportSurfaces", Some(root));
        let controller_one = push("Controller1", Some(root));
        let ray_one = push("RayLine1", Some(controller_one));
        let controller_two = push("Controller2", Some(root));
        let ray_two = push("RayLine2", Some(controller_two));
        let marker = push("TeleportMarker", Some(root));

        // Built-in visuals the renderer resolves without the registry.
        for ray in [ray_one, ray_two] {
            nodes[ray.index()].mesh = Some(BUILTIN_RAY_MESH.to_string());
            nodes[ray.index()].color = Vec3::ONE;
        }
        let marker_node = &mut nodes[marker.index()];
        marker_node.visible = false;
        marker_node.mesh = Some(BUILTIN_MARKER_MESH.to_string());
        marker_node.color = Vec3::new(0.3, 0.9, 1.0);

        let wells = Wells {
            root,
            interactables,
            teleport_surfaces,
            controllers: [controller_one, controller_two],
            ray_lines: [ray_one, ray_two],
            marker,
        };

        Self {
            inner: Arc::new(RwLock::new(Inner { nodes, wells })),
        }
    }

    pub fn wells(&self) -> Wells {
        self.inner.read().wells
    }

    /// Inserts a node under `parent` and returns its id.
    pub fn add(&self, name: &str, parent: NodeId, transform: Transform) -> NodeId {
        let mut inner = self.inner.write();
        let id = NodeId(inner.nodes.len() as u32);
        inner
            .nodes
            .push(Node::new(name.to_string(), Some(parent), transform));
        inner.nodes[parent.index()].children.push(id);
        id
    }

    /// Applies a mutation to a single node's own state.
    pub fn update<F, R>(&self, id: NodeId, mut updater: F) -> R
    where
        F: FnMut(&mut NodeState) -> R,
    {
        let mut inner = self.inner.write();
        let node = &inner.nodes[id.index()];
        let mut state = NodeState {
            name: node.name.clone(),
            transform: node.transform,
            color: node.color,
            opacity: node.opacity,
            transparent: node.transparent,
            visible: node.visible,
            mesh: node.mesh.clone(),
        };
        let result = updater(&mut state);
        let node = &mut inner.nodes[id.index()];
        node.name = state.name;
        node.transform = state.transform;
        node.color = state.color;
        node.opacity = state.opacity;
        node.transparent = state.transparent;
        node.visible = state.visible;
        node.mesh = state.mesh;
        result
    }

    pub fn node(&self, id: NodeId) -> NodeSnapshot {
        snapshot_of(&self.inner.read().nodes[id.index()])
    }

    pub fn set_mesh(&self, id: NodeId, mesh: impl Into<String>) {
        self.inner.write().nodes[id.index()].mesh = Some(mesh.into());
    }

    pub fn set_color(&self, id: NodeId, color: Vec3) {
        self.inner.write().nodes[id.index()].color = color;
    }

    pub fn set_visible(&self, id: NodeId, visible: bool) {
        self.inner.write().nodes[id.index()].visible = visible;
    }

    pub fn set_transform(&self, id: NodeId, transform: Transform) {
        self.inner.write().nodes[id.index()].transform = transform;
    }

    pub fn set_opacity(&self, id: NodeId, opacity: f32, transparent: bool) {
        let mut inner = self.inner.write();
        let node = &mut inner.nodes[id.index()];
        node.opacity = opacity;
        node.transparent = transparent;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.inner.read().nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.inner.read().nodes[id.index()].children.clone()
    }

    /// World transform as the product of the parent chain.
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let inner = self.inner.read();
        world_of(&inner.nodes, id)
    }

    /// Reparents `id` under `new_parent`, preserving its world transform.
    ///
    /// This is the ownership-transfer operation: membership in a group is
    /// defined by parenthood, so an object attached to a controller frame
    /// is no longer a member of its previous group.
    pub fn attach(&self, id: NodeId, new_parent: NodeId) {
        let mut inner = self.inner.write();
        if inner.nodes[id.index()].parent == Some(new_parent) {
            return;
        }
        let world = world_of(&inner.nodes, id);
        let parent_world = world_of(&inner.nodes, new_parent);
        let local = Transform::from_matrix(parent_world.inverse() * world);

        if let Some(old_parent) = inner.nodes[id.index()].parent {
            let index = old_parent.index();
            inner.nodes[index].children.retain(|child| *child != id);
        }
        inner.nodes[new_parent.index()].children.push(id);
        let node = &mut inner.nodes[id.index()];
        node.parent = Some(new_parent);
        node.transform = local;
    }

    /// Ids of `id` and every node below it.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(inner.nodes[current.index()].children.iter().copied());
        }
        out
    }

    /// The direct child of `group` whose subtree contains `id`, if any.
    pub fn group_child_of(&self, group: NodeId, id: NodeId) -> Option<NodeId> {
        let inner = self.inner.read();
        let mut current = id;
        while let Some(parent) = inner.nodes[current.index()].parent {
            if parent == group {
                return Some(current);
            }
            current = parent;
        }
        None
    }

    /// Flattens the visible part of the graph into renderable instances.
    /// Hiding a node hides its whole subtree.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut stack = vec![(inner.wells.root, Mat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let node = &inner.nodes[id.index()];
            if !node.visible {
                continue;
            }
            let world = parent_world * node.transform.matrix();
            if node.mesh.is_some() {
                out.push(DrawItem {
                    mesh: node.mesh.clone(),
                    world,
                    color: node.color,
                    opacity: node.opacity,
                });
            }
            stack.extend(node.children.iter().map(|child| (*child, world)));
        }
        out
    }
}

fn snapshot_of(node: &Node) -> NodeSnapshot {
    NodeSnapshot {
        name: node.name.clone(),
        parent: node.parent,
        transform: node.transform,
        color: node.color,
        opacity: node.opacity,
        transparent: node.transparent,
        visible: node.visible,
        mesh: node.mesh.clone(),
    }
}

fn world_of(nodes: &[Node], id: NodeId) -> Mat4 {
    let node = &nodes[id.index()];
    match node.parent {
        Some(parent) => world_of(nodes, parent) * node.transform.matrix(),
        None => node.transform.matrix(),
    }
}
