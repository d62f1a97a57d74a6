//! Core modules for a room-scale teleport-and-grab stage.
//!
//! The crate exposes high level building blocks: a shared scene graph
//! with the session's fixed scaffolding, OBJ mesh loading, controller
//! ray casting and the interaction loop that drives grabbing, hover
//! highlighting and teleportation.  Rendering lives in its own module so
//! the interaction code stays testable in headless tools.

pub mod controller;
pub mod graph;
pub mod interaction;
pub mod loader;
pub mod mesh;
pub mod orbit;
pub mod ray;
pub mod render;
pub mod scene;

pub use controller::{
    ControllerEvent, ControllerId, ControllerState, Pose, ReferenceSpace, TargetRayMode,
};
pub use graph::{DrawItem, NodeId, SceneGraph, Transform, Wells};
pub use interaction::InteractionLoop;
pub use loader::AssetLoadManager;
pub use mesh::{MeshData, MeshRegistry};
pub use orbit::OrbitCamera;
pub use ray::{raycast_group, Ray, RayHit};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{ObjectKind, SceneEntry, SceneManifest};
