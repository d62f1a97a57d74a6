use glam::{Mat4, Vec3};

use crate::controller::Pose;
use crate::graph::{NodeId, SceneGraph};
use crate::mesh::{MeshData, MeshRegistry};

const T_EPSILON: f32 = 1e-6;

/// A world-space ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Ray cast from a pose along its local -Z axis, the forward
    /// direction of tracked target rays.
    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.position, pose.rotation * Vec3::NEG_Z)
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Nearest intersection for one ray against one candidate group.
/// Ephemeral; recomputed from scratch every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub node: NodeId,
    pub point: Vec3,
    pub distance: f32,
}

/// Tests `ray` against every renderable in the subtree under `group` and
/// returns the closest hit by world distance, or `None`.
///
/// Nodes are skipped while invisible or while their mesh has not finished
/// loading. Group sizes are tens of objects, so no acceleration structure
/// beyond a bounding-sphere reject is used.
pub fn raycast_group(
    graph: &SceneGraph,
    registry: &MeshRegistry,
    group: NodeId,
    ray: &Ray,
) -> Option<RayHit> {
    let mut closest: Option<RayHit> = None;
    for id in graph.subtree(group) {
        let node = graph.node(id);
        if !node.visible {
            continue;
        }
        let Some(mesh) = node.mesh.as_deref().and_then(|name| registry.get(name)) else {
            continue;
        };

        let world = graph.world_transform(id);
        let Some(hit_point) = raycast_node(ray, &world, &mesh) else {
            continue;
        };
        let distance = (hit_point - ray.origin).length();
        if closest.map_or(true, |hit| distance < hit.distance) {
            closest = Some(RayHit {
                node: id,
                point: hit_point,
                distance,
            });
        }
    }
    closest
}

/// Intersects the ray with one node's mesh, returning the world-space hit
/// point. The test runs in mesh-local space so non-uniform node scales
/// behave; the distance is recovered from the transformed hit point.
fn raycast_node(ray: &Ray, world: &Mat4, mesh: &MeshData) -> Option<Vec3> {
    let inverse = world.inverse();
    let local_origin = inverse.transform_point3(ray.origin);
    let local_direction = inverse.transform_vector3(ray.direction).normalize_or_zero();
    if local_direction == Vec3::ZERO {
        return None;
    }

    if !sphere_reject(local_origin, local_direction, mesh.bounding_radius()) {
        return None;
    }

    let mut nearest: Option<f32> = None;
    for index in 0..mesh.triangle_count() {
        let [a, b, c] = mesh.triangle(index);
        if let Some(t) = ray_triangle(local_origin, local_direction, a, b, c) {
            if nearest.map_or(true, |n| t < n) {
                nearest = Some(t);
            }
        }
    }

    nearest.map(|t| world.transform_point3(local_origin + local_direction * t))
}

/// Cheap sphere-around-origin test run before per-triangle work.
fn sphere_reject(origin: Vec3, direction: Vec3, radius: f32) -> bool {
    if origin.length_squared() <= radius * radius {
        return true; // origin inside the sphere
    }
    let tca = (-origin).dot(direction);
    if tca < 0.0 {
        return false; // sphere entirely behind the ray
    }
    origin.length_squared() - tca * tca <= radius * radius
}

/// Moller-Trumbore ray/triangle intersection; front and back faces both
/// count, matching the host engine's default raycaster.
fn ray_triangle(origin: Vec3, direction: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = direction.cross(edge2);
    let determinant = edge1.dot(p);
    if determinant.abs() < T_EPSILON {
        return None; // parallel to the triangle plane
    }
    let inv_det = 1.0 / determinant;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t > T_EPSILON).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Transform;
    use glam::Quat;

    fn quad_mesh() -> MeshData {
        // Unit quad in the XY plane, facing +Z.
        MeshData::from_obj_str(
            "v -0.5 -0.5 0\nv 0.5 -0.5 0\nv 0.5 0.5 0\nv -0.5 0.5 0\nf 1 2 3 4\n",
        )
        .unwrap()
    }

    fn stage() -> (SceneGraph, MeshRegistry) {
        let registry = MeshRegistry::new();
        registry.insert("quad", quad_mesh());
        (SceneGraph::new(), registry)
    }

    fn add_quad(graph: &SceneGraph, group: NodeId, name: &str, position: Vec3) -> NodeId {
        let id = graph.add(name, group, Transform::from_translation(position));
        graph.set_mesh(id, "quad");
        id
    }

    #[test]
    fn ray_from_pose_points_along_negative_z() {
        let ray = Ray::from_pose(&Pose::default());
        assert_eq!(ray.direction, Vec3::NEG_Z);

        let turned = Pose::new(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let ray = Ray::from_pose(&turned);
        assert!((ray.direction - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn hits_the_closest_of_two_objects() {
        let (graph, registry) = stage();
        let group = graph.wells().interactables;
        let near = add_quad(&graph, group, "Near", Vec3::new(0.0, 0.0, -1.0));
        let _far = add_quad(&graph, group, "Far", Vec3::new(0.0, 0.0, -3.0));

        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let hit = raycast_group(&graph, &registry, group, &ray).unwrap();
        assert_eq!(hit.node, near);
        assert!((hit.distance - 1.0).abs() < 1e-4);
        assert!((hit.point - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);
    }

    #[test]
    fn recursive_over_child_hierarchies() {
        let (graph, registry) = stage();
        let group = graph.wells().interactables;
        let holder = graph.add(
            "Holder",
            group,
            Transform::from_translation(Vec3::new(0.0, 0.0, -2.0)),
        );
        let part = graph.add("Part", holder, Transform::IDENTITY);
        graph.set_mesh(part, "quad");

        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let hit = raycast_group(&graph, &registry, group, &ray).unwrap();
        assert_eq!(hit.node, part);
        assert!((hit.distance - 2.0).abs() < 1e-4);
    }

    #[test]
    fn misses_return_none() {
        let (graph, registry) = stage();
        let group = graph.wells().teleport_surfaces;
        add_quad(&graph, group, "Floor", Vec3::new(0.0, 0.0, -2.0));

        let away = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(raycast_group(&graph, &registry, group, &away).is_none());
    }

    #[test]
    fn unloaded_meshes_are_not_ray_testable() {
        let (graph, registry) = stage();
        let group = graph.wells().interactables;
        let pending = graph.add(
            "Pending",
            group,
            Transform::from_translation(Vec3::new(0.0, 0.0, -1.0)),
        );
        graph.set_mesh(pending, "models/not-finished.obj");

        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        assert!(raycast_group(&graph, &registry, group, &ray).is_none());
    }

    #[test]
    fn scaled_nodes_report_world_distance() {
        let (graph, registry) = stage();
        let group = graph.wells().teleport_surfaces;
        let floor = graph.add(
            "Floor",
            group,
            Transform {
                translation: Vec3::new(0.0, 0.0, -4.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::new(10.0, 10.0, 1.0),
            },
        );
        graph.set_mesh(floor, "quad");

        let ray = Ray::new(Vec3::new(3.0, 0.0, 0.0), Vec3::NEG_Z);
        let hit = raycast_group(&graph, &registry, group, &ray).unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-4);
        assert!((hit.point - Vec3::new(3.0, 0.0, -4.0)).length() < 1e-4);
    }
}
