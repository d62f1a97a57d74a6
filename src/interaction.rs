use glam::{Quat, Vec3};
use log::debug;

use crate::controller::{ControllerEvent, ControllerId, ControllerState, Pose, ReferenceSpace, TargetRayMode};
use crate::graph::{NodeId, SceneGraph, Wells};
use crate::mesh::MeshRegistry;
use crate::ray::{raycast_group, Ray, RayHit};

/// Ray line length shown while the controller ray hits nothing.
pub const DEFAULT_RAY_LENGTH: f32 = 5.0;
/// Opacity applied to the sub-parts of a hovered object.
pub const HIGHLIGHT_OPACITY: f32 = 0.5;

/// Drives the teleport-and-grab interaction: owns both controllers' state,
/// the highlight list, the shared last teleport point and the session's
/// reference space.
///
/// Input handlers and [`InteractionLoop::tick`] are called from the same
/// execution context, never concurrently; the host serializes all
/// callbacks.
pub struct InteractionLoop {
    graph: SceneGraph,
    registry: MeshRegistry,
    wells: Wells,
    controllers: [ControllerState; 2],
    highlighted: Vec<NodeId>,
    teleport_point: Option<Vec3>,
    reference_space: ReferenceSpace,
}

impl InteractionLoop {
    pub fn new(graph: SceneGraph, registry: MeshRegistry) -> Self {
        let wells = graph.wells();
        Self {
            graph,
            registry,
            wells,
            controllers: [ControllerState::default(), ControllerState::default()],
            highlighted: Vec::new(),
            teleport_point: None,
            reference_space: ReferenceSpace::default(),
        }
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn controller(&self, id: ControllerId) -> &ControllerState {
        &self.controllers[id.index()]
    }

    pub fn reference_space(&self) -> ReferenceSpace {
        self.reference_space
    }

    pub fn teleport_point(&self) -> Option<Vec3> {
        self.teleport_point
    }

    pub fn highlighted(&self) -> &[NodeId] {
        &self.highlighted
    }

    /// Feeds a new tracked pose for one controller. The controller's graph
    /// node follows, so a grabbed object moves with the hand.
    pub fn set_pose(&mut self, id: ControllerId, pose: Pose) {
        self.controllers[id.index()].pose = pose;
        let node = self.wells.controllers[id.index()];
        self.graph.update(node, |n| {
            n.transform.translation = pose.position;
            n.transform.rotation = pose.rotation;
        });
    }

    /// Dispatches one input transition for one controller.
    pub fn handle_event(&mut self, id: ControllerId, event: ControllerEvent) {
        match event {
            ControllerEvent::SelectStart { ray_mode } => self.on_select_start(id, ray_mode),
            ControllerEvent::SelectEnd => self.on_select_end(id),
            ControllerEvent::SqueezeStart => {
                self.controllers[id.index()].squeezing = true;
            }
            ControllerEvent::SqueezeEnd => self.on_squeeze_end(id),
        }
    }

    fn on_select_start(&mut self, id: ControllerId, ray_mode: TargetRayMode) {
        self.controllers[id.index()].ray_mode = ray_mode;
        let Some(hit) = self.raycast(id, self.wells.interactables) else {
            return; // nothing under the ray, selection stays empty
        };
        let object = self
            .graph
            .group_child_of(self.wells.interactables, hit.node)
            .unwrap_or(hit.node);
        self.graph.attach(object, self.wells.controllers[id.index()]);
        self.controllers[id.index()].selected = Some(object);
        debug!("controller {:?} grabbed node {:?}", id, object);
    }

    fn on_select_end(&mut self, id: ControllerId) {
        if let Some(object) = self.controllers[id.index()].selected.take() {
            self.graph.attach(object, self.wells.interactables);
            debug!("controller {:?} released node {:?}", id, object);
        }
    }

    fn on_squeeze_end(&mut self, id: ControllerId) {
        self.controllers[id.index()].squeezing = false;
        if let Some(point) = self.teleport_point.take() {
            // Replace the reference space wholesale; identity rotation.
            self.reference_space = self.reference_space.offset_by(-point, Quat::IDENTITY);
            debug!("teleport committed to {point:?}");
        }
    }

    /// Runs once per rendered frame, before the camera update and the
    /// render call. Step order matters: stale highlights are cleared
    /// before this frame's are computed.
    pub fn tick(&mut self) {
        self.clear_highlights();
        for id in ControllerId::ALL {
            self.update_highlight(id);
        }
        self.update_teleport_marker();
    }

    fn clear_highlights(&mut self) {
        for object in self.highlighted.drain(..) {
            for part in self.graph.subtree(object) {
                self.graph.set_opacity(part, 1.0, false);
            }
        }
    }

    fn update_highlight(&mut self, id: ControllerId) {
        let state = &self.controllers[id.index()];
        // Screen-based (AR) input shows no hover feedback, and a grabbed
        // object is not re-highlighted under its own controller.
        if state.ray_mode == TargetRayMode::Screen || state.selected.is_some() {
            return;
        }
        let ray_line = self.wells.ray_lines[id.index()];
        match self.raycast(id, self.wells.interactables) {
            Some(hit) => {
                let object = self
                    .graph
                    .group_child_of(self.wells.interactables, hit.node)
                    .unwrap_or(hit.node);
                for part in self.graph.subtree(object) {
                    self.graph.set_opacity(part, HIGHLIGHT_OPACITY, true);
                }
                self.highlighted.push(object);
                self.graph
                    .update(ray_line, |n| n.transform.scale.z = hit.distance);
            }
            None => {
                self.graph
                    .update(ray_line, |n| n.transform.scale.z = DEFAULT_RAY_LENGTH);
            }
        }
    }

    fn update_teleport_marker(&mut self) {
        // Controller one wins when both squeeze; two is only consulted
        // while one is idle.
        let active = ControllerId::ALL
            .into_iter()
            .find(|id| self.controllers[id.index()].squeezing);

        self.teleport_point = active
            .and_then(|id| self.raycast(id, self.wells.teleport_surfaces))
            .map(|hit| hit.point);

        match self.teleport_point {
            Some(point) => {
                self.graph
                    .update(self.wells.marker, |n| n.transform.translation = point);
                self.graph.set_visible(self.wells.marker, true);
            }
            None => self.graph.set_visible(self.wells.marker, false),
        }
    }

    fn raycast(&self, id: ControllerId, group: NodeId) -> Option<RayHit> {
        let world = self
            .graph
            .world_transform(self.wells.controllers[id.index()]);
        let ray = Ray::new(
            world.transform_point3(Vec3::ZERO),
            world.transform_vector3(Vec3::NEG_Z),
        );
        raycast_group(&self.graph, &self.registry, group, &ray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Transform;
    use crate::mesh::MeshData;

    const SELECT: ControllerEvent = ControllerEvent::SelectStart {
        ray_mode: TargetRayMode::TrackedPointer,
    };

    fn quad_obj() -> MeshData {
        MeshData::from_obj_str(
            "v -0.5 -0.5 0\nv 0.5 -0.5 0\nv 0.5 0.5 0\nv -0.5 0.5 0\nf 1 2 3 4\n",
        )
        .unwrap()
    }

    /// Controller one at the origin looking down -Z, controller two off to
    /// the side looking down -Z.
    fn rig() -> InteractionLoop {
        let graph = SceneGraph::new();
        let registry = MeshRegistry::new();
        registry.insert("quad", quad_obj());
        let mut rig = InteractionLoop::new(graph, registry);
        rig.set_pose(ControllerId::One, Pose::default());
        rig.set_pose(
            ControllerId::Two,
            Pose::new(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY),
        );
        rig
    }

    fn add_grabbable(rig: &InteractionLoop, name: &str, position: Vec3) -> NodeId {
        let wells = rig.graph().wells();
        let id = rig
            .graph()
            .add(name, wells.interactables, Transform::from_translation(position));
        rig.graph().set_mesh(id, "quad");
        id
    }

    fn add_floor(rig: &InteractionLoop, position: Vec3) -> NodeId {
        let wells = rig.graph().wells();
        let id = rig.graph().add(
            "Floor",
            wells.teleport_surfaces,
            Transform::from_translation(position),
        );
        rig.graph().set_mesh(id, "quad");
        id
    }

    #[test]
    fn select_start_reparents_hit_object_under_controller() {
        let mut rig = rig();
        let object = add_grabbable(&rig, "Barrel", Vec3::new(0.0, 0.0, -2.0));
        rig.handle_event(ControllerId::One, SELECT);

        let wells = rig.graph().wells();
        assert_eq!(rig.controller(ControllerId::One).selected, Some(object));
        // Structural exclusivity: the object left the group's membership.
        assert!(!rig.graph().children(wells.interactables).contains(&object));
        assert_eq!(rig.graph().parent(object), Some(wells.controllers[0]));
    }

    #[test]
    fn selected_object_cannot_be_selected_by_other_controller() {
        let mut rig = rig();
        add_grabbable(&rig, "Barrel", Vec3::new(0.0, 0.0, -2.0));
        rig.handle_event(ControllerId::One, SELECT);
        // Controller two aims at the same spot but the object is gone from
        // the group, so its intersection test cannot find it.
        rig.set_pose(ControllerId::Two, Pose::default());
        rig.handle_event(ControllerId::Two, SELECT);
        assert_eq!(rig.controller(ControllerId::Two).selected, None);
    }

    #[test]
    fn select_start_with_no_hit_is_a_no_op() {
        let mut rig = rig();
        let wells = rig.graph().wells();
        let before = rig.graph().children(wells.interactables);
        rig.handle_event(ControllerId::One, SELECT);
        assert_eq!(rig.controller(ControllerId::One).selected, None);
        assert_eq!(rig.graph().children(wells.interactables), before);
    }

    #[test]
    fn select_end_returns_object_preserving_world_position() {
        let mut rig = rig();
        let object = add_grabbable(&rig, "Barrel", Vec3::new(0.0, 0.0, -2.0));
        rig.handle_event(ControllerId::One, SELECT);
        // Move the hand; the object rides along.
        rig.set_pose(
            ControllerId::One,
            Pose::new(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY),
        );
        let carried = rig.graph().world_transform(object).transform_point3(Vec3::ZERO);
        rig.handle_event(ControllerId::One, ControllerEvent::SelectEnd);

        let wells = rig.graph().wells();
        assert!(rig.graph().children(wells.interactables).contains(&object));
        let dropped = rig.graph().world_transform(object).transform_point3(Vec3::ZERO);
        assert!((carried - dropped).length() < 1e-4);
        assert_eq!(rig.controller(ControllerId::One).selected, None);
    }

    #[test]
    fn nested_hit_selects_top_level_group_child() {
        let mut rig = rig();
        let wells = rig.graph().wells();
        let model = rig
            .graph()
            .add("Statue", wells.interactables, Transform::from_translation(Vec3::new(0.0, 0.0, -2.0)));
        let part = rig.graph().add("Body", model, Transform::IDENTITY);
        rig.graph().set_mesh(part, "quad");

        rig.handle_event(ControllerId::One, SELECT);
        assert_eq!(rig.controller(ControllerId::One).selected, Some(model));
    }

    #[test]
    fn highlight_scenario_at_distance_two() {
        let mut rig = rig();
        let object = add_grabbable(&rig, "Barrel", Vec3::new(0.0, 0.0, -2.0));
        rig.tick();

        assert_eq!(rig.highlighted(), &[object]);
        let snapshot = rig.graph().node(object);
        assert_eq!(snapshot.opacity, HIGHLIGHT_OPACITY);
        assert!(snapshot.transparent);
        let wells = rig.graph().wells();
        let ray_line = rig.graph().node(wells.ray_lines[0]);
        assert!((ray_line.transform.scale.z - 2.0).abs() < 1e-4);
    }

    #[test]
    fn highlight_clearing_is_idempotent() {
        let mut rig = rig();
        let object = add_grabbable(&rig, "Barrel", Vec3::new(0.0, 0.0, -2.0));
        rig.tick();
        assert_eq!(rig.graph().node(object).opacity, HIGHLIGHT_OPACITY);

        // Aim away so the next ticks only clear.
        rig.set_pose(
            ControllerId::One,
            Pose::new(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::PI)),
        );
        rig.tick();
        rig.tick();
        let snapshot = rig.graph().node(object);
        assert_eq!(snapshot.opacity, 1.0);
        assert!(!snapshot.transparent);
        assert!(rig.highlighted().is_empty());
        let wells = rig.graph().wells();
        let ray_line = rig.graph().node(wells.ray_lines[0]);
        assert!((ray_line.transform.scale.z - DEFAULT_RAY_LENGTH).abs() < 1e-4);
    }

    #[test]
    fn screen_ray_mode_suppresses_highlighting() {
        let mut rig = rig();
        add_grabbable(&rig, "Barrel", Vec3::new(0.0, 0.0, -2.0));
        rig.handle_event(
            ControllerId::One,
            ControllerEvent::SelectStart {
                ray_mode: TargetRayMode::Screen,
            },
        );
        rig.handle_event(ControllerId::One, ControllerEvent::SelectEnd);
        rig.tick();
        assert!(rig.highlighted().is_empty());
    }

    #[test]
    fn grabbed_object_is_not_highlighted_by_its_controller() {
        let mut rig = rig();
        add_grabbable(&rig, "Barrel", Vec3::new(0.0, 0.0, -2.0));
        rig.handle_event(ControllerId::One, SELECT);
        rig.tick();
        assert!(rig.highlighted().is_empty());
    }

    #[test]
    fn teleport_scenario_marker_and_commit() {
        let mut rig = rig();
        add_floor(&rig, Vec3::new(3.0, 0.0, 7.0));
        rig.set_pose(
            ControllerId::One,
            Pose::new(Vec3::new(3.0, 0.0, 9.0), Quat::IDENTITY),
        );
        rig.handle_event(ControllerId::One, ControllerEvent::SqueezeStart);
        rig.tick();

        let wells = rig.graph().wells();
        let marker = rig.graph().node(wells.marker);
        assert!(marker.visible);
        assert!((marker.transform.translation - Vec3::new(3.0, 0.0, 7.0)).length() < 1e-4);

        rig.handle_event(ControllerId::One, ControllerEvent::SqueezeEnd);
        let space = rig.reference_space();
        assert!((space.origin - Vec3::new(-3.0, 0.0, -7.0)).length() < 1e-4);
        assert_eq!(space.orientation, Quat::IDENTITY);
        assert_eq!(rig.teleport_point(), None);
    }

    #[test]
    fn squeeze_with_no_surface_hides_marker_and_commits_nothing() {
        let mut rig = rig();
        rig.handle_event(ControllerId::One, ControllerEvent::SqueezeStart);
        rig.tick();

        let wells = rig.graph().wells();
        assert!(!rig.graph().node(wells.marker).visible);

        rig.handle_event(ControllerId::One, ControllerEvent::SqueezeEnd);
        assert_eq!(rig.reference_space(), ReferenceSpace::default());
    }

    #[test]
    fn commit_never_happens_on_squeeze_start_or_while_squeezing() {
        let mut rig = rig();
        add_floor(&rig, Vec3::new(0.0, 0.0, -2.0));
        rig.handle_event(ControllerId::One, ControllerEvent::SqueezeStart);
        assert_eq!(rig.reference_space(), ReferenceSpace::default());
        rig.tick();
        rig.tick(); // staying in the squeezing state commits nothing
        assert_eq!(rig.reference_space(), ReferenceSpace::default());
        assert!(rig.teleport_point().is_some());
    }

    #[test]
    fn controller_one_wins_when_both_squeeze() {
        let mut rig = rig();
        add_floor(&rig, Vec3::new(0.0, 0.0, -2.0));
        // A second floor in front of controller two.
        let wells = rig.graph().wells();
        let far = rig.graph().add(
            "Floor2",
            wells.teleport_surfaces,
            Transform::from_translation(Vec3::new(10.0, 0.0, -4.0)),
        );
        rig.graph().set_mesh(far, "quad");

        rig.handle_event(ControllerId::One, ControllerEvent::SqueezeStart);
        rig.handle_event(ControllerId::Two, ControllerEvent::SqueezeStart);
        rig.tick();
        assert!((rig.teleport_point().unwrap() - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-4);

        // Once controller one lets go, controller two is consulted.
        rig.handle_event(ControllerId::One, ControllerEvent::SqueezeEnd);
        rig.tick();
        assert!((rig.teleport_point().unwrap() - Vec3::new(10.0, 0.0, -4.0)).length() < 1e-4);
    }
}
