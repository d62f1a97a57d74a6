use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// World-space pose of a tracked device, supplied externally each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

/// The two controller slots of a session. Slot one wins ties, e.g. when
/// both controllers squeeze in the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerId {
    One,
    Two,
}

impl ControllerId {
    pub const ALL: [Self; 2] = [Self::One, Self::Two];

    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }
}

/// How the input device produces its target ray, mirroring the session
/// layer's `targetRayMode` strings. Screen-based input never shows hover
/// highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetRayMode {
    TrackedPointer,
    Screen,
    Gaze,
}

impl TargetRayMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tracked-pointer" => Some(Self::TrackedPointer),
            "screen" => Some(Self::Screen),
            "gaze" => Some(Self::Gaze),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrackedPointer => "tracked-pointer",
            Self::Screen => "screen",
            Self::Gaze => "gaze",
        }
    }
}

impl Default for TargetRayMode {
    fn default() -> Self {
        Self::TrackedPointer
    }
}

/// Input transitions delivered by the session layer. Handlers are invoked
/// between frame ticks, never concurrently with one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerEvent {
    SelectStart { ray_mode: TargetRayMode },
    SelectEnd,
    SqueezeStart,
    SqueezeEnd,
}

/// Mutable per-controller state. Created once at session start and only
/// ever mutated by input handlers and the frame loop.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub pose: Pose,
    pub squeezing: bool,
    pub selected: Option<NodeId>,
    pub ray_mode: TargetRayMode,
}

/// Spatial origin against which all tracked poses are reported.
///
/// Teleportation never moves the player rig; it replaces this space with
/// one offset by the negated teleport point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSpace {
    pub origin: Vec3,
    pub orientation: Quat,
}

impl Default for ReferenceSpace {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl ReferenceSpace {
    /// Returns the replacement space offset by `delta` and `rotation`.
    /// The old value is meant to be discarded wholesale.
    #[must_use]
    pub fn offset_by(self, delta: Vec3, rotation: Quat) -> Self {
        Self {
            origin: self.origin + delta,
            orientation: rotation * self.orientation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_mode_round_trips_session_strings() {
        for mode in [
            TargetRayMode::TrackedPointer,
            TargetRayMode::Screen,
            TargetRayMode::Gaze,
        ] {
            assert_eq!(TargetRayMode::from_name(mode.as_str()), Some(mode));
        }
        assert_eq!(TargetRayMode::from_name("transient-pointer"), None);
    }

    #[test]
    fn reference_space_offsets_accumulate() {
        let space = ReferenceSpace::default()
            .offset_by(Vec3::new(-3.0, 0.0, -7.0), Quat::IDENTITY)
            .offset_by(Vec3::new(1.0, 0.0, 2.0), Quat::IDENTITY);
        assert_eq!(space.origin, Vec3::new(-2.0, 0.0, -5.0));
        assert_eq!(space.orientation, Quat::IDENTITY);
    }

    #[test]
    fn controller_slots_keep_independent_state() {
        let mut states = [ControllerState::default(), ControllerState::default()];
        states[ControllerId::One.index()].squeezing = true;
        assert!(!states[ControllerId::Two.index()].squeezing);
    }
}
