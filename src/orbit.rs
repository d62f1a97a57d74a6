use glam::{Mat4, Vec3};

use crate::render::CameraParams;

/// Damped orbit controls around a fixed target, matching the feel of the
/// authoring demo: input adds angular velocity, velocity decays each
/// update so the camera glides to a stop.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_degrees: f32,
    pub damping: f32,
    yaw_velocity: f32,
    pitch_velocity: f32,
    zoom_velocity: f32,
}

/// Keep the camera off the poles so the up vector stays valid.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
const MIN_DISTANCE: f32 = 0.5;
const MAX_DISTANCE: f32 = 50.0;

impl Default for OrbitCamera {
    fn default() -> Self {
        // Equivalent of the demo's initial eye at (5, 5, 5).
        Self {
            target: Vec3::ZERO,
            distance: Vec3::splat(5.0).length(),
            yaw: std::f32::consts::FRAC_PI_4,
            pitch: (5.0f32 / Vec3::splat(5.0).length()).asin(),
            fov_degrees: 75.0,
            damping: 0.05,
            yaw_velocity: 0.0,
            pitch_velocity: 0.0,
            zoom_velocity: 0.0,
        }
    }
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rotational input, e.g. from a mouse drag.
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw_velocity += delta_yaw;
        self.pitch_velocity += delta_pitch;
    }

    /// Adds dolly input; positive moves the eye closer.
    pub fn zoom(&mut self, delta: f32) {
        self.zoom_velocity += delta;
    }

    /// Integrates pending input and decays it by the damping factor.
    pub fn update(&mut self) {
        self.yaw += self.yaw_velocity;
        self.pitch = (self.pitch + self.pitch_velocity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.distance = (self.distance - self.zoom_velocity).clamp(MIN_DISTANCE, MAX_DISTANCE);

        let keep = 1.0 - self.damping;
        self.yaw_velocity *= keep;
        self.pitch_velocity *= keep;
        self.zoom_velocity *= keep;
    }

    /// Eye position on the orbit sphere.
    pub fn position(&self) -> Vec3 {
        let horizontal = self.distance * self.pitch.cos();
        self.target
            + Vec3::new(
                horizontal * self.yaw.sin(),
                self.distance * self.pitch.sin(),
                horizontal * self.yaw.cos(),
            )
    }

    pub fn camera_params(&self, aspect: f32) -> CameraParams {
        let position = self.position();
        let view = Mat4::look_at_rh(position, self.target, Vec3::Y);
        let projection =
            Mat4::perspective_rh_gl(self.fov_degrees.to_radians(), aspect.max(0.01), 0.1, 1000.0);
        CameraParams {
            view_proj: projection * view,
            position,
        }
    }
}
