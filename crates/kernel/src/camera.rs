use std::sync::Arc;

use glam::{Mat4, Vec3};
use meander_common::CameraPose;
use meander_input::{Control, InputFrame};
use parking_lot::RwLock;

const MIN_SPEED: f32 = 0.5;
const MAX_SPEED: f32 = 4096.0;

/// No-clip fly camera in a Z-up world. Yaw 0 looks along +Y.
///
/// Owned by the control thread; other threads only ever see the
/// [`CameraPose`] it publishes.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub sensitivity: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, -3.0, 64.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 2000.0,
            speed: 16.0,
            sensitivity: 0.003,
        }
    }
}

impl FlyCamera {
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            -self.yaw.sin() * self.pitch.cos(),
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Z).normalize()
    }

    /// Mouse look. Positive `dx` turns right, positive `dy` looks down.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.sensitivity;
        self.pitch -= dy * self.sensitivity;
        self.pitch = self.pitch.clamp(-89.0_f32.to_radians(), 89.0_f32.to_radians());
    }

    /// Each scroll line up doubles the speed, each line down halves it.
    pub fn scale_speed(&mut self, lines: f32) {
        self.speed = (self.speed * 2.0_f32.powf(lines)).clamp(MIN_SPEED, MAX_SPEED);
    }

    /// Apply one frame of input over `dt` seconds.
    pub fn apply(&mut self, input: &InputFrame, dt: f32) {
        if input.is_held(Control::Look) {
            self.rotate(input.pointer_delta.x, input.pointer_delta.y);
        }
        if input.scroll != 0.0 {
            self.scale_speed(input.scroll);
        }

        let intent = input.movement();
        let direction = self.right() * intent.x + self.forward() * intent.y + Vec3::Z * intent.z;
        self.position += direction.normalize_or_zero() * self.speed * dt;
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Z)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            view: self.view_matrix(),
            proj: self.projection_matrix(),
        }
    }
}

/// Latest published camera pose. Writers swap in a whole new snapshot, so
/// readers never observe a half-updated pose.
#[derive(Debug, Default)]
pub struct PoseBuffer {
    current: RwLock<Arc<CameraPose>>,
}

impl PoseBuffer {
    pub fn new(pose: CameraPose) -> Self {
        Self {
            current: RwLock::new(Arc::new(pose)),
        }
    }

    pub fn publish(&self, pose: CameraPose) {
        *self.current.write() = Arc::new(pose);
    }

    pub fn latest(&self) -> Arc<CameraPose> {
        Arc::clone(&self.current.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use meander_input::Action;

    #[test]
    fn default_camera_looks_along_y() {
        let cam = FlyCamera::default();
        assert!((cam.forward() - Vec3::Y).length() < 1e-6);
        assert!((cam.right() - Vec3::X).length() < 1e-6);
        assert!(!cam.pose().view_projection().is_nan());
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = FlyCamera::default();
        cam.rotate(0.0, -1e6);
        assert!(cam.pitch <= 89.0_f32.to_radians());
        assert!(cam.forward().z > 0.99);
    }

    #[test]
    fn forward_key_moves_by_speed() {
        let mut cam = FlyCamera::default();
        let start = cam.position;
        let input = InputFrame::aggregate([Action::Press(Control::MoveForward)]);
        cam.apply(&input, 0.5);
        assert!((cam.position - (start + Vec3::Y * 8.0)).length() < 1e-4);
    }

    #[test]
    fn pointer_only_turns_while_looking() {
        let mut cam = FlyCamera::default();
        let motion = InputFrame::aggregate([Action::PointerMotion(Vec2::new(100.0, 0.0))]);
        cam.apply(&motion, 0.016);
        assert_eq!(cam.yaw, 0.0);

        let looking = InputFrame::aggregate([
            Action::Press(Control::Look),
            Action::PointerMotion(Vec2::new(100.0, 0.0)),
        ]);
        cam.apply(&looking, 0.016);
        assert!(cam.yaw < 0.0);
        assert!(cam.forward().x > 0.0, "turning right should face +X");
    }

    #[test]
    fn scroll_doubles_and_halves_speed() {
        let mut cam = FlyCamera::default();
        cam.scale_speed(1.0);
        assert_eq!(cam.speed, 32.0);
        cam.scale_speed(-2.0);
        assert_eq!(cam.speed, 8.0);
        cam.scale_speed(-100.0);
        assert_eq!(cam.speed, MIN_SPEED);
    }

    #[test]
    fn pose_buffer_swaps_snapshots() {
        let buffer = PoseBuffer::new(CameraPose::default());
        let before = buffer.latest();
        let pose = FlyCamera::default().pose();
        buffer.publish(pose);
        assert_eq!(*buffer.latest(), pose);
        assert_eq!(before.position, Vec3::ZERO);
    }
}
