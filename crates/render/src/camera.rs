use glam::{Mat3, Mat4, Vec3};
use simrig_common::MouseState;
use simrig_kernel::ModelStat;

/// Camera manipulation selected by the mouse buttons held during a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    RotateV,
    RotateH,
    MoveV,
    MoveH,
    Zoom,
}

impl MouseAction {
    /// Right button moves, left rotates, middle zooms. Shift picks the
    /// horizontal variant.
    pub fn from_buttons(mouse: &MouseState, shift: bool) -> Option<Self> {
        if mouse.button_right {
            Some(if shift { Self::MoveH } else { Self::MoveV })
        } else if mouse.button_left {
            Some(if shift { Self::RotateH } else { Self::RotateV })
        } else if mouse.button_middle {
            Some(Self::Zoom)
        } else {
            None
        }
    }
}

/// Free camera orbiting a look-at point in a Z-up world.
/// Camera motion is presentation state and never touches the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    pub lookat: Vec3,
    /// Degrees, counter-clockwise from +X.
    pub azimuth: f32,
    /// Degrees, negative looks down.
    pub elevation: f32,
    pub distance: f32,
    /// Vertical field of view in degrees.
    pub fovy: f32,
    extent: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            lookat: Vec3::ZERO,
            azimuth: 90.0,
            elevation: -45.0,
            distance: 2.0,
            fovy: 45.0,
            extent: 1.0,
        }
    }
}

const SCROLL_ZOOM: f32 = 0.05;

impl OrbitCamera {
    /// Centre the camera on the model's reference configuration.
    pub fn framing(stat: &ModelStat) -> Self {
        let mut cam = Self::default();
        cam.frame(stat);
        cam
    }

    pub fn frame(&mut self, stat: &ModelStat) {
        self.lookat = stat.center.as_vec3();
        self.extent = stat.extent as f32;
        self.distance = 1.5 * self.extent;
    }

    pub fn forward(&self) -> Vec3 {
        let (az, el) = (self.azimuth.to_radians(), self.elevation.to_radians());
        Vec3::new(el.cos() * az.cos(), el.cos() * az.sin(), el.sin())
    }

    pub fn eye(&self) -> Vec3 {
        self.lookat - self.forward() * self.distance
    }

    fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Z).normalize_or_zero()
    }

    /// Apply one mouse motion. `dx` and `dy` are fractions of the viewport height.
    pub fn move_camera(&mut self, action: MouseAction, dx: f32, dy: f32) {
        match action {
            MouseAction::RotateV => {
                self.azimuth -= dx * 180.0;
                self.elevation = (self.elevation - dy * 180.0).clamp(-89.0, 89.0);
            }
            MouseAction::RotateH => self.azimuth -= dx * 180.0,
            MouseAction::MoveV | MouseAction::MoveH => {
                let right = self.right();
                let second = if action == MouseAction::MoveV {
                    right.cross(self.forward())
                } else {
                    Vec3::new(self.forward().x, self.forward().y, 0.0).normalize_or_zero()
                };
                self.lookat += (-right * dx + second * dy) * self.distance;
            }
            MouseAction::Zoom => {
                self.distance = (self.distance * (1.0 + dy)).max(0.01 * self.extent);
            }
        }
        self.azimuth = self.azimuth.rem_euclid(360.0);
    }

    /// Zoom by 5% per scroll notch; positive scrolls in.
    pub fn scroll(&mut self, notches: f32) {
        self.move_camera(MouseAction::Zoom, 0.0, -SCROLL_ZOOM * notches);
    }

    /// Track a cursor move and, while a button is held, turn it into a camera action.
    pub fn drag(&mut self, mouse: &mut MouseState, x: f64, y: f64, shift: bool, viewport_height: u32) {
        let dx = (x - mouse.last_x) as f32;
        let dy = (y - mouse.last_y) as f32;
        mouse.last_x = x;
        mouse.last_y = y;
        let height = viewport_height.max(1) as f32;
        if let Some(action) = MouseAction::from_buttons(mouse, shift) {
            self.move_camera(action, dx / height, dy / height);
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.lookat, Vec3::Z)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.fovy.to_radians(),
            aspect,
            0.01 * self.extent,
            50.0 * self.extent,
        )
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

/// Camera defined in the model, posed by the simulation.
/// Looks along its local -Z with +Y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedCamera {
    pub pos: Vec3,
    pub rot: Mat3,
    pub fovy: f32,
}

impl FixedCamera {
    pub fn view_projection(&self, aspect: f32, extent: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.pos, self.pos - self.rot.z_axis, self.rot.y_axis);
        let proj = Mat4::perspective_rh(self.fovy.to_radians(), aspect, 0.01 * extent, 50.0 * extent);
        proj * view
    }
}
