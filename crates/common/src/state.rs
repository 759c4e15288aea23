use serde::{Deserialize, Serialize};

/// Snapshot of the pointer as seen by the last event poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MouseState {
    pub button_left: bool,
    pub button_middle: bool,
    pub button_right: bool,
    pub last_x: f64,
    pub last_y: f64,
}

impl MouseState {
    pub fn any_button(&self) -> bool {
        self.button_left || self.button_middle || self.button_right
    }
}

/// Application-level toggles shared between the shell, the viewer and the UI.
///
/// Owned by the shell and passed by reference into per-frame callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Stepping is skipped while false.
    pub running: bool,
    pub vsync: bool,
    pub fullscreen: bool,
    /// `None` renders through the free orbit camera, `Some(i)` through model camera `i`.
    pub camera: Option<usize>,
    /// A reset was requested; the next step applies it instead of stepping.
    pub dirty_reset: bool,
    /// The UI owns the pointer this frame; camera input is ignored.
    pub wants_to_capture_mouse: bool,
    pub show_ui: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            running: true,
            vsync: true,
            fullscreen: false,
            camera: None,
            dirty_reset: false,
            wants_to_capture_mouse: false,
            show_ui: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_interactive_startup() {
        let s = AppState::default();
        assert!(s.running);
        assert!(s.vsync);
        assert!(s.camera.is_none());
        assert!(!s.dirty_reset);
    }

    #[test]
    fn mouse_any_button() {
        let mut m = MouseState::default();
        assert!(!m.any_button());
        m.button_middle = true;
        assert!(m.any_button());
    }
}
