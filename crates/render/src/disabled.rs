use crate::backend::{InputSnapshot, UiLayer, ViewerBackend};
use simrig_common::{AppState, ViewerKind};
use simrig_kernel::{WorldModel, WorldState};

/// Backend that presents nothing. Also stands in for a backend that could
/// not be created.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledBackend {
    width: u32,
    height: u32,
}

impl DisabledBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl ViewerBackend for DisabledBackend {
    fn kind(&self) -> ViewerKind {
        ViewerKind::Disabled
    }

    fn prepare(&mut self, _model: &WorldModel, _state: &WorldState, _app: &AppState) -> InputSnapshot {
        InputSnapshot::default()
    }

    fn render(&mut self, _app: &mut AppState, _ui: Option<&mut dyn UiLayer>) {}

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::SceneSource;

    #[test]
    fn disabled_backend_is_inert() {
        let model = SceneSource::xml("<mujoco><worldbody/></mujoco>").compile().unwrap();
        let state = WorldState::new(&model);
        let mut backend = DisabledBackend::new(640, 480);
        let mut app = AppState::default();
        for _ in 0..10 {
            let input = backend.prepare(&model, &state, &app);
            assert_eq!(input, InputSnapshot::default());
            backend.render(&mut app, None);
        }
        assert_eq!(backend.gpu_submissions(), 0);
        assert_eq!(backend.viewport(), (640, 480));
        assert!(backend.frame().is_none());
        assert_eq!(app, AppState::default());
    }
}
