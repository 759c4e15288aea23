use crate::camera::{FixedCamera, OrbitCamera};
use crate::context::{ContextDevice, RenderContext};
use crate::resources::{RenderParts, ResourceRequest};
use crate::scene::VisualScene;
use glam::Mat4;
use simrig_common::fatal::precondition_violation;
use simrig_common::{AppState, MouseState, ReleaseObserver, ViewerKind};
use simrig_kernel::{ModelId, WorldModel, WorldState};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{kind} backend unavailable: {reason}")]
    Unavailable { kind: ViewerKind, reason: String },
    #[error("invalid viewport {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },
}

impl BackendError {
    pub fn unavailable(kind: ViewerKind, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            kind,
            reason: reason.into(),
        }
    }
}

/// What one `prepare` saw of the user.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pub mouse: MouseState,
    /// Reset key pressed since the last prepare.
    pub reset_requested: bool,
    pub close_requested: bool,
    /// Scroll notches accumulated since the last prepare.
    pub scroll: f32,
    pub framebuffer: (u32, u32),
}

/// Immediate-mode UI drawn after the scene on interactive frames.
/// Sees application toggles only, never the simulation state.
pub trait UiLayer {
    fn show(&mut self, ctx: &egui::Context, app: &mut AppState);
}

impl<F> UiLayer for F
where
    F: FnMut(&egui::Context, &mut AppState),
{
    fn show(&mut self, ctx: &egui::Context, app: &mut AppState) {
        self(ctx, app)
    }
}

/// RGBA8 pixels read back from an offscreen render, top row first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl FrameBuffer {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.rgba.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }
}

/// One way of presenting the simulation.
///
/// `prepare` copies what it needs out of the model and state and handles
/// input without issuing GPU work. `render` draws what the last `prepare`
/// captured; it never sees the simulation, so it can run outside the lock
/// that guards stepping.
pub trait ViewerBackend {
    fn kind(&self) -> ViewerKind;

    fn prepare(&mut self, model: &WorldModel, state: &WorldState, app: &AppState) -> InputSnapshot;

    fn render(&mut self, app: &mut AppState, ui: Option<&mut dyn UiLayer>);

    /// Viewport in pixels.
    fn viewport(&self) -> (u32, u32);

    /// Command buffers handed to a GPU queue so far.
    fn gpu_submissions(&self) -> u64 {
        0
    }

    /// Last offscreen frame, for backends that keep one.
    fn frame(&self) -> Option<&FrameBuffer> {
        None
    }

    /// Drop model-dependent resources and rebuild them for `model`, keeping
    /// the window and graphics device.
    fn rebind(&mut self, _model: &WorldModel) {}
}

/// Model-facing half shared by the drawing backends: the visual scene,
/// the render context and the camera.
///
/// The render context is built on `device`, so a model switch replaces the
/// backend's model-dependent device objects together with the settings.
pub struct SceneView<D: ContextDevice = ()> {
    parts: RenderParts<(), D::Objects>,
    device: D,
    request: ResourceRequest,
    observer: Option<Arc<dyn ReleaseObserver>>,
    pub camera: OrbitCamera,
    fixed: Option<FixedCamera>,
    extent: f32,
    model_id: ModelId,
}

impl SceneView {
    pub fn new(
        model: &WorldModel,
        request: ResourceRequest,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Self {
        Self::on_device(model, request, (), observer)
    }
}

impl<D: ContextDevice> SceneView<D> {
    pub fn on_device(
        model: &WorldModel,
        request: ResourceRequest,
        device: D,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Self {
        let parts = RenderParts::allocate(model, &request, &device, observer.clone());
        Self {
            parts,
            device,
            request,
            observer,
            camera: OrbitCamera::framing(model.stat()),
            fixed: None,
            extent: model.stat().extent as f32,
            model_id: model.id(),
        }
    }

    /// Copy poses out of the state. Capacity overflow is a programming
    /// error in the scene setup and is fatal.
    pub fn sync(&mut self, model: &WorldModel, state: &WorldState, app: &AppState) {
        if self.model_id != model.id() {
            self.rebind(model);
        }
        let Some(scene) = self.parts.visual_scene.get_mut() else {
            return;
        };
        if let Err(e) = scene.update(model, state) {
            precondition_violation(&e.to_string());
        }
        self.fixed = app.camera.and_then(|i| scene.cameras().get(i)).map(|c| FixedCamera {
            pos: c.pos,
            rot: c.rot,
            fovy: c.fovy,
        });
    }

    pub fn rebind(&mut self, model: &WorldModel) {
        self.parts
            .rebuild(model, &self.request, &self.device, self.observer.clone());
        self.camera = OrbitCamera::framing(model.stat());
        self.fixed = None;
        self.extent = model.stat().extent as f32;
        self.model_id = model.id();
        tracing::debug!(model = model.name(), "scene view rebound");
    }

    pub fn scene(&self) -> Option<&VisualScene> {
        self.parts.visual_scene.get()
    }

    pub fn context(&self) -> Option<&RenderContext<D::Objects>> {
        self.parts.render_context.get()
    }

    /// Through the selected model camera when one was captured, else the free camera.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        match &self.fixed {
            Some(cam) => cam.view_projection(aspect, self.extent),
            None => self.camera.view_projection(aspect),
        }
    }

    pub fn uses_fixed_camera(&self) -> bool {
        self.fixed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::SceneSource;

    const XML: &str = r#"
        <mujoco><worldbody>
          <camera name="c" pos="0 -2 0" xyaxes="1 0 0 0 0 1"/>
          <geom size="0.5"/>
        </worldbody></mujoco>"#;

    fn world() -> (WorldModel, WorldState) {
        let model = SceneSource::xml(XML).compile().unwrap();
        let mut state = WorldState::new(&model);
        simrig_kernel::engine::forward(&model, &mut state);
        (model, state)
    }

    #[test]
    fn sync_fills_scene_and_selects_camera() {
        let (model, state) = world();
        let mut view = SceneView::new(&model, ResourceRequest::for_kind(ViewerKind::Egl), None);
        let mut app = AppState::default();
        view.sync(&model, &state, &app);
        assert_eq!(view.scene().unwrap().len(), 1);
        assert!(!view.uses_fixed_camera());

        app.camera = Some(0);
        view.sync(&model, &state, &app);
        assert!(view.uses_fixed_camera());

        // Out-of-range camera falls back to the free camera.
        app.camera = Some(3);
        view.sync(&model, &state, &app);
        assert!(!view.uses_fixed_camera());
    }

    #[test]
    fn sync_against_new_model_rebinds() {
        let (model, state) = world();
        let mut view = SceneView::new(&model, ResourceRequest::for_kind(ViewerKind::Egl), None);
        let (other, other_state) = world();
        view.sync(&other, &other_state, &AppState::default());
        assert_eq!(view.context().unwrap().model_id(), other.id());
        view.sync(&model, &state, &AppState::default());
        assert_eq!(view.context().unwrap().model_id(), model.id());
    }

    #[derive(Default)]
    struct Builds(std::sync::atomic::AtomicU32);

    impl ContextDevice for &Builds {
        type Objects = u32;

        fn build(&self, _ctx: &RenderContext) -> u32 {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1
        }
    }

    #[test]
    fn model_switch_rebuilds_device_objects() {
        let (model, state) = world();
        let builds = Builds::default();
        let mut view = SceneView::on_device(
            &model,
            ResourceRequest::for_kind(ViewerKind::Windowed),
            &builds,
            None,
        );
        assert_eq!(view.context().unwrap().device, 1);
        view.sync(&model, &state, &AppState::default());
        assert_eq!(view.context().unwrap().device, 1);

        let (other, other_state) = world();
        view.sync(&other, &other_state, &AppState::default());
        let ctx = view.context().unwrap();
        assert_eq!(ctx.device, 2);
        assert_eq!(ctx.model_id(), other.id());
    }

    #[test]
    fn remote_view_builds_no_device_objects() {
        let (model, _) = world();
        let builds = Builds::default();
        let view = SceneView::on_device(
            &model,
            ResourceRequest::for_kind(ViewerKind::Remote),
            &builds,
            None,
        );
        assert!(view.context().is_none());
        assert_eq!(builds.0.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn capacity_overflow_is_fatal() {
        let (model, state) = world();
        let request = ResourceRequest {
            scene_capacity: 0,
            ..ResourceRequest::for_kind(ViewerKind::Remote)
        };
        let mut view = SceneView::new(&model, request, None);
        view.sync(&model, &state, &AppState::default());
    }

    #[test]
    fn frame_buffer_pixel_lookup() {
        let fb = FrameBuffer {
            width: 2,
            height: 1,
            rgba: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        assert_eq!(fb.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(fb.pixel(2, 0), None);
    }

    #[test]
    fn closures_are_ui_layers() {
        let mut app = AppState::default();
        let mut toggle = |_: &egui::Context, app: &mut AppState| app.running = !app.running;
        let ctx = egui::Context::default();
        UiLayer::show(&mut toggle, &ctx, &mut app);
        assert!(!app.running);
    }
}
