use serde::Serialize;
use simrig_common::fatal::precondition_violation;
use simrig_common::{AppState, ReleaseObserver, ViewerConfig, ViewerKind};
use simrig_kernel::{WorldModel, WorldState};
use simrig_render::{
    BackendError, DisabledBackend, FrameBuffer, InputSnapshot, RemoteBackend, UiLayer,
    ViewerBackend,
};
use simrig_render_wgpu::{OffscreenBackend, WindowedBackend};
use std::sync::Arc;

/// Whether the requested backend came up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ViewerStatus {
    Active,
    /// Construction failed; the viewer presents nothing.
    Degraded { reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewerStats {
    pub prepares: u64,
    pub renders: u64,
    pub gpu_submissions: u64,
}

enum Backend {
    Disabled(DisabledBackend),
    Windowed(Box<WindowedBackend>),
    Offscreen(Box<OffscreenBackend>),
    Remote(RemoteBackend),
}

impl Backend {
    fn get(&self) -> &dyn ViewerBackend {
        match self {
            Self::Disabled(b) => b,
            Self::Windowed(b) => &**b,
            Self::Offscreen(b) => &**b,
            Self::Remote(b) => b,
        }
    }

    fn get_mut(&mut self) -> &mut dyn ViewerBackend {
        match self {
            Self::Disabled(b) => b,
            Self::Windowed(b) => &mut **b,
            Self::Offscreen(b) => &mut **b,
            Self::Remote(b) => b,
        }
    }
}

/// One active presentation backend, chosen at construction.
///
/// The viewer holds no simulation state. It borrows the model and state for
/// the duration of [`prepare`](Self::prepare) and draws the copy taken there
/// during [`render`](Self::render).
pub struct Viewer {
    backend: Backend,
    kind: ViewerKind,
    status: ViewerStatus,
    stats: ViewerStats,
    prepared: bool,
}

impl Viewer {
    pub fn create(
        kind: ViewerKind,
        model: &WorldModel,
        state: &WorldState,
        width: u32,
        height: u32,
    ) -> Self {
        let config = ViewerConfig {
            width,
            height,
            ..ViewerConfig::with_kind(kind)
        };
        Self::create_with(&config, model, state)
    }

    pub fn create_with(config: &ViewerConfig, model: &WorldModel, state: &WorldState) -> Self {
        Self::create_observed(config, model, state, None)
    }

    /// [`create_with`](Self::create_with), reporting the release of every
    /// presentation resource to `observer`.
    pub fn create_observed(
        config: &ViewerConfig,
        model: &WorldModel,
        state: &WorldState,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Self {
        if !state.is_paired_with(model) {
            precondition_violation("viewer created with a state that was not created from this model");
        }
        let kind = config.kind;
        let (width, height) = (config.width, config.height);
        let built = match kind {
            ViewerKind::Disabled => Ok(Backend::Disabled(DisabledBackend::new(width, height))),
            ViewerKind::Windowed => WindowedBackend::new(model, config, observer)
                .map(|b| Backend::Windowed(Box::new(b))),
            ViewerKind::Egl | ViewerKind::OsMesa => {
                OffscreenBackend::new(kind, model, width, height, observer)
                    .map(|b| Backend::Offscreen(Box::new(b)))
            }
            ViewerKind::Remote => match config.remote_addr.as_deref() {
                Some(addr) => RemoteBackend::connect(addr, model, width, height, observer)
                    .map(Backend::Remote),
                None => Err(BackendError::unavailable(kind, "no remote address configured")),
            },
        };

        let (backend, status) = match built {
            Ok(backend) => {
                tracing::info!(kind = %kind, width, height, "viewer created");
                (backend, ViewerStatus::Active)
            }
            Err(e) => {
                tracing::warn!(kind = %kind, "viewer degraded: {e}");
                (
                    Backend::Disabled(DisabledBackend::new(width, height)),
                    ViewerStatus::Degraded {
                        reason: e.to_string(),
                    },
                )
            }
        };
        Self {
            backend,
            kind,
            status,
            stats: ViewerStats::default(),
            prepared: false,
        }
    }

    /// Copy what the next frame draws out of `model` and `state`, and poll input.
    pub fn prepare(&mut self, model: &WorldModel, state: &WorldState, app: &AppState) -> InputSnapshot {
        self.stats.prepares += 1;
        self.prepared = true;
        self.backend.get_mut().prepare(model, state, app)
    }

    /// Draw and present the last prepared frame. Without a preceding
    /// [`prepare`](Self::prepare) this does nothing.
    pub fn render(&mut self, app: &mut AppState, ui: Option<&mut dyn UiLayer>) {
        if !std::mem::take(&mut self.prepared) {
            tracing::trace!("render without prepare skipped");
            return;
        }
        self.stats.renders += 1;
        self.backend.get_mut().render(app, ui);
    }

    /// Kind requested at construction, even when degraded.
    pub fn kind(&self) -> ViewerKind {
        self.kind
    }

    /// Kind of the backend actually presenting.
    pub fn active_kind(&self) -> ViewerKind {
        self.backend.get().kind()
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, ViewerStatus::Degraded { .. })
    }

    pub fn width(&self) -> u32 {
        self.backend.get().viewport().0
    }

    pub fn height(&self) -> u32 {
        self.backend.get().viewport().1
    }

    pub fn stats(&self) -> ViewerStats {
        ViewerStats {
            gpu_submissions: self.backend.get().gpu_submissions(),
            ..self.stats
        }
    }

    /// Last offscreen frame, when the backend keeps one.
    pub fn frame(&self) -> Option<&FrameBuffer> {
        self.backend.get().frame()
    }

    /// Rebuild model-dependent resources for `model`, keeping the window and device.
    pub fn rebind(&mut self, model: &WorldModel) {
        self.prepared = false;
        self.backend.get_mut().rebind(model);
    }
}
