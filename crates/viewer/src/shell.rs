use crate::viewer::Viewer;
use simrig_common::fatal::precondition_violation;
use simrig_common::{AppState, SimConfig};
use simrig_kernel::{Controller, LoadError, Passive, SceneSource, SimulationCore, source};
use simrig_render::UiLayer;

/// Why a shell's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The requested number of frames ran.
    Completed,
    /// The viewer asked to close.
    Closed,
}

/// One simulation, one viewer and the application toggles between them.
///
/// # Invariants
/// - The viewer drops before the simulation, so presentation resources go
///   before the model they were built from.
/// - A pending reset replaces the next step; a paused shell never steps.
pub struct ApplicationShell {
    viewer: Viewer,
    sim: SimulationCore,
    app: AppState,
    frame_duration: f64,
    frames: u64,
}

impl ApplicationShell {
    pub fn new(sim: SimulationCore, viewer: Viewer, frame_duration: f64) -> Self {
        if !sim.is_running() {
            precondition_violation("shell created around an idle simulation");
        }
        let app = AppState::default();
        Self {
            viewer,
            sim,
            app,
            frame_duration,
            frames: 0,
        }
    }

    /// Load `source` and build the viewer `config` asks for. The viewer may
    /// come up degraded; only a load failure is an error.
    pub fn from_config(source: &SceneSource, config: &SimConfig) -> Result<Self, LoadError> {
        let sim = SimulationCore::from_source(source, config.fixed_timestep)?;
        let (model, state) = sim.world();
        let viewer = Viewer::create_with(&config.viewer, model, state);
        let mut shell = Self::new(sim, viewer, config.frame_duration);
        shell.app.vsync = config.viewer.vsync;
        Ok(shell)
    }

    /// Advance the simulation by one frame, honouring pause and pending reset.
    pub fn step<C: Controller + ?Sized>(&mut self, controller: &mut C) {
        if self.app.dirty_reset {
            self.sim.reset();
            self.app.dirty_reset = false;
            tracing::info!("simulation reset");
            return;
        }
        if self.app.running {
            self.sim.step_with(self.frame_duration, controller);
        }
    }

    /// Prepare and render one frame. Returns `false` once the viewer asks to close.
    pub fn present(&mut self, ui: Option<&mut dyn UiLayer>) -> bool {
        let (model, state) = self.sim.world();
        let input = self.viewer.prepare(model, state, &self.app);
        if input.reset_requested {
            self.app.dirty_reset = true;
        }
        self.viewer.render(&mut self.app, ui);
        self.frames += 1;
        !input.close_requested
    }

    /// One step followed by one presented frame.
    pub fn frame<C: Controller + ?Sized>(
        &mut self,
        controller: &mut C,
        ui: Option<&mut dyn UiLayer>,
    ) -> bool {
        self.step(controller);
        self.present(ui)
    }

    /// Alternate stepping and presenting on this thread for at most `frames`
    /// frames, or until the viewer closes when `frames` is `None`.
    pub fn run<C: Controller + ?Sized>(
        &mut self,
        frames: Option<u64>,
        controller: &mut C,
        mut ui: Option<&mut dyn UiLayer>,
    ) -> RunOutcome {
        let mut done = 0;
        while frames.is_none_or(|n| done < n) {
            if !self.frame(controller, ui.as_mut().map(|u| &mut **u as &mut dyn UiLayer)) {
                tracing::info!(frames = done + 1, "viewer closed");
                return RunOutcome::Closed;
            }
            done += 1;
        }
        RunOutcome::Completed
    }

    /// Passive-control [`run`](Self::run) without a UI.
    pub fn run_passive(&mut self, frames: Option<u64>) -> RunOutcome {
        self.run(frames, &mut Passive, None)
    }

    /// Swap in the scene from `source`, keeping the viewer's window and device.
    ///
    /// The new scene is loaded before anything is released; on failure the
    /// running scene is untouched.
    pub fn reload(&mut self, source: &SceneSource) -> Result<(), LoadError> {
        let world = source::load(source)?;
        let Some(model) = world.model.get() else {
            precondition_violation("reload produced a null model");
        };
        self.viewer.rebind(model);
        self.sim.attach(world);
        self.app.dirty_reset = false;
        self.app.camera = None;
        tracing::info!(model = self.sim.model().name(), "scene reloaded");
        Ok(())
    }

    pub fn app(&self) -> &AppState {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut AppState {
        &mut self.app
    }

    pub fn sim(&self) -> &SimulationCore {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut SimulationCore {
        &mut self.sim
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    /// Frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Viewer, &mut SimulationCore, &mut AppState) {
        (&mut self.viewer, &mut self.sim, &mut self.app)
    }
}
