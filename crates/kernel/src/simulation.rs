use crate::engine;
use crate::error::LoadError;
use crate::model::WorldModel;
use crate::source::{self, LoadedWorld, SceneSource};
use crate::state::{ControlInput, WorldState};
use serde::Serialize;
use simrig_common::fatal::precondition_violation;
use simrig_common::ResourceHandle;

/// Loop slack, in native steps, so exact multiples of the step size do not
/// pick up an extra step from rounding.
const STEP_TOLERANCE: f64 = 1e-9;

/// Writes actuator controls before each integrator step.
pub trait Controller {
    fn control(&mut self, input: &ControlInput<'_>, ctrl: &mut [f64]);
}

impl<F> Controller for F
where
    F: FnMut(&ControlInput<'_>, &mut [f64]),
{
    fn control(&mut self, input: &ControlInput<'_>, ctrl: &mut [f64]) {
        self(input, ctrl)
    }
}

/// Controller that leaves the control vector untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passive;

impl Controller for Passive {
    fn control(&mut self, _input: &ControlInput<'_>, _ctrl: &mut [f64]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// No model attached.
    Idle,
    Running,
}

/// Bookkeeping across `step` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimulationCounters {
    /// Whole native steps taken since the last reset, in seconds.
    pub simulation_time: f64,
    pub steps_this_call: u64,
    pub total_calls: u64,
    pub total_steps: u64,
}

/// Fixed-timestep driver around one model and its paired state.
///
/// # Invariants
/// - The state was created from the attached model; checked on attach and
///   on every step.
/// - `simulation_time == total_steps * native step`, reset only by
///   [`reset`](Self::reset).
pub struct SimulationCore {
    // Declared before `model` so the state is released first.
    state: ResourceHandle<WorldState>,
    model: ResourceHandle<WorldModel>,
    fixed_timestep: f64,
    counters: SimulationCounters,
}

impl SimulationCore {
    /// An idle core. `fixed_timestep` replaces non-positive step durations.
    pub fn new(fixed_timestep: f64) -> Self {
        Self {
            state: ResourceHandle::null(),
            model: ResourceHandle::null(),
            fixed_timestep: sanitize_timestep(fixed_timestep),
            counters: SimulationCounters::default(),
        }
    }

    /// Load `source` and return a running core.
    pub fn from_source(source: &SceneSource, fixed_timestep: f64) -> Result<Self, LoadError> {
        let world = source::load(source)?;
        let mut core = Self::new(fixed_timestep);
        core.attach(world);
        Ok(core)
    }

    /// Take ownership of a loaded world. Any previous world is released
    /// (state first) and the counters start over.
    pub fn attach(&mut self, world: LoadedWorld) {
        let LoadedWorld { model, state } = world;
        let (Some(m), Some(s)) = (model.get(), state.get()) else {
            precondition_violation("attaching a null model or state handle");
        };
        if !s.is_paired_with(m) {
            precondition_violation("attaching a state that was not created from this model");
        }
        self.state.release();
        self.model.release();
        self.state = state;
        self.model = model;
        self.counters = SimulationCounters::default();
        tracing::debug!(model = self.model().name(), "simulation attached");
    }

    /// Give up the world and return to idle.
    pub fn detach(&mut self) -> LoadedWorld {
        self.counters = SimulationCounters::default();
        LoadedWorld {
            state: self.state.take(),
            model: self.model.take(),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.model.is_null() {
            Phase::Idle
        } else {
            Phase::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn fixed_timestep(&self) -> f64 {
        self.fixed_timestep
    }

    /// Advance by at least `duration` seconds of simulated time, in native
    /// steps. A non-positive or non-finite duration means one fixed
    /// timestep.
    pub fn step(&mut self, duration: f64) {
        self.step_with(duration, &mut Passive);
    }

    /// [`step`](Self::step), calling `controller` before every native step.
    pub fn step_with<C: Controller + ?Sized>(&mut self, duration: f64, controller: &mut C) {
        let duration = if duration > 0.0 && duration.is_finite() {
            duration
        } else {
            self.fixed_timestep
        };
        let (model, state) = self.parts_mut("step");
        let h = model.timestep();
        let mut steps: u64 = 0;
        while (steps as f64) * h < duration - STEP_TOLERANCE * h {
            let (input, ctrl) = state.control_split(model);
            controller.control(&input, ctrl);
            engine::step(model, state);
            steps += 1;
        }

        let counters = &mut self.counters;
        counters.steps_this_call = steps;
        counters.total_calls += 1;
        counters.total_steps += steps;
        counters.simulation_time = counters.total_steps as f64 * h;
    }

    /// Back to the reference configuration with all counters at zero.
    /// Does nothing on an idle core.
    pub fn reset(&mut self) {
        self.counters = SimulationCounters::default();
        if let (Some(model), Some(state)) = (self.model.get(), self.state.get_mut()) {
            engine::reset(model, state);
            tracing::debug!(model = model.name(), "simulation reset");
        }
    }

    /// Recompute derived quantities after writing `qpos` or `qvel` directly.
    pub fn forward(&mut self) {
        let (model, state) = self.parts_mut("forward");
        engine::forward(model, state);
    }

    pub fn model(&self) -> &WorldModel {
        self.parts("model access").0
    }

    pub fn state(&self) -> &WorldState {
        self.parts("state access").1
    }

    pub fn state_mut(&mut self) -> &mut WorldState {
        self.parts_mut("state access").1
    }

    /// Model and state together, for a viewer's `prepare`.
    pub fn world(&self) -> (&WorldModel, &WorldState) {
        self.parts("world access")
    }

    pub fn counters(&self) -> SimulationCounters {
        self.counters
    }

    pub fn simulation_time(&self) -> f64 {
        self.counters.simulation_time
    }

    pub fn steps_this_call(&self) -> u64 {
        self.counters.steps_this_call
    }

    pub fn total_calls(&self) -> u64 {
        self.counters.total_calls
    }

    pub fn total_steps(&self) -> u64 {
        self.counters.total_steps
    }

    fn parts(&self, op: &str) -> (&WorldModel, &WorldState) {
        match (self.model.get(), self.state.get()) {
            (Some(m), Some(s)) => (m, s),
            _ => precondition_violation(&format!("{op} on an idle simulation")),
        }
    }

    fn parts_mut(&mut self, op: &str) -> (&WorldModel, &mut WorldState) {
        let (Some(model), Some(state)) = (self.model.get(), self.state.get_mut()) else {
            precondition_violation(&format!("{op} on an idle simulation"));
        };
        if !state.is_paired_with(model) {
            precondition_violation(&format!("{op} with a state from a different model"));
        }
        (model, state)
    }
}

fn sanitize_timestep(h: f64) -> f64 {
    if h > 0.0 && h.is_finite() {
        h
    } else {
        tracing::warn!(requested = h, "invalid fixed timestep; using default");
        simrig_common::DEFAULT_FIXED_TIMESTEP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PENDULUM: &str = r#"
        <mujoco model="pendulum">
          <option timestep="0.01"/>
          <worldbody>
            <body pos="0 0 1">
              <joint name="hinge" axis="0 1 0" damping="0.01"/>
              <geom type="capsule" fromto="0 0 0 0 0 -0.5" size="0.03"/>
            </body>
          </worldbody>
          <actuator><motor name="torque" joint="hinge"/></actuator>
        </mujoco>"#;

    fn core() -> SimulationCore {
        let mut core = SimulationCore::from_source(&SceneSource::xml(PENDULUM), 0.002).unwrap();
        core.state_mut().qpos_mut()[0] = 0.4;
        core.forward();
        core
    }

    #[test]
    fn new_core_is_idle() {
        let core = SimulationCore::new(0.002);
        assert_eq!(core.phase(), Phase::Idle);
        assert_eq!(core.counters(), SimulationCounters::default());
    }

    #[test]
    fn step_takes_ceil_of_duration_over_native_step() {
        let mut core = core();
        core.step(0.035);
        assert_eq!(core.steps_this_call(), 4);
        core.step(0.03);
        assert_eq!(core.steps_this_call(), 3);
        assert_eq!(core.total_steps(), 7);
        assert_eq!(core.total_calls(), 2);
        assert!((core.simulation_time() - 0.07).abs() < 1e-12);
    }

    #[test]
    fn non_positive_duration_uses_fixed_timestep() {
        let mut a = SimulationCore::from_source(&SceneSource::xml(PENDULUM), 0.025).unwrap();
        let mut b = SimulationCore::from_source(&SceneSource::xml(PENDULUM), 0.025).unwrap();
        a.step(0.0);
        b.step(0.025);
        assert_eq!(a.steps_this_call(), b.steps_this_call());
        a.step(-1.0);
        assert_eq!(a.steps_this_call(), 3);
        assert_eq!(a.state().qpos(), b.state().qpos());
    }

    #[test]
    fn non_finite_duration_uses_fixed_timestep() {
        let mut core = SimulationCore::from_source(&SceneSource::xml(PENDULUM), 0.025).unwrap();
        core.step(f64::INFINITY);
        assert_eq!(core.steps_this_call(), 3);
        core.step(f64::NAN);
        assert_eq!(core.steps_this_call(), 3);
        assert_eq!(core.total_steps(), 6);
    }

    #[test]
    fn simulation_time_is_whole_native_steps() {
        let mut core = core();
        for _ in 0..10 {
            core.step(1.0 / 60.0);
            let h = core.model().timestep();
            assert_eq!(core.simulation_time(), core.total_steps() as f64 * h);
        }
    }

    #[test]
    fn controller_runs_before_every_step() {
        let mut core = core();
        let mut calls = Vec::new();
        let mut record = |input: &ControlInput<'_>, ctrl: &mut [f64]| {
            calls.push(input.time);
            ctrl[0] = 0.1;
        };
        core.step_with(0.05, &mut record);
        assert_eq!(calls.len(), 5);
        // First call sees the state before any integration.
        assert_eq!(calls[0], 0.0);
        assert_eq!(core.state().ctrl()[0], 0.1);
    }

    #[test]
    fn reset_reproduces_fresh_trajectory() {
        let mut fresh = core();
        let mut reused = core();
        for _ in 0..30 {
            reused.step(1.0 / 60.0);
        }
        reused.reset();
        assert_eq!(reused.counters(), SimulationCounters::default());
        reused.state_mut().qpos_mut()[0] = 0.4;
        reused.forward();

        for _ in 0..30 {
            fresh.step(1.0 / 60.0);
            reused.step(1.0 / 60.0);
        }
        assert_eq!(fresh.state().qpos(), reused.state().qpos());
        assert_eq!(fresh.state().qvel(), reused.state().qvel());
        assert_eq!(fresh.simulation_time(), reused.simulation_time());
    }

    #[test]
    fn reset_on_idle_core_is_harmless() {
        let mut core = SimulationCore::new(0.002);
        core.reset();
        assert_eq!(core.phase(), Phase::Idle);
    }

    #[test]
    #[should_panic(expected = "idle simulation")]
    fn stepping_idle_core_panics() {
        SimulationCore::new(0.002).step(0.01);
    }

    #[test]
    #[should_panic(expected = "not created from this model")]
    fn attaching_mismatched_pair_panics() {
        let a = source::load(&SceneSource::xml(PENDULUM)).unwrap();
        let b = source::load(&SceneSource::xml(PENDULUM)).unwrap();
        let LoadedWorld { state, model: _keep } = a;
        let LoadedWorld { model, state: _other } = b;
        SimulationCore::new(0.002).attach(LoadedWorld { state, model });
    }

    #[test]
    fn detach_returns_to_idle() {
        let mut core = core();
        core.step(0.1);
        let world = core.detach();
        assert!(!world.model.is_null());
        assert_eq!(core.phase(), Phase::Idle);
        assert_eq!(core.total_steps(), 0);
    }

    #[test]
    fn invalid_fixed_timestep_falls_back_to_default() {
        assert_eq!(
            SimulationCore::new(f64::NAN).fixed_timestep(),
            simrig_common::DEFAULT_FIXED_TIMESTEP
        );
    }
}
