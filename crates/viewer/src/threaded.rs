use crate::shell::ApplicationShell;
use parking_lot::Mutex;
use simrig_common::fatal::precondition_violation;
use simrig_kernel::{Controller, SimulationCore, SimulationCounters};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Counters reported by the render side every this many frames.
const REPORT_EVERY: u64 = 60;

/// Result of a threaded run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreadedRun {
    pub frames: u64,
    pub counters: SimulationCounters,
}

impl ApplicationShell {
    /// Step on a background thread while this thread prepares and renders.
    ///
    /// One lock guards every `step` against every `prepare`; `render` runs
    /// outside it. Both sides pace themselves to the frame duration. Runs for
    /// `frames` rendered frames or until the viewer closes, then joins the
    /// stepping thread and puts the simulation back.
    pub fn run_threaded<C>(&mut self, frames: u64, controller: C) -> ThreadedRun
    where
        C: Controller + Send + 'static,
    {
        let frame_duration = self.frame_duration();
        let period = Duration::from_secs_f64(frame_duration.max(0.0));
        let (viewer, sim, app) = self.parts_mut();
        let placeholder = SimulationCore::new(sim.fixed_timestep());
        let shared = Arc::new(Mutex::new(std::mem::replace(sim, placeholder)));
        let stop = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(!app.running));
        let reset = Arc::new(AtomicBool::new(false));

        let stepper = {
            let (shared, stop, paused, reset) =
                (shared.clone(), stop.clone(), paused.clone(), reset.clone());
            let mut controller = controller;
            thread::Builder::new()
                .name("simrig-step".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        let start = Instant::now();
                        {
                            let mut sim = shared.lock();
                            if reset.swap(false, Ordering::AcqRel) {
                                sim.reset();
                            } else if !paused.load(Ordering::Acquire) {
                                sim.step_with(frame_duration, &mut controller);
                            }
                        }
                        if let Some(rest) = period.checked_sub(start.elapsed()) {
                            thread::sleep(rest);
                        }
                    }
                })
        };
        let stepper = match stepper {
            Ok(handle) => handle,
            Err(e) => precondition_violation(&format!("cannot spawn stepping thread: {e}")),
        };

        let mut rendered = 0;
        while rendered < frames {
            let start = Instant::now();
            let input = {
                let sim = shared.lock();
                let (model, state) = sim.world();
                viewer.prepare(model, state, app)
            };
            viewer.render(app, None);
            rendered += 1;

            if input.reset_requested || std::mem::take(&mut app.dirty_reset) {
                reset.store(true, Ordering::Release);
            }
            paused.store(!app.running, Ordering::Release);
            if rendered % REPORT_EVERY == 0 {
                let counters = shared.lock().counters();
                tracing::info!(
                    frames = rendered,
                    time = counters.simulation_time,
                    steps = counters.total_steps,
                    calls = counters.total_calls,
                    "threaded run"
                );
            }
            if input.close_requested {
                break;
            }
            if let Some(rest) = period.checked_sub(start.elapsed()) {
                thread::sleep(rest);
            }
        }

        stop.store(true, Ordering::Release);
        if let Err(panic) = stepper.join() {
            std::panic::resume_unwind(panic);
        }
        let core = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(_) => precondition_violation("simulation still shared after the stepping thread joined"),
        };
        let counters = core.counters();
        *sim = core;
        ThreadedRun {
            frames: rendered,
            counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use simrig_common::SimConfig;
    use simrig_kernel::{Passive, SceneSource};

    use super::*;

    const XML: &str = r#"
        <mujoco>
          <option timestep="0.002"/>
          <worldbody>
            <body pos="0 0 1">
              <joint axis="0 1 0"/>
              <geom type="sphere" pos="0 0 -0.5" size="0.05"/>
            </body>
          </worldbody>
        </mujoco>"#;

    #[test]
    fn threaded_run_returns_the_simulation() {
        let config = SimConfig {
            frame_duration: 0.005,
            ..SimConfig::default()
        };
        let mut shell = ApplicationShell::from_config(&SceneSource::xml(XML), &config).unwrap();
        let run = shell.run_threaded(20, Passive);
        assert_eq!(run.frames, 20);
        assert!(shell.sim().is_running());
        assert_eq!(shell.sim().counters(), run.counters);
        assert_eq!(
            run.counters.simulation_time,
            run.counters.total_steps as f64 * 0.002
        );
        assert_eq!(shell.viewer().stats().renders, 20);
    }

    #[test]
    fn paused_threaded_run_never_steps() {
        let mut shell =
            ApplicationShell::from_config(&SceneSource::xml(XML), &SimConfig::default()).unwrap();
        shell.app_mut().running = false;
        let run = shell.run_threaded(5, Passive);
        assert_eq!(run.counters.total_steps, 0);
    }
}
