//! Simulation kernel: world model, scene loading, forward dynamics and the
//! fixed-timestep driver.
//!
//! # Invariants
//! - A [`WorldModel`] is immutable once compiled; each compile gets a fresh [`ModelId`].
//! - A [`WorldState`] is only ever stepped against the model it was created from.
//! - [`SimulationCore`] advances time in whole native steps and resets to zero
//!   only through [`SimulationCore::reset`].

pub mod engine;
pub mod error;
mod mjcf;
pub mod model;
pub mod simulation;
pub mod source;
pub mod state;

pub use error::{LoadError, SourceId};
pub use model::{
    Actuator, ActuatorKind, Body, Camera, Geom, GeomKind, Joint, JointKind, ModelId, ModelStat,
    ObjectKind, Options, Sensor, SensorKind, WorldModel,
};
pub use simulation::{Controller, Passive, Phase, SimulationCore, SimulationCounters};
pub use source::{LoadedWorld, SceneSource, load, load_observed};
pub use state::{ControlInput, WorldState};

#[cfg(test)]
mod tests {
    use super::*;

    const DOUBLE_PENDULUM: &str = include_str!("../../../scenes/double_pendulum.xml");
    const SIMPLE_PENDULUM: &str = include_str!("../../../scenes/simple_pendulum.xml");
    const CART_POLE: &str = include_str!("../../../scenes/cart_pole.xml");

    #[test]
    fn bundled_scenes_compile() {
        for xml in [DOUBLE_PENDULUM, SIMPLE_PENDULUM, CART_POLE] {
            let model = SceneSource::xml(xml).compile().unwrap();
            assert!(model.nq() > 0);
            assert!(model.ngeom() > 0);
        }
    }

    #[test]
    fn double_pendulum_sixty_hz_for_ten_seconds() {
        let mut core = SimulationCore::from_source(&SceneSource::xml(DOUBLE_PENDULUM), 0.002).unwrap();
        let shoulder = core.model().name2id(ObjectKind::Joint, "shoulder").unwrap();
        core.state_mut().qpos_mut()[shoulder] = 1.2;
        core.forward();

        let h = core.model().timestep();
        for _ in 0..600 {
            core.step(1.0 / 60.0);
            assert_eq!(core.steps_this_call(), 4);
            assert!(core.state().qpos().iter().all(|q| q.is_finite()));
        }
        assert_eq!(core.total_calls(), 600);
        assert!((core.simulation_time() - 10.0).abs() <= h);
    }

    #[test]
    fn sixty_hz_frames_overshoot_when_the_step_does_not_divide_them() {
        // 1/60 s over a 0.002 s step is 8.33 steps; every call rounds up to 9.
        let mut core = SimulationCore::from_source(&SceneSource::xml(CART_POLE), 0.002).unwrap();
        let h = core.model().timestep();
        for _ in 0..600 {
            core.step(1.0 / 60.0);
            assert_eq!(core.steps_this_call(), 9);
        }
        assert_eq!(core.total_steps(), 5400);
        assert!((core.simulation_time() - 5400.0 * h).abs() < 1e-9);
        assert!(core.simulation_time() > 10.0 + h);
    }

    #[test]
    fn cart_pole_controller_reads_sensors() {
        let mut core = SimulationCore::from_source(&SceneSource::xml(CART_POLE), 0.002).unwrap();
        let angle = core.model().name2id(ObjectKind::Sensor, "pole_angle").unwrap();
        let push = core.model().name2id(ObjectKind::Actuator, "push").unwrap();
        let mut seen = 0;
        let mut policy = |input: &ControlInput<'_>, ctrl: &mut [f64]| {
            seen += 1;
            ctrl[push] = (-2.0 * input.sensordata[angle]).clamp(-1.0, 1.0);
        };
        core.step_with(0.1, &mut policy);
        assert_eq!(seen, 50);
    }
}
