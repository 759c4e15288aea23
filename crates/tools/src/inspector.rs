use serde::Serialize;
use simrig_kernel::{JointKind, ObjectKind, WorldModel, WorldState};
use std::fmt;

/// Model inspector for developer tooling.
///
/// Read-only queries for the CLI `info` command and the desktop panel.
pub struct ModelInspector;

impl ModelInspector {
    pub fn summary(model: &WorldModel) -> ModelSummary {
        ModelSummary {
            name: model.name().to_string(),
            timestep: model.timestep(),
            gravity: model.options().gravity.to_array(),
            // Body 0 is the world.
            bodies: model.nbody().saturating_sub(1),
            joints: model.nq(),
            geoms: model.ngeom(),
            actuators: model.nu(),
            sensors: model.nsensor(),
            cameras: model.ncam(),
            total_mass: model.total_mass(),
            extent: model.stat().extent,
        }
    }

    /// Every entity of `kind`, in index order.
    pub fn list(model: &WorldModel, kind: ObjectKind) -> Vec<EntityInfo> {
        let count = match kind {
            ObjectKind::Body => model.nbody(),
            ObjectKind::Joint => model.nq(),
            ObjectKind::Geom => model.ngeom(),
            ObjectKind::Actuator => model.nu(),
            ObjectKind::Sensor => model.nsensor(),
            ObjectKind::Camera => model.ncam(),
        };
        (0..count)
            .map(|index| EntityInfo {
                kind,
                index,
                name: model.id2name(kind, index).map(str::to_string),
            })
            .collect()
    }

    /// Position and velocity of every joint, with angles in degrees.
    pub fn joints(model: &WorldModel, state: &WorldState) -> Vec<JointReadout> {
        model
            .joints()
            .iter()
            .enumerate()
            .map(|(i, joint)| {
                let (pos, vel) = (state.qpos()[i], state.qvel()[i]);
                let (position, velocity) = match joint.kind {
                    JointKind::Hinge => (pos.to_degrees(), vel.to_degrees()),
                    JointKind::Slide => (pos, vel),
                };
                JointReadout {
                    name: joint.name.clone().unwrap_or_else(|| format!("joint{i}")),
                    kind: joint.kind,
                    position,
                    velocity,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub timestep: f64,
    pub gravity: [f64; 3],
    pub bodies: usize,
    pub joints: usize,
    pub geoms: usize,
    pub actuators: usize,
    pub sensors: usize,
    pub cameras: usize,
    pub total_mass: f64,
    pub extent: f64,
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model `{}`: timestep={} bodies={} joints={} geoms={} actuators={} sensors={} cameras={} mass={:.3}",
            self.name,
            self.timestep,
            self.bodies,
            self.joints,
            self.geoms,
            self.actuators,
            self.sensors,
            self.cameras,
            self.total_mass,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityInfo {
    pub kind: ObjectKind,
    pub index: usize,
    pub name: Option<String>,
}

impl fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [{}] {}",
            self.kind,
            self.index,
            self.name.as_deref().unwrap_or("<unnamed>")
        )
    }
}

/// One joint's coordinate in display units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointReadout {
    pub name: String,
    pub kind: JointKind,
    pub position: f64,
    pub velocity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::SceneSource;

    const XML: &str = r#"
        <mujoco model="arm">
          <worldbody>
            <body name="upper" pos="0 0 1">
              <joint name="shoulder" axis="0 1 0"/>
              <geom type="capsule" fromto="0 0 0 0 0 -0.5" size="0.05"/>
              <body name="lower" pos="0 0 -0.5">
                <joint type="slide" axis="0 0 1"/>
                <geom name="tip" size="0.05"/>
              </body>
            </body>
          </worldbody>
          <actuator><motor name="m" joint="shoulder"/></actuator>
        </mujoco>"#;

    fn model() -> WorldModel {
        SceneSource::xml(XML).compile().unwrap()
    }

    #[test]
    fn summary_counts_entities() {
        let summary = ModelInspector::summary(&model());
        assert_eq!(summary.name, "arm");
        assert_eq!(summary.bodies, 2);
        assert_eq!(summary.joints, 2);
        assert_eq!(summary.geoms, 2);
        assert_eq!(summary.actuators, 1);
        assert!(summary.total_mass > 0.0);
    }

    #[test]
    fn summary_display() {
        let s = ModelInspector::summary(&model()).to_string();
        assert!(s.contains("Model `arm`"));
        assert!(s.contains("joints=2"));
    }

    #[test]
    fn list_reports_names_and_gaps() {
        let model = model();
        let geoms = ModelInspector::list(&model, ObjectKind::Geom);
        assert_eq!(geoms.len(), 2);
        assert_eq!(geoms[0].name, None);
        assert_eq!(geoms[1].name.as_deref(), Some("tip"));
        assert!(geoms[0].to_string().contains("<unnamed>"));
    }

    #[test]
    fn joint_readout_uses_degrees_for_hinges() {
        let model = model();
        let mut state = WorldState::new(&model);
        state.qpos_mut()[0] = std::f64::consts::FRAC_PI_2;
        state.qpos_mut()[1] = 0.25;
        let joints = ModelInspector::joints(&model, &state);
        assert!((joints[0].position - 90.0).abs() < 1e-9);
        assert_eq!(joints[0].name, "shoulder");
        assert_eq!(joints[1].position, 0.25);
        assert_eq!(joints[1].name, "joint1");
    }

    #[test]
    fn summary_serializes() {
        let json = serde_json::to_value(ModelInspector::summary(&model())).unwrap();
        assert_eq!(json["actuators"], 1);
    }
}
