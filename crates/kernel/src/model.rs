use glam::{DQuat, DVec3};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one compiled model. A [`WorldState`](crate::WorldState) records
/// the identity of the model it was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModelId(u64);

impl ModelId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Categories of named entities in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Body,
    Joint,
    Geom,
    Actuator,
    Sensor,
    Camera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JointKind {
    /// One rotational degree of freedom about `axis`.
    Hinge,
    /// One translational degree of freedom along `axis`.
    Slide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeomKind {
    Plane,
    Sphere,
    Capsule,
    Ellipsoid,
    Cylinder,
    Box,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ActuatorKind {
    /// Force equals the control value.
    Motor,
    /// Proportional servo on joint position.
    Position { kp: f64 },
    /// Proportional servo on joint velocity.
    Velocity { kv: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorKind {
    JointPos,
    JointVel,
    ActuatorFrc,
}

#[derive(Debug, Clone, Serialize)]
pub struct Body {
    pub name: Option<String>,
    /// Parent body index; the world body is its own parent.
    pub parent: usize,
    /// Frame offset in the parent frame.
    pub pos: DVec3,
    pub quat: DQuat,
    pub mass: f64,
    /// Center of mass in the body frame.
    pub ipos: DVec3,
    /// Isotropic rotational inertia about the center of mass.
    pub inertia: f64,
    /// Joints attached to this body, in declaration order.
    pub joints: Range<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Joint {
    pub name: Option<String>,
    pub kind: JointKind,
    pub body: usize,
    /// Anchor in the body frame.
    pub pos: DVec3,
    /// Unit axis in the body frame.
    pub axis: DVec3,
    pub damping: f64,
    pub stiffness: f64,
    pub armature: f64,
    pub range: Option<(f64, f64)>,
    /// Reference configuration: the body frame is defined at this value.
    pub qpos0: f64,
    pub springref: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Geom {
    pub name: Option<String>,
    pub kind: GeomKind,
    pub body: usize,
    pub pos: DVec3,
    pub quat: DQuat,
    /// Kind-specific half sizes (radius, half length, half extents).
    pub size: DVec3,
    pub rgba: [f32; 4],
    pub group: u8,
    pub mass: f64,
}

impl Geom {
    /// Radius of a sphere centred on the geom that encloses it.
    /// Planes report zero.
    pub fn bounding_radius(&self) -> f64 {
        let s = self.size;
        match self.kind {
            GeomKind::Plane => 0.0,
            GeomKind::Sphere => s.x,
            GeomKind::Capsule => s.x + s.y,
            GeomKind::Cylinder => (s.x * s.x + s.y * s.y).sqrt(),
            GeomKind::Ellipsoid => s.x.max(s.y).max(s.z),
            GeomKind::Box => s.length(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Actuator {
    pub name: Option<String>,
    pub kind: ActuatorKind,
    pub joint: usize,
    pub gear: f64,
    pub ctrlrange: Option<(f64, f64)>,
}

impl Actuator {
    pub fn clamp(&self, ctrl: f64) -> f64 {
        match self.ctrlrange {
            Some((lo, hi)) => ctrl.clamp(lo, hi),
            None => ctrl,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sensor {
    pub name: Option<String>,
    pub kind: SensorKind,
    /// Joint or actuator index, depending on `kind`.
    pub target: usize,
}

/// Fixed camera attached to a body. Looks along its local -Z with +Y up.
#[derive(Debug, Clone, Serialize)]
pub struct Camera {
    pub name: Option<String>,
    pub body: usize,
    pub pos: DVec3,
    pub quat: DQuat,
    /// Vertical field of view in degrees.
    pub fovy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Options {
    /// Native integrator step in seconds.
    pub timestep: f64,
    pub gravity: DVec3,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timestep: 0.002,
            gravity: DVec3::new(0.0, 0.0, -9.81),
        }
    }
}

/// Spatial statistics of the reference configuration, used to frame cameras.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelStat {
    pub center: DVec3,
    pub extent: f64,
}

impl Default for ModelStat {
    fn default() -> Self {
        Self {
            center: DVec3::ZERO,
            extent: 1.0,
        }
    }
}

/// Immutable description of the simulated world.
///
/// Body 0 is the world body. Bodies are stored so that every parent precedes
/// its children, and each body's joints are contiguous. There is one
/// generalized coordinate per joint, so `nq == nv == njnt`.
#[derive(Debug, Clone, Serialize)]
pub struct WorldModel {
    pub(crate) id: ModelId,
    pub(crate) name: String,
    pub(crate) options: Options,
    pub(crate) stat: ModelStat,
    pub(crate) bodies: Vec<Body>,
    pub(crate) joints: Vec<Joint>,
    pub(crate) geoms: Vec<Geom>,
    pub(crate) actuators: Vec<Actuator>,
    pub(crate) sensors: Vec<Sensor>,
    pub(crate) cameras: Vec<Camera>,
    /// Joints on the path from the root to each body, root first.
    pub(crate) body_chain: Vec<Vec<usize>>,
    #[serde(skip)]
    pub(crate) names: HashMap<ObjectKind, HashMap<String, usize>>,
}

impl WorldModel {
    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Native integrator step size.
    pub fn timestep(&self) -> f64 {
        self.options.timestep
    }

    pub fn stat(&self) -> &ModelStat {
        &self.stat
    }

    pub fn nq(&self) -> usize {
        self.joints.len()
    }

    pub fn nv(&self) -> usize {
        self.joints.len()
    }

    pub fn nu(&self) -> usize {
        self.actuators.len()
    }

    pub fn nbody(&self) -> usize {
        self.bodies.len()
    }

    pub fn ngeom(&self) -> usize {
        self.geoms.len()
    }

    pub fn nsensor(&self) -> usize {
        self.sensors.len()
    }

    pub fn ncam(&self) -> usize {
        self.cameras.len()
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn geoms(&self) -> &[Geom] {
        &self.geoms
    }

    pub fn actuators(&self) -> &[Actuator] {
        &self.actuators
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn body_chain(&self, body: usize) -> &[usize] {
        &self.body_chain[body]
    }

    /// Resolve a name to its stable index within `kind`.
    ///
    /// Returns `None` when no entity of that kind carries the name.
    pub fn name2id(&self, kind: ObjectKind, name: &str) -> Option<usize> {
        self.names.get(&kind).and_then(|m| m.get(name)).copied()
    }

    pub fn id2name(&self, kind: ObjectKind, id: usize) -> Option<&str> {
        let name = match kind {
            ObjectKind::Body => self.bodies.get(id)?.name.as_deref(),
            ObjectKind::Joint => self.joints.get(id)?.name.as_deref(),
            ObjectKind::Geom => self.geoms.get(id)?.name.as_deref(),
            ObjectKind::Actuator => self.actuators.get(id)?.name.as_deref(),
            ObjectKind::Sensor => self.sensors.get(id)?.name.as_deref(),
            ObjectKind::Camera => self.cameras.get(id)?.name.as_deref(),
        };
        name
    }

    /// Total mass of all bodies.
    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.mass).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SceneSource;

    const XML: &str = r#"
        <mujoco model="lookup">
          <worldbody>
            <body name="arm" pos="0 0 1">
              <joint name="shoulder" type="hinge" axis="0 1 0"/>
              <geom name="upper" type="capsule" fromto="0 0 0 0 0 -0.5" size="0.05"/>
              <camera name="eye" pos="0 -1 0"/>
            </body>
          </worldbody>
          <actuator><motor name="drive" joint="shoulder" gear="2"/></actuator>
          <sensor><jointpos name="angle" joint="shoulder"/></sensor>
        </mujoco>"#;

    #[test]
    fn name_resolution_per_kind() {
        let model = SceneSource::xml(XML).compile().unwrap();
        assert_eq!(model.name2id(ObjectKind::Body, "arm"), Some(1));
        assert_eq!(model.name2id(ObjectKind::Joint, "shoulder"), Some(0));
        assert_eq!(model.name2id(ObjectKind::Geom, "upper"), Some(0));
        assert_eq!(model.name2id(ObjectKind::Actuator, "drive"), Some(0));
        assert_eq!(model.name2id(ObjectKind::Sensor, "angle"), Some(0));
        assert_eq!(model.name2id(ObjectKind::Camera, "eye"), Some(0));
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let model = SceneSource::xml(XML).compile().unwrap();
        assert_eq!(model.name2id(ObjectKind::Joint, "elbow"), None);
        // Names are scoped per kind.
        assert_eq!(model.name2id(ObjectKind::Actuator, "shoulder"), None);
        assert_eq!(model.name2id(ObjectKind::Sensor, ""), None);
    }

    #[test]
    fn id2name_inverts_name2id() {
        let model = SceneSource::xml(XML).compile().unwrap();
        let id = model.name2id(ObjectKind::Joint, "shoulder").unwrap();
        assert_eq!(model.id2name(ObjectKind::Joint, id), Some("shoulder"));
        assert_eq!(model.id2name(ObjectKind::Joint, 99), None);
    }

    #[test]
    fn dimensions_and_chain() {
        let model = SceneSource::xml(XML).compile().unwrap();
        assert_eq!(model.nbody(), 2);
        assert_eq!(model.nq(), 1);
        assert_eq!(model.nu(), 1);
        assert_eq!(model.body_chain(1), &[0]);
        assert!(model.body_chain(0).is_empty());
        assert!(model.total_mass() > 0.0);
    }

    #[test]
    fn every_compile_gets_a_fresh_identity() {
        let a = SceneSource::xml(XML).compile().unwrap();
        let b = SceneSource::xml(XML).compile().unwrap();
        assert_ne!(a.id(), b.id());
    }
}
