//! MJCF subset compiler.
//!
//! Supported: `compiler` (angle, eulerseq, autolimits), `option` (timestep,
//! gravity), `worldbody`/`body` trees with hinge and slide joints, primitive
//! geoms, `inertial`, fixed cameras, `motor`/`position`/`velocity` actuators
//! and `jointpos`/`jointvel`/`actuatorfrc` sensors. Visual-only sections are
//! skipped; anything that changes dynamics and is not supported is an error.

use crate::engine;
use crate::error::CompileError;
use crate::model::{
    Actuator, ActuatorKind, Body, Camera, Geom, GeomKind, Joint, JointKind, ModelId, ModelStat,
    ObjectKind, Options, Sensor, SensorKind, WorldModel,
};
use crate::state::WorldState;
use glam::{DMat3, DQuat, DVec3};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Smallest mass or inertia accepted for a body that can move.
const MIN_VAL: f64 = 1e-15;

const DEFAULT_DENSITY: f64 = 1000.0;
const DEFAULT_RGBA: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Top-level sections that carry nothing this compiler models.
const SKIPPED_SECTIONS: &[&str] = &[
    "asset", "visual", "statistic", "size", "default", "contact", "keyframe", "custom",
    "extension",
];

pub(crate) fn compile(text: &str) -> Result<WorldModel, CompileError> {
    let doc = Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != "mujoco" {
        return Err(err_at(root, "root element must be <mujoco>"));
    }

    let mut builder = Builder::new(root.attribute("model").unwrap_or("unnamed"));
    for el in elements(root).filter(|n| n.has_tag_name("compiler")) {
        builder.compiler(el)?;
    }
    for el in elements(root) {
        match el.tag_name().name() {
            "compiler" | "actuator" | "sensor" => {}
            "option" => builder.option(el)?,
            "worldbody" => builder.worldbody(el)?,
            "include" => return Err(err_at(el, "<include> is not supported")),
            "equality" | "tendon" => {
                return Err(err_at(el, "constraints and tendons are not supported"));
            }
            name if SKIPPED_SECTIONS.contains(&name) => {
                tracing::debug!(section = name, "skipping MJCF section");
            }
            name => tracing::warn!(section = name, "unknown MJCF section ignored"),
        }
    }
    // Actuators and sensors refer to joints by name, so they compile after
    // every worldbody regardless of document order.
    for el in elements(root).filter(|n| n.has_tag_name("actuator")) {
        builder.actuators(el)?;
    }
    for el in elements(root).filter(|n| n.has_tag_name("sensor")) {
        builder.sensors(el)?;
    }
    builder.finish()
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn err_at(node: Node, msg: impl std::fmt::Display) -> CompileError {
    let pos = node.document().text_pos_at(node.range().start);
    CompileError(format!(
        "line {}, column {}: <{}>: {msg}",
        pos.row,
        pos.col,
        node.tag_name().name()
    ))
}

fn floats(node: Node, attr: &str) -> Result<Option<Vec<f64>>, CompileError> {
    let Some(raw) = node.attribute(attr) else {
        return Ok(None);
    };
    raw.split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| err_at(node, format!("attribute `{attr}`: `{t}` is not a number")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn fixed<const N: usize>(node: Node, attr: &str) -> Result<Option<[f64; N]>, CompileError> {
    match floats(node, attr)? {
        None => Ok(None),
        Some(v) => <[f64; N]>::try_from(v.as_slice()).map(Some).map_err(|_| {
            err_at(
                node,
                format!("attribute `{attr}` needs {N} numbers, got {}", v.len()),
            )
        }),
    }
}

fn float(node: Node, attr: &str) -> Result<Option<f64>, CompileError> {
    Ok(fixed::<1>(node, attr)?.map(|[v]| v))
}

fn vec3(node: Node, attr: &str) -> Result<Option<DVec3>, CompileError> {
    Ok(fixed::<3>(node, attr)?.map(DVec3::from_array))
}

fn non_negative(node: Node, attr: &str) -> Result<f64, CompileError> {
    let v = float(node, attr)?.unwrap_or(0.0);
    if v < 0.0 {
        return Err(err_at(node, format!("`{attr}` must be non-negative")));
    }
    Ok(v)
}

/// Tri-state `limited`-style flag: `Some(true)`, `Some(false)` or `None` for auto.
fn tristate(node: Node, attr: &str) -> Result<Option<bool>, CompileError> {
    match node.attribute(attr) {
        None | Some("auto") => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(err_at(node, format!("`{attr}`: expected true/false/auto, got `{other}`"))),
    }
}

fn volume(kind: GeomKind, s: DVec3) -> f64 {
    match kind {
        GeomKind::Plane => 0.0,
        GeomKind::Sphere => 4.0 / 3.0 * PI * s.x.powi(3),
        GeomKind::Capsule => PI * s.x * s.x * 2.0 * s.y + 4.0 / 3.0 * PI * s.x.powi(3),
        GeomKind::Cylinder => PI * s.x * s.x * 2.0 * s.y,
        GeomKind::Ellipsoid => 4.0 / 3.0 * PI * s.x * s.y * s.z,
        GeomKind::Box => 8.0 * s.x * s.y * s.z,
    }
}

/// Mean of the principal moments about the geom centre.
fn isotropic_inertia(kind: GeomKind, mass: f64, s: DVec3) -> f64 {
    match kind {
        GeomKind::Plane => 0.0,
        GeomKind::Sphere => 0.4 * mass * s.x * s.x,
        GeomKind::Capsule | GeomKind::Cylinder => {
            let half = if kind == GeomKind::Capsule { s.y + s.x } else { s.y };
            let axial = 0.5 * mass * s.x * s.x;
            let transverse = mass * (3.0 * s.x * s.x + 4.0 * half * half) / 12.0;
            (axial + 2.0 * transverse) / 3.0
        }
        GeomKind::Ellipsoid => 2.0 * mass * s.length_squared() / 15.0,
        GeomKind::Box => 2.0 * mass * s.length_squared() / 9.0,
    }
}

struct Builder {
    name: String,
    angle_degrees: bool,
    eulerseq: Vec<char>,
    autolimits: bool,
    options: Options,
    bodies: Vec<Body>,
    joints: Vec<Joint>,
    geoms: Vec<Geom>,
    actuators: Vec<Actuator>,
    sensors: Vec<Sensor>,
    cameras: Vec<Camera>,
    body_chain: Vec<Vec<usize>>,
    names: HashMap<ObjectKind, HashMap<String, usize>>,
}

impl Builder {
    fn new(name: &str) -> Self {
        let world = Body {
            name: Some("world".to_string()),
            parent: 0,
            pos: DVec3::ZERO,
            quat: DQuat::IDENTITY,
            mass: 0.0,
            ipos: DVec3::ZERO,
            inertia: 0.0,
            joints: 0..0,
        };
        let mut names: HashMap<ObjectKind, HashMap<String, usize>> = HashMap::new();
        names
            .entry(ObjectKind::Body)
            .or_default()
            .insert("world".to_string(), 0);
        Self {
            name: name.to_string(),
            angle_degrees: true,
            eulerseq: vec!['x', 'y', 'z'],
            autolimits: true,
            options: Options::default(),
            bodies: vec![world],
            joints: Vec::new(),
            geoms: Vec::new(),
            actuators: Vec::new(),
            sensors: Vec::new(),
            cameras: Vec::new(),
            body_chain: vec![Vec::new()],
            names,
        }
    }

    fn register(
        &mut self,
        node: Node,
        kind: ObjectKind,
        id: usize,
    ) -> Result<Option<String>, CompileError> {
        let Some(name) = node.attribute("name") else {
            return Ok(None);
        };
        let table = self.names.entry(kind).or_default();
        if table.insert(name.to_string(), id).is_some() {
            return Err(err_at(node, format!("repeated {kind:?} name `{name}`")));
        }
        Ok(Some(name.to_string()))
    }

    fn angle(&self, v: f64) -> f64 {
        if self.angle_degrees { v.to_radians() } else { v }
    }

    fn compiler(&mut self, node: Node) -> Result<(), CompileError> {
        match node.attribute("angle") {
            None | Some("degree") => self.angle_degrees = true,
            Some("radian") => self.angle_degrees = false,
            Some(other) => return Err(err_at(node, format!("unknown angle unit `{other}`"))),
        }
        if let Some(seq) = node.attribute("eulerseq") {
            let chars: Vec<char> = seq.chars().collect();
            if chars.len() != 3 || !chars.iter().all(|c| "xyzXYZ".contains(*c)) {
                return Err(err_at(node, format!("invalid eulerseq `{seq}`")));
            }
            self.eulerseq = chars;
        }
        if let Some(auto) = tristate(node, "autolimits")? {
            self.autolimits = auto;
        }
        Ok(())
    }

    fn option(&mut self, node: Node) -> Result<(), CompileError> {
        if let Some(ts) = float(node, "timestep")? {
            if !(ts > 0.0 && ts.is_finite()) {
                return Err(err_at(node, "timestep must be positive"));
            }
            self.options.timestep = ts;
        }
        if let Some(g) = vec3(node, "gravity")? {
            self.options.gravity = g;
        }
        Ok(())
    }

    fn orientation(&self, node: Node) -> Result<DQuat, CompileError> {
        if let Some([w, x, y, z]) = fixed::<4>(node, "quat")? {
            let q = DQuat::from_xyzw(x, y, z, w);
            if q.length() < MIN_VAL {
                return Err(err_at(node, "zero quaternion"));
            }
            return Ok(q.normalize());
        }
        if let Some([x, y, z, a]) = fixed::<4>(node, "axisangle")? {
            let axis = DVec3::new(x, y, z);
            if axis.length() < MIN_VAL {
                return Err(err_at(node, "zero rotation axis"));
            }
            return Ok(DQuat::from_axis_angle(axis.normalize(), self.angle(a)));
        }
        if let Some(angles) = fixed::<3>(node, "euler")? {
            let mut q = DQuat::IDENTITY;
            for (c, a) in self.eulerseq.iter().zip(angles) {
                let axis = match c.to_ascii_lowercase() {
                    'x' => DVec3::X,
                    'y' => DVec3::Y,
                    _ => DVec3::Z,
                };
                let r = DQuat::from_axis_angle(axis, self.angle(a));
                // Lower case rotates about the moving frame, upper case about the fixed one.
                q = if c.is_ascii_lowercase() { q * r } else { r * q };
            }
            return Ok(q.normalize());
        }
        if let Some(z) = vec3(node, "zaxis")? {
            if z.length() < MIN_VAL {
                return Err(err_at(node, "zero zaxis"));
            }
            return Ok(DQuat::from_rotation_arc(DVec3::Z, z.normalize()));
        }
        if let Some(v) = fixed::<6>(node, "xyaxes")? {
            let x = DVec3::new(v[0], v[1], v[2]).normalize_or_zero();
            let y = DVec3::new(v[3], v[4], v[5]);
            let y = (y - x * x.dot(y)).normalize_or_zero();
            let z = x.cross(y);
            if z.length() < 0.5 {
                return Err(err_at(node, "degenerate xyaxes"));
            }
            return Ok(DQuat::from_mat3(&DMat3::from_cols(x, y, z)).normalize());
        }
        Ok(DQuat::IDENTITY)
    }

    fn worldbody(&mut self, node: Node) -> Result<(), CompileError> {
        for child in elements(node) {
            match child.tag_name().name() {
                "body" => self.body(child, 0)?,
                "geom" => self.geom(child, 0).map(drop)?,
                "camera" => self.camera(child, 0)?,
                "joint" | "freejoint" => {
                    return Err(err_at(child, "the world body cannot have joints"));
                }
                "site" | "light" => {}
                other => tracing::warn!(element = other, "unknown worldbody element ignored"),
            }
        }
        Ok(())
    }

    fn body(&mut self, node: Node, parent: usize) -> Result<(), CompileError> {
        let id = self.bodies.len();
        let name = self.register(node, ObjectKind::Body, id)?;
        let pos = vec3(node, "pos")?.unwrap_or(DVec3::ZERO);
        let quat = self.orientation(node)?;
        let joint_start = self.joints.len();
        self.bodies.push(Body {
            name,
            parent,
            pos,
            quat,
            mass: 0.0,
            ipos: DVec3::ZERO,
            inertia: 0.0,
            joints: joint_start..joint_start,
        });

        let mut inertial = None;
        let mut own_geoms = Vec::new();
        for child in elements(node) {
            match child.tag_name().name() {
                "joint" => self.joint(child, id)?,
                "freejoint" => return Err(err_at(child, "free joints are not supported")),
                "geom" => own_geoms.push(self.geom(child, id)?),
                "inertial" => inertial = Some(self.inertial(child)?),
                "camera" => self.camera(child, id)?,
                "body" | "site" | "light" => {}
                other => tracing::warn!(element = other, "unknown body element ignored"),
            }
        }

        let joints = joint_start..self.joints.len();
        let mut chain = self.body_chain[parent].clone();
        chain.extend(joints.clone());
        self.body_chain.push(chain);

        let (mass, ipos, inertia) = match inertial {
            Some(props) => props,
            None => self.geom_mass_properties(&own_geoms),
        };
        if !joints.is_empty() && (mass < MIN_VAL) {
            return Err(err_at(node, "a body with joints must have positive mass"));
        }
        let body = &mut self.bodies[id];
        body.joints = joints;
        body.mass = mass;
        body.ipos = ipos;
        body.inertia = inertia;

        for child in elements(node).filter(|n| n.has_tag_name("body")) {
            self.body(child, id)?;
        }
        Ok(())
    }

    fn geom_mass_properties(&self, geoms: &[usize]) -> (f64, DVec3, f64) {
        let mass: f64 = geoms.iter().map(|&g| self.geoms[g].mass).sum();
        if mass < MIN_VAL {
            return (0.0, DVec3::ZERO, 0.0);
        }
        let com = geoms
            .iter()
            .map(|&g| self.geoms[g].pos * self.geoms[g].mass)
            .sum::<DVec3>()
            / mass;
        // Parallel axis theorem averaged over three axes: 2/3 of the squared offset.
        let inertia = geoms
            .iter()
            .map(|&g| {
                let geom = &self.geoms[g];
                isotropic_inertia(geom.kind, geom.mass, geom.size)
                    + geom.mass * (geom.pos - com).length_squared() * 2.0 / 3.0
            })
            .sum();
        (mass, com, inertia)
    }

    fn inertial(&self, node: Node) -> Result<(f64, DVec3, f64), CompileError> {
        let pos = vec3(node, "pos")?.ok_or_else(|| err_at(node, "`pos` is required"))?;
        let mass = float(node, "mass")?.ok_or_else(|| err_at(node, "`mass` is required"))?;
        if mass < 0.0 {
            return Err(err_at(node, "mass must be non-negative"));
        }
        let diag = if let Some(d) = vec3(node, "diaginertia")? {
            d
        } else if let Some(full) = fixed::<6>(node, "fullinertia")? {
            DVec3::new(full[0], full[1], full[2])
        } else {
            return Err(err_at(node, "`diaginertia` or `fullinertia` is required"));
        };
        Ok((mass, pos, diag.element_sum() / 3.0))
    }

    fn joint(&mut self, node: Node, body: usize) -> Result<(), CompileError> {
        let kind = match node.attribute("type").unwrap_or("hinge") {
            "hinge" => JointKind::Hinge,
            "slide" => JointKind::Slide,
            other => return Err(err_at(node, format!("joint type `{other}` is not supported"))),
        };
        let id = self.joints.len();
        let name = self.register(node, ObjectKind::Joint, id)?;
        let axis = vec3(node, "axis")?.unwrap_or(DVec3::Z);
        if axis.length() < MIN_VAL {
            return Err(err_at(node, "zero joint axis"));
        }
        let to_internal = |v: f64| match kind {
            JointKind::Hinge => self.angle(v),
            JointKind::Slide => v,
        };
        let declared = fixed::<2>(node, "range")?;
        let limited = match tristate(node, "limited")? {
            Some(flag) => flag,
            None => self.autolimits && declared.is_some(),
        };
        let range = match (limited, declared) {
            (false, _) => None,
            (true, None) => return Err(err_at(node, "limited joint needs a `range`")),
            (true, Some([lo, hi])) if lo > hi => {
                return Err(err_at(node, "range lower bound exceeds upper bound"));
            }
            (true, Some([lo, hi])) => Some((to_internal(lo), to_internal(hi))),
        };
        let joint = Joint {
            name,
            kind,
            body,
            pos: vec3(node, "pos")?.unwrap_or(DVec3::ZERO),
            axis: axis.normalize(),
            damping: non_negative(node, "damping")?,
            stiffness: non_negative(node, "stiffness")?,
            armature: non_negative(node, "armature")?,
            range,
            qpos0: to_internal(float(node, "ref")?.unwrap_or(0.0)),
            springref: to_internal(float(node, "springref")?.unwrap_or(0.0)),
        };
        self.joints.push(joint);
        Ok(())
    }

    fn geom(&mut self, node: Node, body: usize) -> Result<usize, CompileError> {
        let kind = match node.attribute("type").unwrap_or("sphere") {
            "plane" => GeomKind::Plane,
            "sphere" => GeomKind::Sphere,
            "capsule" => GeomKind::Capsule,
            "ellipsoid" => GeomKind::Ellipsoid,
            "cylinder" => GeomKind::Cylinder,
            "box" => GeomKind::Box,
            other => return Err(err_at(node, format!("geom type `{other}` is not supported"))),
        };
        let id = self.geoms.len();
        let name = self.register(node, ObjectKind::Geom, id)?;
        let raw = floats(node, "size")?.unwrap_or_default();
        let mut size = DVec3::ZERO;
        for (i, v) in raw.iter().take(3).enumerate() {
            size[i] = *v;
        }

        let mut pos = vec3(node, "pos")?.unwrap_or(DVec3::ZERO);
        let mut quat = self.orientation(node)?;
        if let Some(ft) = fixed::<6>(node, "fromto")? {
            if matches!(kind, GeomKind::Plane | GeomKind::Sphere) {
                return Err(err_at(node, "`fromto` needs a capsule, cylinder, box or ellipsoid"));
            }
            let a = DVec3::new(ft[0], ft[1], ft[2]);
            let b = DVec3::new(ft[3], ft[4], ft[5]);
            let dir = b - a;
            if dir.length() < MIN_VAL {
                return Err(err_at(node, "`fromto` endpoints coincide"));
            }
            pos = (a + b) * 0.5;
            quat = DQuat::from_rotation_arc(DVec3::Z, dir.normalize());
            match kind {
                GeomKind::Capsule | GeomKind::Cylinder => size.y = dir.length() * 0.5,
                _ => size.z = dir.length() * 0.5,
            }
        }

        let needed = match kind {
            GeomKind::Plane => 0,
            GeomKind::Sphere => 1,
            GeomKind::Capsule | GeomKind::Cylinder => 2,
            GeomKind::Ellipsoid | GeomKind::Box => 3,
        };
        if (0..needed).any(|i| !(size[i] > 0.0)) {
            return Err(err_at(node, format!("{kind:?} needs {needed} positive size values")));
        }

        let mass = match float(node, "mass")? {
            Some(m) if m < 0.0 => return Err(err_at(node, "mass must be non-negative")),
            Some(m) => m,
            None => {
                let density = float(node, "density")?.unwrap_or(DEFAULT_DENSITY);
                density * volume(kind, size)
            }
        };
        let rgba = match fixed::<4>(node, "rgba")? {
            Some(c) => c.map(|v| v as f32),
            None => DEFAULT_RGBA,
        };
        let group = match node.attribute("group") {
            None => 0,
            Some(g) => g
                .parse::<u8>()
                .map_err(|_| err_at(node, format!("invalid group `{g}`")))?,
        };
        self.geoms.push(Geom {
            name,
            kind,
            body,
            pos,
            quat,
            size,
            rgba,
            group,
            mass: if kind == GeomKind::Plane { 0.0 } else { mass },
        });
        Ok(id)
    }

    fn camera(&mut self, node: Node, body: usize) -> Result<(), CompileError> {
        let id = self.cameras.len();
        let name = self.register(node, ObjectKind::Camera, id)?;
        let fovy = float(node, "fovy")?.unwrap_or(45.0);
        if !(fovy > 0.0 && fovy < 180.0) {
            return Err(err_at(node, "fovy must be within (0, 180) degrees"));
        }
        self.cameras.push(Camera {
            name,
            body,
            pos: vec3(node, "pos")?.unwrap_or(DVec3::ZERO),
            quat: self.orientation(node)?,
            fovy,
        });
        Ok(())
    }

    fn lookup(&self, node: Node, attr: &str, kind: ObjectKind) -> Result<usize, CompileError> {
        let name = node
            .attribute(attr)
            .ok_or_else(|| err_at(node, format!("`{attr}` is required")))?;
        self.names
            .get(&kind)
            .and_then(|m| m.get(name))
            .copied()
            .ok_or_else(|| err_at(node, format!("unknown {attr} `{name}`")))
    }

    fn actuators(&mut self, section: Node) -> Result<(), CompileError> {
        for node in elements(section) {
            let kind = match node.tag_name().name() {
                "motor" => ActuatorKind::Motor,
                "position" => ActuatorKind::Position {
                    kp: float(node, "kp")?.unwrap_or(1.0),
                },
                "velocity" => ActuatorKind::Velocity {
                    kv: float(node, "kv")?.unwrap_or(1.0),
                },
                other => {
                    return Err(err_at(node, format!("actuator `{other}` is not supported")));
                }
            };
            let joint = self.lookup(node, "joint", ObjectKind::Joint)?;
            let id = self.actuators.len();
            let name = self.register(node, ObjectKind::Actuator, id)?;
            let gear = floats(node, "gear")?
                .and_then(|g| g.first().copied())
                .unwrap_or(1.0);
            let declared = fixed::<2>(node, "ctrlrange")?;
            let limited = match tristate(node, "ctrllimited")? {
                Some(flag) => flag,
                None => self.autolimits && declared.is_some(),
            };
            let ctrlrange = match (limited, declared) {
                (false, _) => None,
                (true, None) => return Err(err_at(node, "limited control needs a `ctrlrange`")),
                (true, Some([lo, hi])) if lo > hi => {
                    return Err(err_at(node, "ctrlrange lower bound exceeds upper bound"));
                }
                (true, Some([lo, hi])) => Some((lo, hi)),
            };
            self.actuators.push(Actuator {
                name,
                kind,
                joint,
                gear,
                ctrlrange,
            });
        }
        Ok(())
    }

    fn sensors(&mut self, section: Node) -> Result<(), CompileError> {
        for node in elements(section) {
            let (kind, target) = match node.tag_name().name() {
                "jointpos" => (SensorKind::JointPos, self.lookup(node, "joint", ObjectKind::Joint)?),
                "jointvel" => (SensorKind::JointVel, self.lookup(node, "joint", ObjectKind::Joint)?),
                "actuatorfrc" => (
                    SensorKind::ActuatorFrc,
                    self.lookup(node, "actuator", ObjectKind::Actuator)?,
                ),
                other => return Err(err_at(node, format!("sensor `{other}` is not supported"))),
            };
            let id = self.sensors.len();
            let name = self.register(node, ObjectKind::Sensor, id)?;
            self.sensors.push(Sensor { name, kind, target });
        }
        Ok(())
    }

    fn finish(self) -> Result<WorldModel, CompileError> {
        let mut model = WorldModel {
            id: ModelId::next(),
            name: self.name,
            options: self.options,
            stat: ModelStat::default(),
            bodies: self.bodies,
            joints: self.joints,
            geoms: self.geoms,
            actuators: self.actuators,
            sensors: self.sensors,
            cameras: self.cameras,
            body_chain: self.body_chain,
            names: self.names,
        };

        let mut state = WorldState::new(&model);
        engine::kinematics(&model, &mut state);
        engine::mass_matrix(&model, &mut state);
        if !engine::is_positive_definite(&state) {
            return Err(CompileError(
                "joint-space inertia is singular: every joint must move some mass or have armature"
                    .to_string(),
            ));
        }
        model.stat = statistics(&model, &state);
        Ok(model)
    }
}

fn statistics(model: &WorldModel, state: &WorldState) -> ModelStat {
    let solids: Vec<(DVec3, f64)> = model
        .geoms()
        .iter()
        .enumerate()
        .filter(|(_, g)| g.kind != GeomKind::Plane)
        .map(|(i, g)| (state.geom_position(i), g.bounding_radius()))
        .collect();
    if solids.is_empty() {
        return ModelStat::default();
    }
    let (lo, hi) = solids.iter().fold(
        (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
        |(lo, hi), (p, r)| (lo.min(*p - *r), hi.max(*p + *r)),
    );
    let center = (lo + hi) * 0.5;
    let extent = ((hi - lo).length() * 0.5).max(0.1);
    ModelStat { center, extent }
}
