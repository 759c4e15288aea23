//! Forward dynamics and integration.
//!
//! Bodies are rigid with isotropic rotational inertia about their center of
//! mass. The generalized equation of motion is
//! `M(q) qacc = qfrc_passive + qfrc_actuator - qfrc_bias`, where the bias
//! collects gravity and velocity-product terms. Joint limits are enforced
//! by a critically damped penalty folded into the passive force. There is
//! no contact handling.
//!
//! Like MuJoCo, derived poses and sensors describe the configuration at the
//! start of the most recent step.

use crate::model::{ActuatorKind, JointKind, SensorKind, WorldModel};
use crate::state::WorldState;
use glam::{DMat3, DVec3};
use nalgebra::{DMatrix, DVector};

/// Time constant of the joint-limit penalty, in seconds.
const LIMIT_TIMECONST: f64 = 0.02;

/// Advance `state` by one native step with semi-implicit Euler.
pub fn step(model: &WorldModel, state: &mut WorldState) {
    forward(model, state);
    let h = model.timestep();
    for j in 0..model.nv() {
        state.qvel[j] += h * state.qacc[j];
        state.qpos[j] += h * state.qvel[j];
    }
    state.time += h;
    if !state.is_finite() {
        tracing::warn!(
            time = state.time,
            "simulation became unstable; restoring reference configuration"
        );
        restore_reference(model, state);
    }
}

/// Recompute every derived quantity from `qpos`, `qvel` and `ctrl`.
pub fn forward(model: &WorldModel, state: &mut WorldState) {
    kinematics(model, state);
    mass_matrix(model, state);
    bias_forces(model, state);
    passive_forces(model, state);
    actuation(model, state);
    solve_acceleration(model, state);
    sensors(model, state);
}

/// Return to the reference configuration at time zero with zero controls.
pub fn reset(model: &WorldModel, state: &mut WorldState) {
    restore_reference(model, state);
    state.time = 0.0;
    state.ctrl.fill(0.0);
    state.actuator_force.fill(0.0);
    state.sensordata.fill(0.0);
    forward(model, state);
}

fn restore_reference(model: &WorldModel, state: &mut WorldState) {
    for (q, joint) in state.qpos.iter_mut().zip(model.joints()) {
        *q = joint.qpos0;
    }
    state.qvel.fill(0.0);
    state.qacc.fill(0.0);
}

/// Potential and kinetic energy, using the inertia from the last forward pass.
pub fn energy(model: &WorldModel, state: &WorldState) -> (f64, f64) {
    let g = model.options().gravity;
    let mut potential: f64 = model
        .bodies()
        .iter()
        .enumerate()
        .map(|(b, body)| -body.mass * g.dot(state.xipos[b]))
        .sum();
    for (j, joint) in model.joints().iter().enumerate() {
        let d = state.qpos[j] - joint.springref;
        potential += 0.5 * joint.stiffness * d * d;
    }
    let nv = model.nv();
    let mut kinetic = 0.0;
    for r in 0..nv {
        for c in 0..nv {
            kinetic += 0.5 * state.qvel[r] * state.mass_matrix[r * nv + c] * state.qvel[c];
        }
    }
    (potential, kinetic)
}

pub(crate) fn kinematics(model: &WorldModel, state: &mut WorldState) {
    for (b, body) in model.bodies().iter().enumerate().skip(1) {
        let parent_pos = state.xpos[body.parent];
        let parent_rot = state.xquat[body.parent];
        let mut pos = parent_pos + parent_rot * body.pos;
        let mut rot = parent_rot * body.quat;

        for j in body.joints.clone() {
            let joint = &model.joints()[j];
            let anchor = pos + rot * joint.pos;
            let axis = rot * joint.axis;
            state.xanchor[j] = anchor;
            state.xaxis[j] = axis;
            let q = state.qpos[j] - joint.qpos0;
            match joint.kind {
                JointKind::Hinge => {
                    let r = glam::DQuat::from_axis_angle(axis, q);
                    pos = anchor + r * (pos - anchor);
                    rot = r * rot;
                }
                JointKind::Slide => pos += axis * q,
            }
        }

        let rot = rot.normalize();
        state.xpos[b] = pos;
        state.xquat[b] = rot;
        state.xipos[b] = pos + rot * body.ipos;
    }

    for (g, geom) in model.geoms().iter().enumerate() {
        let rot = state.xquat[geom.body];
        state.geom_xpos[g] = state.xpos[geom.body] + rot * geom.pos;
        state.geom_xmat[g] = DMat3::from_quat(rot * geom.quat);
    }
    for (c, cam) in model.cameras().iter().enumerate() {
        let rot = state.xquat[cam.body];
        state.cam_xpos[c] = state.xpos[cam.body] + rot * cam.pos;
        state.cam_xmat[c] = DMat3::from_quat(rot * cam.quat);
    }
}

/// Linear and angular Jacobian columns of `joint` evaluated at `point`.
fn jacobian_column(model: &WorldModel, state: &WorldState, joint: usize, point: DVec3) -> (DVec3, DVec3) {
    let axis = state.xaxis[joint];
    match model.joints()[joint].kind {
        JointKind::Hinge => (axis.cross(point - state.xanchor[joint]), axis),
        JointKind::Slide => (axis, DVec3::ZERO),
    }
}

fn body_jacobian(model: &WorldModel, state: &WorldState, body: usize) -> Vec<(DVec3, DVec3)> {
    let point = state.xipos[body];
    model
        .body_chain(body)
        .iter()
        .map(|&j| jacobian_column(model, state, j, point))
        .collect()
}

pub(crate) fn mass_matrix(model: &WorldModel, state: &mut WorldState) {
    let nv = model.nv();
    state.mass_matrix.fill(0.0);
    for (b, body) in model.bodies().iter().enumerate().skip(1) {
        if body.mass == 0.0 && body.inertia == 0.0 {
            continue;
        }
        let chain = model.body_chain(b);
        let cols = body_jacobian(model, state, b);
        for (r, &jr) in chain.iter().enumerate() {
            for (c, &jc) in chain.iter().enumerate() {
                state.mass_matrix[jr * nv + jc] +=
                    body.mass * cols[r].0.dot(cols[c].0) + body.inertia * cols[r].1.dot(cols[c].1);
            }
        }
    }
    for (j, joint) in model.joints().iter().enumerate() {
        state.mass_matrix[j * nv + j] += joint.armature;
    }
}

pub(crate) fn is_positive_definite(state: &WorldState) -> bool {
    let nv = state.qvel.len();
    nv == 0 || DMatrix::from_row_slice(nv, nv, &state.mass_matrix).cholesky().is_some()
}

/// Gravity and velocity-product forces, `Jᵀ m (J̇ qvel - g)` summed over bodies.
fn bias_forces(model: &WorldModel, state: &mut WorldState) {
    let gravity = model.options().gravity;
    state.qfrc_bias.fill(0.0);
    for (b, body) in model.bodies().iter().enumerate().skip(1) {
        let chain = model.body_chain(b);
        if chain.is_empty() || (body.mass == 0.0 && body.inertia == 0.0) {
            continue;
        }
        let cols = body_jacobian(model, state, b);
        let point = state.xipos[b];
        let point_vel: DVec3 = cols
            .iter()
            .zip(chain)
            .map(|(col, &j)| col.0 * state.qvel[j])
            .sum();

        // Angular velocity of the frame carrying each successive joint axis.
        let mut omega = DVec3::ZERO;
        let mut dv = DVec3::ZERO;
        let mut dw = DVec3::ZERO;
        for (k, &j) in chain.iter().enumerate() {
            let axis = state.xaxis[j];
            let anchor = state.xanchor[j];
            let anchor_vel: DVec3 = chain[..k]
                .iter()
                .map(|&i| jacobian_column(model, state, i, anchor).0 * state.qvel[i])
                .sum();
            let axis_rate = omega.cross(axis);
            let qd = state.qvel[j];
            match model.joints()[j].kind {
                JointKind::Hinge => {
                    dv += (axis_rate.cross(point - anchor) + axis.cross(point_vel - anchor_vel)) * qd;
                    dw += axis_rate * qd;
                    omega += axis * qd;
                }
                JointKind::Slide => dv += axis_rate * qd,
            }
        }

        for (col, &j) in cols.iter().zip(chain) {
            state.qfrc_bias[j] +=
                body.mass * col.0.dot(dv - gravity) + body.inertia * col.1.dot(dw);
        }
    }
}

fn passive_forces(model: &WorldModel, state: &mut WorldState) {
    let nv = model.nv();
    for (j, joint) in model.joints().iter().enumerate() {
        let q = state.qpos[j];
        let qd = state.qvel[j];
        let mut f = -joint.damping * qd - joint.stiffness * (q - joint.springref);
        if let Some((lo, hi)) = joint.range {
            let violation = if q < lo {
                lo - q
            } else if q > hi {
                hi - q
            } else {
                0.0
            };
            if violation != 0.0 {
                let m = state.mass_matrix[j * nv + j];
                let k = m / (LIMIT_TIMECONST * LIMIT_TIMECONST);
                let d = 2.0 * m / LIMIT_TIMECONST;
                f += k * violation - d * qd;
            }
        }
        state.qfrc_passive[j] = f;
    }
}

fn actuation(model: &WorldModel, state: &mut WorldState) {
    state.qfrc_actuator.fill(0.0);
    for (a, act) in model.actuators().iter().enumerate() {
        let ctrl = act.clamp(state.ctrl[a]);
        let force = match act.kind {
            ActuatorKind::Motor => ctrl,
            ActuatorKind::Position { kp } => kp * (ctrl - act.gear * state.qpos[act.joint]),
            ActuatorKind::Velocity { kv } => kv * (ctrl - act.gear * state.qvel[act.joint]),
        };
        state.actuator_force[a] = force;
        state.qfrc_actuator[act.joint] += act.gear * force;
    }
}

fn solve_acceleration(model: &WorldModel, state: &mut WorldState) {
    let nv = model.nv();
    if nv == 0 {
        return;
    }
    let rhs = DVector::from_iterator(
        nv,
        (0..nv).map(|j| state.qfrc_passive[j] + state.qfrc_actuator[j] - state.qfrc_bias[j]),
    );
    let inertia = DMatrix::from_row_slice(nv, nv, &state.mass_matrix);
    match inertia.cholesky() {
        Some(chol) => {
            let qacc = chol.solve(&rhs);
            state.qacc.copy_from_slice(qacc.as_slice());
        }
        None => {
            tracing::warn!(time = state.time, "joint-space inertia is not positive definite");
            state.qacc.fill(0.0);
        }
    }
}

fn sensors(model: &WorldModel, state: &mut WorldState) {
    for (s, sensor) in model.sensors().iter().enumerate() {
        state.sensordata[s] = match sensor.kind {
            SensorKind::JointPos => state.qpos[sensor.target],
            SensorKind::JointVel => state.qvel[sensor.target],
            SensorKind::ActuatorFrc => state.actuator_force[sensor.target],
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SceneSource;
    use std::f64::consts::PI;

    fn setup(xml: &str) -> (WorldModel, WorldState) {
        let model = SceneSource::xml(xml).compile().unwrap();
        let mut state = WorldState::new(&model);
        forward(&model, &mut state);
        (model, state)
    }

    const FALLING: &str = r#"
        <mujoco><worldbody><body>
          <joint type="slide" axis="0 0 1"/>
          <geom size="0.1" mass="1"/>
        </body></worldbody></mujoco>"#;

    #[test]
    fn slide_joint_falls_under_gravity() {
        let (model, mut state) = setup(FALLING);
        for _ in 0..500 {
            step(&model, &mut state);
        }
        assert!((state.time() - 1.0).abs() < 1e-9);
        // Semi-implicit Euler: -g h² n(n+1)/2.
        let expected = -9.81 * 0.002 * 0.002 * 500.0 * 501.0 / 2.0;
        assert!((state.qpos()[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn hinge_kinematics_rotate_child_geoms() {
        let (model, mut state) = setup(
            r#"<mujoco><compiler angle="radian"/><worldbody>
                 <body><joint axis="0 1 0"/><geom pos="0 0 -1" size="0.1"/></body>
               </worldbody></mujoco>"#,
        );
        state.qpos_mut()[0] = PI / 2.0;
        forward(&model, &mut state);
        // Rotating -Z by +90 degrees about +Y lands on -X.
        assert!((state.geom_position(0) - DVec3::new(-1.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn motor_force_respects_gear_and_ctrlrange() {
        let (model, mut state) = setup(
            r#"<mujoco><option gravity="0 0 0"/><worldbody><body>
                 <joint name="x" type="slide" axis="1 0 0"/>
                 <inertial pos="0 0 0" mass="1" diaginertia="1 1 1"/>
               </body></worldbody>
               <actuator><motor name="push" joint="x" gear="2" ctrlrange="-1 1"/></actuator>
               <sensor><actuatorfrc actuator="push"/></sensor>
               </mujoco>"#,
        );
        state.ctrl_mut()[0] = 0.5;
        forward(&model, &mut state);
        assert!((state.qacc()[0] - 1.0).abs() < 1e-12);
        state.ctrl_mut()[0] = 5.0;
        forward(&model, &mut state);
        assert!((state.qacc()[0] - 2.0).abs() < 1e-12);
        assert_eq!(state.sensordata()[0], 1.0);
    }

    #[test]
    fn position_servo_pulls_toward_target() {
        let (model, mut state) = setup(
            r#"<mujoco><option gravity="0 0 0"/><worldbody><body>
                 <joint name="x" type="slide" axis="1 0 0" damping="5"/>
                 <geom size="0.1" mass="1"/>
               </body></worldbody>
               <actuator><position joint="x" kp="50"/></actuator></mujoco>"#,
        );
        state.ctrl_mut()[0] = 0.3;
        for _ in 0..5000 {
            step(&model, &mut state);
        }
        assert!((state.qpos()[0] - 0.3).abs() < 1e-3);
    }

    #[test]
    fn small_oscillation_period_matches_point_pendulum() {
        let (model, mut state) = setup(
            r#"<mujoco><option timestep="0.0005"/><compiler angle="radian"/><worldbody>
                 <body><joint axis="0 1 0"/>
                   <inertial pos="0 0 -1" mass="1" diaginertia="1e-9 1e-9 1e-9"/>
                 </body>
               </worldbody></mujoco>"#,
        );
        state.qpos_mut()[0] = 0.05;
        let quarter = PI / 2.0 * (1.0 / 9.81f64).sqrt();
        let mut crossed = None;
        for _ in 0..4000 {
            step(&model, &mut state);
            if state.qpos()[0] <= 0.0 {
                crossed = Some(state.time());
                break;
            }
        }
        let t = crossed.expect("pendulum never crossed zero");
        assert!((t - quarter).abs() < 0.01, "crossed at {t}, expected {quarter}");
    }

    #[test]
    fn undamped_double_pendulum_conserves_energy() {
        let (model, mut state) = setup(
            r#"<mujoco><option timestep="0.0002"/><worldbody>
                 <body><joint axis="0 1 0"/>
                   <geom type="capsule" fromto="0 0 0 0 0 -0.5" size="0.04"/>
                   <body pos="0 0 -0.5"><joint axis="0 1 0"/>
                     <geom type="capsule" fromto="0 0 0 0 0 -0.5" size="0.04"/>
                   </body>
                 </body>
               </worldbody></mujoco>"#,
        );
        state.qpos_mut()[0] = 1.0;
        state.qpos_mut()[1] = -0.5;
        forward(&model, &mut state);
        let (p0, k0) = energy(&model, &state);
        let total0 = p0 + k0;
        let scale = model.total_mass() * 9.81 * 1.0;
        for _ in 0..5000 {
            step(&model, &mut state);
        }
        forward(&model, &mut state);
        let (p1, k1) = energy(&model, &state);
        assert!(k1 > 0.0);
        assert!(
            ((p1 + k1) - total0).abs() < 0.02 * scale,
            "energy drifted from {total0} to {}",
            p1 + k1
        );
    }

    #[test]
    fn joint_limit_holds_body() {
        let (model, mut state) = setup(
            r#"<mujoco><worldbody><body>
                 <joint type="slide" axis="0 0 1" range="-0.1 0.1"/>
                 <geom size="0.05" mass="1"/>
               </body></worldbody></mujoco>"#,
        );
        for _ in 0..2000 {
            step(&model, &mut state);
        }
        assert!(state.qpos()[0] > -0.15, "limit breached: {}", state.qpos()[0]);
    }

    #[test]
    fn reset_restores_reference_and_zeroes_time() {
        let (model, mut state) = setup(FALLING);
        for _ in 0..10 {
            step(&model, &mut state);
        }
        reset(&model, &mut state);
        assert_eq!(state.time(), 0.0);
        assert_eq!(state.qpos(), &[0.0]);
        assert_eq!(state.qvel(), &[0.0]);
    }

    #[test]
    fn mass_matrix_of_single_slide_is_mass_plus_armature() {
        let (_, state) = setup(
            r#"<mujoco><worldbody><body>
                 <joint type="slide" armature="0.5"/>
                 <geom size="0.1" mass="2"/>
               </body></worldbody></mujoco>"#,
        );
        assert!((state.mass_matrix(0, 0) - 2.5).abs() < 1e-12);
    }
}
