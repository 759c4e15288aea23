use crate::model::{ModelId, WorldModel};
use glam::{DMat3, DQuat, DVec3};

/// Mutable dynamic state of one [`WorldModel`].
///
/// Joint-space arrays are indexed by joint id. Derived poses (`xpos`,
/// `geom_xpos`, ...) are refreshed by the engine's forward pass and are
/// stale after a direct write to `qpos` until the next forward.
#[derive(Debug, Clone)]
pub struct WorldState {
    model_id: ModelId,
    pub(crate) time: f64,
    pub(crate) qpos: Vec<f64>,
    pub(crate) qvel: Vec<f64>,
    pub(crate) qacc: Vec<f64>,
    pub(crate) ctrl: Vec<f64>,
    pub(crate) actuator_force: Vec<f64>,
    pub(crate) qfrc_passive: Vec<f64>,
    pub(crate) qfrc_actuator: Vec<f64>,
    pub(crate) qfrc_bias: Vec<f64>,
    pub(crate) sensordata: Vec<f64>,
    pub(crate) xpos: Vec<DVec3>,
    pub(crate) xquat: Vec<DQuat>,
    pub(crate) xipos: Vec<DVec3>,
    pub(crate) xanchor: Vec<DVec3>,
    pub(crate) xaxis: Vec<DVec3>,
    pub(crate) geom_xpos: Vec<DVec3>,
    pub(crate) geom_xmat: Vec<DMat3>,
    pub(crate) cam_xpos: Vec<DVec3>,
    pub(crate) cam_xmat: Vec<DMat3>,
    /// Row-major `nv * nv` joint-space inertia.
    pub(crate) mass_matrix: Vec<f64>,
}

/// Read-only view handed to a controller alongside the control vector.
#[derive(Debug, Clone, Copy)]
pub struct ControlInput<'a> {
    pub model: &'a WorldModel,
    pub time: f64,
    pub qpos: &'a [f64],
    pub qvel: &'a [f64],
    pub sensordata: &'a [f64],
}

impl WorldState {
    /// Allocate a state for `model` at the reference configuration.
    ///
    /// Derived quantities are zero until the first forward pass.
    pub fn new(model: &WorldModel) -> Self {
        let nv = model.nv();
        let nbody = model.nbody();
        let ngeom = model.ngeom();
        let ncam = model.ncam();
        Self {
            model_id: model.id(),
            time: 0.0,
            qpos: model.joints().iter().map(|j| j.qpos0).collect(),
            qvel: vec![0.0; nv],
            qacc: vec![0.0; nv],
            ctrl: vec![0.0; model.nu()],
            actuator_force: vec![0.0; model.nu()],
            qfrc_passive: vec![0.0; nv],
            qfrc_actuator: vec![0.0; nv],
            qfrc_bias: vec![0.0; nv],
            sensordata: vec![0.0; model.nsensor()],
            xpos: vec![DVec3::ZERO; nbody],
            xquat: vec![DQuat::IDENTITY; nbody],
            xipos: vec![DVec3::ZERO; nbody],
            xanchor: vec![DVec3::ZERO; nv],
            xaxis: vec![DVec3::ZERO; nv],
            geom_xpos: vec![DVec3::ZERO; ngeom],
            geom_xmat: vec![DMat3::IDENTITY; ngeom],
            cam_xpos: vec![DVec3::ZERO; ncam],
            cam_xmat: vec![DMat3::IDENTITY; ncam],
            mass_matrix: vec![0.0; nv * nv],
        }
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn is_paired_with(&self, model: &WorldModel) -> bool {
        self.model_id == model.id()
    }

    /// Simulated time in seconds, advanced by the integrator.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn qpos(&self) -> &[f64] {
        &self.qpos
    }

    pub fn qpos_mut(&mut self) -> &mut [f64] {
        &mut self.qpos
    }

    pub fn qvel(&self) -> &[f64] {
        &self.qvel
    }

    pub fn qvel_mut(&mut self) -> &mut [f64] {
        &mut self.qvel
    }

    pub fn qacc(&self) -> &[f64] {
        &self.qacc
    }

    pub fn ctrl(&self) -> &[f64] {
        &self.ctrl
    }

    pub fn ctrl_mut(&mut self) -> &mut [f64] {
        &mut self.ctrl
    }

    pub fn actuator_force(&self) -> &[f64] {
        &self.actuator_force
    }

    pub fn sensordata(&self) -> &[f64] {
        &self.sensordata
    }

    /// Joint-space inertia entry `(row, col)` from the last forward pass.
    pub fn mass_matrix(&self, row: usize, col: usize) -> f64 {
        let nv = self.qvel.len();
        self.mass_matrix[row * nv + col]
    }

    pub fn body_position(&self, body: usize) -> DVec3 {
        self.xpos[body]
    }

    pub fn body_orientation(&self, body: usize) -> DQuat {
        self.xquat[body]
    }

    pub fn body_com(&self, body: usize) -> DVec3 {
        self.xipos[body]
    }

    pub fn geom_position(&self, geom: usize) -> DVec3 {
        self.geom_xpos[geom]
    }

    pub fn geom_rotation(&self, geom: usize) -> DMat3 {
        self.geom_xmat[geom]
    }

    pub fn camera_position(&self, cam: usize) -> DVec3 {
        self.cam_xpos[cam]
    }

    pub fn camera_rotation(&self, cam: usize) -> DMat3 {
        self.cam_xmat[cam]
    }

    /// Split into a read-only view for a controller and the writable
    /// control vector.
    pub fn control_split<'a>(
        &'a mut self,
        model: &'a WorldModel,
    ) -> (ControlInput<'a>, &'a mut [f64]) {
        let input = ControlInput {
            model,
            time: self.time,
            qpos: &self.qpos,
            qvel: &self.qvel,
            sensordata: &self.sensordata,
        };
        (input, &mut self.ctrl)
    }

    /// True when every generalized coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.qpos
            .iter()
            .chain(&self.qvel)
            .chain(&self.qacc)
            .all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SceneSource;

    const XML: &str = r#"
        <mujoco>
          <worldbody>
            <body name="a">
              <joint name="j" type="slide" axis="1 0 0" ref="0.25"/>
              <geom type="sphere" size="0.1"/>
            </body>
          </worldbody>
          <actuator><motor joint="j"/></actuator>
        </mujoco>"#;

    #[test]
    fn new_state_matches_model_dimensions() {
        let model = SceneSource::xml(XML).compile().unwrap();
        let state = WorldState::new(&model);
        assert_eq!(state.qpos().len(), model.nq());
        assert_eq!(state.ctrl().len(), model.nu());
        assert_eq!(state.qpos()[0], 0.25);
        assert_eq!(state.time(), 0.0);
        assert!(state.is_paired_with(&model));
    }

    #[test]
    fn state_from_other_model_is_not_paired() {
        let a = SceneSource::xml(XML).compile().unwrap();
        let b = SceneSource::xml(XML).compile().unwrap();
        let state = WorldState::new(&a);
        assert!(!state.is_paired_with(&b));
    }

    #[test]
    fn control_split_exposes_writable_ctrl() {
        let model = SceneSource::xml(XML).compile().unwrap();
        let mut state = WorldState::new(&model);
        let (input, ctrl) = state.control_split(&model);
        assert_eq!(input.qpos.len(), 1);
        ctrl[0] = 3.0;
        assert_eq!(state.ctrl()[0], 3.0);
    }
}
