use glam::{Mat3, Vec3};
use serde::Serialize;
use simrig_kernel::{GeomKind, ModelId, WorldModel, WorldState};

/// Geom groups drawn by default: 0, 1 and 2.
pub const DEFAULT_VISIBLE_GROUPS: u8 = 0b0000_0111;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SceneError {
    #[error("visual scene capacity {capacity} exceeded: {required} geoms")]
    CapacityExceeded { capacity: usize, required: usize },
}

/// One drawable geom, in single precision for the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisualGeom {
    pub geom_id: usize,
    pub body_id: usize,
    pub kind: GeomKind,
    pub pos: Vec3,
    pub mat: Mat3,
    pub size: Vec3,
    pub rgba: [f32; 4],
}

/// Pose of a model camera at the last update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub pos: Vec3,
    pub rot: Mat3,
    pub fovy: f32,
}

/// Bounded list of drawables regenerated every frame from model and state.
///
/// The buffer is sized once; an update that would need more room fails
/// instead of growing.
#[derive(Debug, Clone)]
pub struct VisualScene {
    geoms: Vec<VisualGeom>,
    cameras: Vec<CameraPose>,
    capacity: usize,
    visible_groups: u8,
    model_id: Option<ModelId>,
    time: f64,
}

impl VisualScene {
    pub fn new(capacity: usize) -> Self {
        Self {
            geoms: Vec::with_capacity(capacity),
            cameras: Vec::new(),
            capacity,
            visible_groups: DEFAULT_VISIBLE_GROUPS,
            model_id: None,
            time: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.geoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geoms.is_empty()
    }

    pub fn geoms(&self) -> &[VisualGeom] {
        &self.geoms
    }

    pub fn cameras(&self) -> &[CameraPose] {
        &self.cameras
    }

    /// Model the scene was last built from.
    pub fn model_id(&self) -> Option<ModelId> {
        self.model_id
    }

    /// Simulated time of the last update.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_group_visible(&mut self, group: u8, visible: bool) {
        if group < 8 {
            let bit = 1 << group;
            if visible {
                self.visible_groups |= bit;
            } else {
                self.visible_groups &= !bit;
            }
        }
    }

    pub fn is_group_visible(&self, group: u8) -> bool {
        group < 8 && self.visible_groups & (1 << group) != 0
    }

    /// Rebuild the drawables from the current poses.
    ///
    /// On error the previous contents are left untouched.
    pub fn update(&mut self, model: &WorldModel, state: &WorldState) -> Result<(), SceneError> {
        let visible = || {
            model
                .geoms()
                .iter()
                .enumerate()
                .filter(|(_, g)| self.is_group_visible(g.group))
        };
        let required = visible().count();
        if required > self.capacity {
            return Err(SceneError::CapacityExceeded {
                capacity: self.capacity,
                required,
            });
        }

        let geoms: Vec<VisualGeom> = visible()
            .map(|(i, g)| VisualGeom {
                geom_id: i,
                body_id: g.body,
                kind: g.kind,
                pos: state.geom_position(i).as_vec3(),
                mat: state.geom_rotation(i).as_mat3(),
                size: g.size.as_vec3(),
                rgba: g.rgba,
            })
            .collect();
        self.geoms.clear();
        self.geoms.extend(geoms);

        self.cameras.clear();
        self.cameras.extend(model.cameras().iter().enumerate().map(|(i, c)| CameraPose {
            pos: state.camera_position(i).as_vec3(),
            rot: state.camera_rotation(i).as_mat3(),
            fovy: c.fovy as f32,
        }));
        self.model_id = Some(model.id());
        self.time = state.time();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::SceneSource;

    const XML: &str = r#"
        <mujoco><worldbody>
          <geom type="plane" size="1 1 0.1"/>
          <camera pos="0 -2 1"/>
          <body pos="0 0 1">
            <joint type="slide" axis="0 0 1"/>
            <geom type="box" size="0.1 0.2 0.3" rgba="1 0 0 1"/>
            <geom type="sphere" size="0.1" group="4"/>
          </body>
        </worldbody></mujoco>"#;

    fn world() -> (WorldModel, WorldState) {
        let model = SceneSource::xml(XML).compile().unwrap();
        let mut state = WorldState::new(&model);
        simrig_kernel::engine::forward(&model, &mut state);
        (model, state)
    }

    #[test]
    fn update_copies_visible_geoms() {
        let (model, state) = world();
        let mut scene = VisualScene::new(10);
        scene.update(&model, &state).unwrap();
        // Group 4 is hidden by default.
        assert_eq!(scene.len(), 2);
        let b = &scene.geoms()[1];
        assert_eq!(b.kind, GeomKind::Box);
        assert_eq!(b.pos, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(b.rgba, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(scene.cameras().len(), 1);
        assert_eq!(scene.model_id(), Some(model.id()));
    }

    #[test]
    fn hidden_groups_can_be_enabled() {
        let (model, state) = world();
        let mut scene = VisualScene::new(10);
        scene.set_group_visible(4, true);
        scene.update(&model, &state).unwrap();
        assert_eq!(scene.len(), 3);
    }

    #[test]
    fn over_capacity_fails_and_keeps_previous_contents() {
        let (model, state) = world();
        let mut scene = VisualScene::new(2);
        scene.update(&model, &state).unwrap();
        scene.set_group_visible(4, true);
        let err = scene.update(&model, &state).unwrap_err();
        assert_eq!(
            err,
            SceneError::CapacityExceeded {
                capacity: 2,
                required: 3
            }
        );
        assert_eq!(scene.len(), 2);
    }
}
