use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use simrig_kernel::GeomKind;
use simrig_render::{RenderContext, VisualGeom, VisualScene};
use std::f32::consts::{PI, TAU};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct InstanceData {
    pub model_0: [f32; 4],
    pub model_1: [f32; 4],
    pub model_2: [f32; 4],
    pub model_3: [f32; 4],
    pub color: [f32; 4],
}

impl InstanceData {
    fn new(model: Mat4, color: [f32; 4]) -> Self {
        let cols = model.to_cols_array_2d();
        Self {
            model_0: cols[0],
            model_1: cols[1],
            model_2: cols[2],
            model_3: cols[3],
            color,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct GridVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

/// Unit cube centred on the origin, edge length 1.
pub(crate) fn cube_mesh() -> (Vec<Vertex>, Vec<u16>) {
    let p = 0.5_f32;
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([0.0, 0.0, 1.0], [[-p, -p, p], [p, -p, p], [p, p, p], [-p, p, p]]),
        ([0.0, 0.0, -1.0], [[p, -p, -p], [-p, -p, -p], [-p, p, -p], [p, p, -p]]),
        ([1.0, 0.0, 0.0], [[p, -p, p], [p, -p, -p], [p, p, -p], [p, p, p]]),
        ([-1.0, 0.0, 0.0], [[-p, -p, -p], [-p, -p, p], [-p, p, p], [-p, p, -p]]),
        ([0.0, 1.0, 0.0], [[-p, p, p], [p, p, p], [p, p, -p], [-p, p, -p]]),
        ([0.0, -1.0, 0.0], [[-p, -p, -p], [p, -p, -p], [p, -p, p], [-p, -p, p]]),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, corners) in faces {
        let base = vertices.len() as u16;
        vertices.extend(corners.iter().map(|&position| Vertex { position, normal }));
        indices.extend([base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (vertices, indices)
}

/// Unit sphere from latitude rings.
pub(crate) fn sphere_mesh(segments: u16, rings: u16) -> (Vec<Vertex>, Vec<u16>) {
    let mut vertices = Vec::new();
    for r in 0..=rings {
        let theta = PI * r as f32 / rings as f32;
        for s in 0..=segments {
            let phi = TAU * s as f32 / segments as f32;
            let n = [theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()];
            vertices.push(Vertex {
                position: n,
                normal: n,
            });
        }
    }
    let stride = segments + 1;
    let mut indices = Vec::new();
    for r in 0..rings {
        for s in 0..segments {
            let a = r * stride + s;
            let b = a + stride;
            indices.extend([a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    (vertices, indices)
}

/// Capped cylinder of radius 1 spanning z in [-1, 1].
pub(crate) fn cylinder_mesh(segments: u16) -> (Vec<Vertex>, Vec<u16>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let ring = |s: u16| {
        let phi = TAU * s as f32 / segments as f32;
        (phi.cos(), phi.sin())
    };

    for s in 0..=segments {
        let (x, y) = ring(s);
        vertices.push(Vertex {
            position: [x, y, -1.0],
            normal: [x, y, 0.0],
        });
        vertices.push(Vertex {
            position: [x, y, 1.0],
            normal: [x, y, 0.0],
        });
    }
    for s in 0..segments {
        let a = 2 * s;
        indices.extend([a, a + 2, a + 1, a + 1, a + 2, a + 3]);
    }

    for (z, nz) in [(1.0f32, 1.0f32), (-1.0, -1.0)] {
        let center = vertices.len() as u16;
        vertices.push(Vertex {
            position: [0.0, 0.0, z],
            normal: [0.0, 0.0, nz],
        });
        for s in 0..=segments {
            let (x, y) = ring(s);
            vertices.push(Vertex {
                position: [x, y, z],
                normal: [0.0, 0.0, nz],
            });
        }
        for s in 0..segments {
            let (a, b) = (center + 1 + s, center + 2 + s);
            if nz > 0.0 {
                indices.extend([center, a, b]);
            } else {
                indices.extend([center, b, a]);
            }
        }
    }
    (vertices, indices)
}

/// Floor grid in the z = 0 plane around the model centre.
pub(crate) fn grid_mesh(ctx: &RenderContext) -> Vec<GridVertex> {
    let color = [0.4, 0.4, 0.4, 1.0];
    let n = ctx.grid_half_lines as i32;
    let spacing = ctx.grid_spacing;
    let extent = n as f32 * spacing;
    let (cx, cy) = (
        (ctx.center.x / spacing).round() * spacing,
        (ctx.center.y / spacing).round() * spacing,
    );
    let mut verts = Vec::with_capacity((2 * n as usize + 1) * 4);
    for i in -n..=n {
        let offset = i as f32 * spacing;
        verts.push(GridVertex {
            position: [cx - extent, cy + offset, 0.0],
            color,
        });
        verts.push(GridVertex {
            position: [cx + extent, cy + offset, 0.0],
            color,
        });
        verts.push(GridVertex {
            position: [cx + offset, cy - extent, 0.0],
            color,
        });
        verts.push(GridVertex {
            position: [cx + offset, cy + extent, 0.0],
            color,
        });
    }
    verts
}

/// Instances grouped by the mesh they draw with.
#[derive(Debug, Default)]
pub(crate) struct Batches {
    pub cubes: Vec<InstanceData>,
    pub spheres: Vec<InstanceData>,
    pub cylinders: Vec<InstanceData>,
}

impl Batches {
    pub fn len(&self) -> usize {
        self.cubes.len() + self.spheres.len() + self.cylinders.len()
    }

    pub fn from_scene<G>(scene: &VisualScene, ctx: &RenderContext<G>) -> Self {
        let mut batches = Self::default();
        for geom in scene.geoms() {
            batches.push(geom, ctx);
        }
        batches
    }

    fn push<G>(&mut self, g: &VisualGeom, ctx: &RenderContext<G>) {
        let rot = Quat::from_mat3(&g.mat);
        let at = |scale: Vec3, offset: Vec3| {
            Mat4::from_scale_rotation_translation(scale, rot, g.pos + g.mat * offset)
        };
        let s = g.size;
        match g.kind {
            GeomKind::Box => self.cubes.push(InstanceData::new(at(s * 2.0, Vec3::ZERO), g.rgba)),
            GeomKind::Sphere => self
                .spheres
                .push(InstanceData::new(at(Vec3::splat(s.x), Vec3::ZERO), g.rgba)),
            GeomKind::Ellipsoid => self.spheres.push(InstanceData::new(at(s, Vec3::ZERO), g.rgba)),
            GeomKind::Cylinder => self
                .cylinders
                .push(InstanceData::new(at(Vec3::new(s.x, s.x, s.y), Vec3::ZERO), g.rgba)),
            GeomKind::Capsule => {
                self.cylinders
                    .push(InstanceData::new(at(Vec3::new(s.x, s.x, s.y), Vec3::ZERO), g.rgba));
                for end in [s.y, -s.y] {
                    self.spheres.push(InstanceData::new(
                        at(Vec3::splat(s.x), Vec3::new(0.0, 0.0, end)),
                        g.rgba,
                    ));
                }
            }
            GeomKind::Plane => {
                // Zero half sizes mean an unbounded plane; draw it out to the grid.
                let span = ctx.grid_half_lines as f32 * ctx.grid_spacing;
                let half = Vec3::new(
                    if s.x > 0.0 { s.x } else { span },
                    if s.y > 0.0 { s.y } else { span },
                    0.001 * ctx.extent,
                );
                self.cubes.push(InstanceData::new(
                    at(half * 2.0, Vec3::new(0.0, 0.0, -half.z)),
                    g.rgba,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::{SceneSource, WorldState};
    use simrig_render::FontScale;

    fn scene(xml: &str) -> (VisualScene, RenderContext) {
        let model = SceneSource::xml(xml).compile().unwrap();
        let mut state = WorldState::new(&model);
        simrig_kernel::engine::forward(&model, &mut state);
        let mut scene = VisualScene::new(64);
        scene.update(&model, &state).unwrap();
        (scene, RenderContext::new(&model, FontScale::default()))
    }

    #[test]
    fn capsule_is_a_cylinder_and_two_caps() {
        let (scene, ctx) = scene(
            r#"<mujoco><worldbody><geom type="capsule" size="0.1 0.5"/></worldbody></mujoco>"#,
        );
        let batches = Batches::from_scene(&scene, &ctx);
        assert_eq!(batches.cylinders.len(), 1);
        assert_eq!(batches.spheres.len(), 2);
        let top = Vec3::from_slice(&batches.spheres[0].model_3[..3]);
        assert!((top - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn every_primitive_gets_a_batch() {
        let (scene, ctx) = scene(
            r#"<mujoco><worldbody>
                 <geom type="plane" size="0 0 1"/>
                 <geom type="box" size="1 1 1"/>
                 <geom type="sphere" size="1"/>
                 <geom type="ellipsoid" size="1 2 3"/>
                 <geom type="cylinder" size="1 1"/>
               </worldbody></mujoco>"#,
        );
        let batches = Batches::from_scene(&scene, &ctx);
        assert_eq!(batches.cubes.len(), 2);
        assert_eq!(batches.spheres.len(), 2);
        assert_eq!(batches.cylinders.len(), 1);
        assert_eq!(batches.len(), 5);
    }

    #[test]
    fn meshes_index_within_bounds() {
        for (verts, indices) in [cube_mesh(), sphere_mesh(24, 12), cylinder_mesh(24)] {
            assert_eq!(indices.len() % 3, 0);
            assert!(indices.iter().all(|&i| (i as usize) < verts.len()));
        }
    }

    #[test]
    fn grid_has_four_vertices_per_line_pair() {
        let (_, ctx) = scene(r#"<mujoco><worldbody><geom size="1"/></worldbody></mujoco>"#);
        let grid = grid_mesh(&ctx);
        assert_eq!(grid.len(), (2 * ctx.grid_half_lines as usize + 1) * 4);
        assert!(grid.iter().all(|v| v.position[2] == 0.0));
    }
}
