//! Scene streaming to an external visualizer.
//!
//! The wire format is newline-delimited JSON over TCP. After connecting, the
//! first message is a `build` describing every drawable geom; each rendered
//! frame then sends an `update` with the current poses. A new model sends a
//! fresh `build`.

use crate::backend::{BackendError, InputSnapshot, SceneView, UiLayer, ViewerBackend};
use crate::resources::ResourceRequest;
use crate::scene::{VisualGeom, VisualScene};
use serde::{Deserialize, Serialize};
use simrig_common::{AppState, ReleaseObserver, ViewerKind};
use simrig_kernel::{GeomKind, ModelId, WorldModel, WorldState};
use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteShape {
    Box { half_extents: [f32; 3] },
    Sphere { radius: f32 },
    Ellipsoid { radii: [f32; 3] },
    Cylinder { radius: f32, half_length: f32 },
    Capsule { radius: f32, half_length: f32 },
}

impl RemoteShape {
    /// `None` for kinds the consumer cannot draw.
    pub fn from_geom(geom: &VisualGeom) -> Option<Self> {
        let s = geom.size;
        match geom.kind {
            GeomKind::Box => Some(Self::Box {
                half_extents: s.to_array(),
            }),
            GeomKind::Sphere => Some(Self::Sphere { radius: s.x }),
            GeomKind::Ellipsoid => Some(Self::Ellipsoid { radii: s.to_array() }),
            GeomKind::Cylinder => Some(Self::Cylinder {
                radius: s.x,
                half_length: s.y,
            }),
            GeomKind::Capsule => Some(Self::Capsule {
                radius: s.x,
                half_length: s.y,
            }),
            GeomKind::Plane => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteGeom {
    pub id: usize,
    pub shape: RemoteShape,
    pub rgba: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePose {
    pub id: usize,
    pub position: [f32; 3],
    /// Column-major rotation matrix.
    pub rotation: [f32; 9],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneMessage {
    Build { model: String, geoms: Vec<RemoteGeom> },
    Update { time: f64, poses: Vec<RemotePose> },
}

pub struct RemoteBackend {
    view: SceneView,
    stream: Option<BufWriter<TcpStream>>,
    addr: String,
    built_for: Option<ModelId>,
    remote_ids: HashSet<usize>,
    /// Unsent scene build for the current model.
    pending_build: Option<SceneMessage>,
    /// Latest unsent poses; a newer prepare replaces it.
    pending_update: Option<SceneMessage>,
    messages_sent: u64,
    width: u32,
    height: u32,
}

impl RemoteBackend {
    pub fn connect(
        addr: &str,
        model: &WorldModel,
        width: u32,
        height: u32,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Result<Self, BackendError> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| BackendError::unavailable(ViewerKind::Remote, format!("{addr}: {e}")))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed: {e}");
        }
        tracing::info!(addr, "connected to remote viewer");
        Ok(Self {
            view: SceneView::new(model, ResourceRequest::for_kind(ViewerKind::Remote), observer),
            stream: Some(BufWriter::new(stream)),
            addr: addr.to_string(),
            built_for: None,
            remote_ids: HashSet::new(),
            pending_build: None,
            pending_update: None,
            messages_sent: 0,
            width,
            height,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    fn build_message(&mut self, model: &WorldModel, scene: &VisualScene) -> SceneMessage {
        self.remote_ids.clear();
        let mut geoms = Vec::with_capacity(scene.len());
        for geom in scene.geoms() {
            match RemoteShape::from_geom(geom) {
                Some(shape) => {
                    self.remote_ids.insert(geom.geom_id);
                    geoms.push(RemoteGeom {
                        id: geom.geom_id,
                        shape,
                        rgba: geom.rgba,
                    });
                }
                None => tracing::warn!(
                    geom = geom.geom_id,
                    kind = ?geom.kind,
                    "geom kind not supported by remote viewer; skipped"
                ),
            }
        }
        SceneMessage::Build {
            model: model.name().to_string(),
            geoms,
        }
    }

    fn update_message(&self, scene: &VisualScene) -> SceneMessage {
        let poses = scene
            .geoms()
            .iter()
            .filter(|g| self.remote_ids.contains(&g.geom_id))
            .map(|g| RemotePose {
                id: g.geom_id,
                position: g.pos.to_array(),
                rotation: g.mat.to_cols_array(),
            })
            .collect();
        SceneMessage::Update {
            time: scene.time(),
            poses,
        }
    }

    fn send(&mut self, msg: &SceneMessage) -> std::io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        serde_json::to_writer(&mut *stream, msg)?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        self.messages_sent += 1;
        Ok(())
    }
}

impl ViewerBackend for RemoteBackend {
    fn kind(&self) -> ViewerKind {
        ViewerKind::Remote
    }

    fn prepare(&mut self, model: &WorldModel, state: &WorldState, app: &AppState) -> InputSnapshot {
        if self.stream.is_none() {
            return InputSnapshot::default();
        }
        self.view.sync(model, state, app);
        // Cloned so message building can borrow `self` mutably.
        let Some(scene) = self.view.scene().cloned() else {
            return InputSnapshot::default();
        };
        if self.built_for != Some(model.id()) {
            self.pending_build = Some(self.build_message(model, &scene));
            self.built_for = Some(model.id());
        }
        self.pending_update = Some(self.update_message(&scene));
        InputSnapshot {
            framebuffer: (self.width, self.height),
            ..InputSnapshot::default()
        }
    }

    fn render(&mut self, _app: &mut AppState, _ui: Option<&mut dyn UiLayer>) {
        let pending = [self.pending_build.take(), self.pending_update.take()];
        for msg in pending.iter().flatten() {
            if let Err(e) = self.send(msg) {
                tracing::warn!(addr = %self.addr, "remote viewer disconnected: {e}");
                self.stream = None;
                break;
            }
        }
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn rebind(&mut self, model: &WorldModel) {
        self.view.rebind(model);
        self.built_for = None;
        self.pending_build = None;
        self.pending_update = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::SceneSource;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    const XML: &str = r#"
        <mujoco model="remote"><worldbody>
          <geom type="plane" size="1 1 0.1"/>
          <body pos="0 0 1">
            <joint type="slide" axis="0 0 1"/>
            <geom type="box" size="0.1 0.1 0.1"/>
            <geom type="capsule" fromto="0 0 0 0 0 -0.5" size="0.05"/>
          </body>
        </worldbody></mujoco>"#;

    fn world() -> (WorldModel, WorldState) {
        let model = SceneSource::xml(XML).compile().unwrap();
        let mut state = WorldState::new(&model);
        simrig_kernel::engine::forward(&model, &mut state);
        (model, state)
    }

    #[test]
    fn streams_build_then_updates() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let reader = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            BufReader::new(socket)
                .lines()
                .map(|l| serde_json::from_str::<SceneMessage>(&l.unwrap()).unwrap())
                .collect::<Vec<_>>()
        });

        let (model, mut state) = world();
        let mut backend = RemoteBackend::connect(&addr, &model, 800, 600, None).unwrap();
        let mut app = AppState::default();
        for _ in 0..3 {
            backend.prepare(&model, &state, &app);
            backend.render(&mut app, None);
            simrig_kernel::engine::step(&model, &mut state);
        }
        assert!(backend.is_connected());
        assert_eq!(backend.messages_sent(), 4);
        drop(backend);

        let messages = reader.join().unwrap();
        assert_eq!(messages.len(), 4);
        let SceneMessage::Build { model: name, geoms } = &messages[0] else {
            panic!("first message must build the scene");
        };
        assert_eq!(name, "remote");
        // The plane is skipped.
        assert_eq!(geoms.len(), 2);
        assert!(matches!(geoms[0].shape, RemoteShape::Box { .. }));
        for msg in &messages[1..] {
            let SceneMessage::Update { poses, .. } = msg else {
                panic!("expected update, got {msg:?}");
            };
            assert_eq!(poses.len(), 2);
        }
    }

    #[test]
    fn unrendered_frames_collapse_to_the_latest_update() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let reader = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            BufReader::new(socket)
                .lines()
                .map(|l| serde_json::from_str::<SceneMessage>(&l.unwrap()).unwrap())
                .collect::<Vec<_>>()
        });

        let (model, mut state) = world();
        let mut backend = RemoteBackend::connect(&addr, &model, 800, 600, None).unwrap();
        let mut app = AppState::default();
        for _ in 0..5 {
            simrig_kernel::engine::step(&model, &mut state);
            backend.prepare(&model, &state, &app);
        }
        backend.render(&mut app, None);
        assert_eq!(backend.messages_sent(), 2);
        backend.render(&mut app, None);
        assert_eq!(backend.messages_sent(), 2);
        drop(backend);

        let messages = reader.join().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], SceneMessage::Build { .. }));
        let SceneMessage::Update { time, .. } = messages[1] else {
            panic!("expected update, got {:?}", messages[1]);
        };
        assert_eq!(time, state.time());
    }

    #[test]
    fn refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let (model, _) = world();
        let err = RemoteBackend::connect(&addr, &model, 1, 1, None).err().unwrap();
        assert!(matches!(
            err,
            BackendError::Unavailable {
                kind: ViewerKind::Remote,
                ..
            }
        ));
    }

    #[test]
    fn message_format_is_tagged_json() {
        let msg = SceneMessage::Update {
            time: 0.5,
            poses: vec![],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"update","time":0.5,"poses":[]}"#);
    }
}
