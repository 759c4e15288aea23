use crate::error::{LoadError, SourceId};
use crate::mjcf;
use crate::model::WorldModel;
use crate::state::WorldState;
use simrig_common::{ReleaseObserver, ResourceHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a scene description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSource {
    File(PathBuf),
    Xml(String),
}

impl SceneSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn xml(text: impl Into<String>) -> Self {
        Self::Xml(text.into())
    }

    pub fn id(&self) -> SourceId {
        match self {
            Self::File(path) => SourceId::File(path.clone()),
            Self::Xml(_) => SourceId::Inline,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Xml(_) => None,
        }
    }

    /// Read and compile the description into a fresh model.
    pub fn compile(&self) -> Result<WorldModel, LoadError> {
        let text = match self {
            Self::File(path) => std::fs::read_to_string(path)
                .map_err(|e| LoadError::new(self.id(), format!("cannot read file: {e}")))?,
            Self::Xml(text) => text.clone(),
        };
        mjcf::compile(&text).map_err(|e| LoadError::new(self.id(), e.0))
    }
}

/// Model and paired state, each owned by its own handle.
///
/// Fields drop in declaration order, so the state goes before its model.
pub struct LoadedWorld {
    pub state: ResourceHandle<WorldState>,
    pub model: ResourceHandle<WorldModel>,
}

/// Compile `source` and allocate a paired state with derived quantities filled in.
///
/// On failure nothing is allocated and the error names the source.
pub fn load(source: &SceneSource) -> Result<LoadedWorld, LoadError> {
    load_observed(source, None)
}

/// [`load`], reporting each handle's release to `observer`.
pub fn load_observed(
    source: &SceneSource,
    observer: Option<Arc<dyn ReleaseObserver>>,
) -> Result<LoadedWorld, LoadError> {
    let model = source.compile().inspect_err(|e| {
        tracing::error!(source = %e.source_id, diagnostic = %e.diagnostic, "scene load failed");
    })?;
    let mut state = WorldState::new(&model);
    crate::engine::forward(&model, &mut state);
    tracing::info!(
        source = %source.id(),
        model = model.name(),
        nbody = model.nbody(),
        njnt = model.nq(),
        nu = model.nu(),
        timestep = model.timestep(),
        "scene loaded"
    );
    Ok(LoadedWorld {
        state: ResourceHandle::tracked(state, "world-state", observer.clone()),
        model: ResourceHandle::tracked(model, "world-model", observer),
    })
}
