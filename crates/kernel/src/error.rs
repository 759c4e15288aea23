use std::fmt;

/// Identifies where a scene description came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    File(std::path::PathBuf),
    Inline,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Inline => f.write_str("<inline xml>"),
        }
    }
}

/// A scene description could not be turned into a world model.
///
/// Nothing allocated during the failed load survives the error.
#[derive(Debug, thiserror::Error)]
#[error("failed to load scene `{source_id}`: {diagnostic}")]
pub struct LoadError {
    pub source_id: SourceId,
    pub diagnostic: String,
}

impl LoadError {
    pub fn new(source_id: SourceId, diagnostic: impl Into<String>) -> Self {
        Self {
            source_id,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Diagnostic produced while compiling a document, before the source is attached.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct CompileError(pub String);

impl From<roxmltree::Error> for CompileError {
    fn from(e: roxmltree::Error) -> Self {
        Self(format!("XML parse error: {e}"))
    }
}
