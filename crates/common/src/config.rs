use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::{DEFAULT_FIXED_TIMESTEP, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH, SIMULATION_FPS};

/// Errors from loading configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which presentation backend a viewer is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerKind {
    /// No presentation at all; headless batch runs.
    #[default]
    #[serde(alias = "none")]
    Disabled,
    /// Native window with an interactive camera.
    #[serde(alias = "glfw")]
    Windowed,
    /// Offscreen rendering through an EGL-backed GL context.
    Egl,
    /// Offscreen rendering through a software rasterizer.
    OsMesa,
    /// Scene updates streamed to an external consumer.
    #[serde(alias = "meshcat")]
    Remote,
}

impl ViewerKind {
    pub const ALL: [ViewerKind; 5] = [
        ViewerKind::Disabled,
        ViewerKind::Windowed,
        ViewerKind::Egl,
        ViewerKind::OsMesa,
        ViewerKind::Remote,
    ];

    /// Whether this kind draws locally and therefore needs a render context.
    pub fn renders_locally(self) -> bool {
        matches!(self, Self::Windowed | Self::Egl | Self::OsMesa)
    }

    /// Whether this kind consumes a visual scene at all.
    pub fn needs_visual_scene(self) -> bool {
        self != Self::Disabled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Windowed => "windowed",
            Self::Egl => "egl",
            Self::OsMesa => "osmesa",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ViewerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "none" | "headless" => Ok(Self::Disabled),
            "windowed" | "glfw" | "window" => Ok(Self::Windowed),
            "egl" => Ok(Self::Egl),
            "osmesa" => Ok(Self::OsMesa),
            "remote" | "meshcat" => Ok(Self::Remote),
            other => {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                Err(ConfigError::Invalid(format!(
                    "unknown viewer kind `{other}`, expected one of: {}",
                    known.join(", ")
                )))
            }
        }
    }
}

/// Viewer construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub kind: ViewerKind,
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
    /// `host:port` of the consumer for [`ViewerKind::Remote`].
    pub remote_addr: Option<String>,
    /// Overlay text scale in percent: 100, 150 or 200.
    pub font_scale: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            kind: ViewerKind::Disabled,
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
            title: "simrig".into(),
            vsync: true,
            remote_addr: None,
            font_scale: 100,
        }
    }
}

impl ViewerConfig {
    pub fn with_kind(kind: ViewerKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Duration substituted when `step` is called with a non-positive value.
    pub fixed_timestep: f64,
    /// Simulated seconds advanced per shell frame.
    pub frame_duration: f64,
    pub viewer: ViewerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: DEFAULT_FIXED_TIMESTEP,
            frame_duration: 1.0 / SIMULATION_FPS,
            viewer: ViewerConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            )));
        }
        if !self.frame_duration.is_finite() {
            return Err(ConfigError::Invalid("frame_duration must be finite".into()));
        }
        if !matches!(self.viewer.font_scale, 100 | 150 | 200) {
            return Err(ConfigError::Invalid(format!(
                "font_scale must be 100, 150 or 200, got {}",
                self.viewer.font_scale
            )));
        }
        if self.viewer.kind == ViewerKind::Remote && self.viewer.remote_addr.is_none() {
            tracing::warn!("remote viewer requested without remote_addr; it will run degraded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn viewer_kind_parses_aliases() {
        assert_eq!("glfw".parse::<ViewerKind>().unwrap(), ViewerKind::Windowed);
        assert_eq!("none".parse::<ViewerKind>().unwrap(), ViewerKind::Disabled);
        assert_eq!("MeshCat".parse::<ViewerKind>().unwrap(), ViewerKind::Remote);
        let err = "vulkan".parse::<ViewerKind>().unwrap_err().to_string();
        assert!(err.contains("vulkan"));
        assert!(err.contains("disabled, windowed, egl, osmesa, remote"));
    }

    #[test]
    fn viewer_kind_display_round_trips_through_from_str() {
        for kind in ViewerKind::ALL {
            assert_eq!(kind.to_string().parse::<ViewerKind>().unwrap(), kind);
        }
    }

    #[test]
    fn local_rendering_kinds() {
        assert!(ViewerKind::Windowed.renders_locally());
        assert!(ViewerKind::OsMesa.renders_locally());
        assert!(!ViewerKind::Remote.renders_locally());
        assert!(ViewerKind::Remote.needs_visual_scene());
        assert!(!ViewerKind::Disabled.needs_visual_scene());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = SimConfig::from_json_str(r#"{ "viewer": { "kind": "egl" } }"#).unwrap();
        assert_eq!(config.fixed_timestep, DEFAULT_FIXED_TIMESTEP);
        assert_eq!(config.viewer.kind, ViewerKind::Egl);
        assert_eq!(config.viewer.width, DEFAULT_VIEWPORT_WIDTH);
    }

    #[test]
    fn non_positive_timestep_is_rejected() {
        let err = SimConfig::from_json_str(r#"{ "fixed_timestep": 0.0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn font_scale_must_be_a_supported_percentage() {
        let config = SimConfig::from_json_str(r#"{ "viewer": { "font_scale": 150 } }"#).unwrap();
        assert_eq!(config.viewer.font_scale, 150);
        let err = SimConfig::from_json_str(r#"{ "viewer": { "font_scale": 120 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "frame_duration": 0.02, "viewer": {{ "kind": "glfw", "vsync": false }} }}"#)
            .unwrap();
        let config = SimConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.frame_duration, 0.02);
        assert_eq!(config.viewer.kind, ViewerKind::Windowed);
        assert!(!config.viewer.vsync);
    }
}
