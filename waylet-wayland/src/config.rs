//! Runtime configuration for the presentation layer.
//!
//! Configuration is process-lifetime and validated once at connect time;
//! the only environment input is the decoration kill switch.

use serde::{Deserialize, Serialize};
use waylet_core::{ColorFormat, ConfigError};

/// Environment variable disabling client-drawn decorations. Any value
/// other than `"0"` disables them.
pub const DISABLE_DECORATIONS_ENV: &str = "WAYLET_DISABLE_DECORATIONS";

/// Which buffer backend presents window contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Shared-memory buffers (`wl_shm`).
    Shm,
    /// GPU buffers imported through `zwp_linux_dmabuf_v1`.
    Dmabuf,
}

/// Runtime configuration of the Wayland presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaylandConfig {
    /// Buffer backend selection.
    pub backend: BackendKind,
    /// Rotating buffer count per window: 1 serializes flushes on buffer
    /// release, 2 pipelines one frame ahead. DMABUF requires 2.
    pub buffer_count: usize,
    /// Pixel format the renderer draws in.
    pub color_format: ColorFormat,
    /// Whether client-side decorations are drawn at all. Can still be
    /// vetoed at runtime by [`DISABLE_DECORATIONS_ENV`].
    pub decorations: bool,
}

impl Default for WaylandConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Shm,
            buffer_count: 1,
            color_format: ColorFormat::Xrgb8888,
            decorations: true,
        }
    }
}

impl WaylandConfig {
    /// Validates cross-field constraints. Called once at connect time;
    /// an invalid configuration is a hard error, never a fallback.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_count < 1 || self.buffer_count > 2 {
            return Err(ConfigError::InvalidValue {
                field: "buffer_count",
                reason: format!("expected 1 or 2, got {}", self.buffer_count),
            });
        }
        if self.backend == BackendKind::Dmabuf && self.buffer_count != 2 {
            return Err(ConfigError::Incompatible(
                "the DMABUF backend requires buffer_count = 2".into(),
            ));
        }
        Ok(())
    }

    /// Whether the environment kill switch disables decorations.
    pub fn decorations_disabled_by_env() -> bool {
        std::env::var(DISABLE_DECORATIONS_ENV)
            .map(|v| v != "0")
            .unwrap_or(false)
    }

    /// Decoration setting after applying the environment override.
    pub fn effective_decorations(&self) -> bool {
        self.decorations && !Self::decorations_disabled_by_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WaylandConfig::default().validate().is_ok());
    }

    #[test]
    fn buffer_count_bounds() {
        let mut cfg = WaylandConfig::default();
        cfg.buffer_count = 0;
        assert!(cfg.validate().is_err());
        cfg.buffer_count = 3;
        assert!(cfg.validate().is_err());
        cfg.buffer_count = 2;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn dmabuf_requires_double_buffering() {
        let cfg = WaylandConfig {
            backend: BackendKind::Dmabuf,
            buffer_count: 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = WaylandConfig {
            backend: BackendKind::Dmabuf,
            buffer_count: 2,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
