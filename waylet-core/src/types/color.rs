//! Renderer pixel formats.
//!
//! Only the fixed set of formats the presentation layer can express both
//! as a wl_shm format and as a DRM fourcc is supported. An unsupported
//! renderer format is a configuration error at bring-up, never a runtime
//! fallback.

use serde::{Deserialize, Serialize};

/// Pixel format of the buffers the renderer draws into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    /// 32-bit ARGB, alpha in the most significant byte.
    Argb8888,
    /// 32-bit RGB with the high byte ignored.
    Xrgb8888,
    /// 16-bit RGB, 5-6-5 packing.
    Rgb565,
}

impl ColorFormat {
    /// Bytes per pixel of this format.
    pub const fn bytes_per_pixel(self) -> i32 {
        match self {
            ColorFormat::Argb8888 | ColorFormat::Xrgb8888 => 4,
            ColorFormat::Rgb565 => 2,
        }
    }

    /// Minimum stride for a row of `width` pixels.
    pub const fn min_stride(self, width: i32) -> i32 {
        width * self.bytes_per_pixel()
    }
}

impl std::fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColorFormat::Argb8888 => "ARGB8888",
            ColorFormat::Xrgb8888 => "XRGB8888",
            ColorFormat::Rgb565 => "RGB565",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(ColorFormat::Argb8888.bytes_per_pixel(), 4);
        assert_eq!(ColorFormat::Xrgb8888.bytes_per_pixel(), 4);
        assert_eq!(ColorFormat::Rgb565.bytes_per_pixel(), 2);
    }

    #[test]
    fn stride_is_width_times_bpp() {
        assert_eq!(ColorFormat::Rgb565.min_stride(480), 960);
        assert_eq!(ColorFormat::Xrgb8888.min_stride(480), 1920);
    }
}
