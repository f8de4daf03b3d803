//! Shared configuration for a paintable surface
//!
//! One `PaintConfig` is the single source of truth for pointer slots, layer
//! texture resolution, and the screen rectangle a 2D canvas occupies.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::types::PaintError;

/// Default number of simultaneous pointers (mouse + touches).
pub const DEFAULT_MAX_POINTERS: usize = 10;

/// Default layer texture resolution.
pub const DEFAULT_TEXTURE_SIZE: u32 = 1024;

/// Configuration for one paintable surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaintConfig {
    /// Number of input pointers tracked. One extra internal slot is reserved
    /// for programmatic draw calls.
    pub max_pointers: usize,
    /// Layer texture width in pixels
    pub texture_width: u32,
    /// Layer texture height in pixels
    pub texture_height: u32,
    /// Screen-space origin of a 2D canvas surface (ignored for mesh surfaces)
    pub canvas_origin: [f32; 2],
    /// Screen-space size of a 2D canvas surface (ignored for mesh surfaces)
    pub canvas_size: [f32; 2],
}

impl Default for PaintConfig {
    fn default() -> Self {
        Self {
            max_pointers: DEFAULT_MAX_POINTERS,
            texture_width: DEFAULT_TEXTURE_SIZE,
            texture_height: DEFAULT_TEXTURE_SIZE,
            canvas_origin: [0.0, 0.0],
            canvas_size: [DEFAULT_TEXTURE_SIZE as f32, DEFAULT_TEXTURE_SIZE as f32],
        }
    }
}

impl PaintConfig {
    /// Create a config with the given texture resolution
    pub fn new(texture_width: u32, texture_height: u32) -> Self {
        Self {
            texture_width,
            texture_height,
            ..Default::default()
        }
    }

    /// Texture resolution as a Vec2 for paint-space scaling
    pub fn texture_size(&self) -> Vec2 {
        Vec2::new(self.texture_width as f32, self.texture_height as f32)
    }

    /// Validate the configuration before any GPU resources are created
    pub fn validate(&self) -> Result<(), PaintError> {
        if self.texture_width == 0 || self.texture_height == 0 {
            return Err(PaintError::InvalidTextureSize {
                width: self.texture_width,
                height: self.texture_height,
            });
        }
        if self.max_pointers == 0 {
            return Err(PaintError::NoPointerSlots);
        }
        Ok(())
    }
}
