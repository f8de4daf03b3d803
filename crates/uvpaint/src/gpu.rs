//! GPU backend seam.
//!
//! The pipeline never talks to a graphics API directly; it builds quad
//! geometry on the CPU and submits it through [`GpuBackend`]. Commands are
//! executed in call order within a frame, command-buffer style: a draw
//! issued by one call is visible to the next.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::brush::Brush;
use crate::types::BlendMode;

/// Opaque handle to a GPU texture owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Shader pass selector for brush draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DrawPass {
    /// Stamp the brush texture
    Stamp = 0,
    /// Tint staged ink with the brush color
    Colorize = 1,
}

/// One brush-quad vertex, laid out for direct GPU upload.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct QuadVertex {
    /// Position in texture-pixel space
    pub pos: [f32; 2],
    /// Stamp texture coordinate
    pub uv: [f32; 2],
}

/// CPU-side quad batch submitted as a single draw.
#[derive(Debug, Clone, Default)]
pub struct QuadMesh {
    pub vertices: Vec<QuadVertex>,
    pub indices: Vec<u32>,
}

impl QuadMesh {
    pub fn with_capacity(quads: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(quads * 4),
            indices: Vec::with_capacity(quads * 6),
        }
    }

    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }

    /// Append one rotated quad centered at `center` with the given diameter.
    pub fn push_quad(&mut self, center: Vec2, diameter: f32, rotation: f32) {
        let half = diameter * 0.5;
        let (sin, cos) = rotation.sin_cos();
        let right = Vec2::new(cos, sin) * half;
        let up = Vec2::new(-sin, cos) * half;

        let base = self.vertices.len() as u32;
        let corners = [
            (center - right - up, [0.0, 0.0]),
            (center + right - up, [1.0, 0.0]),
            (center + right + up, [1.0, 1.0]),
            (center - right + up, [0.0, 1.0]),
        ];
        for (pos, uv) in corners {
            self.vertices.push(QuadVertex {
                pos: pos.to_array(),
                uv,
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

/// Graphics backend contract consumed by the renderer.
///
/// Texture allocation failure is treated as fatal by the backend itself;
/// nothing here returns a recoverable error.
pub trait GpuBackend {
    fn create_texture(&mut self, width: u32, height: u32, label: &str) -> TextureHandle;
    fn release_texture(&mut self, texture: TextureHandle);
    fn set_render_target(&mut self, target: TextureHandle);
    fn clear_render_target(&mut self, color: [f32; 4]);
    fn draw_mesh(&mut self, mesh: &QuadMesh, brush: &Brush, pass: DrawPass);
    fn blit(&mut self, src: TextureHandle, dst: TextureHandle);
    /// Blend `src` over `dst` with the given opacity, optional mask, and mode.
    fn composite(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        opacity: f32,
        mask: Option<TextureHandle>,
        blend: BlendMode,
    );
}
