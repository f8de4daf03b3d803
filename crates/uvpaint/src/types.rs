//! Core data types shared across the painting pipeline.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one paintable surface registered with the raycast service.
///
/// Registration order doubles as the deterministic tie-break when two
/// surfaces produce hits at the same depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u32);

/// Index of one simultaneous input contact (mouse = 0, touches 0..N).
pub type PointerId = usize;

/// A world-space ray with a normalized direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Create a ray, normalizing the direction
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir: dir.normalize_or_zero(),
        }
    }

    /// Point at distance `t` along the ray
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// A mesh face with world-space vertices and per-vertex UVs.
///
/// Immutable after mesh build. Ids are unique within one mesh only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub id: u32,
    pub positions: [Vec3; 3],
    pub uvs: [Vec2; 3],
}

impl Triangle {
    /// Geometric (unnormalized winding) normal
    pub fn normal(&self) -> Vec3 {
        let [a, b, c] = self.positions;
        (b - a).cross(c - a).normalize_or_zero()
    }

    /// Barycentric coordinates of a point, projected onto the triangle plane.
    ///
    /// Returns `(w, u, v)` weights for vertices 0, 1, 2.
    pub fn barycentric(&self, p: Vec3) -> Vec3 {
        let [a, b, c] = self.positions;
        let v0 = b - a;
        let v1 = c - a;
        let v2 = p - a;

        let d00 = v0.dot(v0);
        let d01 = v0.dot(v1);
        let d11 = v1.dot(v1);
        let d20 = v2.dot(v0);
        let d21 = v2.dot(v1);

        let denom = d00 * d11 - d01 * d01;
        if denom.abs() < f32::EPSILON {
            // Degenerate triangle, weight everything onto vertex 0
            return Vec3::new(1.0, 0.0, 0.0);
        }

        let u = (d11 * d20 - d01 * d21) / denom;
        let v = (d00 * d21 - d01 * d20) / denom;
        Vec3::new(1.0 - u - v, u, v)
    }

    /// Interpolate the triangle's UVs at the given barycentric weights
    pub fn uv_at(&self, bary: Vec3) -> Vec2 {
        self.uvs[0] * bary.x + self.uvs[1] * bary.y + self.uvs[2] * bary.z
    }

    /// UV of a world-space point on (or near) this triangle
    pub fn uv_of_point(&self, p: Vec3) -> Vec2 {
        self.uv_at(self.barycentric(p))
    }
}

/// Result of resolving a ray against a mesh: the hit triangle, the world-space
/// hit point, and the interpolated UV.
///
/// Produced per raycast and consumed within the same frame, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct RaycastData {
    pub triangle: Triangle,
    pub world_hit: Vec3,
    pub uv_hit: Vec2,
}

/// Blend modes applied to the brush material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    Normal = 0,
    Erase = 1,
}

/// Errors surfaced by fallible constructors.
///
/// Frame-loop operations never return these; invalid layer operations and
/// failed stitch walks degrade with a warning instead (this pipeline runs
/// inside an interactive loop).
#[derive(Debug, Error)]
pub enum PaintError {
    #[error("mesh buffers disagree: {positions} positions, {uvs} uvs")]
    MismatchedBuffers { positions: usize, uvs: usize },
    #[error("index buffer length {0} is not a multiple of 3")]
    BadIndexCount(usize),
    #[error("index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },
    #[error("mesh has no triangles")]
    EmptyMesh,
    #[error("texture size {width}x{height} is invalid")]
    InvalidTextureSize { width: u32, height: u32 },
    #[error("max_pointers must be at least 1")]
    NoPointerSlots,
    #[error("unknown surface {0:?}")]
    UnknownSurface(SurfaceId),
}
