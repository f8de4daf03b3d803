//! Paintable mesh geometry.
//!
//! A [`PaintMesh`] holds the immutable triangle list a surface is painted
//! through, plus a bounding box used as a cheap reject before any
//! per-triangle ray test. World-space positions are baked at build time from
//! the owning transform; re-register the mesh if that transform changes.

use glam::{Mat4, Vec2, Vec3};

use crate::constants::BOUNDS_EPSILON;
use crate::types::{PaintError, Ray, Triangle};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Smallest box containing all points. Empty input yields a degenerate
    /// box at the origin.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        };
        let mut min = first;
        let mut max = first;
        for p in iter {
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    /// Box grown by `margin` on every side
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Slab test against a ray. Hits behind the origin do not count.
    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        let inv = ray.dir.recip();
        let t1 = (self.min - ray.origin) * inv;
        let t2 = (self.max - ray.origin) * inv;
        let t_near = t1.min(t2).max_element();
        let t_far = t1.max(t2).min_element();
        t_near <= t_far && t_far >= 0.0
    }
}

/// Immutable triangle soup for one paintable mesh.
pub struct PaintMesh {
    triangles: Vec<Triangle>,
    bounds: Aabb,
}

impl PaintMesh {
    /// Build a mesh from raw vertex buffers.
    ///
    /// `indices` is a flat triangle list (3 per face). Positions are
    /// transformed into world space by `transform`; UVs are taken as-is.
    /// Triangle ids are the face index within this mesh.
    pub fn from_buffers(
        positions: &[Vec3],
        uvs: &[Vec2],
        indices: &[u32],
        transform: Mat4,
    ) -> Result<Self, PaintError> {
        if positions.len() != uvs.len() {
            return Err(PaintError::MismatchedBuffers {
                positions: positions.len(),
                uvs: uvs.len(),
            });
        }
        if indices.len() % 3 != 0 {
            return Err(PaintError::BadIndexCount(indices.len()));
        }
        if indices.is_empty() {
            return Err(PaintError::EmptyMesh);
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(PaintError::IndexOutOfRange {
                index: bad,
                vertices: positions.len(),
            });
        }

        let world: Vec<Vec3> = positions
            .iter()
            .map(|&p| transform.transform_point3(p))
            .collect();

        let triangles: Vec<Triangle> = indices
            .chunks_exact(3)
            .enumerate()
            .map(|(face, idx)| {
                let [i0, i1, i2] = [idx[0] as usize, idx[1] as usize, idx[2] as usize];
                Triangle {
                    id: face as u32,
                    positions: [world[i0], world[i1], world[i2]],
                    uvs: [uvs[i0], uvs[i1], uvs[i2]],
                }
            })
            .collect();

        let bounds = Aabb::from_points(world);
        Ok(Self { triangles, bounds })
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Look up a triangle by its id (the face index)
    pub fn triangle(&self, id: u32) -> Option<&Triangle> {
        self.triangles.get(id as usize)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Cheap reject: does the ray come anywhere near this mesh?
    pub fn ray_touches_bounds(&self, ray: &Ray) -> bool {
        self.bounds.expanded(BOUNDS_EPSILON).intersects_ray(ray)
    }
}
