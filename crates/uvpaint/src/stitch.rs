//! Cross-triangle stroke stitching.
//!
//! A stroke segment whose endpoints land on different triangles cannot be
//! drawn as a single UV-space line: the triangles' UV islands may be
//! discontinuous in texture space. The stitcher walks the mesh surface from
//! the start hit to the end hit along the cutting plane spanned by the camera
//! and the two hit points, and emits a texture-pixel polyline with two
//! boundary UVs per triangle crossing (the exit UV in the old triangle and
//! the entry UV of the same point in the new one).
//!
//! Failure containment is deliberate: a lost walk retries once in the
//! reverse direction, then returns whatever partial polyline it collected.
//! Runaway walks are stopped by a hard iteration cap and a revisit guard.

use glam::{Vec2, Vec3};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::constants::{MAX_WALK_ITERATIONS, WALK_STEP_OFFSET};
use crate::mesh::PaintMesh;
use crate::raycast::raycast_mesh;
use crate::types::{PointerId, Ray, RaycastData, Triangle};

/// Polyline produced by one stitch walk.
#[derive(Debug, Clone)]
pub struct StitchedLine {
    /// Texture-pixel positions, start to end
    pub points: Vec<Vec2>,
    /// Ids of every triangle the walk touched
    pub triangles: Vec<u32>,
    /// False when the walk gave up and the polyline is truncated
    pub complete: bool,
}

/// Walks a stroke segment across triangle boundaries.
#[derive(Debug, Clone, Copy)]
pub struct StrokeStitcher {
    /// World-space offset for stepping a probe past a boundary
    pub step_offset: f32,
    /// Hard cap on walk steps
    pub max_iterations: usize,
}

impl Default for StrokeStitcher {
    fn default() -> Self {
        Self {
            step_offset: WALK_STEP_OFFSET,
            max_iterations: MAX_WALK_ITERATIONS,
        }
    }
}

impl StrokeStitcher {
    /// Convenience wrapper returning only the polyline.
    pub fn line_positions(
        &self,
        mesh: &PaintMesh,
        camera: Vec3,
        start: &RaycastData,
        end: &RaycastData,
        tex_size: Vec2,
        pointer: PointerId,
        can_retry: bool,
    ) -> Vec<Vec2> {
        self.stitch(mesh, camera, start, end, tex_size, pointer, can_retry)
            .points
    }

    /// Stitch a segment between two raycast hits into a UV polyline.
    ///
    /// Output coordinates are scaled by `tex_size` into texture pixels. Two
    /// hits on the same triangle short-circuit to `[start, end]`.
    pub fn stitch(
        &self,
        mesh: &PaintMesh,
        camera: Vec3,
        start: &RaycastData,
        end: &RaycastData,
        tex_size: Vec2,
        pointer: PointerId,
        can_retry: bool,
    ) -> StitchedLine {
        let mut points = vec![start.uv_hit * tex_size];
        let mut triangles = vec![start.triangle.id];

        if start.triangle.id == end.triangle.id {
            points.push(end.uv_hit * tex_size);
            return StitchedLine {
                points,
                triangles,
                complete: true,
            };
        }

        // Cutting plane through the camera and both hit points
        let mut normal = (start.world_hit - camera).cross(end.world_hit - camera);
        if normal.length_squared() < 1e-12 {
            // Camera is collinear with the segment; cut along the surface instead
            normal = (end.world_hit - start.world_hit).cross(start.triangle.normal());
        }
        if normal.length_squared() < 1e-12 {
            points.push(end.uv_hit * tex_size);
            return StitchedLine {
                points,
                triangles,
                complete: true,
            };
        }
        let normal = normal.normalize();

        let mut current = start.triangle;
        let mut visited: SmallVec<[u32; 32]> = SmallVec::new();
        visited.push(current.id);

        for _ in 0..self.max_iterations {
            let Some(exit) = plane_exit(&current, camera, normal, end.world_hit) else {
                return self.retry_or_partial(
                    points, triangles, mesh, camera, start, end, tex_size, pointer, can_retry,
                );
            };
            points.push(current.uv_of_point(exit) * tex_size);

            let Some(hit) = self.probe_across(mesh, camera, exit, end.world_hit, current.id) else {
                return self.retry_or_partial(
                    points, triangles, mesh, camera, start, end, tex_size, pointer, can_retry,
                );
            };

            if visited.contains(&hit.triangle.id) {
                debug!(
                    pointer,
                    triangle = hit.triangle.id,
                    "stitch walk revisited a triangle, aborting"
                );
                return StitchedLine {
                    points,
                    triangles,
                    complete: false,
                };
            }
            visited.push(hit.triangle.id);
            triangles.push(hit.triangle.id);

            // Entry UV: the same boundary point, in the new triangle's UV island
            points.push(hit.triangle.uv_of_point(exit) * tex_size);

            if hit.triangle.id == end.triangle.id {
                points.push(end.uv_hit * tex_size);
                return StitchedLine {
                    points,
                    triangles,
                    complete: true,
                };
            }

            current = hit.triangle;
        }

        debug!(pointer, "stitch walk hit the iteration cap");
        StitchedLine {
            points,
            triangles,
            complete: false,
        }
    }

    /// Find the triangle on the far side of a boundary by stepping a probe
    /// point past it and casting back from the camera. The step doubles a few
    /// times in case the probe lands on the near side again.
    fn probe_across(
        &self,
        mesh: &PaintMesh,
        camera: Vec3,
        exit: Vec3,
        toward: Vec3,
        current_id: u32,
    ) -> Option<RaycastData> {
        let dir = (toward - exit).normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }

        let mut step = self.step_offset;
        for _ in 0..4 {
            let probe = exit + dir * step;
            let ray = Ray::new(camera, probe - camera);
            match raycast_mesh(mesh, &ray) {
                Some((hit, _)) if hit.triangle.id != current_id => return Some(hit),
                Some(_) => step *= 2.0,
                None => return None,
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn retry_or_partial(
        &self,
        partial: Vec<Vec2>,
        triangles: Vec<u32>,
        mesh: &PaintMesh,
        camera: Vec3,
        start: &RaycastData,
        end: &RaycastData,
        tex_size: Vec2,
        pointer: PointerId,
        can_retry: bool,
    ) -> StitchedLine {
        if can_retry {
            debug!(pointer, "stitch walk lost the surface, retrying reversed");
            let mut reversed = self.stitch(mesh, camera, end, start, tex_size, pointer, false);
            reversed.points.reverse();
            return reversed;
        }
        warn!(
            pointer,
            points = partial.len(),
            "stitch walk failed in both directions, returning partial polyline"
        );
        StitchedLine {
            points: partial,
            triangles,
            complete: false,
        }
    }
}

/// Intersect the cutting plane with the triangle's edges and pick the
/// crossing closest to the walk target.
fn plane_exit(tri: &Triangle, plane_origin: Vec3, plane_normal: Vec3, toward: Vec3) -> Option<Vec3> {
    let mut best: Option<(Vec3, f32)> = None;
    for i in 0..3 {
        let a = tri.positions[i];
        let b = tri.positions[(i + 1) % 3];
        let da = plane_normal.dot(a - plane_origin);
        let db = plane_normal.dot(b - plane_origin);
        if da * db > 0.0 {
            continue;
        }
        let denom = da - db;
        if denom.abs() < f32::EPSILON {
            continue;
        }
        let t = (da / denom).clamp(0.0, 1.0);
        let p = a + (b - a) * t;
        let d = p.distance_squared(toward);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((p, d));
        }
    }
    best.map(|(p, _)| p)
}
