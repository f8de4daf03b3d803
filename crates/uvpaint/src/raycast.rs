//! Ray-mesh intersection and the per-frame raycast service.
//!
//! Intersection uses the Moller-Trumbore algorithm. The [`RaycastService`]
//! batches all (sender, pointer) requests raised during a frame, resolves
//! them in one `tick`, and hands each sender at most one response: a request
//! only hits when the globally nearest intersection across *every* registered
//! mesh belongs to the requesting sender, so one surface cannot paint through
//! another that the camera is actually facing.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use rayon::prelude::*;
use tracing::debug;

use crate::mesh::PaintMesh;
use crate::types::{PointerId, Ray, RaycastData, SurfaceId, Triangle};

/// Epsilon for floating point comparisons in ray intersection
const EPSILON: f32 = 1e-6;

/// Result of a ray-triangle intersection test
#[derive(Debug, Clone, Copy)]
pub struct TriangleHit {
    /// Distance along the ray to the intersection point
    pub t: f32,
    /// Barycentric coordinate u (weight for vertex 1)
    pub u: f32,
    /// Barycentric coordinate v (weight for vertex 2)
    pub v: f32,
}

/// Moller-Trumbore ray-triangle intersection.
///
/// Returns the hit distance and barycentric coordinates if the ray intersects
/// the triangle in front of its origin.
pub fn ray_triangle_intersection(
    ray_origin: Vec3,
    ray_dir: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
) -> Option<TriangleHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let pvec = ray_dir.cross(edge2);
    let det = edge1.dot(pvec);

    // Near-zero determinant: ray lies in the triangle plane or misses
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = ray_origin - v0;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = ray_dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    if t < EPSILON {
        return None;
    }

    Some(TriangleHit { t, u, v })
}

/// Test one triangle, producing full hit data (world point + interpolated UV)
pub fn raycast_triangle(tri: &Triangle, ray: &Ray) -> Option<(RaycastData, f32)> {
    let hit = ray_triangle_intersection(
        ray.origin,
        ray.dir,
        tri.positions[0],
        tri.positions[1],
        tri.positions[2],
    )?;
    let bary = Vec3::new(1.0 - hit.u - hit.v, hit.u, hit.v);
    Some((
        RaycastData {
            triangle: *tri,
            world_hit: ray.point_at(hit.t),
            uv_hit: tri.uv_at(bary),
        },
        hit.t,
    ))
}

/// Closest hit against a whole mesh, with a bounding-volume pre-reject.
pub fn raycast_mesh(mesh: &PaintMesh, ray: &Ray) -> Option<(RaycastData, f32)> {
    if !mesh.ray_touches_bounds(ray) {
        return None;
    }
    closest_of(mesh.triangles().iter(), ray)
}

/// Closest hit restricted to the given triangle ids.
///
/// Used when refining a line: only the triangles touched by the previous
/// walk need to be tested.
pub fn raycast_mesh_subset(mesh: &PaintMesh, ray: &Ray, ids: &[u32]) -> Option<(RaycastData, f32)> {
    closest_of(ids.iter().filter_map(|&id| mesh.triangle(id)), ray)
}

fn closest_of<'a>(
    triangles: impl Iterator<Item = &'a Triangle>,
    ray: &Ray,
) -> Option<(RaycastData, f32)> {
    let mut closest: Option<(RaycastData, f32)> = None;
    for tri in triangles {
        if let Some((data, t)) = raycast_triangle(tri, ray) {
            if closest.as_ref().is_none_or(|&(_, best)| t < best) {
                closest = Some((data, t));
            }
        }
    }
    closest
}

/// One mesh registered with the service, tagged with its owning sender.
pub struct RegisteredMesh {
    pub sender: SurfaceId,
    pub mesh: PaintMesh,
}

/// A hit attributed to the sender whose mesh produced it.
#[derive(Debug, Clone, Copy)]
pub struct GlobalHit {
    pub sender: SurfaceId,
    pub data: RaycastData,
    pub t: f32,
}

/// Execution strategy for the per-frame intersection work.
///
/// Both implementations are synchronous: results never cross a frame
/// boundary. The contract is the globally nearest hit across all meshes,
/// with ties broken by registration order.
pub trait RaycastStrategy: Send + Sync {
    fn closest_hit(&self, meshes: &[RegisteredMesh], ray: &Ray) -> Option<GlobalHit>;
}

/// Plain CPU loop over every registered mesh.
pub struct SequentialRaycast;

impl RaycastStrategy for SequentialRaycast {
    fn closest_hit(&self, meshes: &[RegisteredMesh], ray: &Ray) -> Option<GlobalHit> {
        let mut best: Option<GlobalHit> = None;
        for reg in meshes {
            if let Some((data, t)) = raycast_mesh(&reg.mesh, ray) {
                // Strict comparison: the earlier registered mesh wins ties
                if best.as_ref().is_none_or(|b| t < b.t) {
                    best = Some(GlobalHit {
                        sender: reg.sender,
                        data,
                        t,
                    });
                }
            }
        }
        best
    }
}

/// Batched variant: per-mesh intersection tests fan out across rayon workers
/// and are joined before this call returns.
pub struct ParallelRaycast;

impl RaycastStrategy for ParallelRaycast {
    fn closest_hit(&self, meshes: &[RegisteredMesh], ray: &Ray) -> Option<GlobalHit> {
        meshes
            .par_iter()
            .enumerate()
            .filter_map(|(order, reg)| {
                raycast_mesh(&reg.mesh, ray).map(|(data, t)| {
                    (
                        order,
                        GlobalHit {
                            sender: reg.sender,
                            data,
                            t,
                        },
                    )
                })
            })
            .min_by(|(ia, a), (ib, b)| {
                a.t.partial_cmp(&b.t)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ia.cmp(ib))
            })
            .map(|(_, hit)| hit)
    }
}

/// Token handed back by [`RaycastService::request_raycast`].
#[derive(Debug, Clone, Copy)]
pub struct PendingRaycast {
    seq: u64,
    pub sender: SurfaceId,
    pub pointer: PointerId,
}

struct Request {
    seq: u64,
    sender: SurfaceId,
    pointer: PointerId,
    ray: Ray,
    refine: bool,
}

/// Batches raycast requests per frame and arbitrates hits between surfaces.
pub struct RaycastService {
    meshes: Vec<RegisteredMesh>,
    strategy: Box<dyn RaycastStrategy>,
    pending: Vec<Request>,
    responses: HashMap<u64, Option<RaycastData>>,
    /// Triangles touched by the most recent stitch walk, per (sender, pointer).
    walk_cache: HashMap<(SurfaceId, PointerId), Vec<u32>>,
    next_seq: u64,
}

impl Default for RaycastService {
    fn default() -> Self {
        Self::new()
    }
}

impl RaycastService {
    /// Service with the sequential strategy
    pub fn new() -> Self {
        Self::with_strategy(Box::new(SequentialRaycast))
    }

    pub fn with_strategy(strategy: Box<dyn RaycastStrategy>) -> Self {
        Self {
            meshes: Vec::new(),
            strategy,
            pending: Vec::new(),
            responses: HashMap::new(),
            walk_cache: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Register a mesh for a sender. Registration order is stable and breaks
    /// closest-hit ties.
    pub fn register_mesh(&mut self, sender: SurfaceId, mesh: PaintMesh) {
        self.meshes.push(RegisteredMesh { sender, mesh });
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Meshes belonging to one sender, in registration order
    pub fn meshes_of(&self, sender: SurfaceId) -> impl Iterator<Item = &PaintMesh> {
        self.meshes
            .iter()
            .filter(move |reg| reg.sender == sender)
            .map(|reg| &reg.mesh)
    }

    /// Queue a raycast for resolution at the next [`tick`](Self::tick).
    ///
    /// A second request for the same (sender, pointer) in one frame replaces
    /// the first and returns the same token. When `prev_screen_pos` is given
    /// the request is treated as a line refinement and the triangles of the
    /// pointer's last stitch walk are tested first.
    pub fn request_raycast(
        &mut self,
        sender: SurfaceId,
        pointer: PointerId,
        ray: Ray,
        prev_screen_pos: Option<Vec2>,
        _screen_pos: Vec2,
    ) -> PendingRaycast {
        let refine = prev_screen_pos.is_some();
        if let Some(existing) = self
            .pending
            .iter_mut()
            .find(|r| r.sender == sender && r.pointer == pointer)
        {
            existing.ray = ray;
            existing.refine = refine;
            return PendingRaycast {
                seq: existing.seq,
                sender,
                pointer,
            };
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Request {
            seq,
            sender,
            pointer,
            ray,
            refine,
        });
        PendingRaycast {
            seq,
            sender,
            pointer,
        }
    }

    /// Resolve every pending request. Unclaimed responses from the previous
    /// frame are dropped first; nothing survives a frame boundary.
    pub fn tick(&mut self) {
        self.responses.clear();

        let requests = std::mem::take(&mut self.pending);
        for req in requests {
            // Refinement fast path: the subset touched by the last walk.
            // The subset only narrows the sender's own search; the hit still
            // has to win occlusion against every other sender's meshes.
            if req.refine {
                if let Some(ids) = self.walk_cache.get(&(req.sender, req.pointer)) {
                    let subset_hit = self
                        .meshes
                        .iter()
                        .filter(|reg| reg.sender == req.sender)
                        .find_map(|reg| raycast_mesh_subset(&reg.mesh, &req.ray, ids));
                    if let Some((data, t)) = subset_hit {
                        let occluded = self.meshes.iter().any(|reg| {
                            reg.sender != req.sender
                                && raycast_mesh(&reg.mesh, &req.ray)
                                    .is_some_and(|(_, other)| other < t)
                        });
                        if !occluded {
                            self.responses.insert(req.seq, Some(data));
                            continue;
                        }
                    }
                }
            }

            let hit = self.strategy.closest_hit(&self.meshes, &req.ray);
            let response = match hit {
                Some(h) if h.sender == req.sender => Some(h.data),
                Some(h) => {
                    debug!(
                        requested = req.sender.0,
                        occluded_by = h.sender.0,
                        "raycast occluded by a nearer surface"
                    );
                    None
                }
                None => None,
            };
            self.responses.insert(req.seq, response);
        }
    }

    /// Claim the response for a pending token. Returns `None` both for a miss
    /// and for a token from a frame that was never resolved.
    pub fn try_get_response(&mut self, pending: &PendingRaycast) -> Option<RaycastData> {
        self.responses.remove(&pending.seq).flatten()
    }

    /// Synchronous raycast against only the sender's own meshes.
    pub fn raycast_local(&self, sender: SurfaceId, ray: &Ray) -> Option<RaycastData> {
        let mut best: Option<(RaycastData, f32)> = None;
        for reg in self.meshes.iter().filter(|r| r.sender == sender) {
            if let Some((data, t)) = raycast_mesh(&reg.mesh, ray) {
                if best.as_ref().is_none_or(|&(_, bt)| t < bt) {
                    best = Some((data, t));
                }
            }
        }
        best.map(|(data, _)| data)
    }

    /// Synchronous raycast restricted to a triangle subset of one sender.
    pub fn raycast_local_subset(
        &self,
        sender: SurfaceId,
        ray: &Ray,
        ids: &[u32],
    ) -> Option<RaycastData> {
        self.meshes
            .iter()
            .filter(|r| r.sender == sender)
            .find_map(|reg| raycast_mesh_subset(&reg.mesh, ray, ids))
            .map(|(data, _)| data)
    }

    /// Record the triangles a stitch walk touched, enabling the refinement
    /// fast path for this pointer's next request.
    pub fn note_line_triangles(&mut self, sender: SurfaceId, pointer: PointerId, ids: Vec<u32>) {
        self.walk_cache.insert((sender, pointer), ids);
    }

    /// Drop a pointer's refinement cache (stroke ended).
    pub fn clear_line_triangles(&mut self, sender: SurfaceId, pointer: PointerId) {
        self.walk_cache.remove(&(sender, pointer));
    }
}
