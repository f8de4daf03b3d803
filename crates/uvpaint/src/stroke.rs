//! Per-pointer stroke accumulation.
//!
//! Each pointer slot owns a [`StrokeState`] for the whole session; the state
//! is reset in place on stroke finish, never reallocated. [`LineData`] keeps
//! only the short history needed to emit the next stamp or line segment.

use glam::Vec2;
use smallvec::SmallVec;

use crate::types::RaycastData;

/// Bounded history of recent stroke samples.
///
/// Capacity is 3 positions for mesh targets (so smoothing sees up to four
/// points, the capacity plus the newest sample) and 1 for flat canvases (the
/// live segment). A push may hold capacity + 1 entries until the renderer
/// consumes the pending segment and calls [`LineData::trim`].
#[derive(Debug, Clone)]
pub struct LineData {
    raycasts: SmallVec<[RaycastData; 2]>,
    paint_positions: SmallVec<[Vec2; 4]>,
    brush_sizes: SmallVec<[f32; 4]>,
    capacity: usize,
    /// Positions recorded over the whole stroke, ignoring trims
    total_pushed: usize,
}

impl LineData {
    pub fn new(capacity: usize) -> Self {
        Self {
            raycasts: SmallVec::new(),
            paint_positions: SmallVec::new(),
            brush_sizes: SmallVec::new(),
            capacity: capacity.max(1),
            total_pushed: 0,
        }
    }

    /// Record a raycast hit, keeping only the last two
    pub fn push_raycast(&mut self, hit: RaycastData) {
        self.raycasts.push(hit);
        while self.raycasts.len() > 2 {
            self.raycasts.remove(0);
        }
    }

    /// Record a paint-space position and its brush size. The history may
    /// exceed capacity by one entry until the next [`trim`](Self::trim).
    pub fn push_position(&mut self, pos: Vec2, brush_size: f32) {
        self.paint_positions.push(pos);
        self.brush_sizes.push(brush_size);
        self.total_pushed += 1;
        while self.paint_positions.len() > self.capacity + 1 {
            self.paint_positions.remove(0);
            self.brush_sizes.remove(0);
        }
    }

    /// Drop the oldest entries down to capacity, once the pending segment
    /// has been rendered.
    pub fn trim(&mut self) {
        while self.paint_positions.len() > self.capacity {
            self.paint_positions.remove(0);
            self.brush_sizes.remove(0);
        }
    }

    pub fn raycasts(&self) -> &[RaycastData] {
        &self.raycasts
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.paint_positions
    }

    pub fn sizes(&self) -> &[f32] {
        &self.brush_sizes
    }

    pub fn len(&self) -> usize {
        self.paint_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paint_positions.is_empty()
    }

    /// Most recent position, if any
    pub fn latest(&self) -> Option<Vec2> {
        self.paint_positions.last().copied()
    }

    /// Positions recorded since the last clear, counting trimmed ones
    pub fn total_pushed(&self) -> usize {
        self.total_pushed
    }

    pub fn clear(&mut self) {
        self.raycasts.clear();
        self.paint_positions.clear();
        self.brush_sizes.clear();
        self.total_pushed = 0;
    }
}

/// Transient per-pointer painting state.
#[derive(Debug, Clone)]
pub struct StrokeState {
    pub pressure: f32,
    /// Raw screen position of the pointer
    pub screen_pos: Option<Vec2>,
    /// Normalized surface-local position (UV for meshes, 0..1 for canvases)
    pub local_pos: Option<Vec2>,
    /// Position in texture-pixel space
    pub paint_pos: Option<Vec2>,
    pub in_bounds: bool,
    pub is_painting: bool,
    pub is_painting_done: bool,
    /// Set when a new sample arrived since the last render
    pub moved: bool,
    pub line: LineData,
}

impl StrokeState {
    pub fn new(line_capacity: usize) -> Self {
        Self {
            pressure: 0.0,
            screen_pos: None,
            local_pos: None,
            paint_pos: None,
            in_bounds: false,
            is_painting: false,
            is_painting_done: false,
            moved: false,
            line: LineData::new(line_capacity),
        }
    }

    /// Reset every transient field in place. The line capacity survives.
    pub fn reset(&mut self) {
        self.pressure = 0.0;
        self.screen_pos = None;
        self.local_pos = None;
        self.paint_pos = None;
        self.in_bounds = false;
        self.is_painting = false;
        self.is_painting_done = false;
        self.moved = false;
        self.line.clear();
    }
}
