/// Hard cap on cross-triangle walk steps. Raising this does not fix bad
/// topology, it only burns more time on it.
pub const MAX_WALK_ITERATIONS: usize = 512;

/// Hard cap on quads emitted for a single line render.
pub const MAX_LINE_QUADS: usize = 16384;

/// Effective pressure floor. Keeps stamps from collapsing to zero-size geometry.
pub const PRESSURE_MIN: f32 = 0.01;

/// Effective pressure ceiling.
pub const PRESSURE_MAX: f32 = 10.0;

/// World-space offset used to step a walk probe past a triangle boundary.
pub const WALK_STEP_OFFSET: f32 = 1e-3;

/// Margin applied to mesh bounds before the cheap ray reject.
pub const BOUNDS_EPSILON: f32 = 1e-4;

/// Quad spacing along a line, as a fraction of brush diameter.
pub const QUAD_SPACING_RATIO: f32 = 0.25;

/// Pixel length of one smoothing sub-segment.
pub const SMOOTHING_SEGMENT_LENGTH: f32 = 10.0;
