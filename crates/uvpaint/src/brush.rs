//! Brush resource and pressure handling.

use serde::{Deserialize, Serialize};

use crate::constants::{PRESSURE_MAX, PRESSURE_MIN};
use crate::gpu::TextureHandle;

/// Clamp raw input pressure into the effective range.
///
/// The floor guarantees pressure never renders as zero-size geometry.
pub fn effective_pressure(pressure: f32) -> f32 {
    pressure.clamp(PRESSURE_MIN, PRESSURE_MAX)
}

/// Shapes how brush size interpolates between the ends of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PressureCurve {
    #[default]
    Linear,
    /// Ease-in: thin tails, full body
    Squared,
    /// Ease-out: full tails, thin body
    Sqrt,
}

impl PressureCurve {
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::Squared => t * t,
            Self::Sqrt => t.sqrt(),
        }
    }
}

/// The brush resource handed to every draw call.
///
/// The stamp texture and the material behind it are owned by the host; the
/// pipeline only routes this description into the backend.
#[derive(Debug, Clone)]
pub struct Brush {
    /// Stamp texture used for every quad
    pub stamp: TextureHandle,
    /// Diameter in texture pixels at pressure 1
    pub size: f32,
    /// Offset added to the stamp position, in texture pixels
    pub render_offset: f32,
    /// Whether a hover preview quad is drawn for this brush
    pub preview: bool,
    /// RGBA color applied in the colorize pass
    pub color: [f32; 4],
    /// Randomize each quad's rotation along a line
    pub rotation_jitter: bool,
    pub pressure_curve: PressureCurve,
}

impl Brush {
    pub fn new(stamp: TextureHandle, size: f32) -> Self {
        Self {
            stamp,
            size,
            render_offset: 0.0,
            preview: true,
            color: [0.0, 0.0, 0.0, 1.0],
            rotation_jitter: false,
            pressure_curve: PressureCurve::Linear,
        }
    }

    /// Brush diameter for a given raw pressure
    pub fn scaled_size(&self, pressure: f32) -> f32 {
        self.size * effective_pressure(pressure)
    }
}
