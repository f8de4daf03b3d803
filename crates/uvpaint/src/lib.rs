//! uvpaint - surface-stroke painting pipeline
//!
//! Turns pointer input into brush strokes on the UV-mapped texture of a 3D
//! mesh (or a flat canvas), with layering and undo hooks:
//! - [`raycast`] - Per-frame batched screen-ray to triangle/UV resolution
//! - [`stitch`] - Walking stroke segments across triangle boundaries
//! - [`surface`] - Per-pointer stroke state machines and frame orchestration
//! - [`renderer`] - Stroke polylines to rotated quad strips on named targets
//! - [`layers`] - Ordered layer stack with merging and external undo
//! - [`gpu`] - The backend seam everything renders through
//! - [`brush`] / [`tool`] - Brush resources and per-tool render policies

pub mod brush;
pub mod config;
pub mod constants;
pub mod events;
pub mod gpu;
pub mod layers;
pub mod mesh;
pub mod raycast;
pub mod renderer;
pub mod stitch;
pub mod stroke;
pub mod surface;
pub mod tool;
pub mod types;

pub use brush::*;
pub use config::*;
pub use constants::*;
pub use events::*;
pub use gpu::*;
pub use layers::*;
pub use mesh::*;
pub use raycast::*;
pub use renderer::*;
pub use stitch::*;
pub use stroke::*;
pub use surface::*;
pub use tool::*;
pub use types::*;
