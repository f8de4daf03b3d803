//! Per-tool rendering policy.
//!
//! A [`ToolPolicy`] decides which render targets a tool's ink reaches,
//! whether strokes stage through the `Input` buffer before baking into the
//! active layer, and how the stroke is smoothed. Policies come from an
//! explicit factory keyed by [`PaintMode`]; there is no runtime discovery.

use serde::{Deserialize, Serialize};

use crate::types::BlendMode;

/// Available painting tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaintMode {
    /// Direct painting into the active layer
    Brush,
    /// Staged erasing, previewed before it commits
    Erase,
    /// Staged region marking that never bakes into a layer
    Selection,
}

/// Rendering rules for one tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolPolicy {
    pub mode: PaintMode,
    /// Ink is written into the active layer texture
    pub render_to_layer: bool,
    /// Ink is written into the staged `Input` target
    pub render_to_input: bool,
    /// Draw a hover preview quad when no pointer is painting
    pub show_preview: bool,
    /// The active layer is viewed through its Input blend while the stroke
    /// is uncommitted, and `Input` is baked into it on finish
    pub use_paint_input: bool,
    /// Blend mode applied to the brush material
    pub blend: BlendMode,
    /// 1 = raw segments; >1 enables curve interpolation on mesh targets
    pub smoothing: u32,
    /// Whether finishing a stroke counts as a completed edit (undo snapshot)
    pub processing_finished: bool,
    /// Whether the tool may emit multi-point line geometry
    pub allow_lines: bool,
}

impl ToolPolicy {
    /// Static registry mapping each mode to its policy.
    pub fn for_mode(mode: PaintMode) -> Self {
        match mode {
            PaintMode::Brush => Self {
                mode,
                render_to_layer: true,
                render_to_input: false,
                show_preview: true,
                use_paint_input: false,
                blend: BlendMode::Normal,
                smoothing: 3,
                processing_finished: true,
                allow_lines: true,
            },
            PaintMode::Erase => Self {
                mode,
                render_to_layer: false,
                render_to_input: true,
                show_preview: true,
                use_paint_input: true,
                blend: BlendMode::Erase,
                smoothing: 1,
                processing_finished: true,
                allow_lines: true,
            },
            PaintMode::Selection => Self {
                mode,
                render_to_layer: false,
                render_to_input: true,
                show_preview: false,
                use_paint_input: false,
                blend: BlendMode::Normal,
                smoothing: 1,
                processing_finished: false,
                allow_lines: true,
            },
        }
    }
}
