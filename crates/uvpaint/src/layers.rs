//! Ordered, undoable layer stack.
//!
//! The stack owns every layer's GPU texture for the surface's lifetime.
//! Invalid operations (removing the last layer, out-of-range indices) are
//! logged and ignored rather than raised: this code runs inside an
//! interactive frame loop.
//!
//! Undo storage is external. The stack only calls
//! [`UndoController::save_state`] at commit points; the host restores layer
//! textures itself and then asks the surface to re-render.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::EventRegistry;
use crate::gpu::{GpuBackend, TextureHandle};
use crate::renderer::Renderer;
use crate::types::PaintError;

/// External undo integration point.
pub trait UndoController {
    /// Snapshot the current layer textures.
    fn save_state(&mut self);
}

/// Stand-in for hosts without undo.
pub struct NullUndo;

impl UndoController for NullUndo {
    fn save_state(&mut self) {}
}

/// Notifications emitted on stack mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerEvent {
    Changed,
    ActiveChanged(usize),
}

/// Serializable layer description for the external persistence collaborator.
///
/// Pixel contents travel separately (the host blits them through the
/// backend); this is only the stack structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerData {
    pub name: String,
    pub enabled: bool,
    pub mask_enabled: bool,
    pub opacity: f32,
}

/// One paintable layer.
pub struct Layer {
    pub name: String,
    pub enabled: bool,
    pub mask_enabled: bool,
    /// Compositing opacity in [0, 1]
    pub opacity: f32,
    texture: TextureHandle,
    mask: Option<TextureHandle>,
    /// Texture this layer was seeded from, owned elsewhere
    pub source: Option<TextureHandle>,
}

impl Layer {
    fn create<G: GpuBackend>(
        gpu: &mut G,
        width: u32,
        height: u32,
        name: &str,
        source: Option<TextureHandle>,
    ) -> Self {
        let texture = gpu.create_texture(width, height, name);
        if let Some(src) = source {
            gpu.blit(src, texture);
        }
        Self {
            name: name.to_owned(),
            enabled: true,
            mask_enabled: false,
            opacity: 1.0,
            texture,
            mask: None,
            source,
        }
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// The mask applied during compositing, if present and enabled
    pub fn active_mask(&self) -> Option<TextureHandle> {
        self.mask_enabled.then_some(self.mask).flatten()
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    fn release<G: GpuBackend>(&mut self, gpu: &mut G) {
        gpu.release_texture(self.texture);
        if let Some(mask) = self.mask.take() {
            gpu.release_texture(mask);
        }
    }
}

/// Ordered collection of layers with an active index.
///
/// Index 0 is the bottom of the stack; compositing runs bottom-to-top.
/// The stack is never empty and `active < len()` holds after every mutation.
pub struct LayerStack {
    layers: Vec<Layer>,
    active: usize,
    width: u32,
    height: u32,
    is_merging: bool,
    pub events: EventRegistry<LayerEvent>,
}

impl LayerStack {
    /// Create a stack with one initial layer.
    pub fn new<G: GpuBackend>(gpu: &mut G, width: u32, height: u32) -> Result<Self, PaintError> {
        if width == 0 || height == 0 {
            return Err(PaintError::InvalidTextureSize { width, height });
        }
        let first = Layer::create(gpu, width, height, "Layer 1", None);
        Ok(Self {
            layers: vec![first],
            active: 0,
            width,
            height,
            is_merging: false,
            events: EventRegistry::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active]
    }

    /// Append a layer on top of the stack and make it active.
    pub fn add_new_layer<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        name: &str,
        source: Option<TextureHandle>,
    ) -> usize {
        let layer = Layer::create(gpu, self.width, self.height, name, source);
        self.layers.push(layer);
        self.active = self.layers.len() - 1;
        debug!(name, index = self.active, "added layer");
        self.notify_changed();
        self.active
    }

    /// Remove a layer. Removing the last remaining layer or an out-of-range
    /// index is a logged no-op.
    pub fn remove_layer<G: GpuBackend>(&mut self, gpu: &mut G, index: usize) {
        if self.layers.len() <= 1 {
            warn!("ignoring removal of the last remaining layer");
            return;
        }
        if index >= self.layers.len() {
            warn!(index, count = self.layers.len(), "layer index out of range");
            return;
        }

        let mut removed = self.layers.remove(index);
        removed.release(gpu);

        // Keep the active index on the same layer where possible
        if index < self.active || self.active >= self.layers.len() {
            self.active = self.active.saturating_sub(1);
        }
        self.notify_changed();
    }

    /// Change the active layer. Out-of-range indices are ignored.
    pub fn set_active_layer(&mut self, index: usize) {
        if index >= self.layers.len() {
            warn!(index, count = self.layers.len(), "layer index out of range");
            return;
        }
        self.active = index;
        if !self.is_merging {
            self.events.emit(&LayerEvent::ActiveChanged(index));
        }
    }

    /// Create (or re-enable) the active layer's mask.
    pub fn add_layer_mask<G: GpuBackend>(&mut self, gpu: &mut G) {
        let width = self.width;
        let height = self.height;
        let layer = &mut self.layers[self.active];
        if layer.mask.is_none() {
            let label = format!("{} mask", layer.name);
            layer.mask = Some(gpu.create_texture(width, height, &label));
        }
        layer.mask_enabled = true;
        self.notify_changed();
    }

    /// Remove the active layer's mask, releasing its texture.
    pub fn remove_mask<G: GpuBackend>(&mut self, gpu: &mut G) {
        let layer = &mut self.layers[self.active];
        if let Some(mask) = layer.mask.take() {
            gpu.release_texture(mask);
        }
        layer.mask_enabled = false;
        self.notify_changed();
    }

    /// A layer may be disabled only while some other layer stays enabled.
    pub fn can_disable_layer(&self, index: usize) -> bool {
        self.layers
            .iter()
            .enumerate()
            .any(|(i, l)| i != index && l.enabled)
    }

    /// Toggle a layer, refusing to disable the last enabled one.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        if index >= self.layers.len() {
            warn!(index, count = self.layers.len(), "layer index out of range");
            return;
        }
        if !enabled && !self.can_disable_layer(index) {
            warn!(index, "refusing to disable the last enabled layer");
            return;
        }
        self.layers[index].enabled = enabled;
        self.notify_changed();
    }

    /// Merge the active layer into its neighbor below.
    ///
    /// The composite of exactly those two layers replaces the lower one, the
    /// upper is removed, the result's opacity resets to 1, and an undo
    /// snapshot is forced. Change notifications are suppressed for the
    /// duration.
    pub fn merge_layers<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        renderer: &mut Renderer,
        undo: &mut dyn UndoController,
    ) {
        if self.layers.len() < 2 {
            warn!("merge requires at least two layers");
            return;
        }
        if self.active == 0 {
            warn!("active layer has no layer below it");
            return;
        }

        self.is_merging = true;
        let lower = self.active - 1;

        let saved: Vec<bool> = self.layers.iter().map(|l| l.enabled).collect();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.enabled = i == lower || i == self.active;
        }

        // Composite through scratch; the lower texture is also a source
        let scratch = renderer.targets().combined_temp;
        renderer.composite_to(gpu, &self.layers, scratch);
        gpu.blit(scratch, self.layers[lower].texture);

        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.enabled = saved[i];
        }

        let mut removed = self.layers.remove(self.active);
        removed.release(gpu);
        self.active = lower;
        self.layers[lower].opacity = 1.0;

        self.is_merging = false;
        undo.save_state();
        self.notify_changed();
    }

    /// Flatten every layer into the bottom one.
    pub fn merge_all_layers<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        renderer: &mut Renderer,
        undo: &mut dyn UndoController,
    ) {
        if self.layers.len() < 2 {
            warn!("merge requires at least two layers");
            return;
        }

        self.is_merging = true;

        let scratch = renderer.targets().combined_temp;
        renderer.composite_to(gpu, &self.layers, scratch);
        gpu.blit(scratch, self.layers[0].texture);

        for mut layer in self.layers.drain(1..).collect::<Vec<_>>() {
            layer.release(gpu);
        }
        self.active = 0;
        self.layers[0].opacity = 1.0;

        self.is_merging = false;
        undo.save_state();
        self.notify_changed();
    }

    /// Structure snapshot for the persistence collaborator.
    pub fn get_layers_data(&self) -> Vec<LayerData> {
        self.layers
            .iter()
            .map(|l| LayerData {
                name: l.name.clone(),
                enabled: l.enabled,
                mask_enabled: l.mask_enabled,
                opacity: l.opacity,
            })
            .collect()
    }

    /// Rebuild the stack from persisted structure, allocating fresh
    /// textures. Pixel contents are restored separately by the host.
    pub fn set_layers_data<G: GpuBackend>(&mut self, gpu: &mut G, data: &[LayerData]) {
        if data.is_empty() {
            warn!("ignoring empty layer data");
            return;
        }

        for layer in &mut self.layers {
            layer.release(gpu);
        }
        self.layers.clear();

        for entry in data {
            let mut layer = Layer::create(gpu, self.width, self.height, &entry.name, None);
            layer.enabled = entry.enabled;
            layer.opacity = entry.opacity.clamp(0.0, 1.0);
            if entry.mask_enabled {
                let label = format!("{} mask", entry.name);
                layer.mask = Some(gpu.create_texture(self.width, self.height, &label));
                layer.mask_enabled = true;
            }
            self.layers.push(layer);
        }
        self.active = self.active.min(self.layers.len() - 1);
        self.notify_changed();
    }

    /// Release every owned texture. The stack must not be used afterwards.
    pub fn dispose<G: GpuBackend>(&mut self, gpu: &mut G) {
        for layer in &mut self.layers {
            layer.release(gpu);
        }
        self.layers.clear();
        self.active = 0;
    }

    fn notify_changed(&mut self) {
        if !self.is_merging {
            self.events.emit(&LayerEvent::Changed);
        }
    }
}
