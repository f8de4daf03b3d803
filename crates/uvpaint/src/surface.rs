//! Paintable surface orchestration.
//!
//! A [`PaintSurface`] ties the whole pipeline together: it owns the layer
//! stack and renderer for one paint target, tracks a [`StrokeState`] per
//! pointer, routes mesh input through the shared [`RaycastService`], and
//! stitches cross-triangle segments before they reach the renderer.
//!
//! The host drives three phases per frame: forward pointer events, tick the
//! raycast service once, then tick each surface. All per-frame collaborators
//! arrive through [`FrameCtx`]; nothing here reaches for globals.

use glam::{Vec2, Vec3};
use tracing::{debug, warn};

use crate::brush::Brush;
use crate::config::PaintConfig;
use crate::constants::SMOOTHING_SEGMENT_LENGTH;
use crate::events::{EventRegistry, Subscription};
use crate::gpu::GpuBackend;
use crate::layers::{LayerStack, NullUndo, UndoController};
use crate::raycast::{PendingRaycast, RaycastService};
use crate::renderer::Renderer;
use crate::stitch::StrokeStitcher;
use crate::stroke::StrokeState;
use crate::tool::{PaintMode, ToolPolicy};
use crate::types::{PaintError, PointerId, Ray, SurfaceId};

/// Per-frame collaborators borrowed from the host.
pub struct FrameCtx<'a, G: GpuBackend> {
    pub gpu: &'a mut G,
    pub raycast: &'a mut RaycastService,
    /// World-space camera position, used as the stitch cutting-plane origin
    pub camera: Vec3,
}

/// What kind of geometry this surface paints onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// 3D mesh resolved through the raycast service
    Mesh,
    /// Flat screen rectangle mapped directly to texture space
    Canvas,
}

/// Pointer lifecycle phase, as forwarded by the host's input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Hover,
    Down,
    Move,
    Up,
}

/// One input event sample.
#[derive(Debug, Clone, Copy)]
pub struct PointerSample {
    pub phase: PointerPhase,
    pub pointer: PointerId,
    pub screen_pos: Vec2,
    pub pressure: f32,
    /// World ray for this sample; required for mesh surfaces
    pub ray: Option<Ray>,
}

/// Notifications emitted by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Hovered(PointerId),
    PointerDown(PointerId),
    PointerPressed(PointerId),
    StrokeFinished(PointerId),
}

/// One paintable surface and its full painting state.
pub struct PaintSurface {
    id: SurfaceId,
    kind: SurfaceKind,
    config: PaintConfig,
    pub layers: LayerStack,
    pub renderer: Renderer,
    stitcher: StrokeStitcher,
    brush: Brush,
    policy: ToolPolicy,
    undo: Box<dyn UndoController>,
    /// One state per pointer plus a trailing slot for programmatic draws
    states: Vec<StrokeState>,
    pending: Vec<Option<PendingRaycast>>,
    pub events: EventRegistry<SurfaceEvent>,
}

impl PaintSurface {
    pub fn new<G: GpuBackend>(
        gpu: &mut G,
        id: SurfaceId,
        kind: SurfaceKind,
        config: PaintConfig,
        brush: Brush,
    ) -> Result<Self, PaintError> {
        config.validate()?;

        let layers = LayerStack::new(gpu, config.texture_width, config.texture_height)?;
        let renderer = Renderer::new(gpu, config.texture_width, config.texture_height);

        let line_capacity = match kind {
            SurfaceKind::Mesh => 3,
            SurfaceKind::Canvas => 1,
        };
        let slots = config.max_pointers + 1;
        let states = (0..slots).map(|_| StrokeState::new(line_capacity)).collect();

        Ok(Self {
            id,
            kind,
            config,
            layers,
            renderer,
            stitcher: StrokeStitcher::default(),
            brush,
            policy: ToolPolicy::for_mode(PaintMode::Brush),
            undo: Box::new(NullUndo),
            states,
            pending: vec![None; slots],
            events: EventRegistry::new(),
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn config(&self) -> &PaintConfig {
        &self.config
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn tool(&self) -> &ToolPolicy {
        &self.policy
    }

    /// Switch tools. Takes effect for the next stroke; strokes already in
    /// flight keep rendering under the policy they started with only until
    /// the next event, matching how tool switches feel mid-gesture.
    pub fn set_tool(&mut self, mode: PaintMode) {
        self.policy = ToolPolicy::for_mode(mode);
    }

    pub fn set_undo_controller(&mut self, undo: Box<dyn UndoController>) {
        self.undo = undo;
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SurfaceEvent) + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    /// Internal slot reserved for programmatic draw calls.
    fn reserved_slot(&self) -> usize {
        self.config.max_pointers
    }

    fn pointer_state(&mut self, pointer: PointerId) -> Option<usize> {
        if pointer >= self.config.max_pointers {
            warn!(
                pointer,
                max = self.config.max_pointers,
                "pointer id out of range, ignoring event"
            );
            return None;
        }
        Some(pointer)
    }

    /// Forward one pointer event into the state machine.
    ///
    /// Mesh samples queue a raycast that resolves at the next service tick;
    /// canvas samples resolve immediately through the configured screen rect.
    pub fn pointer_event<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>, sample: PointerSample) {
        let Some(slot) = self.pointer_state(sample.pointer) else {
            return;
        };

        match sample.phase {
            PointerPhase::Hover => {
                if self.states[slot].is_painting {
                    return; // drags are handled by Move
                }
                self.sample_surface(ctx, slot, &sample);
                self.events.emit(&SurfaceEvent::Hovered(sample.pointer));
            }
            PointerPhase::Down => {
                let state = &mut self.states[slot];
                state.is_painting = true;
                state.is_painting_done = false;
                self.sample_surface(ctx, slot, &sample);
                self.events.emit(&SurfaceEvent::PointerDown(sample.pointer));
            }
            PointerPhase::Move => {
                let painting = self.states[slot].is_painting;
                self.sample_surface(ctx, slot, &sample);
                if painting {
                    self.events.emit(&SurfaceEvent::PointerPressed(sample.pointer));
                }
            }
            PointerPhase::Up => {
                // An Up with no stroke in flight has nothing to finish
                if self.states[slot].is_painting {
                    self.states[slot].is_painting_done = true;
                }
            }
        }
    }

    /// Hover update for a pointer that is not painting.
    pub fn on_hover<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        pointer: PointerId,
        screen_pos: Vec2,
        ray: Option<Ray>,
    ) {
        self.pointer_event(
            ctx,
            PointerSample {
                phase: PointerPhase::Hover,
                pointer,
                screen_pos,
                pressure: 0.0,
                ray,
            },
        );
    }

    /// Begin a stroke.
    pub fn on_down<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        pointer: PointerId,
        screen_pos: Vec2,
        pressure: f32,
        ray: Option<Ray>,
    ) {
        self.pointer_event(
            ctx,
            PointerSample {
                phase: PointerPhase::Down,
                pointer,
                screen_pos,
                pressure,
                ray,
            },
        );
    }

    /// Continued contact while painting (a drag sample).
    pub fn on_press<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        pointer: PointerId,
        screen_pos: Vec2,
        pressure: f32,
        ray: Option<Ray>,
    ) {
        self.pointer_event(
            ctx,
            PointerSample {
                phase: PointerPhase::Move,
                pointer,
                screen_pos,
                pressure,
                ray,
            },
        );
    }

    /// End a stroke; the finish runs at the next [`tick`](Self::tick).
    pub fn on_up<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        pointer: PointerId,
        screen_pos: Vec2,
    ) {
        self.pointer_event(
            ctx,
            PointerSample {
                phase: PointerPhase::Up,
                pointer,
                screen_pos,
                pressure: 0.0,
                ray: None,
            },
        );
    }

    /// Record a sample, either by queueing a mesh raycast or by mapping the
    /// canvas rectangle directly.
    fn sample_surface<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        slot: usize,
        sample: &PointerSample,
    ) {
        let prev_screen = self.states[slot].screen_pos;
        {
            let state = &mut self.states[slot];
            state.pressure = sample.pressure;
            state.screen_pos = Some(sample.screen_pos);
        }

        match self.kind {
            SurfaceKind::Mesh => {
                let Some(ray) = sample.ray else {
                    warn!(pointer = sample.pointer, "mesh surface sample without a ray");
                    return;
                };
                // Refinement only applies mid-stroke
                let prev = self.states[slot].is_painting.then_some(prev_screen).flatten();
                let token =
                    ctx.raycast
                        .request_raycast(self.id, slot, ray, prev, sample.screen_pos);
                self.pending[slot] = Some(token);
            }
            SurfaceKind::Canvas => {
                let origin = Vec2::from_array(self.config.canvas_origin);
                let size = Vec2::from_array(self.config.canvas_size);
                let local = (sample.screen_pos - origin) / size;
                self.record_input(slot, local, None);
            }
        }
    }

    /// Apply a resolved surface-local position to the pointer's state.
    ///
    /// Positions are only accumulated while painting; hover samples just
    /// track the cursor for the preview.
    fn record_input(
        &mut self,
        slot: usize,
        local: Vec2,
        raycast: Option<crate::types::RaycastData>,
    ) {
        let in_bounds = (0.0..=1.0).contains(&local.x) && (0.0..=1.0).contains(&local.y);
        let paint = local * self.config.texture_size();
        let state = &mut self.states[slot];

        state.local_pos = Some(local);
        state.in_bounds = in_bounds || raycast.is_some();
        if !state.in_bounds {
            return;
        }

        let changed = state.paint_pos != Some(paint);
        state.paint_pos = Some(paint);

        if state.is_painting && changed {
            if let Some(hit) = raycast {
                state.line.push_raycast(hit);
            }
            let size = self.brush.scaled_size(state.pressure);
            state.line.push_position(paint, size);
            state.moved = true;
        }
    }

    /// Resolve queued raycasts, render moved pointers, finish released ones,
    /// and rebuild the presentable composite. Call once per frame, after
    /// [`RaycastService::tick`].
    pub fn tick<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>) {
        for slot in 0..self.pending.len() {
            if let Some(token) = self.pending[slot].take() {
                match ctx.raycast.try_get_response(&token) {
                    Some(data) => self.record_input(slot, data.uv_hit, Some(data)),
                    None => self.states[slot].in_bounds = false,
                }
            }
        }

        let drawing = self
            .states
            .iter()
            .any(|s| s.is_painting && s.moved && !s.is_painting_done);
        if drawing {
            self.renderer.draw_pre_process(ctx.gpu, &self.policy);
        }

        let mut finished = false;
        for slot in 0..self.states.len() {
            if self.states[slot].is_painting_done {
                self.finish_painting(ctx, slot, false);
                finished = true;
            } else if self.states[slot].moved && self.states[slot].is_painting {
                self.render_pointer(ctx, slot);
            }
        }

        if !finished {
            self.present(ctx);
        }
    }

    /// Draw the pointer's newest stroke geometry.
    fn render_pointer<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>, slot: usize) {
        if !self.states[slot].moved || !self.states[slot].in_bounds {
            return;
        }
        self.states[slot].moved = false;

        let layer = self.layers.active_layer().texture();
        let positions: Vec<Vec2> = self.states[slot].line.positions().to_vec();
        let sizes: Vec<f32> = self.states[slot].line.sizes().to_vec();

        if positions.len() == 1 {
            self.renderer.render_stamp(
                ctx.gpu,
                &self.policy,
                layer,
                positions[0],
                &self.brush,
                sizes[0],
            );
        } else if self.policy.allow_lines {
            let size_start = sizes[sizes.len() - 2];
            let size_end = sizes[sizes.len() - 1];
            let points = self.segment_points(ctx, slot, &positions);

            self.renderer.render_line(
                ctx.gpu,
                &self.policy,
                layer,
                &points,
                &self.brush,
                size_start,
                size_end,
            );
        }

        self.states[slot].line.trim();
    }

    /// Polyline for the newest segment: stitched across triangle boundaries
    /// when the last two mesh hits disagree, smoothed when the tool asks for
    /// it, otherwise just the raw pair.
    fn segment_points<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        slot: usize,
        positions: &[Vec2],
    ) -> Vec<Vec2> {
        let n = positions.len();

        if self.kind == SurfaceKind::Mesh {
            let raycasts = self.states[slot].line.raycasts();
            if let [a, b] = raycasts {
                if a.triangle.id != b.triangle.id {
                    let a = *a;
                    let b = *b;
                    let tex = self.config.texture_size();
                    let stitched = ctx
                        .raycast
                        .meshes_of(self.id)
                        .find(|m| m.triangle(a.triangle.id).is_some() && m.triangle(b.triangle.id).is_some())
                        .map(|mesh| self.stitcher.stitch(mesh, ctx.camera, &a, &b, tex, slot, true));
                    if let Some(line) = stitched {
                        debug!(
                            pointer = slot,
                            points = line.points.len(),
                            complete = line.complete,
                            "stitched cross-triangle segment"
                        );
                        ctx.raycast.note_line_triangles(self.id, slot, line.triangles);
                        return line.points;
                    }
                }
            }
        }

        if self.policy.smoothing > 1 && self.kind == SurfaceKind::Mesh && n >= 3 {
            return self.smooth_segment(positions);
        }
        vec![positions[n - 2], positions[n - 1]]
    }

    /// Catmull-Rom interpolation over the buffered samples.
    ///
    /// With four points buffered the newest one is the lookahead control and
    /// the spline covers the segment one sample behind it. Early in the
    /// stroke, before the lookahead exists, the trailing control is
    /// extrapolated instead.
    fn smooth_segment(&self, positions: &[Vec2]) -> Vec<Vec2> {
        let n = positions.len();
        let (p0, p1, p2, p3) = if n >= 4 {
            (
                positions[n - 4],
                positions[n - 3],
                positions[n - 2],
                positions[n - 1],
            )
        } else {
            let p1 = positions[n - 2];
            let p2 = positions[n - 1];
            (positions[n - 3], p1, p2, p2 + (p2 - p1))
        };

        let seg_len = p1.distance(p2);
        let subdivisions = ((seg_len / SMOOTHING_SEGMENT_LENGTH) as u32)
            .clamp(1, self.policy.smoothing) as usize;

        let mut out = Vec::with_capacity(subdivisions + 1);
        for i in 0..=subdivisions {
            let t = i as f32 / subdivisions as f32;
            out.push(catmull_rom(p0, p1, p2, p3, t));
        }
        out
    }

    /// End a pointer's stroke: flush pending geometry, commit or keep staged
    /// ink per the tool policy, snapshot undo, and run the final render pass.
    ///
    /// `force` ends a stroke that never went through Up, e.g. programmatic
    /// draws or pointer loss; a forced finish on a pointer that was not
    /// painting just discards staged ink.
    pub fn finish_painting<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        slot: usize,
        force: bool,
    ) {
        if slot >= self.states.len() {
            warn!(pointer = slot, "finish on unknown pointer slot");
            return;
        }
        if !self.states[slot].is_painting && !force {
            // Nothing to finish; make sure the done flag cannot latch
            self.states[slot].is_painting_done = false;
            return;
        }

        if self.states[slot].moved {
            self.render_pointer(ctx, slot);
        }

        let was_painting = self.states[slot].is_painting;
        let had_ink = !self.states[slot].line.is_empty();
        let multi_point = self.states[slot].line.total_pushed() > 1;

        // Smoothed mesh strokes render one sample behind; flush the tail
        if was_painting
            && self.kind == SurfaceKind::Mesh
            && self.policy.smoothing > 1
            && self.policy.allow_lines
            && self.states[slot].line.total_pushed() >= 4
        {
            let positions = self.states[slot].line.positions();
            let sizes = self.states[slot].line.sizes();
            let n = positions.len();
            if n >= 2 {
                let tail = [positions[n - 2], positions[n - 1]];
                let (s0, s1) = (sizes[n - 2], sizes[n - 1]);
                let layer = self.layers.active_layer().texture();
                self.renderer
                    .render_line(ctx.gpu, &self.policy, layer, &tail, &self.brush, s0, s1);
            }
        }

        if self.policy.use_paint_input && was_painting && had_ink {
            let layer = self.layers.active_layer().texture();
            self.renderer.bake_input_to_layer(ctx.gpu, layer, self.policy.blend);
        } else {
            // Cancelled or non-committing stroke, staged ink is dropped
            self.renderer.clear_input(ctx.gpu);
        }

        // Snapshots are taken for multi-point strokes only
        if self.policy.processing_finished && was_painting && multi_point {
            self.undo.save_state();
        }

        ctx.raycast.clear_line_triangles(self.id, slot);
        self.states[slot].reset();
        self.events.emit(&SurfaceEvent::StrokeFinished(slot));

        self.present(ctx);
    }

    /// Rebuild the `Combined` texture from the current stack and stroke state.
    fn present<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>) {
        let painting = self.states.iter().any(|s| s.is_painting);
        let staged = (painting && self.policy.use_paint_input).then_some(self.policy.blend);

        let preview = (!painting && self.policy.show_preview && self.brush.preview)
            .then(|| {
                self.states
                    .iter()
                    .find(|s| s.in_bounds && s.paint_pos.is_some())
                    .and_then(|s| s.paint_pos)
            })
            .flatten()
            .map(|pos| (pos, &self.brush));

        self.renderer.draw_process(
            ctx.gpu,
            self.layers.layers(),
            self.layers.active_index(),
            staged,
            preview,
        );
    }

    /// Stamp a single point programmatically, in texture-pixel coordinates.
    pub fn draw_point<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>, pos: Vec2, pressure: f32) {
        let slot = self.reserved_slot();
        self.begin_programmatic(slot, pressure);
        self.push_programmatic(slot, pos, pressure);
        self.render_pointer(ctx, slot);
        self.finish_painting(ctx, slot, true);
    }

    /// Draw one straight segment programmatically.
    pub fn draw_line<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        from: Vec2,
        to: Vec2,
        pressure: f32,
    ) {
        self.draw_lines(ctx, &[from, to], pressure);
    }

    /// Draw a connected polyline programmatically.
    pub fn draw_lines<G: GpuBackend>(
        &mut self,
        ctx: &mut FrameCtx<'_, G>,
        points: &[Vec2],
        pressure: f32,
    ) {
        if points.is_empty() {
            return;
        }
        let slot = self.reserved_slot();
        self.begin_programmatic(slot, pressure);
        for &point in points {
            self.push_programmatic(slot, point, pressure);
            if self.states[slot].line.len() >= 2 {
                self.render_pointer(ctx, slot);
            }
        }
        if points.len() == 1 {
            self.render_pointer(ctx, slot);
        }
        self.finish_painting(ctx, slot, true);
    }

    fn begin_programmatic(&mut self, slot: usize, pressure: f32) {
        let state = &mut self.states[slot];
        state.reset();
        state.is_painting = true;
        state.in_bounds = true;
        state.pressure = pressure;
    }

    fn push_programmatic(&mut self, slot: usize, pos: Vec2, pressure: f32) {
        let size = self.brush.scaled_size(pressure);
        let state = &mut self.states[slot];
        state.paint_pos = Some(pos);
        state.line.push_position(pos, size);
        state.moved = true;
    }

    /// The host restored layer textures from an undo snapshot; drop staged
    /// ink and re-present.
    pub fn on_undo_applied<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>) {
        self.renderer.clear_input(ctx.gpu);
        self.present(ctx);
    }

    /// Same contract as [`Self::on_undo_applied`], for redo.
    pub fn on_redo_applied<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>) {
        self.renderer.clear_input(ctx.gpu);
        self.present(ctx);
    }

    /// Merge the active layer down, routing through this surface's renderer
    /// and undo controller.
    pub fn merge_active_down<G: GpuBackend>(&mut self, ctx: &mut FrameCtx<'_, G>) {
        self.layers
            .merge_layers(ctx.gpu, &mut self.renderer, self.undo.as_mut());
        self.present(ctx);
    }

    /// Release every GPU resource this surface owns.
    pub fn dispose<G: GpuBackend>(&mut self, gpu: &mut G) {
        self.layers.dispose(gpu);
        self.renderer.dispose(gpu);
    }
}

fn catmull_rom(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, t: f32) -> Vec2 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}
