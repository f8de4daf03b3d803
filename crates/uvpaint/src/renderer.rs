//! Stroke-to-texture renderer.
//!
//! Owns the four named render targets a paint surface needs (`Input`,
//! `ActiveLayerTemp`, `Combined`, `CombinedTemp`), turns stroke polylines
//! into rotated quad strips, and composites the layer stack into the
//! presentable `Combined` texture.
//!
//! Everything here is pure command submission: geometry is built on the CPU
//! and handed to the [`GpuBackend`] in deterministic call order.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::brush::Brush;
use crate::constants::{MAX_LINE_QUADS, QUAD_SPACING_RATIO};
use crate::gpu::{DrawPass, GpuBackend, QuadMesh, TextureHandle};
use crate::layers::Layer;
use crate::tool::ToolPolicy;
use crate::types::BlendMode;

const CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// The renderer's working textures, allocated once per surface.
#[derive(Debug, Clone, Copy)]
pub struct RenderTargetSet {
    /// Staging buffer for uncommitted stroke ink
    pub input: TextureHandle,
    /// Scratch used when viewing the active layer through its staged ink
    pub active_layer_temp: TextureHandle,
    /// The presentable composite of all layers
    pub combined: TextureHandle,
    /// Scratch composite used during merges
    pub combined_temp: TextureHandle,
    pub width: u32,
    pub height: u32,
}

impl RenderTargetSet {
    fn create<G: GpuBackend>(gpu: &mut G, width: u32, height: u32) -> Self {
        Self {
            input: gpu.create_texture(width, height, "input"),
            active_layer_temp: gpu.create_texture(width, height, "active layer temp"),
            combined: gpu.create_texture(width, height, "combined"),
            combined_temp: gpu.create_texture(width, height, "combined temp"),
            width,
            height,
        }
    }

    fn release<G: GpuBackend>(&self, gpu: &mut G) {
        gpu.release_texture(self.input);
        gpu.release_texture(self.active_layer_temp);
        gpu.release_texture(self.combined);
        gpu.release_texture(self.combined_temp);
    }
}

/// Per-frame draw diagnostics, reset by [`Renderer::begin_frame`].
#[derive(Debug, Clone, Default)]
pub struct RenderStats {
    pub line_calls: usize,
    pub stamp_calls: usize,
    pub quads_emitted: usize,
    /// Input positions of the most recent line call
    pub last_line_points: Vec<Vec2>,
}

impl RenderStats {
    fn reset(&mut self) {
        self.line_calls = 0;
        self.stamp_calls = 0;
        self.quads_emitted = 0;
        self.last_line_points.clear();
    }
}

/// Builds brush geometry and routes it to the right targets.
pub struct Renderer {
    targets: RenderTargetSet,
    stats: RenderStats,
    rng: StdRng,
}

impl Renderer {
    pub fn new<G: GpuBackend>(gpu: &mut G, width: u32, height: u32) -> Self {
        Self {
            targets: RenderTargetSet::create(gpu, width, height),
            stats: RenderStats::default(),
            // Jitter only needs to look random, not be unpredictable
            rng: StdRng::seed_from_u64(0x9E3779B9),
        }
    }

    pub fn targets(&self) -> &RenderTargetSet {
        &self.targets
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Reset per-frame diagnostics. Call once at the top of each frame.
    pub fn begin_frame(&mut self) {
        self.stats.reset();
    }

    pub fn clear_texture<G: GpuBackend>(&mut self, gpu: &mut G, texture: TextureHandle) {
        gpu.set_render_target(texture);
        gpu.clear_render_target(CLEAR);
    }

    /// Drop all staged, uncommitted ink.
    pub fn clear_input<G: GpuBackend>(&mut self, gpu: &mut G) {
        let input = self.targets.input;
        self.clear_texture(gpu, input);
    }

    /// Draw a single brush stamp at one position.
    pub fn render_stamp<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        policy: &ToolPolicy,
        layer: TextureHandle,
        position: Vec2,
        brush: &Brush,
        diameter: f32,
    ) {
        self.stats.stamp_calls += 1;

        let mut mesh = QuadMesh::with_capacity(1);
        let rotation = if brush.rotation_jitter {
            self.rng.gen_range(0.0..std::f32::consts::TAU)
        } else {
            0.0
        };
        mesh.push_quad(position + Vec2::splat(brush.render_offset), diameter, rotation);
        self.stats.quads_emitted += 1;

        self.submit(gpu, policy, layer, &mesh, brush);
    }

    /// Draw a stroke polyline as a strip of rotated quads.
    ///
    /// Quad diameters interpolate from `size_start` to `size_end` along the
    /// arc length, shaped by the brush's pressure curve. Returns the number
    /// of quads emitted.
    pub fn render_line<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        policy: &ToolPolicy,
        layer: TextureHandle,
        positions: &[Vec2],
        brush: &Brush,
        size_start: f32,
        size_end: f32,
    ) -> usize {
        if positions.is_empty() {
            return 0;
        }
        self.stats.line_calls += 1;
        self.stats.last_line_points.clear();
        self.stats.last_line_points.extend_from_slice(positions);

        let total: f32 = positions.windows(2).map(|w| w[0].distance(w[1])).sum();

        // Tighter spacing when the size varies, so tapers stay smooth
        let size_ratio = (size_end - size_start).abs() / size_start.max(f32::EPSILON);
        let spacing = brush.size.max(1.0) * QUAD_SPACING_RATIO / (1.0 + size_ratio);

        let lower = (positions.len() / 2).max(1);
        let count = ((total / spacing).ceil() as usize).clamp(lower, MAX_LINE_QUADS);

        let mut mesh = QuadMesh::with_capacity(count);
        if total <= f32::EPSILON {
            // Degenerate line, stack the quads on the first point
            for _ in 0..count {
                let rot = self.quad_rotation(brush, Vec2::X);
                mesh.push_quad(positions[0] + Vec2::splat(brush.render_offset), size_start, rot);
            }
        } else {
            self.resample_polyline(&mut mesh, positions, brush, size_start, size_end, total, count);
        }

        debug!(points = positions.len(), quads = count, "line render");
        self.stats.quads_emitted += count;
        self.submit(gpu, policy, layer, &mesh, brush);
        count
    }

    /// Place `count` quads at even arc-length intervals along `positions`.
    fn resample_polyline(
        &mut self,
        mesh: &mut QuadMesh,
        positions: &[Vec2],
        brush: &Brush,
        size_start: f32,
        size_end: f32,
        total: f32,
        count: usize,
    ) {
        let step = if count > 1 {
            total / (count - 1) as f32
        } else {
            0.0
        };

        let mut seg = 0;
        let mut seg_start = 0.0f32;
        let mut seg_len = positions[0].distance(positions[1]);

        for i in 0..count {
            let target = (i as f32 * step).min(total);
            while target > seg_start + seg_len && seg + 2 < positions.len() {
                seg_start += seg_len;
                seg += 1;
                seg_len = positions[seg].distance(positions[seg + 1]);
            }

            let dir = positions[seg + 1] - positions[seg];
            let local = if seg_len > f32::EPSILON {
                (target - seg_start) / seg_len
            } else {
                0.0
            };
            let center = positions[seg] + dir * local;

            let t = brush.pressure_curve.apply(target / total);
            let diameter = size_start + (size_end - size_start) * t;
            let rotation = self.quad_rotation(brush, dir);
            mesh.push_quad(center + Vec2::splat(brush.render_offset), diameter, rotation);
        }
    }

    fn quad_rotation(&mut self, brush: &Brush, dir: Vec2) -> f32 {
        if brush.rotation_jitter {
            self.rng.gen_range(0.0..std::f32::consts::TAU)
        } else {
            dir.y.atan2(dir.x)
        }
    }

    /// Route a quad batch to the targets the tool's policy selects.
    ///
    /// Layer draws go through `ActiveLayerTemp` because the layer texture
    /// would otherwise be both sampled and written in one pass.
    fn submit<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        policy: &ToolPolicy,
        layer: TextureHandle,
        mesh: &QuadMesh,
        brush: &Brush,
    ) {
        if policy.render_to_input {
            gpu.set_render_target(self.targets.input);
            gpu.draw_mesh(mesh, brush, DrawPass::Stamp);
            gpu.draw_mesh(mesh, brush, DrawPass::Colorize);
        }
        if policy.render_to_layer {
            let temp = self.targets.active_layer_temp;
            gpu.set_render_target(temp);
            gpu.clear_render_target(CLEAR);
            gpu.blit(layer, temp);
            gpu.set_render_target(temp);
            gpu.draw_mesh(mesh, brush, DrawPass::Stamp);
            gpu.draw_mesh(mesh, brush, DrawPass::Colorize);
            gpu.blit(temp, layer);
        }
    }

    /// Per-frame hook run before any stroke geometry is drawn.
    ///
    /// Tools whose staged overlay is redrawn from scratch every frame
    /// (staging tools that never commit, like selection) get a fresh `Input`
    /// here; committing tools accumulate across the stroke instead.
    pub fn draw_pre_process<G: GpuBackend>(&mut self, gpu: &mut G, policy: &ToolPolicy) {
        if policy.render_to_input && !policy.processing_finished {
            self.clear_input(gpu);
        }
    }

    /// Commit staged ink into a layer texture and clear the staging buffer.
    pub fn bake_input_to_layer<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        layer: TextureHandle,
        blend: BlendMode,
    ) {
        gpu.composite(self.targets.input, layer, 1.0, None, blend);
        self.clear_input(gpu);
    }

    /// Composite enabled layers, bottom to top, into an arbitrary target.
    ///
    /// Used by layer merging; the everyday presentation path is
    /// [`Self::draw_process`].
    pub fn composite_to<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        layers: &[Layer],
        target: TextureHandle,
    ) {
        gpu.set_render_target(target);
        gpu.clear_render_target(CLEAR);
        for layer in layers {
            if !layer.enabled || layer.opacity <= 0.0 {
                continue;
            }
            gpu.composite(
                layer.texture(),
                target,
                layer.opacity,
                layer.active_mask(),
                BlendMode::Normal,
            );
        }
    }

    /// Rebuild the presentable `Combined` texture.
    ///
    /// When `staged` is set, the active layer is shown through its
    /// uncommitted `Input` ink: the layer is copied into `ActiveLayerTemp`,
    /// the staged ink is blended on top, and that temp stands in for the
    /// layer during compositing. An optional hover preview stamp is drawn
    /// last, on top of everything.
    pub fn draw_process<G: GpuBackend>(
        &mut self,
        gpu: &mut G,
        layers: &[Layer],
        active: usize,
        staged: Option<BlendMode>,
        preview: Option<(Vec2, &Brush)>,
    ) {
        let combined = self.targets.combined;

        let staged_temp = staged.map(|blend| {
            let temp = self.targets.active_layer_temp;
            gpu.set_render_target(temp);
            gpu.clear_render_target(CLEAR);
            gpu.blit(layers[active].texture(), temp);
            gpu.composite(self.targets.input, temp, 1.0, None, blend);
            temp
        });

        gpu.set_render_target(combined);
        gpu.clear_render_target(CLEAR);
        for (i, layer) in layers.iter().enumerate() {
            if !layer.enabled || layer.opacity <= 0.0 {
                continue;
            }
            let source = match staged_temp {
                Some(temp) if i == active => temp,
                _ => layer.texture(),
            };
            gpu.composite(
                source,
                combined,
                layer.opacity,
                layer.active_mask(),
                BlendMode::Normal,
            );
        }

        if let Some((position, brush)) = preview {
            let mut mesh = QuadMesh::with_capacity(1);
            mesh.push_quad(position + Vec2::splat(brush.render_offset), brush.size, 0.0);
            gpu.set_render_target(combined);
            gpu.draw_mesh(&mesh, brush, DrawPass::Stamp);
        }
    }

    /// Release the renderer's textures. Must be the last call on this value.
    pub fn dispose<G: GpuBackend>(&mut self, gpu: &mut G) {
        self.targets.release(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::PaintMode;

    #[derive(Default)]
    struct CountingGpu {
        next: u32,
        draws: usize,
        composites: usize,
        quads_drawn: usize,
    }

    impl GpuBackend for CountingGpu {
        fn create_texture(&mut self, _w: u32, _h: u32, _label: &str) -> TextureHandle {
            self.next += 1;
            TextureHandle(self.next - 1)
        }
        fn release_texture(&mut self, _texture: TextureHandle) {}
        fn set_render_target(&mut self, _target: TextureHandle) {}
        fn clear_render_target(&mut self, _color: [f32; 4]) {}
        fn draw_mesh(&mut self, mesh: &QuadMesh, _brush: &Brush, _pass: DrawPass) {
            self.draws += 1;
            self.quads_drawn = mesh.quad_count();
        }
        fn blit(&mut self, _src: TextureHandle, _dst: TextureHandle) {}
        fn composite(
            &mut self,
            _src: TextureHandle,
            _dst: TextureHandle,
            _opacity: f32,
            _mask: Option<TextureHandle>,
            _blend: BlendMode,
        ) {
            self.composites += 1;
        }
    }

    fn setup() -> (CountingGpu, Renderer, Brush) {
        let mut gpu = CountingGpu::default();
        let renderer = Renderer::new(&mut gpu, 256, 256);
        let brush = Brush::new(TextureHandle(99), 16.0);
        (gpu, renderer, brush)
    }

    #[test]
    fn test_line_quad_count_scales_with_length() {
        let (mut gpu, mut renderer, brush) = setup();
        let policy = ToolPolicy::for_mode(PaintMode::Brush);
        let layer = TextureHandle(50);

        let short = renderer.render_line(
            &mut gpu,
            &policy,
            layer,
            &[Vec2::new(0.0, 0.0), Vec2::new(8.0, 0.0)],
            &brush,
            16.0,
            16.0,
        );
        let long = renderer.render_line(
            &mut gpu,
            &policy,
            layer,
            &[Vec2::new(0.0, 0.0), Vec2::new(200.0, 0.0)],
            &brush,
            16.0,
            16.0,
        );
        assert!(long > short);
        // spacing = 16 * 0.25 = 4px, so 200px needs 50 quads
        assert_eq!(long, 50);
    }

    #[test]
    fn test_line_quad_count_lower_bound() {
        let (mut gpu, mut renderer, brush) = setup();
        let policy = ToolPolicy::for_mode(PaintMode::Brush);
        let layer = TextureHandle(50);

        // Zero-length stroke still emits at least one quad
        let count = renderer.render_line(
            &mut gpu,
            &policy,
            layer,
            &[Vec2::new(5.0, 5.0), Vec2::new(5.0, 5.0)],
            &brush,
            16.0,
            16.0,
        );
        assert_eq!(count, 1);

        // Dense point lists force at least len/2 quads
        let points: Vec<Vec2> = (0..10).map(|i| Vec2::new(i as f32 * 0.01, 0.0)).collect();
        let count = renderer.render_line(&mut gpu, &policy, layer, &points, &brush, 16.0, 16.0);
        assert_eq!(count, 5);
    }

    #[test]
    fn test_line_quad_count_upper_bound() {
        let (mut gpu, mut renderer, brush) = setup();
        let policy = ToolPolicy::for_mode(PaintMode::Brush);
        let layer = TextureHandle(50);

        // 1e6 px at 4px spacing would want 250k quads; the cap holds
        let count = renderer.render_line(
            &mut gpu,
            &policy,
            layer,
            &[Vec2::ZERO, Vec2::new(1.0e6, 0.0)],
            &brush,
            16.0,
            16.0,
        );
        assert_eq!(count, MAX_LINE_QUADS);
        assert_eq!(gpu.quads_drawn, MAX_LINE_QUADS);
    }

    #[test]
    fn test_stats_record_line_calls() {
        let (mut gpu, mut renderer, brush) = setup();
        let policy = ToolPolicy::for_mode(PaintMode::Brush);
        let points = [Vec2::new(1.0, 2.0), Vec2::new(30.0, 2.0)];

        renderer.begin_frame();
        renderer.render_line(&mut gpu, &policy, TextureHandle(50), &points, &brush, 16.0, 16.0);

        assert_eq!(renderer.stats().line_calls, 1);
        assert_eq!(renderer.stats().last_line_points, points.to_vec());

        renderer.begin_frame();
        assert_eq!(renderer.stats().line_calls, 0);
        assert!(renderer.stats().last_line_points.is_empty());
    }

    #[test]
    fn test_input_policy_draws_without_touching_layer() {
        let (mut gpu, mut renderer, brush) = setup();
        let policy = ToolPolicy::for_mode(PaintMode::Selection);

        renderer.render_stamp(&mut gpu, &policy, TextureHandle(50), Vec2::ZERO, &brush, 16.0);
        // Stamp + colorize into Input only
        assert_eq!(gpu.draws, 2);
    }

    #[test]
    fn test_bake_composites_then_clears() {
        let (mut gpu, mut renderer, _brush) = setup();
        renderer.bake_input_to_layer(&mut gpu, TextureHandle(50), BlendMode::Erase);
        assert_eq!(gpu.composites, 1);
    }
}
