//! End-to-end pipeline tests against a recording GPU backend.
//!
//! Each test drives the public host flow: forward pointer events, tick the
//! raycast service, tick the surface, then inspect the recorded command
//! stream and renderer diagnostics.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use uvpaint::{
    Brush, BlendMode, DrawPass, FrameCtx, GpuBackend, PaintConfig, PaintMesh, PaintMode,
    PaintSurface, PointerPhase, PointerSample, QuadMesh, Ray, RaycastService, SurfaceEvent,
    SurfaceId, SurfaceKind, TextureHandle, UndoController,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum GpuOp {
    SetTarget(TextureHandle),
    Clear,
    Draw {
        quads: usize,
        pass: DrawPass,
    },
    Blit {
        src: TextureHandle,
        dst: TextureHandle,
    },
    Composite {
        src: TextureHandle,
        dst: TextureHandle,
        blend: BlendMode,
    },
}

#[derive(Default)]
struct RecordingGpu {
    next: u32,
    ops: Vec<GpuOp>,
}

impl RecordingGpu {
    fn composites_to(&self, dst: TextureHandle) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, GpuOp::Composite { dst: d, .. } if *d == dst))
            .count()
    }

    fn composites_with_blend(&self, blend: BlendMode) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, GpuOp::Composite { blend: b, .. } if *b == blend))
            .count()
    }
}

impl GpuBackend for RecordingGpu {
    fn create_texture(&mut self, _w: u32, _h: u32, _label: &str) -> TextureHandle {
        self.next += 1;
        TextureHandle(self.next - 1)
    }
    fn release_texture(&mut self, _texture: TextureHandle) {}
    fn set_render_target(&mut self, target: TextureHandle) {
        self.ops.push(GpuOp::SetTarget(target));
    }
    fn clear_render_target(&mut self, _color: [f32; 4]) {
        self.ops.push(GpuOp::Clear);
    }
    fn draw_mesh(&mut self, mesh: &QuadMesh, _brush: &Brush, pass: DrawPass) {
        self.ops.push(GpuOp::Draw {
            quads: mesh.quad_count(),
            pass,
        });
    }
    fn blit(&mut self, src: TextureHandle, dst: TextureHandle) {
        self.ops.push(GpuOp::Blit { src, dst });
    }
    fn composite(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        _opacity: f32,
        _mask: Option<TextureHandle>,
        blend: BlendMode,
    ) {
        self.ops.push(GpuOp::Composite { src, dst, blend });
    }
}

struct SharedUndo(Rc<RefCell<usize>>);
impl UndoController for SharedUndo {
    fn save_state(&mut self) {
        *self.0.borrow_mut() += 1;
    }
}

/// One large triangle in the XY plane with UVs equal to world XY.
fn big_triangle() -> PaintMesh {
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(0.0, 2.0, 0.0),
    ];
    let uvs = [
        Vec2::new(0.0, 0.0),
        Vec2::new(2.0, 0.0),
        Vec2::new(0.0, 2.0),
    ];
    PaintMesh::from_buffers(&positions, &uvs, &[0, 1, 2], Mat4::IDENTITY).unwrap()
}

/// Unit quad split along the diagonal, identity UVs.
fn quad() -> PaintMesh {
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
    ];
    let uvs = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 1.0),
    ];
    PaintMesh::from_buffers(&positions, &uvs, &[0, 1, 2, 1, 3, 2], Mat4::IDENTITY).unwrap()
}

fn mesh_surface(gpu: &mut RecordingGpu, mesh: PaintMesh, raycast: &mut RaycastService) -> PaintSurface {
    let id = SurfaceId(0);
    raycast.register_mesh(id, mesh);
    let config = PaintConfig::new(256, 256);
    let brush = Brush::new(TextureHandle(4096), 16.0);
    PaintSurface::new(gpu, id, SurfaceKind::Mesh, config, brush).unwrap()
}

fn canvas_surface(gpu: &mut RecordingGpu) -> PaintSurface {
    let mut config = PaintConfig::new(256, 256);
    config.canvas_origin = [0.0, 0.0];
    config.canvas_size = [256.0, 256.0];
    let brush = Brush::new(TextureHandle(4096), 16.0);
    PaintSurface::new(gpu, SurfaceId(0), SurfaceKind::Canvas, config, brush).unwrap()
}

fn down_ray(x: f32, y: f32) -> Option<Ray> {
    Some(Ray::new(Vec3::new(x, y, 5.0), Vec3::NEG_Z))
}

fn mesh_sample(phase: PointerPhase, x: f32, y: f32) -> PointerSample {
    PointerSample {
        phase,
        pointer: 0,
        screen_pos: Vec2::new(x * 100.0, y * 100.0),
        pressure: 1.0,
        ray: down_ray(x, y),
    }
}

fn frame(
    surface: &mut PaintSurface,
    gpu: &mut RecordingGpu,
    raycast: &mut RaycastService,
    sample: PointerSample,
) {
    let mut ctx = FrameCtx {
        gpu,
        raycast,
        camera: Vec3::new(0.5, 0.5, 5.0),
    };
    surface.pointer_event(&mut ctx, sample);
    ctx.raycast.tick();
    surface.tick(&mut ctx);
}

#[test]
fn test_two_point_mesh_stroke_renders_one_pixel_scaled_line() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = mesh_surface(&mut gpu, big_triangle(), &mut raycast);

    frame(&mut surface, &mut gpu, &mut raycast, mesh_sample(PointerPhase::Down, 0.1, 0.1));
    frame(&mut surface, &mut gpu, &mut raycast, mesh_sample(PointerPhase::Move, 0.9, 0.9));

    let stats = surface.renderer.stats();
    assert_eq!(stats.line_calls, 1);
    assert_eq!(stats.last_line_points.len(), 2);
    // UV (0.1, 0.1) and (0.9, 0.9) scaled by the 256px texture
    assert!((stats.last_line_points[0] - Vec2::splat(25.6)).length() < 1e-3);
    assert!((stats.last_line_points[1] - Vec2::splat(230.4)).length() < 1e-3);
}

#[test]
fn test_cross_triangle_stroke_is_stitched() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = mesh_surface(&mut gpu, quad(), &mut raycast);

    frame(&mut surface, &mut gpu, &mut raycast, mesh_sample(PointerPhase::Down, 0.2, 0.2));
    frame(&mut surface, &mut gpu, &mut raycast, mesh_sample(PointerPhase::Move, 0.8, 0.8));

    let stats = surface.renderer.stats();
    assert_eq!(stats.line_calls, 1);
    // One triangle boundary crossed: start, exit, entry, end
    assert_eq!(stats.last_line_points.len(), 4);
    assert!((stats.last_line_points[0] - Vec2::splat(0.2 * 256.0)).length() < 0.5);
    assert!((stats.last_line_points[3] - Vec2::splat(0.8 * 256.0)).length() < 0.5);
}

#[test]
fn test_missed_ray_records_nothing() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = mesh_surface(&mut gpu, big_triangle(), &mut raycast);

    frame(&mut surface, &mut gpu, &mut raycast, mesh_sample(PointerPhase::Down, 5.0, 5.0));

    let stats = surface.renderer.stats();
    assert_eq!(stats.stamp_calls, 0);
    assert_eq!(stats.line_calls, 0);
}

#[test]
fn test_forced_finish_presents_once_and_resets() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = canvas_surface(&mut gpu);
    let combined = surface.renderer.targets().combined;

    let finishes = Rc::new(RefCell::new(Vec::new()));
    let sink = finishes.clone();
    surface.subscribe(move |e| {
        if let SurfaceEvent::StrokeFinished(p) = e {
            sink.borrow_mut().push(*p);
        }
    });

    let before = gpu.composites_to(combined);
    {
        let mut ctx = FrameCtx {
            gpu: &mut gpu,
            raycast: &mut raycast,
            camera: Vec3::Z,
        };
        surface.draw_line(&mut ctx, Vec2::new(10.0, 10.0), Vec2::new(100.0, 10.0), 1.0);
    }

    // Exactly one final composite pass for the forced finish
    assert_eq!(gpu.composites_to(combined) - before, 1);
    assert_eq!(finishes.borrow().len(), 1);
    assert_eq!(surface.renderer.stats().line_calls, 1);

    // The reserved slot is clean: the next programmatic draw starts fresh
    let stats_lines = surface.renderer.stats().line_calls;
    let mut ctx = FrameCtx {
        gpu: &mut gpu,
        raycast: &mut raycast,
        camera: Vec3::Z,
    };
    surface.draw_line(&mut ctx, Vec2::new(10.0, 50.0), Vec2::new(100.0, 50.0), 1.0);
    assert_eq!(surface.renderer.stats().line_calls, stats_lines + 1);
    assert_eq!(surface.renderer.stats().last_line_points.len(), 2);
}

#[test]
fn test_brush_stroke_snapshots_undo_once() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = canvas_surface(&mut gpu);

    let saves = Rc::new(RefCell::new(0usize));
    surface.set_undo_controller(Box::new(SharedUndo(saves.clone())));

    let stroke = [
        (PointerPhase::Down, 10.0),
        (PointerPhase::Move, 60.0),
        (PointerPhase::Move, 120.0),
        (PointerPhase::Up, 120.0),
    ];
    for (phase, x) in stroke {
        let sample = PointerSample {
            phase,
            pointer: 0,
            screen_pos: Vec2::new(x, 40.0),
            pressure: 1.0,
            ray: None,
        };
        frame(&mut surface, &mut gpu, &mut raycast, sample);
    }

    assert_eq!(*saves.borrow(), 1);
}

#[test]
fn test_selection_stroke_never_snapshots_undo() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = canvas_surface(&mut gpu);
    surface.set_tool(PaintMode::Selection);

    let saves = Rc::new(RefCell::new(0usize));
    surface.set_undo_controller(Box::new(SharedUndo(saves.clone())));

    for (phase, x) in [
        (PointerPhase::Down, 10.0),
        (PointerPhase::Move, 90.0),
        (PointerPhase::Up, 90.0),
    ] {
        let sample = PointerSample {
            phase,
            pointer: 0,
            screen_pos: Vec2::new(x, 40.0),
            pressure: 1.0,
            ray: None,
        };
        frame(&mut surface, &mut gpu, &mut raycast, sample);
    }

    assert_eq!(*saves.borrow(), 0);
    // Selection ink stayed staged, nothing was committed to the layer
    assert_eq!(gpu.composites_with_blend(BlendMode::Erase), 0);
    assert_eq!(gpu.composites_to(surface.layers.active_layer().texture()), 0);
}

#[test]
fn test_erase_stroke_bakes_staged_ink_into_layer() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = canvas_surface(&mut gpu);
    surface.set_tool(PaintMode::Erase);
    let layer = surface.layers.active_layer().texture();

    for (phase, x) in [
        (PointerPhase::Down, 10.0),
        (PointerPhase::Move, 90.0),
        (PointerPhase::Up, 90.0),
    ] {
        let sample = PointerSample {
            phase,
            pointer: 0,
            screen_pos: Vec2::new(x, 40.0),
            pressure: 1.0,
            ray: None,
        };
        frame(&mut surface, &mut gpu, &mut raycast, sample);
    }

    // Exactly one erase-blended bake into the active layer
    let bakes: Vec<_> = gpu
        .ops
        .iter()
        .filter(|op| {
            matches!(
                op,
                GpuOp::Composite {
                    dst,
                    blend: BlendMode::Erase,
                    ..
                } if *dst == layer
            )
        })
        .collect();
    assert_eq!(bakes.len(), 1);
}

#[test]
fn test_multi_pointer_strokes_render_independently() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = canvas_surface(&mut gpu);

    // Two pointers down in one frame, then both move
    let mut ctx = FrameCtx {
        gpu: &mut gpu,
        raycast: &mut raycast,
        camera: Vec3::Z,
    };
    for (pointer, x) in [(0usize, 10.0f32), (1, 200.0)] {
        surface.pointer_event(
            &mut ctx,
            PointerSample {
                phase: PointerPhase::Down,
                pointer,
                screen_pos: Vec2::new(x, 40.0),
                pressure: 1.0,
                ray: None,
            },
        );
    }
    ctx.raycast.tick();
    surface.tick(&mut ctx);

    let mut ctx = FrameCtx {
        gpu: &mut gpu,
        raycast: &mut raycast,
        camera: Vec3::Z,
    };
    for (pointer, x) in [(0usize, 50.0f32), (1, 160.0)] {
        surface.pointer_event(
            &mut ctx,
            PointerSample {
                phase: PointerPhase::Move,
                pointer,
                screen_pos: Vec2::new(x, 40.0),
                pressure: 1.0,
                ray: None,
            },
        );
    }
    ctx.raycast.tick();
    surface.tick(&mut ctx);

    // Each pointer contributed its own line segment
    assert_eq!(surface.renderer.stats().line_calls, 2);
}

#[test]
fn test_stray_up_keeps_composites_flowing() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = canvas_surface(&mut gpu);
    let combined = surface.renderer.targets().combined;

    // An Up for a pointer that never went Down
    let stray = PointerSample {
        phase: PointerPhase::Up,
        pointer: 0,
        screen_pos: Vec2::new(40.0, 40.0),
        pressure: 0.0,
        ray: None,
    };
    frame(&mut surface, &mut gpu, &mut raycast, stray);

    // Every following hover frame still rebuilds the composite
    for x in [60.0, 80.0, 100.0] {
        let before = gpu.composites_to(combined);
        let hover = PointerSample {
            phase: PointerPhase::Hover,
            pointer: 0,
            screen_pos: Vec2::new(x, 40.0),
            pressure: 0.0,
            ray: None,
        };
        frame(&mut surface, &mut gpu, &mut raycast, hover);
        assert!(gpu.composites_to(combined) > before);
    }
}

#[test]
fn test_undo_applied_clears_staged_ink_and_represents() {
    let mut gpu = RecordingGpu::default();
    let mut raycast = RaycastService::new();
    let mut surface = canvas_surface(&mut gpu);
    let combined = surface.renderer.targets().combined;
    let input = surface.renderer.targets().input;

    let before = gpu.composites_to(combined);
    let mut ctx = FrameCtx {
        gpu: &mut gpu,
        raycast: &mut raycast,
        camera: Vec3::Z,
    };
    surface.on_undo_applied(&mut ctx);

    assert_eq!(gpu.composites_to(combined) - before, 1);
    // Input was cleared: a set-target on input followed by a clear
    let cleared_input = gpu.ops.windows(2).any(|w| {
        matches!(w, [GpuOp::SetTarget(t), GpuOp::Clear] if *t == input)
    });
    assert!(cleared_input);
}
