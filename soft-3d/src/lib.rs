#![warn(clippy::all)]
#![allow(clippy::cast_lossless, clippy::cast_possible_truncation)]

mod data;
pub use data::RenderingData;
mod render;
pub use render::{
    PixelAttrs, Renderer as RawRenderer, BUFFER_SIZE, FIRST_PIXEL_OFFSET, NUM_SCANLINES,
    SCANLINE_WIDTH,
};
mod threaded;

use glimmer_core::{
    gpu::{
        engine_3d::{
            Polygon, RendererTx, RenderingState, ScreenVertex, TEXTURE_VRAM_LEN, TEX_PAL_VRAM_LEN,
        },
        SCREEN_HEIGHT, SCREEN_WIDTH,
    },
    utils::{zeroed_box, Bytes},
};
use std::{
    cell::UnsafeCell,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use threaded::{worker, Semaphore, SharedData};

/// The software rasterizer, either running inline on the caller or on a
/// dedicated worker thread.
///
/// Worker coordination follows a fixed discipline: `render_frame` posts the
/// start semaphore, the worker posts one line ticket per finished scanline
/// and one done ticket per frame, `get_line` consumes line tickets, and
/// `vcount_144` drains the done ticket at the end of the visible display.
pub struct Renderer {
    threaded: bool,
    shared: Arc<SharedData>,
    thread: Option<thread::JoinHandle<()>>,
    #[cfg(feature = "log")]
    logger: slog::Logger,
}

impl Renderer {
    pub fn new(threaded: bool, #[cfg(feature = "log")] logger: slog::Logger) -> Self {
        let shared = Arc::new(SharedData {
            rendering_data: UnsafeCell::new(zeroed_box()),
            renderer: UnsafeCell::new(render::Renderer::new()),
            frame_identical: AtomicBool::new(false),
            running: AtomicBool::new(false),
            rendering: AtomicBool::new(false),
            start: Semaphore::new(),
            done: Semaphore::new(),
            scanline_count: Semaphore::new(),
        });

        let mut result = Renderer {
            threaded,
            shared,
            thread: None,
            #[cfg(feature = "log")]
            logger,
        };
        result.setup_render_thread();
        result
    }

    pub fn threaded(&self) -> bool {
        self.threaded
    }

    /// Selects the worker model. Takes effect immediately; must not be
    /// called between `render_frame` and the frame's last `get_line`.
    pub fn set_threaded(&mut self, threaded: bool) {
        #[cfg(feature = "log")]
        slog::debug!(self.logger, "Changing worker model"; "threaded" => threaded);
        self.threaded = threaded;
        self.setup_render_thread();
    }

    fn stop_render_thread(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shared.running.store(false, Ordering::Relaxed);
            self.shared.start.post(1);
            let _ = thread.join();
        }
    }

    fn setup_render_thread(&mut self) {
        if self.threaded {
            if self.thread.is_none() {
                self.shared.running.store(true, Ordering::Relaxed);
                let shared = Arc::clone(&self.shared);
                #[cfg(feature = "log")]
                let logger = self.logger.clone();
                self.thread = Some(
                    thread::Builder::new()
                        .name("3D rendering".to_string())
                        .spawn(move || {
                            worker(
                                shared,
                                #[cfg(feature = "log")]
                                logger,
                            )
                        })
                        .expect("Couldn't spawn 3D rendering thread"),
                );
            }

            if self.shared.rendering.load(Ordering::Relaxed) {
                self.shared.done.wait();
            }

            self.shared.start.reset();
            self.shared.scanline_count.reset();

            // prime one frame so a consumer that starts fetching lines
            // before the first real frame doesn't block forever
            self.shared.start.post(1);
        } else {
            self.stop_render_thread();
        }
    }

    /// Returns the visible 256 pixels of `line`, packed
    /// `r | g << 8 | b << 16 | a << 24` with 6-bit RGB and 5-bit alpha.
    ///
    /// In worker mode this blocks until the line's final pass has run;
    /// within a frame, lines become available strictly in ascending order.
    pub fn get_line(&mut self, line: usize) -> &[u32; SCREEN_WIDTH] {
        if self.thread.is_some() && line < SCREEN_HEIGHT {
            self.shared.scanline_count.wait();
        }

        let renderer = unsafe { &*self.shared.renderer.get() };
        renderer.line(line)
    }
}

impl RendererTx for Renderer {
    fn render_frame(
        &mut self,
        vert_ram: &[ScreenVertex],
        poly_ram: &[Polygon],
        state: &RenderingState,
        texture: &Bytes<TEXTURE_VRAM_LEN>,
        tex_pal: &Bytes<TEX_PAL_VRAM_LEN>,
        frame_identical: bool,
    ) {
        // the consumer has drained the previous frame by now (vcount_144),
        // so the worker is parked on the start semaphore and the shared
        // cells are safe to touch
        let data = unsafe { &mut *self.shared.rendering_data.get() };

        let vram_changed = data.copy_vram(texture, tex_pal, state);
        let frame_identical = frame_identical && !vram_changed;

        if !frame_identical {
            data.prepare(vert_ram, poly_ram, state);
        }

        self.shared
            .frame_identical
            .store(frame_identical, Ordering::Relaxed);

        if self.thread.is_some() {
            self.shared.start.post(1);
        } else if !frame_identical {
            let renderer = unsafe { &mut *self.shared.renderer.get() };
            renderer.render_frame(data, || {});
        }
    }

    fn vcount_144(&mut self) {
        if self.thread.is_some() {
            self.shared.done.wait();
        }
    }

    fn reset(&mut self) {
        if self.shared.rendering.load(Ordering::Relaxed) {
            self.shared.done.wait();
        }

        {
            let renderer = unsafe { &mut *self.shared.renderer.get() };
            renderer.reset();
        }

        self.setup_render_thread();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.stop_render_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimmer_core::gpu::engine_3d::{PolygonAttrs, PolyVertIndex, PolyVertsLen, VertexAddr};

    fn renderer(threaded: bool) -> Renderer {
        Renderer::new(
            threaded,
            #[cfg(feature = "log")]
            slog::Logger::root(slog::Discard, slog::o!()),
        )
    }

    struct Frame {
        vert_ram: Vec<ScreenVertex>,
        poly_ram: Vec<Polygon>,
        state: RenderingState,
        texture: Box<Bytes<TEXTURE_VRAM_LEN>>,
        tex_pal: Box<Bytes<TEX_PAL_VRAM_LEN>>,
    }

    // A white triangle against a far clear plane.
    fn frame() -> Frame {
        let verts = [(0u16, 0u16), (128, 191), (255, 0)];
        let vert_ram: Vec<ScreenVertex> = verts
            .iter()
            .map(|&(x, y)| ScreenVertex {
                coords: [x, y],
                color: [63 << 3; 3],
                uv: [0; 2],
            })
            .collect();

        let mut poly = Polygon::new();
        poly.verts_len = PolyVertsLen::new(3);
        for i in 0..3 {
            poly.verts[i] = VertexAddr::new(i as u16);
            poly.w_values[i] = 0x1000;
            poly.depth_values[i] = 0x8000;
        }
        poly.top_i = PolyVertIndex::new(0);
        poly.bot_i = PolyVertIndex::new(1);
        poly.top_y = 0;
        poly.bot_y = 191;
        poly.attrs = PolygonAttrs(0).with_alpha(31);

        let mut state = RenderingState::new();
        state.clear_depth = 0x7FFF;

        Frame {
            vert_ram,
            poly_ram: vec![poly],
            state,
            texture: zeroed_box(),
            tex_pal: zeroed_box(),
        }
    }

    fn render(renderer: &mut Renderer, frame: &Frame, frame_identical: bool) {
        renderer.render_frame(
            &frame.vert_ram,
            &frame.poly_ram,
            &frame.state,
            &frame.texture,
            &frame.tex_pal,
            frame_identical,
        );
    }

    #[test]
    fn threaded_output_matches_the_synchronous_path() {
        let frame = frame();

        let mut sync = renderer(false);
        render(&mut sync, &frame, false);
        let sync_lines: Vec<[u32; 256]> = (0..192).map(|y| *sync.get_line(y)).collect();

        let mut threaded = renderer(true);
        // drain the priming frame so the buffers are stable
        threaded.vcount_144();
        render(&mut threaded, &frame, false);
        threaded.vcount_144();

        for (y, expected) in sync_lines.iter().enumerate() {
            assert_eq!(threaded.get_line(y), expected);
        }
    }

    #[test]
    fn identical_frames_reuse_the_buffers() {
        let frame = frame();

        let mut renderer = renderer(false);
        render(&mut renderer, &frame, false);
        let before: Vec<[u32; 256]> = (0..192).map(|y| *renderer.get_line(y)).collect();

        // an identical frame with an empty polygon list must not re-render
        let mut empty = Frame {
            vert_ram: Vec::new(),
            poly_ram: Vec::new(),
            ..frame
        };
        empty.state.clear_depth = 0;
        render(&mut renderer, &empty, true);

        for (y, expected) in before.iter().enumerate() {
            assert_eq!(renderer.get_line(y), expected);
        }
    }

    #[test]
    fn dirty_vram_defeats_the_identical_frame_skip() {
        let mut frame = frame();

        let mut renderer = renderer(false);
        render(&mut renderer, &frame, false);
        assert_eq!(renderer.get_line(96)[128], 63 | 63 << 8 | 63 << 16 | 31 << 24);

        // flag a texture bank dirty: the skip no longer applies and the
        // empty polygon list really renders
        frame.poly_ram.clear();
        frame.state.texture_dirty = 1;
        render(&mut renderer, &frame, true);
        assert_eq!(renderer.get_line(96)[128], 0);
    }

    #[test]
    fn worker_can_be_stopped_and_restarted() {
        let frame = frame();

        let mut renderer = renderer(true);
        renderer.vcount_144();

        render(&mut renderer, &frame, false);
        renderer.vcount_144();
        assert_eq!(renderer.get_line(96)[128], 63 | 63 << 8 | 63 << 16 | 31 << 24);

        renderer.set_threaded(false);
        assert!(!renderer.threaded());
        render(&mut renderer, &frame, false);
        assert_eq!(renderer.get_line(96)[128], 63 | 63 << 8 | 63 << 16 | 31 << 24);

        renderer.set_threaded(true);
        renderer.vcount_144();
        render(&mut renderer, &frame, false);
        renderer.vcount_144();
        assert_eq!(renderer.get_line(96)[128], 63 | 63 << 8 | 63 << 16 | 31 << 24);
    }

    #[test]
    fn reset_clears_the_buffers() {
        let frame = frame();

        let mut renderer = renderer(false);
        render(&mut renderer, &frame, false);
        assert_ne!(renderer.get_line(96)[128], 0);

        renderer.reset();
        assert_eq!(renderer.get_line(96)[128], 0);
    }
}
