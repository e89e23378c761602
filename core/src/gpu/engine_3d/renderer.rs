use super::{Polygon, RenderingState, ScreenVertex, TEXTURE_VRAM_LEN, TEX_PAL_VRAM_LEN};
use crate::utils::Bytes;

/// The producer-facing interface of a 3D renderer backend.
///
/// `render_frame` is called once per frame after the geometry engine swaps
/// its buffers; the polygon and vertex arrays are borrowed only for the
/// duration of the call. `frame_identical` is the front-end's claim that
/// geometry and render state are unchanged since the previous frame; the
/// renderer may then skip rendering entirely, provided no VRAM it samples
/// from was modified.
pub trait RendererTx {
    fn render_frame(
        &mut self,
        vert_ram: &[ScreenVertex],
        poly_ram: &[Polygon],
        state: &RenderingState,
        texture: &Bytes<TEXTURE_VRAM_LEN>,
        tex_pal: &Bytes<TEX_PAL_VRAM_LEN>,
        frame_identical: bool,
    );

    /// End-of-visible-display synchronization point: blocks until any
    /// in-flight frame has been fully rendered.
    fn vcount_144(&mut self);

    fn reset(&mut self);
}
