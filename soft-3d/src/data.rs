use glimmer_core::{
    gpu::engine_3d::{
        Polygon, RenderingControl, RenderingState, ScreenVertex, POLY_RAM_LEN, TEXTURE_VRAM_LEN,
        TEX_PAL_VRAM_LEN, VERT_RAM_LEN,
    },
    utils::{Bytes, Zero},
};

/// The renderer-owned snapshot of everything a frame reads: the render
/// registers, flat texture/palette VRAM, and the vertex/polygon RAM handed
/// over by the geometry engine. Owning a copy lets the rasterizer run on a
/// worker thread while the producer moves on.
#[repr(C)]
pub struct RenderingData {
    pub control: RenderingControl,

    pub alpha_test_ref: u8,

    pub clear_color: u16,
    pub rear_plane_fog_enabled: bool,
    pub clear_alpha: u8,
    pub clear_poly_id: u8,
    pub clear_depth: u16,
    pub clear_image_offset: [u8; 2],

    pub toon_table: [u16; 32],
    pub edge_table: [u16; 8],

    pub fog_color: u32,
    // Scaled to depth-buffer units (the 15-bit register value times 0x200)
    pub fog_offset: u32,
    // One entry longer than the register table: the density interpolation
    // reads index `id + 1` with a zero fraction at the clamp point
    pub fog_densities: [u8; 34],

    pub texture: Bytes<TEXTURE_VRAM_LEN>,
    pub tex_pal: Bytes<TEX_PAL_VRAM_LEN>,

    pub vert_ram: [ScreenVertex; VERT_RAM_LEN],
    pub poly_ram: [Polygon; POLY_RAM_LEN],
    pub poly_ram_level: u16,
}

unsafe impl Zero for RenderingData {}

impl RenderingData {
    fn copy_rendering_state(&mut self, state: &RenderingState) {
        self.control = state.control;

        self.alpha_test_ref = if state.control.alpha_test_enabled() {
            state.alpha_test_ref & 0x1F
        } else {
            0
        };

        self.clear_color = state.clear_color;
        self.rear_plane_fog_enabled = state.rear_plane_fog_enabled;
        self.clear_alpha = state.clear_alpha;
        self.clear_poly_id = state.clear_poly_id;
        self.clear_depth = state.clear_depth;
        self.clear_image_offset = state.clear_image_offset;

        self.toon_table = state.toon_table;
        self.edge_table = state.edge_table;

        self.fog_color = state.fog_color;
        self.fog_offset = (state.fog_offset as u32 & 0x7FFF) * 0x200;
        self.fog_densities[..33].copy_from_slice(&state.fog_densities);
        self.fog_densities[33] = state.fog_densities[32];
    }

    #[inline]
    pub fn prepare(
        &mut self,
        vert_ram: &[ScreenVertex],
        poly_ram: &[Polygon],
        state: &RenderingState,
    ) {
        self.vert_ram[..vert_ram.len()].copy_from_slice(vert_ram);
        self.poly_ram[..poly_ram.len()].copy_from_slice(poly_ram);
        self.poly_ram_level = poly_ram.len() as u16;

        self.copy_rendering_state(state);
    }

    /// Copies the texture and palette VRAM banks flagged dirty in `state`
    /// and reports whether anything was copied (used for the
    /// frame-identical decision).
    pub fn copy_vram(
        &mut self,
        texture: &Bytes<TEXTURE_VRAM_LEN>,
        tex_pal: &Bytes<TEX_PAL_VRAM_LEN>,
        state: &RenderingState,
    ) -> bool {
        for i in 0..4 {
            if state.texture_dirty & 1 << i == 0 {
                continue;
            }
            let range = i << 17..(i + 1) << 17;
            self.texture[range.clone()].copy_from_slice(&texture[range]);
        }

        for i in 0..8 {
            if state.tex_pal_dirty & 1 << i == 0 {
                continue;
            }
            let range = i << 14..(i + 1) << 14;
            self.tex_pal[range.clone()].copy_from_slice(&tex_pal[range]);
        }

        state.texture_dirty != 0 || state.tex_pal_dirty != 0
    }
}
