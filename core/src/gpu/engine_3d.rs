mod vertex;
pub use vertex::ScreenVertex;
mod renderer;
pub use renderer::RendererTx;

use crate::utils::Zero;

pub const TEXTURE_VRAM_LEN: usize = 0x8_0000;
pub const TEX_PAL_VRAM_LEN: usize = 0x2_0000;
pub const VERT_RAM_LEN: usize = 6144;
pub const POLY_RAM_LEN: usize = 2048;

mod bounded {
    use crate::bounded_int;
    bounded_int!(pub struct PolyVertIndex(u8), max 9);
    bounded_int!(pub struct PolyVertsLen(u8), max 10);
    bounded_int!(pub struct VertexAddr(u16), max 6143);
    bounded_int!(pub struct PolyAddr(u16), max 2047);
}
pub use bounded::{PolyAddr, PolyVertIndex, PolyVertsLen, VertexAddr};

proc_bitfield::bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct PolygonAttrs(pub u32): Debug {
        pub lights_mask: u8 @ 0..=3,
        pub mode: u8 @ 4..=5,
        pub show_back: bool @ 6,
        pub show_front: bool @ 7,
        pub update_depth_for_translucent: bool @ 11,
        pub clip_far_plane: bool @ 12,
        pub always_render_1_dot: bool @ 13,
        pub depth_test_equal: bool @ 14,
        pub fog_enabled: bool @ 15,
        pub alpha: u8 @ 16..=20,
        pub id: u8 @ 24..=29,
    }
}

proc_bitfield::bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct TextureParams(pub u32): Debug {
        pub vram_off: u16 @ 0..=15,
        pub repeat_s: bool @ 16,
        pub repeat_t: bool @ 17,
        pub flip_s: bool @ 18,
        pub flip_t: bool @ 19,
        pub size_shift_s: u8 @ 20..=22,
        pub size_shift_t: u8 @ 23..=25,
        pub format: u8 @ 26..=28,
        pub use_color_0_as_transparent: bool @ 29,
        pub coord_transform_mode: u8 @ 30..=31,
    }
}

proc_bitfield::bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct RenderingControl(pub u16): Debug {
        pub texture_mapping_enabled: bool @ 0,
        pub highlight_shading_enabled: bool @ 1,
        pub alpha_test_enabled: bool @ 2,
        pub alpha_blending_enabled: bool @ 3,
        pub antialiasing_enabled: bool @ 4,
        pub edge_marking_enabled: bool @ 5,
        pub fog_only_alpha: bool @ 6,
        pub fog_enabled: bool @ 7,
        pub fog_depth_shift: u8 @ 8..=11,
        pub color_buffer_underflow: bool @ 12,
        pub poly_vert_ram_overflow: bool @ 13,
        pub rear_plane_bitmap_enabled: bool @ 14,
    }
}

unsafe impl Zero for PolygonAttrs {}
unsafe impl Zero for TextureParams {}
unsafe impl Zero for RenderingControl {}

/// A screen-space polygon as produced by the geometry engine: vertex
/// references in draw order plus the per-vertex W and depth values computed
/// by the viewport transform, and the flags the rasterizer dispatches on.
#[derive(Clone, Copy, Debug)]
pub struct Polygon {
    pub verts: [VertexAddr; 10],
    pub verts_len: PolyVertsLen,
    pub w_values: [u16; 10],
    pub depth_values: [i32; 10],
    pub attrs: PolygonAttrs,
    pub tex_params: TextureParams,
    pub tex_palette_base: u16,
    pub top_i: PolyVertIndex,
    pub bot_i: PolyVertIndex,
    pub top_y: u8,
    pub bot_y: u8,
    pub is_front_facing: bool,
    pub w_buffering: bool,
    pub is_shadow_mask: bool,
    pub is_shadow: bool,
    pub degenerate: bool,
}

unsafe impl Zero for Polygon {}

impl Polygon {
    pub const fn new() -> Self {
        Polygon {
            verts: [VertexAddr::new(0); 10],
            verts_len: PolyVertsLen::new(0),
            w_values: [0; 10],
            depth_values: [0; 10],
            attrs: PolygonAttrs(0),
            tex_params: TextureParams(0),
            tex_palette_base: 0,
            top_i: PolyVertIndex::new(0),
            bot_i: PolyVertIndex::new(0),
            top_y: 0,
            bot_y: 0,
            is_front_facing: true,
            w_buffering: false,
            is_shadow_mask: false,
            is_shadow: false,
            degenerate: false,
        }
    }
}

impl Default for Polygon {
    fn default() -> Self {
        Self::new()
    }
}

/// The global render registers latched at the start of a frame, read-only
/// while the frame is rendered.
#[derive(Clone, Debug)]
pub struct RenderingState {
    pub control: RenderingControl,

    pub alpha_test_ref: u8,

    // Clear attribute 1: 15-bit clear color, fog flag, clear alpha and the
    // opaque polygon ID written to cleared pixels
    pub clear_color: u16,
    pub rear_plane_fog_enabled: bool,
    pub clear_alpha: u8,
    pub clear_poly_id: u8,
    // Clear attribute 2: 15-bit clear depth and rear-plane bitmap offsets
    pub clear_depth: u16,
    pub clear_image_offset: [u8; 2],

    pub toon_table: [u16; 32],
    pub edge_table: [u16; 8],

    pub fog_color: u32,
    pub fog_offset: u16,
    pub fog_densities: [u8; 33],

    // Per-bank dirty masks driving the renderer's flat VRAM copies
    pub texture_dirty: u8,
    pub tex_pal_dirty: u8,
}

impl RenderingState {
    pub const fn new() -> Self {
        RenderingState {
            control: RenderingControl(0),
            alpha_test_ref: 0,
            clear_color: 0,
            rear_plane_fog_enabled: false,
            clear_alpha: 0,
            clear_poly_id: 0,
            clear_depth: 0,
            clear_image_offset: [0; 2],
            toon_table: [0; 32],
            edge_table: [0; 8],
            fog_color: 0,
            fog_offset: 0,
            fog_densities: [0; 33],
            texture_dirty: 0,
            tex_pal_dirty: 0,
        }
    }
}

impl Default for RenderingState {
    fn default() -> Self {
        Self::new()
    }
}
