mod texture;
mod utils;

use crate::data::RenderingData;
use glimmer_core::{
    gpu::{
        engine_3d::{Polygon, PolyAddr, PolyVertIndex, ScreenVertex},
        Scanline, SCREEN_HEIGHT, SCREEN_WIDTH,
    },
    utils::{zeroed_box, Zero},
};
use utils::{dec_poly_vert_index, inc_poly_vert_index, Interp, Slope};

// Buffer dimensions are 258x194: a 1px offscreen border simplifies the
// neighbor lookups of edge marking. The buffers are two layers deep to keep
// track of the two topmost pixels for antialiasing.
pub const SCANLINE_WIDTH: usize = 258;
pub const NUM_SCANLINES: usize = 194;
pub const BUFFER_SIZE: usize = SCANLINE_WIDTH * NUM_SCANLINES;
pub const FIRST_PIXEL_OFFSET: usize = SCANLINE_WIDTH + 1;

proc_bitfield::bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct PixelAttrs(pub u32): Debug {
        pub edge_mask: u8 @ 0..=3,
        pub left_edge: bool @ 0,
        pub right_edge: bool @ 1,
        pub top_edge: bool @ 2,
        pub bottom_edge: bool @ 3,

        pub back_facing: bool @ 4,

        // Antialiasing coverage of the topmost pixel
        pub coverage: u8 @ 8..=12,

        pub fog_enabled: bool @ 15,

        pub translucent_poly_id: u8 @ 16..=21,
        pub translucent: bool @ 22,

        pub opaque_poly_id: u8 @ 24..=29,
    }
}

unsafe impl Zero for PixelAttrs {}

/// The depth predicate a polygon renders with, chosen once at setup time.
///
/// The test turns into less-or-equal when drawing a front-facing pixel over
/// an opaque back-facing one; the equal mode window depends on the
/// depth-buffering mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DepthTest {
    EqualZ,
    EqualW,
    LessThan,
    LessThanFrontFacing,
}

impl DepthTest {
    fn for_polygon(poly: &Polygon) -> Self {
        if poly.attrs.depth_test_equal() {
            if poly.w_buffering {
                DepthTest::EqualW
            } else {
                DepthTest::EqualZ
            }
        } else if poly.is_front_facing {
            DepthTest::LessThanFrontFacing
        } else {
            DepthTest::LessThan
        }
    }

    #[inline]
    fn passes(self, dst_z: u32, z: i32, dst_attr: u32) -> bool {
        let dst_z = dst_z as i32;
        match self {
            DepthTest::EqualZ => dst_z.wrapping_sub(z).wrapping_add(0x200) as u32 <= 0x400,
            DepthTest::EqualW => dst_z.wrapping_sub(z).wrapping_add(0xFF) as u32 <= 0x1FE,
            DepthTest::LessThan => z < dst_z,
            DepthTest::LessThanFrontFacing => {
                if dst_attr & 0x0040_0010 == 0x0000_0010 {
                    // opaque and back-facing
                    z <= dst_z
                } else {
                    z < dst_z
                }
            }
        }
    }
}

/// Expands a 15-bit color to 6-bit components; nonzero 5-bit channels gain
/// a low bit so full intensity maps to 63.
#[inline]
fn expand_rgb5(color: u16) -> (u8, u8, u8) {
    let mut r = (color << 1) as u8 & 0x3E;
    let mut g = (color >> 4) as u8 & 0x3E;
    let mut b = (color >> 9) as u8 & 0x3E;
    if r != 0 {
        r += 1;
    }
    if g != 0 {
        g += 1;
    }
    if b != 0 {
        b += 1;
    }
    (r, g, b)
}

fn alpha_blend(data: &RenderingData, srccolor: u32, dstcolor: u32, alpha: u32) -> u32 {
    let mut dstalpha = dstcolor >> 24;

    if dstalpha == 0 {
        return srccolor;
    }

    let mut src_r = srccolor & 0x3F;
    let mut src_g = (srccolor >> 8) & 0x3F;
    let mut src_b = (srccolor >> 16) & 0x3F;

    if data.control.alpha_blending_enabled() {
        let dst_r = dstcolor & 0x3F;
        let dst_g = (dstcolor >> 8) & 0x3F;
        let dst_b = (dstcolor >> 16) & 0x3F;

        let factor = alpha + 1;
        src_r = (src_r * factor + dst_r * (32 - factor)) >> 5;
        src_g = (src_g * factor + dst_g * (32 - factor)) >> 5;
        src_b = (src_b * factor + dst_b * (32 - factor)) >> 5;
    }

    if alpha > dstalpha {
        dstalpha = alpha;
    }

    src_r | src_g << 8 | src_b << 16 | dstalpha << 24
}

fn process_pixel(
    data: &RenderingData,
    poly: &Polygon,
    vr: u8,
    vg: u8,
    vb: u8,
    s: i16,
    t: i16,
) -> u32 {
    let blend_mode = poly.attrs.mode();
    let polyalpha = poly.attrs.alpha();
    let wireframe = polyalpha == 0;

    let mut vr = vr;
    let mut vg = vg;
    let mut vb = vb;

    if blend_mode == 2 {
        if data.control.highlight_shading_enabled() {
            // highlight mode: all vertex color components take the red
            // component, and the toon color is added after texture blending
            vg = vr;
            vb = vr;
        } else {
            // toon mode: the vertex color is replaced by the toon color
            let (r, g, b) = expand_rgb5(data.toon_table[(vr >> 1) as usize]);
            vr = r;
            vg = g;
            vb = b;
        }
    }

    let mut r;
    let mut g;
    let mut b;
    let a;
    if data.control.texture_mapping_enabled() && poly.tex_params.format() != 0 {
        let (tcolor, talpha) = texture::sample(
            &data.texture,
            &data.tex_pal,
            poly.tex_params,
            poly.tex_palette_base as u32,
            s,
            t,
        );
        let (tr, tg, tb) = expand_rgb5(tcolor);

        if blend_mode & 0x1 != 0 {
            // decal
            if talpha == 0 {
                r = vr;
                g = vg;
                b = vb;
            } else if talpha == 31 {
                r = tr;
                g = tg;
                b = tb;
            } else {
                let ta = talpha as u32;
                r = ((tr as u32 * ta + vr as u32 * (31 - ta)) >> 5) as u8;
                g = ((tg as u32 * ta + vg as u32 * (31 - ta)) >> 5) as u8;
                b = ((tb as u32 * ta + vb as u32 * (31 - ta)) >> 5) as u8;
            }
            a = polyalpha;
        } else {
            // modulate
            r = (((tr as u32 + 1) * (vr as u32 + 1) - 1) >> 6) as u8;
            g = (((tg as u32 + 1) * (vg as u32 + 1) - 1) >> 6) as u8;
            b = (((tb as u32 + 1) * (vb as u32 + 1) - 1) >> 6) as u8;
            a = (((talpha as u32 + 1) * (polyalpha as u32 + 1) - 1) >> 5) as u8;
        }
    } else {
        r = vr;
        g = vg;
        b = vb;
        a = polyalpha;
    }

    if blend_mode == 2 && data.control.highlight_shading_enabled() {
        let (tr, tg, tb) = expand_rgb5(data.toon_table[(vr >> 1) as usize]);
        r = (r + tr).min(63);
        g = (g + tg).min(63);
        b = (b + tb).min(63);
    }

    // wireframe polygons are always opaque
    let a = if wireframe { 31 } else { a };

    r as u32 | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24
}

#[inline]
fn vert<'a>(data: &'a RenderingData, poly: &Polygon, i: PolyVertIndex) -> &'a ScreenVertex {
    &data.vert_ram[poly.verts[i.get() as usize].get() as usize]
}

#[derive(Clone, Copy)]
struct RendererPolygon {
    poly_addr: PolyAddr,
    slope_l: Slope<false>,
    slope_r: Slope<true>,
    xl: i32,
    xr: i32,
    cur_vl: PolyVertIndex,
    next_vl: PolyVertIndex,
    cur_vr: PolyVertIndex,
    next_vr: PolyVertIndex,
    depth_test: DepthTest,
}

impl RendererPolygon {
    fn new(data: &RenderingData, poly_addr: PolyAddr) -> Self {
        let poly = &data.poly_ram[poly_addr.get() as usize];
        let nverts = poly.verts_len;

        let mut rp = RendererPolygon {
            poly_addr,
            slope_l: Slope::default(),
            slope_r: Slope::default(),
            xl: 0,
            xr: 0,
            cur_vl: poly.top_i,
            next_vl: poly.top_i,
            cur_vr: poly.top_i,
            next_vr: poly.top_i,
            depth_test: DepthTest::for_polygon(poly),
        };

        if poly.is_front_facing {
            rp.next_vl = inc_poly_vert_index(rp.cur_vl, nverts);
            rp.next_vr = dec_poly_vert_index(rp.cur_vr, nverts);
        } else {
            rp.next_vl = dec_poly_vert_index(rp.cur_vl, nverts);
            rp.next_vr = inc_poly_vert_index(rp.cur_vr, nverts);
        }

        if poly.top_y == poly.bot_y {
            // degenerate-Y polygon: pick the leftmost and rightmost of the
            // first, second and last vertices and install dummy slopes
            let mut vl = PolyVertIndex::new(0);
            let mut vr = PolyVertIndex::new(0);

            for i in [PolyVertIndex::new(1), PolyVertIndex::new(nverts.get() - 1)] {
                if vert(data, poly, i).coords[0] < vert(data, poly, vl).coords[0] {
                    vl = i;
                }
                if vert(data, poly, i).coords[0] > vert(data, poly, vr).coords[0] {
                    vr = i;
                }
            }

            rp.cur_vl = vl;
            rp.next_vl = vl;
            rp.cur_vr = vr;
            rp.next_vr = vr;

            rp.slope_l = Slope::setup_dummy(vert(data, poly, vl).coords[0] as i32);
            rp.xl = rp.slope_l.x_val();
            rp.slope_r = Slope::setup_dummy(vert(data, poly, vr).coords[0] as i32);
            rp.xr = rp.slope_r.x_val();
        } else {
            rp.setup_left_edge(data, poly.top_y as i32);
            rp.setup_right_edge(data, poly.top_y as i32);
        }

        rp
    }

    fn setup_left_edge(&mut self, data: &RenderingData, y: i32) {
        let poly = &data.poly_ram[self.poly_addr.get() as usize];

        while y >= vert(data, poly, self.next_vl).coords[1] as i32 && self.cur_vl != poly.bot_i {
            self.cur_vl = self.next_vl;
            self.next_vl = if poly.is_front_facing {
                inc_poly_vert_index(self.cur_vl, poly.verts_len)
            } else {
                dec_poly_vert_index(self.cur_vl, poly.verts_len)
            };
        }

        let cur = vert(data, poly, self.cur_vl);
        let next = vert(data, poly, self.next_vl);
        self.slope_l = Slope::setup(
            cur.coords[0] as i32,
            next.coords[0] as i32,
            cur.coords[1] as i32,
            next.coords[1] as i32,
            poly.w_values[self.cur_vl.get() as usize] as i32,
            poly.w_values[self.next_vl.get() as usize] as i32,
            y,
        );
        self.xl = self.slope_l.x_val();
    }

    fn setup_right_edge(&mut self, data: &RenderingData, y: i32) {
        let poly = &data.poly_ram[self.poly_addr.get() as usize];

        while y >= vert(data, poly, self.next_vr).coords[1] as i32 && self.cur_vr != poly.bot_i {
            self.cur_vr = self.next_vr;
            self.next_vr = if poly.is_front_facing {
                dec_poly_vert_index(self.cur_vr, poly.verts_len)
            } else {
                inc_poly_vert_index(self.cur_vr, poly.verts_len)
            };
        }

        let cur = vert(data, poly, self.cur_vr);
        let next = vert(data, poly, self.next_vr);
        self.slope_r = Slope::setup(
            cur.coords[0] as i32,
            next.coords[0] as i32,
            cur.coords[1] as i32,
            next.coords[1] as i32,
            poly.w_values[self.cur_vr.get() as usize] as i32,
            poly.w_values[self.next_vr.get() as usize] as i32,
            y,
        );
        self.xr = self.slope_r.x_val();
    }
}

pub struct Renderer {
    color_buffer: Box<[u32; BUFFER_SIZE * 2]>,
    depth_buffer: Box<[u32; BUFFER_SIZE * 2]>,
    attr_buffer: Box<[PixelAttrs; BUFFER_SIZE * 2]>,
    // One row per Y parity; bit 0 covers the top layer, bit 1 the bottom one
    stencil_buffer: [Scanline<u8>; 2],
    prev_is_shadow_mask: bool,
    polys: Vec<RendererPolygon>,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            color_buffer: zeroed_box(),
            depth_buffer: zeroed_box(),
            attr_buffer: zeroed_box(),
            stencil_buffer: [Scanline([0; SCREEN_WIDTH]); 2],
            prev_is_shadow_mask: false,
            polys: Vec::with_capacity(2048),
        }
    }

    pub fn reset(&mut self) {
        self.color_buffer.fill(0);
        self.depth_buffer.fill(0);
        self.attr_buffer.fill(PixelAttrs(0));
        for row in &mut self.stencil_buffer {
            row.0.fill(0);
        }
        self.prev_is_shadow_mask = false;
        self.polys.clear();
    }

    /// The visible 256 pixels of a finished scanline, packed
    /// `r | g << 8 | b << 16 | a << 24`.
    pub fn line(&self, line: usize) -> &[u32; SCREEN_WIDTH] {
        let start = line * SCANLINE_WIDTH + FIRST_PIXEL_OFFSET;
        <&[u32; SCREEN_WIDTH]>::try_from(&self.color_buffer[start..start + SCREEN_WIDTH]).unwrap()
    }

    pub fn render_frame(&mut self, data: &RenderingData, line_done: impl FnMut()) {
        self.clear_buffers(data);
        self.render_polygons(data, line_done);
    }

    fn render_polygons(&mut self, data: &RenderingData, mut line_done: impl FnMut()) {
        self.polys.clear();
        for i in 0..data.poly_ram_level as usize {
            if data.poly_ram[i].degenerate {
                continue;
            }
            self.polys.push(RendererPolygon::new(data, PolyAddr::new(i as u16)));
        }

        self.render_scanline(data, 0);

        for y in 1..SCREEN_HEIGHT as i32 {
            self.render_scanline(data, y);
            self.scanline_final_pass(data, y - 1);
            line_done();
        }

        self.scanline_final_pass(data, SCREEN_HEIGHT as i32 - 1);
        line_done();
    }

    fn render_scanline(&mut self, data: &RenderingData, y: i32) {
        for i in 0..self.polys.len() {
            let mut rp = self.polys[i];
            let poly = &data.poly_ram[rp.poly_addr.get() as usize];

            if y >= poly.top_y as i32
                && (y < poly.bot_y as i32 || (y == poly.top_y as i32 && poly.bot_y == poly.top_y))
            {
                if poly.is_shadow_mask {
                    self.render_shadow_mask_scanline(data, &mut rp, y);
                } else {
                    self.render_polygon_scanline(data, &mut rp, y);
                }
                self.polys[i] = rp;
            }
        }
    }

    fn plot_translucent_pixel(
        &mut self,
        data: &RenderingData,
        pixeladdr: usize,
        color: u32,
        z: i32,
        polyattr: u32,
        shadow: bool,
    ) {
        let dstattr = self.attr_buffer[pixeladdr].0;
        let mut attr = (polyattr & 0xE0F0)
            | ((polyattr >> 8) & 0xFF_0000)
            | (1 << 22)
            | (dstattr & 0xFF00_1F0F);

        if shadow {
            // shadows compare against opaque pixels too
            if dstattr & 1 << 22 != 0 {
                if dstattr & 0x007F_0000 == attr & 0x007F_0000 {
                    return;
                }
            } else if dstattr & 0x3F00_0000 == polyattr & 0x3F00_0000 {
                return;
            }
        } else {
            // skip if the translucent polygon IDs are equal
            if dstattr & 0x007F_0000 == attr & 0x007F_0000 {
                return;
            }
        }

        // the fog flag never turns on through a translucent write
        if dstattr & 1 << 15 == 0 {
            attr &= !(1 << 15);
        }

        let color = alpha_blend(data, color, self.color_buffer[pixeladdr], color >> 24);

        if z != -1 {
            self.depth_buffer[pixeladdr] = z as u32;
        }

        self.color_buffer[pixeladdr] = color;
        self.attr_buffer[pixeladdr] = PixelAttrs(attr);
    }

    fn render_shadow_mask_scanline(
        &mut self,
        data: &RenderingData,
        rp: &mut RendererPolygon,
        y: i32,
    ) {
        let poly = &data.poly_ram[rp.poly_addr.get() as usize];

        let mut polyalpha = poly.attrs.alpha() as u32;
        let wireframe = polyalpha == 0;

        // the stencil row is cleared by the first mask polygon on the line
        if !self.prev_is_shadow_mask {
            self.stencil_buffer[y as usize & 1].0.fill(0);
        }
        self.prev_is_shadow_mask = true;

        if poly.top_y != poly.bot_y {
            if y >= vert(data, poly, rp.next_vl).coords[1] as i32 && rp.cur_vl != poly.bot_i {
                rp.setup_left_edge(data, y);
            }
            if y >= vert(data, poly, rp.next_vr).coords[1] as i32 && rp.cur_vr != poly.bot_i {
                rp.setup_right_edge(data, y);
            }
        }

        let mut xstart = rp.xl;
        let mut xend = rp.xr;

        let mut l_filledge;
        let mut r_filledge;
        if polyalpha < 31
            || data.control.antialiasing_enabled()
            || data.control.edge_marking_enabled()
        {
            l_filledge = true;
            r_filledge = true;
        } else {
            l_filledge = rp.slope_l.negative || !rp.slope_l.x_major;
            r_filledge = (!rp.slope_r.negative && rp.slope_r.x_major) || rp.slope_r.incr == 0;
        }

        let mut wl = rp.slope_l.interp.interp(
            poly.w_values[rp.cur_vl.get() as usize] as i32,
            poly.w_values[rp.next_vl.get() as usize] as i32,
        );
        let mut wr = rp.slope_r.interp.interp(
            poly.w_values[rp.cur_vr.get() as usize] as i32,
            poly.w_values[rp.next_vr.get() as usize] as i32,
        );

        let mut zl = rp.slope_l.interp.interp_z(
            poly.depth_values[rp.cur_vl.get() as usize],
            poly.depth_values[rp.next_vl.get() as usize],
            poly.w_buffering,
        );
        let mut zr = rp.slope_r.interp.interp_z(
            poly.depth_values[rp.cur_vr.get() as usize],
            poly.depth_values[rp.next_vr.get() as usize],
            poly.w_buffering,
        );

        // if the left and right edges are swapped, render backwards
        let swapped = xstart > xend;
        let (l_edgelen, r_edgelen) = if swapped {
            core::mem::swap(&mut xstart, &mut xend);
            core::mem::swap(&mut wl, &mut wr);
            core::mem::swap(&mut zl, &mut zr);
            core::mem::swap(&mut l_filledge, &mut r_filledge);
            (
                rp.slope_r.edge_params_y_major().0,
                rp.slope_l.edge_params_y_major().0,
            )
        } else {
            (rp.slope_l.edge_params().0, rp.slope_r.edge_params().0)
        };

        // color and texture attributes aren't needed for shadow masks, and
        // every pixel shares the polygon alpha, so the alpha test happens
        // once up front
        if wireframe {
            polyalpha = 31;
        }
        if polyalpha <= data.alpha_test_ref as u32 {
            return;
        }

        let yedge: u32 = if y == poly.top_y as i32 {
            0x4
        } else if y == poly.bot_y as i32 - 1 {
            0x8
        } else {
            0
        };

        let mut x = xstart;
        let mut interp_x = Interp::<false>::new(xstart, xend + 1, wl, wr);

        if x < 0 {
            x = 0;
        }

        // set stencil bits where the depth test fails; draw nothing

        macro_rules! test_pixel {
            ($x: expr, $filled: expr, $or_bit_0: expr) => {{
                let x = $x;
                let pixeladdr = FIRST_PIXEL_OFFSET + (y as usize * SCANLINE_WIDTH) + x as usize;

                interp_x.set_x(x);

                let z = interp_x.interp_z(zl, zr, poly.w_buffering);
                let dstattr = self.attr_buffer[pixeladdr].0;

                if $filled {
                    let row = y as usize & 1;

                    if !rp.depth_test.passes(self.depth_buffer[pixeladdr], z, dstattr) {
                        if $or_bit_0 {
                            self.stencil_buffer[row].0[x as usize] |= 0x1;
                        } else {
                            self.stencil_buffer[row].0[x as usize] = 1;
                        }
                    }

                    if dstattr & 0x3 != 0 {
                        let pixeladdr = pixeladdr + BUFFER_SIZE;
                        if !rp.depth_test.passes(
                            self.depth_buffer[pixeladdr],
                            z,
                            self.attr_buffer[pixeladdr].0,
                        ) {
                            self.stencil_buffer[row].0[x as usize] |= 0x2;
                        }
                    }
                }
            }};
        }

        // part 1: left edge
        let mut xlimit = xstart + l_edgelen;
        if xlimit > xend + 1 {
            xlimit = xend + 1;
        }
        if xlimit > SCREEN_WIDTH as i32 {
            xlimit = SCREEN_WIDTH as i32;
        }

        for xx in x..xlimit {
            test_pixel!(xx, l_filledge, true);
        }
        x = x.max(xlimit);

        // part 2: polygon interior
        let mut xlimit = xend - r_edgelen + 1;
        if xlimit > xend + 1 {
            xlimit = xend + 1;
        }
        if xlimit > SCREEN_WIDTH as i32 {
            xlimit = SCREEN_WIDTH as i32;
        }

        if wireframe && yedge == 0 {
            x = xlimit;
        } else {
            for xx in x..xlimit {
                test_pixel!(xx, true, false);
            }
            x = x.max(xlimit);
        }

        // part 3: right edge
        let mut xlimit = xend + 1;
        if xlimit > SCREEN_WIDTH as i32 {
            xlimit = SCREEN_WIDTH as i32;
        }

        for xx in x..xlimit {
            test_pixel!(xx, r_filledge, false);
        }

        rp.xl = rp.slope_l.step();
        rp.xr = rp.slope_r.step();
    }

    fn render_polygon_scanline(&mut self, data: &RenderingData, rp: &mut RendererPolygon, y: i32) {
        let poly = &data.poly_ram[rp.poly_addr.get() as usize];

        let mut polyattr = poly.attrs.0 & 0x3F00_8000;
        if !poly.is_front_facing {
            polyattr |= 1 << 4;
        }

        let polyalpha = poly.attrs.alpha();
        let wireframe = polyalpha == 0;

        self.prev_is_shadow_mask = false;

        if poly.top_y != poly.bot_y {
            if y >= vert(data, poly, rp.next_vl).coords[1] as i32 && rp.cur_vl != poly.bot_i {
                rp.setup_left_edge(data, y);
            }
            if y >= vert(data, poly, rp.next_vr).coords[1] as i32 && rp.cur_vr != poly.bot_i {
                rp.setup_right_edge(data, y);
            }
        }

        let mut xstart = rp.xl;
        let mut xend = rp.xr;

        // Edge fill rules for opaque pixels: the left edge fills when its
        // slope is <= 1, the right edge when its slope is > 1; edges with a
        // zero increment always fill, and exactly-vertical right edges were
        // already pushed 1px left by the slope setup. Everything fills for
        // wireframe polygons or when antialiasing/edge marking is on.
        let mut l_filledge;
        let mut r_filledge;
        if wireframe
            || data.control.antialiasing_enabled()
            || data.control.edge_marking_enabled()
        {
            l_filledge = true;
            r_filledge = true;
        } else {
            l_filledge = rp.slope_l.negative || !rp.slope_l.x_major;
            r_filledge = (!rp.slope_r.negative && rp.slope_r.x_major) || rp.slope_r.incr == 0;
        }

        let mut wl = rp.slope_l.interp.interp(
            poly.w_values[rp.cur_vl.get() as usize] as i32,
            poly.w_values[rp.next_vl.get() as usize] as i32,
        );
        let mut wr = rp.slope_r.interp.interp(
            poly.w_values[rp.cur_vr.get() as usize] as i32,
            poly.w_values[rp.next_vr.get() as usize] as i32,
        );

        let mut zl = rp.slope_l.interp.interp_z(
            poly.depth_values[rp.cur_vl.get() as usize],
            poly.depth_values[rp.next_vl.get() as usize],
            poly.w_buffering,
        );
        let mut zr = rp.slope_r.interp.interp_z(
            poly.depth_values[rp.cur_vr.get() as usize],
            poly.depth_values[rp.next_vr.get() as usize],
            poly.w_buffering,
        );

        // If the left and right edges are swapped, render backwards. On
        // hardware, swapped edges break the edge length calculation: such
        // slopes behave as if they were Y-major, which also degrades the
        // antialiasing coverage they report.
        let swapped = xstart > xend;
        let (vlc, vln, vrc, vrn, interp_start, interp_end, l_edge, r_edge) = if swapped {
            core::mem::swap(&mut xstart, &mut xend);
            core::mem::swap(&mut wl, &mut wr);
            core::mem::swap(&mut zl, &mut zr);
            core::mem::swap(&mut l_filledge, &mut r_filledge);
            (
                rp.cur_vr,
                rp.next_vr,
                rp.cur_vl,
                rp.next_vl,
                rp.slope_r.interp,
                rp.slope_l.interp,
                rp.slope_r.edge_params_y_major(),
                rp.slope_l.edge_params_y_major(),
            )
        } else {
            (
                rp.cur_vl,
                rp.next_vl,
                rp.cur_vr,
                rp.next_vr,
                rp.slope_l.interp,
                rp.slope_r.interp,
                rp.slope_l.edge_params(),
                rp.slope_r.edge_params(),
            )
        };
        let (l_edgelen, l_edgecov) = l_edge;
        let (r_edgelen, r_edgecov) = r_edge;

        let vlcur = vert(data, poly, vlc);
        let vlnext = vert(data, poly, vln);
        let vrcur = vert(data, poly, vrc);
        let vrnext = vert(data, poly, vrn);

        // interpolate the vertex attributes along both edges
        let rl = interp_start.interp(vlcur.color[0] as i32, vlnext.color[0] as i32);
        let gl = interp_start.interp(vlcur.color[1] as i32, vlnext.color[1] as i32);
        let bl = interp_start.interp(vlcur.color[2] as i32, vlnext.color[2] as i32);
        let sl = interp_start.interp(vlcur.uv[0] as i32, vlnext.uv[0] as i32);
        let tl = interp_start.interp(vlcur.uv[1] as i32, vlnext.uv[1] as i32);

        let rr = interp_end.interp(vrcur.color[0] as i32, vrnext.color[0] as i32);
        let gr = interp_end.interp(vrcur.color[1] as i32, vrnext.color[1] as i32);
        let br = interp_end.interp(vrcur.color[2] as i32, vrnext.color[2] as i32);
        let sr = interp_end.interp(vrcur.uv[0] as i32, vrnext.uv[0] as i32);
        let tr = interp_end.interp(vrcur.uv[1] as i32, vrnext.uv[1] as i32);

        let yedge: u32 = if y == poly.top_y as i32 {
            0x4
        } else if y == poly.bot_y as i32 - 1 {
            0x8
        } else {
            0
        };

        let mut x = xstart;
        let mut interp_x = Interp::<false>::new(xstart, xend + 1, wl, wr);

        if x < 0 {
            x = 0;
        }

        let mut xcov = 0i32;
        let aa_enabled = data.control.antialiasing_enabled();

        macro_rules! render_pixel {
            ($x: expr, $edge: expr, $aa_edge: expr, $edgecov: expr, $invert_cov: expr) => {{
                let x = $x;
                let mut pixeladdr = FIRST_PIXEL_OFFSET + (y as usize * SCANLINE_WIDTH) + x as usize;
                let mut dstattr = self.attr_buffer[pixeladdr].0;

                if poly.is_shadow {
                    let stencil = self.stencil_buffer[y as usize & 1].0[x as usize];
                    if stencil == 0 {
                        continue;
                    }
                    if stencil & 0x1 == 0 {
                        pixeladdr += BUFFER_SIZE;
                    }
                    if stencil & 0x2 == 0 {
                        // prevents drawing the shadow under antialiased edges
                        dstattr &= !0x3;
                    }
                }

                interp_x.set_x(x);

                let mut z = interp_x.interp_z(zl, zr, poly.w_buffering);

                // if the depth test against the topmost pixel fails, retry
                // against the pixel underneath
                if !rp.depth_test.passes(self.depth_buffer[pixeladdr], z, dstattr) {
                    if dstattr & 0x3 == 0 {
                        continue;
                    }

                    pixeladdr += BUFFER_SIZE;
                    dstattr = self.attr_buffer[pixeladdr].0;
                    if !rp.depth_test.passes(self.depth_buffer[pixeladdr], z, dstattr) {
                        continue;
                    }
                }

                let vr = interp_x.interp(rl, rr);
                let vg = interp_x.interp(gl, gr);
                let vb = interp_x.interp(bl, br);

                let s = interp_x.interp(sl, sr) as i16;
                let t = interp_x.interp(tl, tr) as i16;

                let color = process_pixel(
                    data,
                    poly,
                    (vr >> 3) as u8,
                    (vg >> 3) as u8,
                    (vb >> 3) as u8,
                    s,
                    t,
                );
                let alpha = (color >> 24) as u8;

                if alpha <= data.alpha_test_ref {
                    continue;
                }

                if alpha == 31 {
                    let mut attr = polyattr | $edge;

                    if $aa_edge {
                        let mut cov = $edgecov;
                        if cov & 1 << 31 != 0 {
                            let c = if $invert_cov {
                                (0x1F - (xcov >> 5)).max(0)
                            } else {
                                (xcov >> 5).min(31)
                            };
                            cov = c as u32;
                            xcov += ($edgecov & 0x3FF) as i32;
                        }
                        attr |= cov << 8;

                        // push the old topmost pixel down a layer
                        if pixeladdr < BUFFER_SIZE {
                            self.color_buffer[pixeladdr + BUFFER_SIZE] =
                                self.color_buffer[pixeladdr];
                            self.depth_buffer[pixeladdr + BUFFER_SIZE] =
                                self.depth_buffer[pixeladdr];
                            self.attr_buffer[pixeladdr + BUFFER_SIZE] =
                                self.attr_buffer[pixeladdr];
                        }
                    }

                    self.depth_buffer[pixeladdr] = z as u32;
                    self.color_buffer[pixeladdr] = color;
                    self.attr_buffer[pixeladdr] = PixelAttrs(attr);
                } else {
                    // a translucent pixel without the depth-update flag
                    // suppresses the depth store
                    if !poly.attrs.update_depth_for_translucent() {
                        z = -1;
                    }
                    self.plot_translucent_pixel(data, pixeladdr, color, z, polyattr, poly.is_shadow);

                    // blend with the bottom pixel too if the top carries
                    // antialiasing coverage
                    if dstattr & 0x3 != 0 && pixeladdr < BUFFER_SIZE {
                        self.plot_translucent_pixel(
                            data,
                            pixeladdr + BUFFER_SIZE,
                            color,
                            z,
                            polyattr,
                            poly.is_shadow,
                        );
                    }
                }
            }};
        }

        // part 1: left edge
        let edge = yedge | 0x1;
        let mut xlimit = xstart + l_edgelen;
        if xlimit > xend + 1 {
            xlimit = xend + 1;
        }
        if xlimit > SCREEN_WIDTH as i32 {
            xlimit = SCREEN_WIDTH as i32;
        }
        if l_edgecov & 1 << 31 != 0 {
            xcov = ((l_edgecov >> 12) & 0x3FF) as i32;
            if xcov == 0x3FF {
                xcov = 0;
            }
        }

        if !l_filledge {
            x = xlimit.min(xend - r_edgelen + 1);
            if x < 0 {
                x = 0;
            }
        } else {
            for xx in x..xlimit {
                render_pixel!(xx, edge, aa_enabled, l_edgecov, false);
            }
            x = x.max(xlimit);
        }

        // part 2: polygon interior
        let edge = yedge;
        let mut xlimit = xend - r_edgelen + 1;
        if xlimit > xend + 1 {
            xlimit = xend + 1;
        }
        if xlimit > SCREEN_WIDTH as i32 {
            xlimit = SCREEN_WIDTH as i32;
        }

        if wireframe && edge == 0 {
            x = xlimit;
        } else {
            for xx in x..xlimit {
                render_pixel!(xx, edge, false, 0u32, false);
            }
            x = x.max(xlimit);
        }

        // part 3: right edge
        let edge = yedge | 0x2;
        let mut xlimit = xend + 1;
        if xlimit > SCREEN_WIDTH as i32 {
            xlimit = SCREEN_WIDTH as i32;
        }
        if r_edgecov & 1 << 31 != 0 {
            xcov = ((r_edgecov >> 12) & 0x3FF) as i32;
            if xcov == 0x3FF {
                xcov = 0;
            }
        }

        if r_filledge {
            for xx in x..xlimit {
                render_pixel!(xx, edge, aa_enabled, r_edgecov, true);
            }
        }

        rp.xl = rp.slope_l.step();
        rp.xr = rp.slope_r.step();
    }

    fn calculate_fog_density(&self, data: &RenderingData, pixeladdr: usize) -> u32 {
        let z = self.depth_buffer[pixeladdr];

        let densityid;
        let densityfrac;
        if z < data.fog_offset {
            densityid = 0;
            densityfrac = 0;
        } else {
            // the Z difference is shifted right by two, then left by the fog
            // shift; bits 0-16 are the fractional part and bits 17-31 the
            // density index. With a large enough shift the value overflows
            // and fog wraps around to lower Z ranges, as on hardware.
            let z = (z - data.fog_offset) >> 2 << data.control.fog_depth_shift();

            let id = z >> 17;
            if id >= 32 {
                densityid = 32;
                densityfrac = 0;
            } else {
                densityid = id;
                densityfrac = z & 0x1_FFFF;
            }
        }

        let density = (data.fog_densities[densityid as usize] as u32 * (0x2_0000 - densityfrac)
            + data.fog_densities[densityid as usize + 1] as u32 * densityfrac)
            >> 17;

        if density >= 127 {
            128
        } else {
            density
        }
    }

    fn scanline_final_pass(&mut self, data: &RenderingData, y: i32) {
        let line_offset = FIRST_PIXEL_OFFSET + y as usize * SCANLINE_WIDTH;

        if data.control.edge_marking_enabled() {
            // edge marking, applied to topmost pixels only
            for x in 0..SCREEN_WIDTH {
                let pixeladdr = line_offset + x;

                let attr = self.attr_buffer[pixeladdr].0;
                if attr & 0xF == 0 {
                    continue;
                }

                // opaque polygon IDs are used for edge marking
                let polyid = attr >> 24;
                let z = self.depth_buffer[pixeladdr];

                let marked = {
                    let neighbor = |addr: usize| {
                        polyid != self.attr_buffer[addr].0 >> 24 && z < self.depth_buffer[addr]
                    };
                    neighbor(pixeladdr - 1)
                        || neighbor(pixeladdr + 1)
                        || neighbor(pixeladdr - SCANLINE_WIDTH)
                        || neighbor(pixeladdr + SCANLINE_WIDTH)
                };

                if marked {
                    let (r, g, b) = expand_rgb5(data.edge_table[(polyid >> 3) as usize]);
                    self.color_buffer[pixeladdr] = r as u32
                        | (g as u32) << 8
                        | (b as u32) << 16
                        | (self.color_buffer[pixeladdr] & 0xFF00_0000);

                    // edge marking breaks the antialiasing coverage
                    self.attr_buffer[pixeladdr] =
                        PixelAttrs((attr & 0xFFFF_E0FF) | 0x0000_1000);
                }
            }
        }

        if data.control.fog_enabled() {
            // Fog is applied to the two topmost pixels, which antialiasing
            // requires. The fog step is 0x80000 >> shift: depth buffer
            // values are the register depths scaled by 0x200.
            let fogcolor = !data.control.fog_only_alpha();

            let (fog_r, fog_g, fog_b) = expand_rgb5(data.fog_color as u16);
            let fog_a = (data.fog_color >> 16) & 0x1F;

            macro_rules! fog_pixel {
                ($pixeladdr: expr) => {{
                    let pixeladdr = $pixeladdr;
                    let density = self.calculate_fog_density(data, pixeladdr);

                    let srccolor = self.color_buffer[pixeladdr];
                    let mut src_r = srccolor & 0x3F;
                    let mut src_g = (srccolor >> 8) & 0x3F;
                    let mut src_b = (srccolor >> 16) & 0x3F;
                    let src_a = (srccolor >> 24) & 0x1F;

                    if fogcolor {
                        src_r = (fog_r as u32 * density + src_r * (128 - density)) >> 7;
                        src_g = (fog_g as u32 * density + src_g * (128 - density)) >> 7;
                        src_b = (fog_b as u32 * density + src_b * (128 - density)) >> 7;
                    }

                    let src_a = (fog_a * density + src_a * (128 - density)) >> 7;

                    self.color_buffer[pixeladdr] =
                        src_r | src_g << 8 | src_b << 16 | src_a << 24;
                }};
            }

            for x in 0..SCREEN_WIDTH {
                let pixeladdr = line_offset + x;

                let attr = self.attr_buffer[pixeladdr].0;
                if attr & 1 << 15 == 0 {
                    continue;
                }

                fog_pixel!(pixeladdr);

                // fog for the pixel one layer down
                if attr & 0x3 == 0 {
                    continue;
                }
                let pixeladdr = pixeladdr + BUFFER_SIZE;

                let attr = self.attr_buffer[pixeladdr].0;
                if attr & 1 << 15 == 0 {
                    continue;
                }

                fog_pixel!(pixeladdr);
            }
        }

        if data.control.antialiasing_enabled() {
            // edges were flagged and their coverages computed during
            // rendering; blend them with the pixels underneath
            for x in 0..SCREEN_WIDTH {
                let pixeladdr = line_offset + x;

                let attr = self.attr_buffer[pixeladdr].0;
                if attr & 0x3 == 0 {
                    continue;
                }

                let coverage = (attr >> 8) & 0x1F;
                if coverage == 0x1F {
                    continue;
                }

                if coverage == 0 {
                    self.color_buffer[pixeladdr] = self.color_buffer[pixeladdr + BUFFER_SIZE];
                    continue;
                }

                let topcolor = self.color_buffer[pixeladdr];
                let top_r = topcolor & 0x3F;
                let top_g = (topcolor >> 8) & 0x3F;
                let top_b = (topcolor >> 16) & 0x3F;
                let top_a = (topcolor >> 24) & 0x1F;

                let botcolor = self.color_buffer[pixeladdr + BUFFER_SIZE];
                let bot_r = botcolor & 0x3F;
                let bot_g = (botcolor >> 8) & 0x3F;
                let bot_b = (botcolor >> 16) & 0x3F;
                let bot_a = (botcolor >> 24) & 0x1F;

                let coverage = coverage + 1;

                // only blend the color if the bottom pixel isn't fully
                // transparent; alpha is always blended
                let (r, g, b) = if bot_a > 0 {
                    (
                        (top_r * coverage + bot_r * (32 - coverage)) >> 5,
                        (top_g * coverage + bot_g * (32 - coverage)) >> 5,
                        (top_b * coverage + bot_b * (32 - coverage)) >> 5,
                    )
                } else {
                    (top_r, top_g, top_b)
                };

                let a = (top_a * coverage + bot_a * (32 - coverage)) >> 5;

                self.color_buffer[pixeladdr] = r | g << 8 | b << 16 | a << 24;
            }
        }
    }

    fn clear_buffers(&mut self, data: &RenderingData) {
        let clearz = ((data.clear_depth as u32 & 0x7FFF) * 0x200) + 0x1FF;
        let polyid = (data.clear_poly_id as u32) << 24;

        // fill the screen borders consumed by edge marking
        macro_rules! clear_pixel {
            ($addr: expr, $color: expr, $depth: expr, $attr: expr) => {{
                let addr = $addr;
                self.color_buffer[addr] = $color;
                self.depth_buffer[addr] = $depth;
                self.attr_buffer[addr] = PixelAttrs($attr);
            }};
        }

        for x in 0..SCANLINE_WIDTH {
            clear_pixel!(x, 0, clearz, polyid);
        }
        for x in (SCANLINE_WIDTH..SCANLINE_WIDTH * (NUM_SCANLINES - 1)).step_by(SCANLINE_WIDTH) {
            clear_pixel!(x, 0, clearz, polyid);
            clear_pixel!(x + SCANLINE_WIDTH - 1, 0, clearz, polyid);
        }
        for x in SCANLINE_WIDTH * (NUM_SCANLINES - 1)..SCANLINE_WIDTH * NUM_SCANLINES {
            clear_pixel!(x, 0, clearz, polyid);
        }

        if data.control.rear_plane_bitmap_enabled() {
            let mut xoff = data.clear_image_offset[0];
            let mut yoff = data.clear_image_offset[1];

            for y in 0..SCREEN_HEIGHT {
                for x in 0..SCREEN_WIDTH {
                    let addr = ((yoff as u32) << 9) + ((xoff as u32) << 1);
                    let val2 = texture::vram_u16(&data.texture, 0x40000 + addr);
                    let val3 = texture::vram_u16(&data.texture, 0x60000 + addr);

                    let (r, g, b) = expand_rgb5(val2);
                    let a = if val2 & 0x8000 != 0 { 0x1F00_0000 } else { 0 };
                    let color = r as u32 | (g as u32) << 8 | (b as u32) << 16 | a;

                    let z = ((val3 & 0x7FFF) as u32 * 0x200) + 0x1FF;

                    let pixeladdr = FIRST_PIXEL_OFFSET + y * SCANLINE_WIDTH + x;
                    clear_pixel!(pixeladdr, color, z, polyid | (val3 & 0x8000) as u32);

                    xoff = xoff.wrapping_add(1);
                }
                yoff = yoff.wrapping_add(1);
            }
        } else {
            let (r, g, b) = expand_rgb5(data.clear_color);
            let color =
                r as u32 | (g as u32) << 8 | (b as u32) << 16 | (data.clear_alpha as u32) << 24;

            let polyid = polyid | if data.rear_plane_fog_enabled { 0x8000 } else { 0 };

            for y in 0..SCREEN_HEIGHT {
                for x in 0..SCREEN_WIDTH {
                    let pixeladdr = FIRST_PIXEL_OFFSET + y * SCANLINE_WIDTH + x;
                    clear_pixel!(pixeladdr, color, clearz, polyid);
                }
            }
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimmer_core::gpu::engine_3d::{
        PolygonAttrs, PolyVertsLen, RenderingControl, TextureParams, VertexAddr,
    };

    fn data() -> Box<RenderingData> {
        let mut data = zeroed_box::<RenderingData>();
        data.clear_depth = 0x7FFF;
        data
    }

    // Front-facing polygons enumerate their vertices starting at the top,
    // walking down the left side first.
    fn put_poly(
        data: &mut RenderingData,
        verts: &[(u16, u16)],
        w: u16,
        z: i32,
        color: [u16; 3],
        attrs: PolygonAttrs,
    ) {
        let index = data.poly_ram_level as usize;
        let vert_base = index * 10;

        let mut poly = Polygon::new();
        poly.verts_len = PolyVertsLen::new(verts.len() as u8);

        let mut top_y = u8::MAX;
        let mut bot_y = 0;
        for (i, &(x, y)) in verts.iter().enumerate() {
            let addr = vert_base + i;
            data.vert_ram[addr] = ScreenVertex {
                coords: [x, y],
                color: [color[0] << 3, color[1] << 3, color[2] << 3],
                uv: [0, 0],
            };
            poly.verts[i] = VertexAddr::new(addr as u16);
            poly.w_values[i] = w;
            poly.depth_values[i] = z;

            let y = y as u8;
            if y < top_y {
                top_y = y;
                poly.top_i = PolyVertIndex::new(i as u8);
            }
            if y > bot_y {
                bot_y = y;
                poly.bot_i = PolyVertIndex::new(i as u8);
            }
        }
        poly.top_y = top_y;
        poly.bot_y = bot_y.max(top_y);
        poly.attrs = attrs;
        poly.is_shadow_mask = attrs.mode() == 3 && attrs.id() == 0;
        poly.is_shadow = attrs.mode() == 3 && attrs.id() != 0;

        data.poly_ram[index] = poly;
        data.poly_ram_level += 1;
    }

    fn set_tex_params(data: &mut RenderingData, index: usize, params: TextureParams) {
        data.poly_ram[index].tex_params = params;
    }

    fn opaque() -> PolygonAttrs {
        PolygonAttrs(0).with_alpha(31)
    }

    const FULL_QUAD: &[(u16, u16)] = &[(0, 0), (0, 191), (255, 191), (255, 0)];

    #[test]
    fn flat_triangle_fills_interior() {
        let mut data = data();
        put_poly(
            &mut data,
            &[(0, 0), (128, 191), (255, 0)],
            0x1000,
            0,
            [63, 63, 63],
            opaque(),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        let white = 63 | 63 << 8 | 63 << 16 | 31 << 24;
        assert_eq!(renderer.line(0)[0], white);
        assert_eq!(renderer.line(0)[128], white);
        assert_eq!(renderer.line(96)[128], white);
        // outside the triangle the clear color remains
        assert_eq!(renderer.line(96)[40], 0);
        // the bottom vertex row is outside the Y range
        assert_eq!(renderer.line(191)[128], 0);
    }

    #[test]
    fn single_scanline_polygon_uses_the_dummy_slopes() {
        let mut data = data();
        put_poly(
            &mut data,
            &[(10, 5), (30, 5), (20, 5)],
            0x1000,
            0,
            [63, 63, 63],
            opaque(),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        let white = 63 | 63 << 8 | 63 << 16 | 31 << 24;
        let line = renderer.line(5);
        assert_eq!(line[9], 0);
        assert_eq!(line[10], white);
        assert_eq!(line[29], white);
        assert_eq!(line[30], 0);
        assert_eq!(renderer.line(4)[15], 0);
        assert_eq!(renderer.line(6)[15], 0);
    }

    #[test]
    fn translucent_blends_over_opaque() {
        let mut data = data();
        data.control = RenderingControl(0).with_alpha_blending_enabled(true);

        put_poly(&mut data, FULL_QUAD, 0x1000, 0x10000, [63, 0, 0], opaque());
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x8000,
            [0, 0, 63],
            PolygonAttrs(0).with_alpha(16).with_id(3),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        let r = (0 * 17 + 63 * 15) >> 5;
        let b = (63 * 17 + 0 * 15) >> 5;
        assert_eq!(renderer.line(96)[128], r | b << 16 | 31 << 24);
    }

    #[test]
    fn translucent_skips_matching_translucent_poly_id() {
        let mut data = data();
        data.control = RenderingControl(0).with_alpha_blending_enabled(true);

        put_poly(&mut data, FULL_QUAD, 0x1000, 0x10000, [63, 0, 0], opaque());
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0xC000,
            [0, 0, 63],
            PolygonAttrs(0).with_alpha(16).with_id(3),
        );
        // same translucent polygon ID: must not blend twice
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x8000,
            [0, 63, 0],
            PolygonAttrs(0).with_alpha(16).with_id(3),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        let r = (0 * 17 + 63 * 15) >> 5;
        let b = (63 * 17 + 0 * 15) >> 5;
        assert_eq!(renderer.line(96)[128], r | b << 16 | 31 << 24);
    }

    #[test]
    fn alpha_equal_to_reference_is_discarded() {
        let mut data = data();
        data.control = RenderingControl(0).with_alpha_blending_enabled(true);
        data.alpha_test_ref = 16;

        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x8000,
            [0, 0, 63],
            PolygonAttrs(0).with_alpha(16).with_id(3),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});
        assert_eq!(renderer.line(96)[128], 0);

        // strictly greater passes
        data.alpha_test_ref = 15;
        renderer.render_frame(&data, || {});
        assert_eq!(renderer.line(96)[128], 63 << 16 | 16 << 24);
    }

    #[test]
    fn shadow_mask_and_shadow_darken_failing_pixels() {
        let mut data = data();
        data.control = RenderingControl(0).with_alpha_blending_enabled(true);

        // opaque green, then a mask behind it, then the shadow in front
        put_poly(&mut data, FULL_QUAD, 0x1000, 0x8000, [0, 63, 0], opaque().with_id(1));
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x20000,
            [0, 0, 0],
            PolygonAttrs(0).with_alpha(16).with_mode(3).with_id(0),
        );
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x4000,
            [0, 0, 0],
            PolygonAttrs(0).with_alpha(16).with_mode(3).with_id(2),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        let g = (0 * 17 + 63 * 15) >> 5;
        assert_eq!(renderer.line(96)[128], g << 8 | 31 << 24);
    }

    #[test]
    fn shadow_skips_matching_opaque_poly_id() {
        let mut data = data();
        data.control = RenderingControl(0).with_alpha_blending_enabled(true);

        put_poly(&mut data, FULL_QUAD, 0x1000, 0x8000, [0, 63, 0], opaque().with_id(1));
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x20000,
            [0, 0, 0],
            PolygonAttrs(0).with_alpha(16).with_mode(3).with_id(0),
        );
        // the shadow shares the opaque polygon's ID: self-shadowing is
        // suppressed
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x4000,
            [0, 0, 0],
            PolygonAttrs(0).with_alpha(16).with_mode(3).with_id(1),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        assert_eq!(renderer.line(96)[128], 63 << 8 | 31 << 24);
    }

    #[test]
    fn edge_marking_replaces_boundary_color() {
        let mut data = data();
        data.control = RenderingControl(0).with_edge_marking_enabled(true);
        data.edge_table[0] = 0x03E0; // pure green, for polygon IDs 0..=7

        put_poly(
            &mut data,
            &[(0, 0), (0, 191), (128, 191), (128, 0)],
            0x1000,
            0x8000,
            [63, 0, 0],
            opaque().with_id(5),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        // the rightmost covered column borders the clear plane (different
        // polygon ID, greater depth): marked with the edge color
        assert_eq!(renderer.line(96)[127], 63 << 8 | 31 << 24);
        // interior pixels are left alone
        assert_eq!(renderer.line(96)[64], 63 | 31 << 24);
    }

    #[test]
    fn fog_blends_toward_fog_color() {
        let mut data = data();
        data.control = RenderingControl(0)
            .with_fog_enabled(true)
            .with_fog_depth_shift(15);
        data.fog_color = 0x1F | 31 << 16; // red, full alpha
        data.fog_offset = 0;
        data.fog_densities[1] = 127;

        // z' = (8 >> 2) << 15 = 0x10000: halfway into the first ramp step
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            8,
            [0, 0, 0],
            opaque().with_fog_enabled(true),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        let density = (127 * 0x10000) >> 17; // 63
        let r = (63 * density) >> 7;
        assert_eq!(renderer.line(96)[128], r | 31 << 24);

        // an all-zero density table leaves colors untouched
        data.fog_densities = [0; 34];
        renderer.render_frame(&data, || {});
        assert_eq!(renderer.line(96)[128], 31 << 24);
    }

    #[test]
    fn antialiasing_leaves_vertical_edges_alone() {
        let mut base = data();
        put_poly(&mut base, FULL_QUAD, 0x1000, 0x8000, [63, 20, 5], opaque());

        let mut plain = Renderer::new();
        plain.render_frame(&base, || {});

        base.control = RenderingControl(0).with_antialiasing_enabled(true);
        let mut aa = Renderer::new();
        aa.render_frame(&base, || {});

        // vertical edges report full coverage, so the blend pass is a no-op
        for y in [0, 96, 190] {
            assert_eq!(aa.line(y), plain.line(y));
        }
    }

    #[test]
    fn wireframe_renders_only_the_outline() {
        let mut data = data();
        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x8000,
            [63, 63, 63],
            PolygonAttrs(0).with_alpha(0),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        let white = 63 | 63 << 8 | 63 << 16 | 31 << 24;
        // left edge column and top row are drawn, the interior isn't
        assert_eq!(renderer.line(96)[0], white);
        assert_eq!(renderer.line(0)[128], white);
        assert_eq!(renderer.line(96)[128], 0);
    }

    #[test]
    fn modulate_combines_texture_and_vertex_color() {
        let mut data = data();
        data.control = RenderingControl(0).with_texture_mapping_enabled(true);
        for i in 0..64 {
            data.texture.write_le_u16(i << 1, 0xFFFF);
        }

        put_poly(&mut data, FULL_QUAD, 0x1000, 0x8000, [63, 0, 0], opaque());
        set_tex_params(&mut data, 0, TextureParams(7 << 26));

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        // white texel times red vertex color
        assert_eq!(renderer.line(96)[128], 63 | 31 << 24);
    }

    #[test]
    fn decal_with_opaque_texel_takes_the_texture_color() {
        let mut data = data();
        data.control = RenderingControl(0).with_texture_mapping_enabled(true);
        for i in 0..64 {
            data.texture.write_le_u16(i << 1, 0xFFFF);
        }

        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x8000,
            [63, 0, 0],
            opaque().with_mode(1),
        );
        set_tex_params(&mut data, 0, TextureParams(7 << 26));

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        assert_eq!(renderer.line(96)[128], 63 | 63 << 8 | 63 << 16 | 31 << 24);
    }

    #[test]
    fn toon_mode_replaces_the_vertex_color() {
        let mut data = data();
        data.toon_table[20] = 0x03E0;

        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x8000,
            [40, 0, 0],
            opaque().with_mode(2),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        assert_eq!(renderer.line(96)[128], 63 << 8 | 31 << 24);
    }

    #[test]
    fn highlight_mode_adds_the_toon_color() {
        let mut data = data();
        data.control = RenderingControl(0).with_highlight_shading_enabled(true);
        data.toon_table[20] = 0x03E0;

        put_poly(
            &mut data,
            FULL_QUAD,
            0x1000,
            0x8000,
            [40, 10, 20],
            opaque().with_mode(2),
        );

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        // green and blue take the red component, then the toon color is
        // added with saturation
        assert_eq!(renderer.line(96)[128], 40 | 63 << 8 | 40 << 16 | 31 << 24);
    }

    #[test]
    fn rear_plane_bitmap_sources_color_and_depth_from_vram() {
        let mut data = data();
        data.control = RenderingControl(0).with_rear_plane_bitmap_enabled(true);

        // color bitmap at 0x40000, depth bitmap at 0x60000; pixel (1, 0)
        let addr = 1 << 1;
        data.texture.write_le_u16(0x40000 + addr, 0x8000 | 0x001F);
        data.texture.write_le_u16(0x60000 + addr, 0x7FFF);

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        assert_eq!(renderer.line(0)[1], 63 | 0x1F00_0000);
        // pixels whose bitmap entries are zero stay transparent black
        assert_eq!(renderer.line(0)[0], 0);
    }

    #[test]
    fn clear_color_fill_applies_clear_attributes() {
        let mut data = data();
        data.clear_color = 0x7C00; // blue
        data.clear_alpha = 31;
        data.clear_poly_id = 7;

        let mut renderer = Renderer::new();
        renderer.render_frame(&data, || {});

        assert_eq!(renderer.line(100)[200], 63 << 16 | 31 << 24);
    }
}
