use glimmer_core::{
    gpu::engine_3d::{TextureParams, TEXTURE_VRAM_LEN, TEX_PAL_VRAM_LEN},
    utils::Bytes,
};

#[inline]
fn texture_u8(texture: &Bytes<TEXTURE_VRAM_LEN>, addr: u32) -> u8 {
    texture[addr as usize & (TEXTURE_VRAM_LEN - 1)]
}

#[inline]
pub(super) fn vram_u16(texture: &Bytes<TEXTURE_VRAM_LEN>, addr: u32) -> u16 {
    texture.read_le_u16(addr as usize & (TEXTURE_VRAM_LEN - 2))
}

#[inline]
fn tex_pal_u16(tex_pal: &Bytes<TEX_PAL_VRAM_LEN>, addr: u32) -> u16 {
    tex_pal.read_le_u16(addr as usize & (TEX_PAL_VRAM_LEN - 2))
}

/// Samples one texel. `s` and `t` are signed with 4 fractional bits; the
/// fractional part is dropped. Returns the raw 15-bit color and a 5-bit
/// alpha.
pub fn sample(
    texture: &Bytes<TEXTURE_VRAM_LEN>,
    tex_pal: &Bytes<TEX_PAL_VRAM_LEN>,
    params: TextureParams,
    palette_base: u32,
    s: i16,
    t: i16,
) -> (u16, u8) {
    let mut vramaddr = (params.vram_off() as u32) << 3;

    let width = 8 << params.size_shift_s();
    let height = 8 << params.size_shift_t();

    let mut s = (s >> 4) as i32;
    let mut t = (t >> 4) as i32;

    if params.repeat_s() {
        if params.flip_s() {
            if s & width != 0 {
                s = (width - 1) - (s & (width - 1));
            } else {
                s &= width - 1;
            }
        } else {
            s &= width - 1;
        }
    } else {
        s = s.clamp(0, width - 1);
    }

    if params.repeat_t() {
        if params.flip_t() {
            if t & height != 0 {
                t = (height - 1) - (t & (height - 1));
            } else {
                t &= height - 1;
            }
        } else {
            t &= height - 1;
        }
    } else {
        t = t.clamp(0, height - 1);
    }

    let alpha0 = if params.use_color_0_as_transparent() {
        0
    } else {
        31
    };

    match params.format() {
        1 => {
            // A3I5
            vramaddr += (t * width + s) as u32;
            let pixel = texture_u8(texture, vramaddr);

            let texpal = palette_base << 4;
            let color = tex_pal_u16(tex_pal, texpal + (((pixel & 0x1F) as u32) << 1));
            let alpha = ((pixel >> 3) & 0x1C) + (pixel >> 6);
            (color, alpha)
        }

        2 => {
            // 4-color
            vramaddr += ((t * width + s) >> 2) as u32;
            let mut pixel = texture_u8(texture, vramaddr);
            pixel >>= (s & 0x3) << 1;
            pixel &= 0x3;

            let texpal = palette_base << 3;
            let color = tex_pal_u16(tex_pal, texpal + ((pixel as u32) << 1));
            (color, if pixel == 0 { alpha0 } else { 31 })
        }

        3 => {
            // 16-color
            vramaddr += ((t * width + s) >> 1) as u32;
            let mut pixel = texture_u8(texture, vramaddr);
            if s & 0x1 != 0 {
                pixel >>= 4;
            } else {
                pixel &= 0xF;
            }

            let texpal = palette_base << 4;
            let color = tex_pal_u16(tex_pal, texpal + ((pixel as u32) << 1));
            (color, if pixel == 0 { alpha0 } else { 31 })
        }

        4 => {
            // 256-color
            vramaddr += (t * width + s) as u32;
            let pixel = texture_u8(texture, vramaddr);

            let texpal = palette_base << 4;
            let color = tex_pal_u16(tex_pal, texpal + ((pixel as u32) << 1));
            (color, if pixel == 0 { alpha0 } else { 31 })
        }

        5 => {
            // 4x4-block compressed
            vramaddr += ((t & 0x3FC) * (width >> 2) + (s & 0x3FC)) as u32;
            vramaddr += (t & 0x3) as u32;

            // the auxiliary palette info lives in the second texture slot,
            // or the second half of it for blocks in the fourth
            let mut slot1addr = 0x20000 + ((vramaddr & 0x1FFFC) >> 1);
            if vramaddr >= 0x40000 {
                slot1addr += 0x10000;
            }

            let mut val = texture_u8(texture, vramaddr);
            val >>= 2 * (s & 0x3);

            let palinfo = vram_u16(texture, slot1addr);
            let paloffset = ((palinfo & 0x3FFF) as u32) << 2;
            let texpal = palette_base << 4;

            let palette_color =
                |index: u32| tex_pal_u16(tex_pal, texpal + paloffset + (index << 1));

            match val & 0x3 {
                0 => (palette_color(0), 31),
                1 => (palette_color(1), 31),
                2 => match palinfo >> 14 {
                    1 => (mix_colors(palette_color(0), palette_color(1), 1, 1, 1), 31),
                    3 => (mix_colors(palette_color(0), palette_color(1), 5, 3, 3), 31),
                    _ => (palette_color(2), 31),
                },
                _ => match palinfo >> 14 {
                    2 => (palette_color(3), 31),
                    3 => (mix_colors(palette_color(0), palette_color(1), 3, 5, 3), 31),
                    _ => (0, 0),
                },
            }
        }

        6 => {
            // A5I3
            vramaddr += (t * width + s) as u32;
            let pixel = texture_u8(texture, vramaddr);

            let texpal = palette_base << 4;
            let color = tex_pal_u16(tex_pal, texpal + (((pixel & 0x7) as u32) << 1));
            (color, pixel >> 3)
        }

        _ => {
            // direct color
            vramaddr += ((t * width + s) << 1) as u32;
            let color = vram_u16(texture, vramaddr);
            (color, if color & 0x8000 != 0 { 31 } else { 0 })
        }
    }
}

/// Per-channel `(c0*f0 + c1*f1) >> shift` on 15-bit colors, masking each
/// channel back into place.
fn mix_colors(color0: u16, color1: u16, f0: u32, f1: u32, shift: u8) -> u16 {
    let r0 = (color0 & 0x001F) as u32;
    let g0 = (color0 & 0x03E0) as u32;
    let b0 = (color0 & 0x7C00) as u32;
    let r1 = (color1 & 0x001F) as u32;
    let g1 = (color1 & 0x03E0) as u32;
    let b1 = (color1 & 0x7C00) as u32;

    let r = (r0 * f0 + r1 * f1) >> shift;
    let g = ((g0 * f0 + g1 * f1) >> shift) & 0x03E0;
    let b = ((b0 * f0 + b1 * f1) >> shift) & 0x7C00;

    (r | g | b) as u16
}
