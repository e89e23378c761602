use crate::utils::Zero;

/// A vertex after the viewport transform. The color components are 9-bit
/// (the 6-bit vertex color shifted left by 3); texture coordinates are
/// signed 1/16ths of a texel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenVertex {
    pub coords: [u16; 2],
    pub color: [u16; 3],
    pub uv: [i16; 2],
}

unsafe impl Zero for ScreenVertex {}

impl ScreenVertex {
    pub const fn new() -> Self {
        ScreenVertex {
            coords: [0; 2],
            color: [0; 3],
            uv: [0; 2],
        }
    }
}

impl Default for ScreenVertex {
    fn default() -> Self {
        Self::new()
    }
}
