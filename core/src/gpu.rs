pub mod engine_3d;

use crate::utils::Zero;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 192;

#[repr(C, align(64))]
#[derive(Clone, Copy)]
pub struct Scanline<T, const LEN: usize = SCREEN_WIDTH>(pub [T; LEN]);

unsafe impl<T: Zero, const LEN: usize> Zero for Scanline<T, LEN> {}
