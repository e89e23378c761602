#![warn(clippy::all)]
#![allow(clippy::cast_lossless, clippy::cast_possible_truncation)]

pub mod gpu;
pub mod utils;
