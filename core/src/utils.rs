use core::ops::{Deref, DerefMut};
use std::alloc::{alloc_zeroed, handle_alloc_error, Layout};

/// Types for which an all-zero bit pattern is a valid value.
///
/// # Safety
/// Every field of the implementing type must itself be valid when zeroed.
pub unsafe trait Zero: Sized {}

unsafe impl Zero for u8 {}
unsafe impl Zero for u16 {}
unsafe impl Zero for u32 {}
unsafe impl Zero for u64 {}
unsafe impl Zero for i8 {}
unsafe impl Zero for i16 {}
unsafe impl Zero for i32 {}
unsafe impl Zero for i64 {}
unsafe impl Zero for bool {}
unsafe impl<T: Zero, const LEN: usize> Zero for [T; LEN] {}

/// Allocates a `Box<T>` with zeroed contents directly on the heap, avoiding a
/// stack round-trip for the multi-megabyte buffers used by the renderers.
pub fn zeroed_box<T: Zero>() -> Box<T> {
    unsafe {
        let layout = Layout::new::<T>();
        let ptr = alloc_zeroed(layout).cast::<T>();
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        Box::from_raw(ptr)
    }
}

/// A fixed-size byte array with little-endian multi-byte accessors, used for
/// flat VRAM views.
#[derive(Clone)]
#[repr(transparent)]
pub struct Bytes<const LEN: usize>(pub [u8; LEN]);

unsafe impl<const LEN: usize> Zero for Bytes<LEN> {}

impl<const LEN: usize> Bytes<LEN> {
    #[inline]
    pub fn new(bytes: [u8; LEN]) -> Self {
        Bytes(bytes)
    }

    #[inline]
    pub fn read_le_u16(&self, addr: usize) -> u16 {
        u16::from_le_bytes([self.0[addr], self.0[addr + 1]])
    }

    #[inline]
    pub fn write_le_u16(&mut self, addr: usize, value: u16) {
        self.0[addr..addr + 2].copy_from_slice(&value.to_le_bytes());
    }
}

impl<const LEN: usize> Deref for Bytes<LEN> {
    type Target = [u8; LEN];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const LEN: usize> DerefMut for Bytes<LEN> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Declares an integer newtype whose values are asserted to stay in
/// `0..=$max` at construction time.
#[macro_export]
macro_rules! bounded_int {
    ($(#[$attr: meta])* $vis: vis struct $name: ident($ty: ty), max $max: literal) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
        $vis struct $name($ty);

        impl $name {
            pub const MAX: $ty = $max;

            #[inline]
            pub const fn new(value: $ty) -> Self {
                assert!(value <= Self::MAX);
                $name(value)
            }

            #[inline]
            pub const fn get(self) -> $ty {
                self.0
            }
        }

        unsafe impl $crate::utils::Zero for $name {}
    };
}
