//! Densely numbered entity references and the map containers keyed by them.
//!
//! This is the small, dependency-free substrate the rest of the Sox native
//! backend is built on: virtual registers, basic-block labels, and function
//! indices are all dense `u32`-backed references, and the IR/regalloc/codegen
//! crates index into plain `Vec`s through them instead of using pointers.

mod map;

pub use map::{PrimaryMap, SecondaryMap};

/// A type that acts as a small dense index into an array.
///
/// Implementors are newtypes around `u32`. The `entity_impl!` macro below
/// generates the boilerplate.
pub trait EntityRef: Copy + Eq + core::fmt::Debug {
    fn new(index: usize) -> Self;
    fn index(self) -> usize;
}

/// Generate an `EntityRef` newtype wrapping a `u32`.
#[macro_export]
macro_rules! entity_impl {
    ($name:ident) => {
        impl $crate::EntityRef for $name {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "{}{}", stringify!($name), self.0)
            }
        }
    };
    ($name:ident, $display_prefix:expr) => {
        impl $crate::EntityRef for $name {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }
    };
}
