//! Shared byte buffers.
//!
//! [`Buffer`] is the unit of data interchange between slide decoders, the tile
//! cache and the renderer. A tile payload (up to 256KB for a 256x256 RGBA
//! tile) is decoded once into a buffer and then handed around by cloning the
//! handle, never by copying bytes.
//!
//! # Ownership Modes
//!
//! | Mode   | Storage              | `write` past capacity | Frees memory |
//! |--------|----------------------|-----------------------|--------------|
//! | Strong | owned allocation     | grows (may relocate)  | yes          |
//! | Weak   | foreign / shared     | `Overflow` error      | never        |
//!
//! A weak buffer can be turned into a strong one with
//! [`Buffer::strengthen`]; the conversion is one-way.

mod handle;
mod storage;

pub use handle::{Buffer, BufferView, WriteRegion};
pub use storage::Strength;
