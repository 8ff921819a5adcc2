#![doc = include_str!("../README.md")]
#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
    rustdoc::missing_crate_level_docs,
    rustdoc::invalid_codeblock_attributes,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::bare_urls,
    rustdoc::invalid_html_tags
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_lifetimes,
    unused_import_braces,
    unreachable_pub,
    clippy::dbg_macro
)]

mod block_pos;
mod chunk_pos;
mod impls;
mod section_pos;
pub mod var_int;

use std::io::Write;

pub use block_pos::BlockPos;
pub use chunk_pos::ChunkPos;
pub use section_pos::SectionPos;
pub use var_int::VarInt;

/// Writes a value in the byte form sections are sent in. Integers are big
/// endian, and lengths and palette ids are [`VarInt`]s.
///
/// ```
/// use strata_protocol::{Encode, VarInt};
///
/// // A palette of two ids, prefixed by its length.
/// let mut buf = vec![];
/// vec![VarInt(1), VarInt(300)].encode(&mut buf).unwrap();
///
/// assert_eq!(buf, [0x02, 0x01, 0xac, 0x02]);
/// ```
pub trait Encode {
    /// The matching [`Decode`] impl must consume exactly the bytes written
    /// here.
    fn encode(&self, w: impl Write) -> anyhow::Result<()>;
}

/// Reads a value from the front of a byte slice and advances the slice past
/// it.
///
/// ```
/// use strata_protocol::Decode;
///
/// // One packed storage word followed by unrelated data.
/// let mut r: &[u8] = &[0x01, 0, 0, 0, 0, 0, 0, 0, 0x2a, 0xff];
///
/// assert_eq!(Vec::<u64>::decode(&mut r).unwrap(), [42]);
/// assert_eq!(r, [0xff]);
/// ```
pub trait Decode<'a>: Sized {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self>;
}
