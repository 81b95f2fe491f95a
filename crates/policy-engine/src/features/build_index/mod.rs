//! Target indexing / PRP feature (C5, spec §4.5).

pub mod canonicalize;
pub mod dto;
pub mod error;
pub mod index;

pub use dto::{IndexMode, IndexedDocument};
pub use error::BuildIndexError;
pub use index::TargetIndex;
