//! Decision-combining feature (C6, spec §4.6).

pub mod combiner;
pub mod dto;
pub mod error;
pub mod use_case;

pub use dto::*;
pub use error::CombineDecisionsError;
pub use use_case::combine_decisions;
