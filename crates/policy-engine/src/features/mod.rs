//! Vertical-slice features implementing C4 (`evaluate_policy`), C5
//! (`build_index`), and C6 (`combine_decisions`).

pub mod build_index;
pub mod combine_decisions;
pub mod evaluate_policy;
