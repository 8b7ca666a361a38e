//! Long-format normalization of parsed tables.

pub mod error;
pub mod frame;
pub mod humanize;
pub mod normalizer;

pub use frame::TidyFrame;
pub use humanize::{humanize, ParameterMap};
pub use normalizer::{tidy, widen, ScopedTable, TidyRow};
