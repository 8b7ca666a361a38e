//! Discovery of the data files behind a (dataset, resolution, period).

pub mod error;
pub mod indexer;
pub mod remote_file;
