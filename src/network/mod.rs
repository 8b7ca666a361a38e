pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod listing;
