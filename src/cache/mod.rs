pub mod error;
pub mod expiry;
pub mod store;
