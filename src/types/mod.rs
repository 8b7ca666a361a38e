pub mod coordinates;
pub mod period;
pub mod resolution;
