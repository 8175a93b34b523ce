pub mod assignment;
pub mod lifecycle;
pub mod tracking;
