pub mod chain;
pub mod error;
pub mod expander;
pub mod geodesy;
pub mod hull;
pub mod mask;
pub mod models;
pub mod physics;
pub mod report;
pub mod router;
pub mod wind;
