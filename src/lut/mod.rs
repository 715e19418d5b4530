//! 3D color-cube grading: `.cube` parsing, a bounded parse cache, application, and authoring.

pub mod authoring;
pub mod cache;
pub mod cube;
pub mod engine;

pub use cache::{LutCache, LutCacheStats};
pub use cube::{parse_cube, LutBuffer};
pub use engine::LutEngine;
