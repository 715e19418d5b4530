//! Built-in filter stages. Every function takes its input by reference and returns a new
//! frame, so stages can be shared freely across threads.

pub mod blend;
pub mod blur;
pub mod color;
pub mod distort;
pub mod effects;
pub mod generators;
pub mod geometry;
pub mod looks;

pub use color::ColorControls;
