//! Geometry helpers shared by the pipeline

pub mod letterbox;

pub use letterbox::{Letterbox, LetterboxGeometry};
