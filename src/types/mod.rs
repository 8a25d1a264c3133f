//! Value types carried by light states.

mod color;
mod routine;

pub use color::Color;
pub use routine::{Palette, Routine};
