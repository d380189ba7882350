//! Run loops for the canvas pipeline.

pub mod headless;

pub use headless::{run, HeadlessConfig};
