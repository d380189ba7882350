//! Hand tracking - landmark geometry, gesture classification, and the
//! landmark source boundary.

pub mod classifier;
pub mod landmarks;
pub mod source;

pub use classifier::{Gesture, GestureClassifier, GestureState};
pub use landmarks::{HandSample, Landmark, Point};
