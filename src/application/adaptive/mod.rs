pub mod controller;

pub use controller::{AdaptiveController, retune};
