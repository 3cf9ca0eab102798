//! Interaction capture

mod boundary;

pub use boundary::*;
