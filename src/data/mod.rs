//! Interaction data structures and the per-session log

mod descriptor;
mod events;
mod log;

pub use descriptor::*;
pub use events::*;
pub use log::*;
