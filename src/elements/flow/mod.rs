//! Flow-control elements.

mod queue;

pub use queue::{Leaky, Queue};
