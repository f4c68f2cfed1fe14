//! Ports to external collaborators.

pub mod outbound;

pub use outbound::{Compute, RecordStore, ResultCache};
