//! Role computations.
//!
//! Each worker role has one [`Compute`] implementation. The executor wraps
//! it with the cache policy; the worker loop and the worker HTTP surface both
//! go through the executor.

pub mod ascii;
pub mod data;
pub mod img;
pub mod ml5;

pub use ascii::AsciiCompute;
pub use data::DataCompute;
pub use img::ImgCompute;
pub use ml5::Ml5Compute;

use crate::domain::role::Role;
use crate::ports::outbound::{Compute, RecordStore};
use std::sync::Arc;

/// Computation for a worker role, `None` for `api`.
pub fn for_role(role: Role, store: Option<Arc<dyn RecordStore>>) -> Option<Arc<dyn Compute>> {
    match role {
        Role::Api => None,
        Role::Ascii => Some(Arc::new(AsciiCompute)),
        Role::Img => Some(Arc::new(ImgCompute)),
        Role::Ml5 => Some(Arc::new(Ml5Compute)),
        Role::Data => Some(Arc::new(DataCompute::new(store))),
    }
}
