//! Bus request/reply protocol.
//!
//! - [`BusRequester`]: api role, publishes envelopes and waits for replies
//! - [`ResponseRouter`]: api role, completes pending records from the inbox
//! - [`Worker`]: worker roles, executes requests and publishes replies

pub mod requester;
pub mod router;
pub mod worker;

pub use requester::{validate_target, BusRequester};
pub use router::{Announcement, AnnouncementRegistry, ResponseRouter};
pub use worker::{Encoding, Inbound, Worker, WorkerOptions};
