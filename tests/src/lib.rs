//! # Relay Test Suite
//!
//! Cross-crate tests. Every node runs in this process and reaches the others
//! through its own connection to one in-process broker; clients talk to the
//! nodes over real HTTP.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs        # node startup, reqwest helpers
//!     ├── request_reply.rs  # api ⇄ worker round trips
//!     └── drain.rs          # shutdown behaviour across nodes
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::drain
//! ```

pub mod integration;
