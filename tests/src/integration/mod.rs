//! Multi-node scenarios.

#[cfg(test)]
mod harness;

mod drain;
mod request_reply;
