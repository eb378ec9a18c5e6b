//! HTTP interface module.
//!
//! Message submission, one-shot reads of the IDE state and the slot list.

pub mod handlers;
pub mod routes;
