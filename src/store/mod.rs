//! Request storage.
//!
//! All state is volatile; nothing survives a process restart.

mod request_store;

pub use request_store::RequestStore;
