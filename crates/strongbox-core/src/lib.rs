//! Core abstractions for Strongbox: secure key-store and record-store contracts,
//! stored value model and the naming rules that tie them together.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod naming;
pub mod storage;
pub mod value;

pub use value::StoredValue;
