//! Per-document variable dictionary fed to the recognizer and updated from
//! assignment results.

mod dictionary;
mod store;

pub use dictionary::{merge_assignments, VariableDictionary, Variables};
pub use store::{MemoryVariableStore, StoreFuture, VariableStore};
