// The infra module contains implementations of the core storage traits.
// Each backend goes in its own submodule.

#[path = "memory/memory_store.rs"]
pub mod memory;

#[path = "sqlite/mod.rs"]
pub mod sqlite;
