//! Lore Adapter - 设定检索实现

mod memory_lore_store;

pub use memory_lore_store::{InMemoryLoreStore, DEFAULT_DIMENSION};
