//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod lore;
pub mod model;
pub mod storage;

pub use lore::*;
pub use model::*;
pub use storage::*;
