//! Events - 任务事件广播

mod publisher;

pub(crate) use publisher::progress_before;
pub use publisher::{EventPublisher, JobEvent};
