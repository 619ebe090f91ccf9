//! Memory Layer - In-Memory State Management
//!
//! 任务队列与控制标志的内存实现

mod job_queue;

pub use job_queue::InMemoryJobQueue;
