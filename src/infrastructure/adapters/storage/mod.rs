//! Storage Adapter - 检查点与书稿文件

mod file_checkpoint_store;
mod manuscript_exporter;

pub use file_checkpoint_store::FileCheckpointStore;
pub use manuscript_exporter::{render as render_manuscript, ExportError, ManuscriptExporter};
