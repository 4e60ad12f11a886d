//! Console presentation: table previews and probe progress

pub mod progress;
pub mod table;

pub use progress::ProgressBarSink;
pub use table::{endpoint_preview, matrix_preview, probe_preview};
