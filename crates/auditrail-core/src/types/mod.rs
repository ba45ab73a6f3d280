pub mod path;
pub mod state;

pub use path::{AuditPath, AuditPathTemplate, PathTemplate, TemplateContext};
pub use state::{StreamState, StreamStatus};
