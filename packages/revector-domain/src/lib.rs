mod content;
mod hash;

pub use content::{SourceContent, SourceDocument, SourceTable, UnknownSourceTable};
pub use hash::content_hash;
