//! Language-pack import/export engine
//!
//! Bulk files flow through the same catalog as capture and diff-apply.
//! Imports are counts-based: a bad row degrades to a count, never a hard
//! failure of the whole import.

pub mod export;
pub mod import;

pub use export::{export, ExportResult};
pub use import::{import_source, import_target, SourceImportReport, TargetImportReport};
