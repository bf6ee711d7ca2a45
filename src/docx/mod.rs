//! OOXML plumbing: the zip container, lossless XML event streams, text-run
//! extraction, the tag scanner and the merge engine.

pub mod merge;
pub mod package;
pub mod runs;
pub mod scan;
pub mod xml;

pub use merge::{render_document, render_package, MergeOptions};
pub use package::{fingerprint, OoxmlPackage, DOCUMENT_PART};
pub use scan::{scan_package, scan_part, ScanReport};
