//! Template-tag integrity scanner and field-merge engine for Thai
//! government procurement DOCX forms.
//!
//! A form template is an ordinary DOCX whose visible text carries `{tag}`
//! placeholders and `{#list}` … `{/list}` sections. The scanner inventories
//! those tags across fragmented text runs and reports the ones no merge
//! could ever fill; the merge engine substitutes a payload into them while
//! leaving every other byte of markup alone.

pub mod builder;
pub mod docx;
pub mod error;
pub mod payload;
pub mod registry;
pub mod thai;

pub use builder::{build_template_data, TemplateData};
pub use docx::merge::{render_document, MergeOptions};
pub use docx::scan::scan_package;
pub use error::{TemplateError, TemplateRenderError};
pub use payload::{parse_payload, GeneratePayload};
