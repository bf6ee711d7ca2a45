use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderIssueId {
    UnclosedTag,
    UnopenedTag,
    NestedTag,
    EmptyTag,
    UnknownSection,
    UnclosedSection,
    UnopenedSection,
    NestedSection,
    SectionSpansContainers,
}

// tag is the literal tag text when recoverable; context is the paragraph's
// concatenated run text.
#[derive(Clone, Debug, Serialize)]
pub struct RenderIssue {
    pub id: RenderIssueId,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub part_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

// Carries every failing tag across all targeted parts, never folded into
// a single message.
#[derive(Error, Debug)]
#[error("template render failed: {} issue(s), first: {}", issues.len(), first_explanation(issues))]
pub struct TemplateRenderError {
    pub issues: Vec<RenderIssue>,
}

fn first_explanation(issues: &[RenderIssue]) -> &str {
    issues.first().map(|i| i.explanation.as_str()).unwrap_or("none")
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("part not found: {0}")]
    PartNotFound(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Render(#[from] TemplateRenderError),
}
