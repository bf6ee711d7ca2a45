use serde::Serialize;

use crate::docx::package::{fingerprint, OoxmlPackage};
use crate::docx::runs::{extract_text_runs, TextRun};
use crate::docx::xml::parse_part;
use crate::error::TemplateError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BraceKind {
    Open,
    Close,
    DoubleOpen,
    DoubleClose,
}

// Character offsets into the raw part source, independent of the tag machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BraceToken {
    pub kind: BraceKind,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParsedTag {
    // literal tag text, braces included
    pub value: String,
    pub open_run: usize,
    pub close_run: usize,
    pub split_across_text_nodes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanIssueKind {
    NestedOpen,
    CloseWithoutOpen,
    UnclosedTag,
    SplitTag,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanIssue {
    pub kind: ScanIssueKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartScanReport {
    pub part_name: String,
    pub brace_tokens: Vec<BraceToken>,
    pub tags: Vec<ParsedTag>,
    pub issues: Vec<ScanIssue>,
}

impl PartScanReport {
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanReport {
    pub fingerprint: String,
    pub has_issues: bool,
    pub parts: Vec<PartScanReport>,
}

// An empty targets slice means the default set: the main document plus
// every numbered header and footer.
pub fn scan_package(bytes: &[u8], targets: &[String]) -> Result<ScanReport, TemplateError> {
    let pkg = OoxmlPackage::open(bytes)?;
    let targets = if targets.is_empty() {
        pkg.scan_targets()
    } else {
        targets.to_vec()
    };
    let mut parts = Vec::new();
    for name in &targets {
        let xml = pkg.read_part(name)?;
        parts.push(scan_part(name, &xml)?);
    }
    let has_issues = parts.iter().any(|p| p.has_issues());
    Ok(ScanReport {
        fingerprint: fingerprint(bytes),
        has_issues,
        parts,
    })
}

// Tag anomalies are data in the report; only unparsable XML is an error.
pub fn scan_part(part_name: &str, xml: &str) -> Result<PartScanReport, TemplateError> {
    let part = parse_part(part_name, xml)?;
    let runs = extract_text_runs(&part);
    Ok(scan_runs(part_name, xml, &runs))
}

struct OpenTag {
    text: String,
    open_run: usize,
}

// One open slot only: a nested '{' is reported, then accumulated as a
// literal inside the outer tag; the first '}' closes the open tag.
fn scan_runs(part_name: &str, source: &str, runs: &[TextRun]) -> PartScanReport {
    let mut tags = Vec::new();
    let mut issues = Vec::new();
    let mut open: Option<OpenTag> = None;
    for run in runs {
        for c in run.text.chars() {
            match c {
                '{' => {
                    if let Some(tag) = open.as_mut() {
                        issues.push(ScanIssue {
                            kind: ScanIssueKind::NestedOpen,
                            message: format!("'{{' inside still-open tag \"{}\"", tag.text),
                            run_index: Some(run.run_index),
                        });
                        tag.text.push('{');
                    } else {
                        open = Some(OpenTag {
                            text: String::from("{"),
                            open_run: run.run_index,
                        });
                    }
                }
                '}' => match open.take() {
                    Some(mut tag) => {
                        tag.text.push('}');
                        let split = tag.open_run != run.run_index;
                        if split {
                            issues.push(ScanIssue {
                                kind: ScanIssueKind::SplitTag,
                                message: format!(
                                    "tag \"{}\" opens in run {} and closes in run {}",
                                    tag.text, tag.open_run, run.run_index
                                ),
                                run_index: Some(run.run_index),
                            });
                        }
                        tags.push(ParsedTag {
                            value: tag.text,
                            open_run: tag.open_run,
                            close_run: run.run_index,
                            split_across_text_nodes: split,
                        });
                    }
                    None => {
                        issues.push(ScanIssue {
                            kind: ScanIssueKind::CloseWithoutOpen,
                            message: "'}' with no open tag".to_string(),
                            run_index: Some(run.run_index),
                        });
                    }
                },
                _ => {
                    if let Some(tag) = open.as_mut() {
                        tag.text.push(c);
                    }
                }
            }
        }
    }
    if let Some(tag) = open {
        issues.push(ScanIssue {
            kind: ScanIssueKind::UnclosedTag,
            message: format!("tag \"{}\" still open at end of part", tag.text),
            run_index: Some(tag.open_run),
        });
    }
    PartScanReport {
        part_name: part_name.to_string(),
        brace_tokens: collect_brace_tokens(source),
        tags,
        issues,
    }
}

fn collect_brace_tokens(source: &str) -> Vec<BraceToken> {
    let mut tokens = Vec::new();
    let mut iter = source.chars().enumerate().peekable();
    while let Some((offset, c)) = iter.next() {
        match c {
            '{' => {
                let kind = if iter.next_if(|&(_, n)| n == '{').is_some() {
                    BraceKind::DoubleOpen
                } else {
                    BraceKind::Open
                };
                tokens.push(BraceToken { kind, offset });
            }
            '}' => {
                let kind = if iter.next_if(|&(_, n)| n == '}').is_some() {
                    BraceKind::DoubleClose
                } else {
                    BraceKind::Close
                };
                tokens.push(BraceToken { kind, offset });
            }
            _ => {}
        }
    }
    tokens
}
