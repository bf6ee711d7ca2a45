use std::collections::BTreeMap;
use std::ops::Range;

use crate::builder::TemplateData;
use crate::docx::package::OoxmlPackage;
use crate::docx::runs::{runs_in, TextRun};
use crate::docx::xml::{parse_part, set_attr, write_part, DocPart, XmlEvent};
use crate::error::{RenderIssue, RenderIssueId, TemplateError, TemplateRenderError};

#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Replacement for a scalar tag whose field does not exist.
    pub missing_glyph: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            missing_glyph: "-".to_string(),
        }
    }
}

pub fn render_document(
    bytes: &[u8],
    data: &TemplateData,
    opts: &MergeOptions,
) -> Result<Vec<u8>, TemplateError> {
    let mut pkg = OoxmlPackage::open(bytes)?;
    render_package(&mut pkg, data, opts)?;
    pkg.serialize()
}

// Diagnostics from all parts are collected before failing; nothing is
// written back unless the whole render is clean.
pub fn render_package(
    pkg: &mut OoxmlPackage,
    data: &TemplateData,
    opts: &MergeOptions,
) -> Result<(), TemplateError> {
    let mut issues = Vec::new();
    let mut rendered = Vec::new();
    for name in pkg.scan_targets() {
        let xml = pkg.read_part(&name)?;
        let part = parse_part(&name, &xml)?;
        let merged = merge_part(&part, data, opts, &mut issues);
        log::debug!("merged {name}, {} issue(s) so far", issues.len());
        rendered.push((name, write_part(&merged)));
    }
    if !issues.is_empty() {
        return Err(TemplateRenderError { issues }.into());
    }
    for (name, xml) in rendered {
        pkg.write_part(&name, &xml);
    }
    Ok(())
}

struct MergeCtx<'a> {
    data: &'a TemplateData,
    opts: &'a MergeOptions,
    part_name: &'a str,
}

// Ranges are byte offsets into the paragraph's concatenated run text;
// tag ranges include both braces.
#[derive(Clone, Debug)]
enum Piece {
    Lit(Range<usize>),
    Tag { range: Range<usize>, inner: String },
}

// An open without its close in the same paragraph starts a block section;
// a close without its open ends one.
#[derive(Default)]
struct ParaClass {
    block_open: Option<String>,
    block_close: Option<String>,
    marker_error: bool,
}

struct ParaInfo {
    events: Vec<XmlEvent>,
    runs: Vec<TextRun>,
    text: String,
    pieces: Vec<Piece>,
    lex_ok: bool,
    class: ParaClass,
}

enum Segment {
    Raw(Vec<XmlEvent>),
    Para(ParaInfo),
}

fn merge_part(
    part: &DocPart,
    data: &TemplateData,
    opts: &MergeOptions,
    issues: &mut Vec<RenderIssue>,
) -> DocPart {
    let ctx = MergeCtx {
        data,
        opts,
        part_name: &part.name,
    };
    let segments = split_segments(part, issues);
    let mut out: Vec<XmlEvent> = Vec::with_capacity(part.events.len());
    let mut i = 0;
    while i < segments.len() {
        match &segments[i] {
            Segment::Raw(events) => {
                out.extend(events.iter().cloned());
                i += 1;
            }
            Segment::Para(info) => {
                if !info.lex_ok || info.class.marker_error {
                    out.extend(info.events.iter().cloned());
                    i += 1;
                    continue;
                }
                // A close reaching this loop was consumed by no open above it.
                if let Some(name) = &info.class.block_close {
                    push_issue(
                        issues,
                        RenderIssueId::UnopenedSection,
                        format!("section close \"{{/{name}}}\" without an open"),
                        Some(format!("{{/{name}}}")),
                        &ctx,
                        &info.text,
                    );
                    out.extend(info.events.iter().cloned());
                    i += 1;
                    continue;
                }
                if let Some(name) = info.class.block_open.clone() {
                    i = expand_block(&segments, i, info, &name, &ctx, issues, &mut out);
                    continue;
                }
                out.extend(merge_paragraph(info, None, &ctx, issues));
                i += 1;
            }
        }
    }
    DocPart {
        name: part.name.clone(),
        events: out,
    }
}

fn expand_block(
    segments: &[Segment],
    open_idx: usize,
    info: &ParaInfo,
    name: &str,
    ctx: &MergeCtx<'_>,
    issues: &mut Vec<RenderIssue>,
    out: &mut Vec<XmlEvent>,
) -> usize {
    let tag = format!("{{#{name}}}");
    let mut close_idx = None;
    for (j, seg) in segments.iter().enumerate().skip(open_idx + 1) {
        if let Segment::Para(p) = seg {
            if p.class.block_close.as_deref() == Some(name) {
                close_idx = Some(j);
                break;
            }
            if let Some(inner_open) = &p.class.block_open {
                push_issue(
                    issues,
                    RenderIssueId::NestedSection,
                    format!("section \"{{#{inner_open}}}\" opened inside \"{tag}\""),
                    Some(tag.clone()),
                    ctx,
                    &p.text,
                );
                out.extend(info.events.iter().cloned());
                return open_idx + 1;
            }
        }
    }
    let close_idx = match close_idx {
        Some(j) => j,
        None => {
            push_issue(
                issues,
                RenderIssueId::UnclosedSection,
                format!("section \"{tag}\" is never closed"),
                Some(tag),
                ctx,
                &info.text,
            );
            out.extend(info.events.iter().cloned());
            return open_idx + 1;
        }
    };
    let body = &segments[open_idx + 1..close_idx];
    if !body_balanced(body) {
        push_issue(
            issues,
            RenderIssueId::SectionSpansContainers,
            format!("section \"{tag}\" body crosses container boundaries"),
            Some(tag),
            ctx,
            &info.text,
        );
        return close_idx + 1;
    }
    let rows = match ctx.data.list(name) {
        Some(rows) => rows,
        None => {
            push_issue(
                issues,
                RenderIssueId::UnknownSection,
                format!("no list field named \"{name}\""),
                Some(tag),
                ctx,
                &info.text,
            );
            return close_idx + 1;
        }
    };
    // Shape problems inside the body repeat identically for every row, so
    // only the first pass reports them. An empty list still gets one pass
    // over an empty row, output discarded, so a malformed body fails the
    // render instead of vanishing with the section.
    if rows.is_empty() {
        let empty_row = BTreeMap::new();
        for seg in body {
            if let Segment::Para(p) = seg {
                merge_paragraph(p, Some(&empty_row), ctx, issues);
            }
        }
        return close_idx + 1;
    }
    let mut scratch = Vec::new();
    for (ri, row) in rows.iter().enumerate() {
        let sink = if ri == 0 { &mut *issues } else { &mut scratch };
        for seg in body {
            match seg {
                Segment::Raw(events) => out.extend(events.iter().cloned()),
                Segment::Para(p) => out.extend(merge_paragraph(p, Some(row), ctx, sink)),
            }
        }
    }
    close_idx + 1
}

fn body_balanced(body: &[Segment]) -> bool {
    let mut depth = 0i64;
    for seg in body {
        let events = match seg {
            Segment::Raw(events) => events,
            Segment::Para(p) => &p.events,
        };
        for event in events {
            match event {
                XmlEvent::Start { .. } => depth += 1,
                XmlEvent::End { .. } => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }
    }
    depth == 0
}

fn merge_paragraph(
    info: &ParaInfo,
    scope: Option<&BTreeMap<String, String>>,
    ctx: &MergeCtx<'_>,
    issues: &mut Vec<RenderIssue>,
) -> Vec<XmlEvent> {
    if !info.lex_ok || info.class.marker_error {
        return info.events.clone();
    }
    if let Some(name) = &info.class.block_close {
        push_issue(
            issues,
            RenderIssueId::UnopenedSection,
            format!("section close \"{{/{name}}}\" without an open"),
            Some(format!("{{/{name}}}")),
            ctx,
            &info.text,
        );
        return info.events.clone();
    }
    if !info.pieces.iter().any(|p| matches!(p, Piece::Tag { .. })) {
        return info.events.clone();
    }
    let before = issues.len();
    let edits = build_edits(info, scope, ctx, issues);
    if issues.len() > before || edits.is_empty() {
        return info.events.clone();
    }
    let plans = plan_run_texts(&info.text, &info.runs, &edits);
    rebuild_paragraph(info, &plans)
}

// Edits come out ordered and non-overlapping: one per scalar tag, one per
// whole inline section span.
fn build_edits(
    info: &ParaInfo,
    scope: Option<&BTreeMap<String, String>>,
    ctx: &MergeCtx<'_>,
    issues: &mut Vec<RenderIssue>,
) -> Vec<(Range<usize>, String)> {
    let mut edits = Vec::new();
    let pieces = &info.pieces;
    let mut idx = 0;
    while idx < pieces.len() {
        let (range, inner) = match &pieces[idx] {
            Piece::Lit(_) => {
                idx += 1;
                continue;
            }
            Piece::Tag { range, inner } => (range.clone(), inner.as_str()),
        };
        if let Some(name) = inner.strip_prefix('#') {
            let name = name.trim();
            let tag = format!("{{#{name}}}");
            if scope.is_some() {
                push_issue(
                    issues,
                    RenderIssueId::NestedSection,
                    format!("section \"{tag}\" opened inside another section"),
                    Some(tag),
                    ctx,
                    &info.text,
                );
                idx += 1;
                continue;
            }
            let mut close = None;
            for (j, piece) in pieces.iter().enumerate().skip(idx + 1) {
                if let Piece::Tag {
                    range: close_range,
                    inner: close_inner,
                } = piece
                {
                    if close_inner.strip_prefix('/').map(str::trim) == Some(name) {
                        close = Some((j, close_range.clone()));
                        break;
                    }
                }
            }
            let (close_j, close_range) = match close {
                Some(found) => found,
                None => {
                    push_issue(
                        issues,
                        RenderIssueId::UnclosedSection,
                        format!("section \"{tag}\" is never closed"),
                        Some(tag),
                        ctx,
                        &info.text,
                    );
                    idx += 1;
                    continue;
                }
            };
            match ctx.data.list(name) {
                None => {
                    push_issue(
                        issues,
                        RenderIssueId::UnknownSection,
                        format!("no list field named \"{name}\""),
                        Some(tag),
                        ctx,
                        &info.text,
                    );
                }
                Some(rows) => {
                    let mut expanded = String::new();
                    for row in rows {
                        expanded.push_str(&render_pieces(
                            &pieces[idx + 1..close_j],
                            info,
                            Some(row),
                            ctx,
                            issues,
                        ));
                    }
                    edits.push((range.start..close_range.end, expanded));
                }
            }
            idx = close_j + 1;
        } else if inner.starts_with('/') {
            push_issue(
                issues,
                RenderIssueId::UnopenedSection,
                format!("section close \"{{{inner}}}\" without an open"),
                Some(format!("{{{inner}}}")),
                ctx,
                &info.text,
            );
            idx += 1;
        } else {
            edits.push((range, resolve_scalar(inner, scope, ctx)));
            idx += 1;
        }
    }
    edits
}

fn render_pieces(
    pieces: &[Piece],
    info: &ParaInfo,
    scope: Option<&BTreeMap<String, String>>,
    ctx: &MergeCtx<'_>,
    issues: &mut Vec<RenderIssue>,
) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Lit(range) => out.push_str(&info.text[range.clone()]),
            Piece::Tag { inner, .. } => {
                if inner.starts_with('#') || inner.starts_with('/') {
                    push_issue(
                        issues,
                        RenderIssueId::NestedSection,
                        format!("section marker \"{{{inner}}}\" inside an inline section body"),
                        Some(format!("{{{inner}}}")),
                        ctx,
                        &info.text,
                    );
                } else {
                    out.push_str(&resolve_scalar(inner, scope, ctx));
                }
            }
        }
    }
    out
}

// A present-but-empty field resolves to the empty string, not the glyph.
fn resolve_scalar(
    name: &str,
    scope: Option<&BTreeMap<String, String>>,
    ctx: &MergeCtx<'_>,
) -> String {
    if let Some(row) = scope {
        if let Some(value) = row.get(name) {
            return value.clone();
        }
    }
    match ctx.data.field(name) {
        Some(value) => value.to_string(),
        None => ctx.opts.missing_glyph.clone(),
    }
}

// The run where an edit starts receives the replacement; runs wholly
// covered go blank; the run where it ends keeps its tail. Runs no edit
// touches stay None.
fn plan_run_texts(
    text: &str,
    runs: &[TextRun],
    edits: &[(Range<usize>, String)],
) -> Vec<Option<String>> {
    let mut spans = Vec::with_capacity(runs.len());
    let mut pos = 0;
    for run in runs {
        let start = pos;
        pos += run.text.len();
        spans.push(start..pos);
    }
    let mut plans: Vec<Option<String>> = vec![None; runs.len()];
    for (ri, span) in spans.iter().enumerate() {
        let mut touched = false;
        let mut out = String::new();
        let mut cursor = span.start;
        for (range, replacement) in edits {
            if range.end <= span.start {
                continue;
            }
            if range.start >= span.end {
                break;
            }
            touched = true;
            if range.start >= span.start {
                out.push_str(&text[cursor..range.start]);
                out.push_str(replacement);
            }
            cursor = range.end.min(span.end).max(cursor);
        }
        if touched {
            out.push_str(&text[cursor..span.end]);
            plans[ri] = Some(out);
        }
    }
    plans
}

fn rebuild_paragraph(info: &ParaInfo, plans: &[Option<String>]) -> Vec<XmlEvent> {
    if plans.iter().all(Option::is_none) {
        return info.events.clone();
    }
    let mut out = Vec::with_capacity(info.events.len() + 8);
    let mut next_run = 0;
    let mut dropping_text = false;
    for (idx, event) in info.events.iter().enumerate() {
        if dropping_text {
            match event {
                XmlEvent::End { name } if name == "w:t" => {
                    dropping_text = false;
                    out.push(event.clone());
                }
                XmlEvent::Text { .. } | XmlEvent::CData { .. } => {}
                other => out.push(other.clone()),
            }
            continue;
        }
        let run_here = if next_run < info.runs.len() && info.runs[next_run].elem_event_index == idx
        {
            let ri = next_run;
            next_run += 1;
            Some(ri)
        } else {
            None
        };
        let plan = run_here.and_then(|ri| plans[ri].as_ref());
        match (plan, event) {
            (Some(new_text), XmlEvent::Start { name, attrs }) => {
                emit_run_text(&mut out, name, attrs, new_text);
                dropping_text = true;
            }
            (Some(new_text), XmlEvent::Empty { name, attrs }) => {
                if new_text.is_empty() {
                    out.push(event.clone());
                } else {
                    emit_run_text(&mut out, name, attrs, new_text);
                    out.push(XmlEvent::End {
                        name: name.clone(),
                    });
                }
            }
            (_, other) => out.push(other.clone()),
        }
    }
    out
}

fn emit_run_text(out: &mut Vec<XmlEvent>, name: &str, attrs: &[(String, String)], text: &str) {
    let segs: Vec<&str> = text.split('\n').collect();
    let mut attrs = attrs.to_vec();
    if segs.iter().any(|s| !s.is_empty() && s.trim() != *s) {
        set_attr(&mut attrs, "xml:space", "preserve");
    }
    for (k, seg) in segs.iter().enumerate() {
        if k > 0 {
            out.push(XmlEvent::End {
                name: name.to_string(),
            });
            out.push(XmlEvent::Empty {
                name: "w:br".to_string(),
                attrs: Vec::new(),
            });
        }
        out.push(XmlEvent::Start {
            name: name.to_string(),
            attrs: attrs.clone(),
        });
        if !seg.is_empty() {
            out.push(XmlEvent::Text {
                text: seg.to_string(),
            });
        }
    }
    // the last spliced element stays open; the caller closes it
}

// Paragraphs in table cells get their own segment; a w:p nested inside
// another w:p (text boxes) stays in the enclosing paragraph's segment.
fn split_segments(part: &DocPart, issues: &mut Vec<RenderIssue>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut raw: Vec<XmlEvent> = Vec::new();
    let mut para: Vec<XmlEvent> = Vec::new();
    let mut depth = 0usize;
    for event in &part.events {
        match event {
            XmlEvent::Start { name, .. } if name == "w:p" => {
                if depth == 0 && !raw.is_empty() {
                    segments.push(Segment::Raw(std::mem::take(&mut raw)));
                }
                depth += 1;
                para.push(event.clone());
            }
            XmlEvent::End { name } if name == "w:p" => {
                if depth == 0 {
                    raw.push(event.clone());
                } else {
                    para.push(event.clone());
                    depth -= 1;
                    if depth == 0 {
                        let info =
                            analyze_paragraph(std::mem::take(&mut para), &part.name, issues);
                        segments.push(Segment::Para(info));
                    }
                }
            }
            other => {
                if depth > 0 {
                    para.push(other.clone());
                } else {
                    raw.push(other.clone());
                }
            }
        }
    }
    if !para.is_empty() {
        raw.extend(para);
    }
    if !raw.is_empty() {
        segments.push(Segment::Raw(raw));
    }
    segments
}

fn analyze_paragraph(
    events: Vec<XmlEvent>,
    part_name: &str,
    issues: &mut Vec<RenderIssue>,
) -> ParaInfo {
    let runs = runs_in(&events);
    let text: String = runs.iter().map(|r| r.text.as_str()).collect();
    let (pieces, lex_ok) = lex_paragraph(&text, part_name, issues);
    let class = if lex_ok {
        classify_markers(&pieces, &text, part_name, issues)
    } else {
        ParaClass::default()
    };
    ParaInfo {
        events,
        runs,
        text,
        pieces,
        lex_ok,
        class,
    }
}

// Tags never span paragraphs: an opener left hanging here is a render
// failure even where the part-level scanner would call a split tag.
fn lex_paragraph(
    text: &str,
    part_name: &str,
    issues: &mut Vec<RenderIssue>,
) -> (Vec<Piece>, bool) {
    let mut pieces = Vec::new();
    let mut ok = true;
    let mut lit_start = 0usize;
    let mut open: Option<usize> = None;
    for (off, c) in text.char_indices() {
        match c {
            '{' => {
                if let Some(start) = open {
                    issues.push(plain_issue(
                        RenderIssueId::NestedTag,
                        format!("'{{' inside tag \"{}\"", &text[start..off]),
                        Some(text[start..off].to_string()),
                        part_name,
                        text,
                    ));
                    ok = false;
                } else {
                    if off > lit_start {
                        pieces.push(Piece::Lit(lit_start..off));
                    }
                    open = Some(off);
                }
            }
            '}' => match open.take() {
                Some(start) => {
                    let end = off + 1;
                    let inner = text[start + 1..off].trim().to_string();
                    let name_part = inner
                        .strip_prefix('#')
                        .or_else(|| inner.strip_prefix('/'))
                        .unwrap_or(inner.as_str());
                    if name_part.trim().is_empty() {
                        issues.push(plain_issue(
                            RenderIssueId::EmptyTag,
                            format!("empty tag \"{}\"", &text[start..end]),
                            Some(text[start..end].to_string()),
                            part_name,
                            text,
                        ));
                        ok = false;
                    }
                    pieces.push(Piece::Tag {
                        range: start..end,
                        inner,
                    });
                    lit_start = end;
                }
                None => {
                    issues.push(plain_issue(
                        RenderIssueId::UnopenedTag,
                        "'}' without a matching '{'".to_string(),
                        None,
                        part_name,
                        text,
                    ));
                    ok = false;
                }
            },
            _ => {}
        }
    }
    if let Some(start) = open {
        issues.push(plain_issue(
            RenderIssueId::UnclosedTag,
            format!("tag \"{}\" is never closed", &text[start..]),
            Some(text[start..].to_string()),
            part_name,
            text,
        ));
        ok = false;
    } else if text.len() > lit_start {
        pieces.push(Piece::Lit(lit_start..text.len()));
    }
    (pieces, ok)
}

fn classify_markers(
    pieces: &[Piece],
    text: &str,
    part_name: &str,
    issues: &mut Vec<RenderIssue>,
) -> ParaClass {
    let mut class = ParaClass::default();
    let mut pending: Option<String> = None;
    for piece in pieces {
        let inner = match piece {
            Piece::Tag { inner, .. } => inner.as_str(),
            Piece::Lit(_) => continue,
        };
        if let Some(name) = inner.strip_prefix('#') {
            let name = name.trim();
            if pending.is_some() || class.block_open.is_some() {
                issues.push(plain_issue(
                    RenderIssueId::NestedSection,
                    format!("section \"{{#{name}}}\" opened inside another section"),
                    Some(format!("{{#{name}}}")),
                    part_name,
                    text,
                ));
                class.marker_error = true;
                return class;
            }
            pending = Some(name.to_string());
        } else if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim();
            match pending.take() {
                Some(open_name) => {
                    if open_name != name {
                        issues.push(plain_issue(
                            RenderIssueId::UnclosedSection,
                            format!("section \"{{#{open_name}}}\" closed by \"{{/{name}}}\""),
                            Some(format!("{{#{open_name}}}")),
                            part_name,
                            text,
                        ));
                        class.marker_error = true;
                        return class;
                    }
                }
                None => {
                    if class.block_close.is_some() {
                        issues.push(plain_issue(
                            RenderIssueId::UnopenedSection,
                            format!("section close \"{{/{name}}}\" without an open"),
                            Some(format!("{{/{name}}}")),
                            part_name,
                            text,
                        ));
                        class.marker_error = true;
                        return class;
                    }
                    class.block_close = Some(name.to_string());
                }
            }
        }
    }
    class.block_open = pending;
    class
}

fn push_issue(
    issues: &mut Vec<RenderIssue>,
    id: RenderIssueId,
    explanation: String,
    tag: Option<String>,
    ctx: &MergeCtx<'_>,
    context: &str,
) {
    issues.push(plain_issue(id, explanation, tag, ctx.part_name, context));
}

fn plain_issue(
    id: RenderIssueId,
    explanation: String,
    tag: Option<String>,
    part_name: &str,
    context: &str,
) -> RenderIssue {
    RenderIssue {
        id,
        explanation,
        tag,
        part_name: part_name.to_string(),
        context: if context.is_empty() {
            None
        } else {
            Some(context.to_string())
        },
    }
}
