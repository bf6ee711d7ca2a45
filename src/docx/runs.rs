use crate::docx::xml::{DocPart, XmlEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub run_index: usize,
    pub text: String,
    pub elem_event_index: usize,
}

pub fn extract_text_runs(part: &DocPart) -> Vec<TextRun> {
    runs_in(&part.events)
}

// Word never nests w:t, so a single open-element slot is enough. Empty
// elements still occupy a run index so indices stay aligned between the
// scanner and the merge.
pub fn runs_in(events: &[XmlEvent]) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::new();
    let mut open: Option<TextRun> = None;
    for (idx, event) in events.iter().enumerate() {
        match event {
            XmlEvent::Start { name, .. } if name == "w:t" => {
                open = Some(TextRun {
                    run_index: runs.len(),
                    text: String::new(),
                    elem_event_index: idx,
                });
            }
            XmlEvent::Empty { name, .. } if name == "w:t" => {
                runs.push(TextRun {
                    run_index: runs.len(),
                    text: String::new(),
                    elem_event_index: idx,
                });
            }
            XmlEvent::End { name } if name == "w:t" => {
                if let Some(run) = open.take() {
                    runs.push(run);
                }
            }
            XmlEvent::Text { text } | XmlEvent::CData { text } => {
                if let Some(run) = open.as_mut() {
                    run.text.push_str(text);
                }
            }
            _ => {}
        }
    }
    runs
}
