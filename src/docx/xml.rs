use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::TemplateError;

// Parts are rewritten event-by-event, so every lexical form (decl, PI,
// doctype, comments, CDATA) must survive the round trip.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

/// Parsed working copy of one part (`word/document.xml`, a header, a footer).
#[derive(Clone, Debug)]
pub struct DocPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

pub fn parse_part(name: &str, xml: &str) -> Result<DocPart, TemplateError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let corrupt =
        |e: &dyn std::fmt::Display| TemplateError::CorruptArchive(format!("{name}: {e}"));

    let mut events: Vec<XmlEvent> = Vec::new();
    loop {
        let ev = reader.read_event().map_err(|e| corrupt(&e))?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = d
                    .version()
                    .map(bytes_to_string)
                    .map_err(|e| corrupt(&e))?;
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                let attrs = collect_attrs(&s).map_err(|e| corrupt(&e))?;
                events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs,
                });
            }
            Event::End(e) => {
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Empty(s) => {
                let attrs = collect_attrs(&s).map_err(|e| corrupt(&e))?;
                events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs,
                });
            }
            Event::Text(t) => {
                let txt = t.unescape().map_err(|e| corrupt(&e))?.into_owned();
                events.push(XmlEvent::Text { text: txt });
            }
            Event::CData(t) => {
                events.push(XmlEvent::CData {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::Comment(t) => {
                events.push(XmlEvent::Comment {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => {
                events.push(XmlEvent::DocType {
                    text: bytes_to_string(t.into_inner()),
                });
            }
        }
    }

    Ok(DocPart {
        name: name.to_string(),
        events,
    })
}

fn collect_attrs(
    s: &quick_xml::events::BytesStart<'_>,
) -> quick_xml::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.map_err(quick_xml::Error::from)?;
        let key = bytes_to_string(a.key.as_ref());
        // Attribute values stay raw (still escaped). Unescaping character
        // references like &#13;&#10; and re-escaping on write would turn
        // them into literal newlines, which XML attribute normalization then
        // rewrites to spaces, corrupting embedded-object payloads.
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_part(part: &DocPart) -> String {
    let mut out = String::new();
    for ev in &part.events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                out.push_str("<?xml version=\"");
                out.push_str(version);
                out.push('"');
                if let Some(enc) = encoding {
                    out.push_str(" encoding=\"");
                    out.push_str(enc);
                    out.push('"');
                }
                if let Some(sa) = standalone {
                    out.push_str(" standalone=\"");
                    out.push_str(sa);
                    out.push('"');
                }
                out.push_str("?>");
            }
            XmlEvent::Start { name, attrs } => {
                write_start_like(&mut out, name, attrs, false);
            }
            XmlEvent::End { name } => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            XmlEvent::Empty { name, attrs } => {
                write_start_like(&mut out, name, attrs, true);
            }
            XmlEvent::Text { text } => {
                escape_text_into(&mut out, text);
            }
            XmlEvent::CData { text } => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            XmlEvent::Comment { text } => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            XmlEvent::PI { content } => {
                out.push_str("<?");
                out.push_str(content);
                out.push_str("?>");
            }
            XmlEvent::DocType { text } => {
                out.push_str("<!DOCTYPE");
                out.push_str(text);
                out.push('>');
            }
        }
    }
    out
}

fn write_start_like(out: &mut String, name: &str, attrs: &[(String, String)], empty: bool) {
    out.push('<');
    out.push_str(name);
    // Attribute values are raw escaped XML; do not escape a second time.
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(v);
        out.push('"');
    }
    if empty {
        out.push_str("/>");
    } else {
        out.push('>');
    }
}

fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

pub fn set_attr(attrs: &mut Vec<(String, String)>, key: &str, value: &str) {
    for (k, v) in attrs.iter_mut() {
        if k == key {
            *v = value.to_string();
            return;
        }
    }
    attrs.push((key.to_string(), value.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_attr_entity_refs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let part = parse_part("test.xml", xml).expect("parse");
        let out = write_part(&part);
        assert!(out.contains(r#"o:gfxdata="A&#xD;&#xA;B""#));
        assert!(!out.contains(r#"o:gfxdata="A&amp;#xD;"#));
    }

    #[test]
    fn roundtrip_is_byte_identical_for_typical_document_part() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:document xmlns:w=\"urn:w\"><w:body><w:p><w:r><w:t xml:space=\"preserve\">hello &amp; \u{e44}\u{e17}\u{e22}</w:t></w:r></w:p>\
<w:sectPr><w:pgSz w:w=\"11906\" w:h=\"16838\"/></w:sectPr></w:body></w:document>";
        let part = parse_part("word/document.xml", xml).expect("parse");
        let out = write_part(&part);
        assert_eq!(out, xml);
    }

    #[test]
    fn text_is_entity_decoded_on_parse() {
        let xml = "<r><t>a &lt;b&gt; &quot;c&quot; &#39;d&#39; &amp;e</t></r>";
        let part = parse_part("x.xml", xml).expect("parse");
        let texts: Vec<&str> = part
            .events
            .iter()
            .filter_map(|e| match e {
                XmlEvent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["a <b> \"c\" 'd' &e"]);
    }

    #[test]
    fn malformed_xml_is_reported_as_corrupt() {
        let err = parse_part("word/document.xml", "<w:p><w:r></w:p>").unwrap_err();
        assert!(matches!(err, TemplateError::CorruptArchive(_)));
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn set_attr_replaces_or_appends() {
        let mut attrs = vec![("a".to_string(), "1".to_string())];
        set_attr(&mut attrs, "a", "2");
        set_attr(&mut attrs, "b", "3");
        assert_eq!(
            attrs,
            vec![
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "3".to_string())
            ]
        );
    }
}
