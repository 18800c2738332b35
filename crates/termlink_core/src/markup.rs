//! Annotated markup as returned by the text analysis service.
//!
//! The analysis service receives the plain content of a resource and returns
//! the same document with term mentions wrapped in RDFa-style elements:
//!
//! ```html
//! <p>The <span typeof="term-occurrence" resource="http://ex.org/t/parcel" score="0.8">parcel</span> is ...</p>
//! ```
//!
//! This module turns that markup into an [`AnnotatedDocument`]: the plain text
//! of the document plus every element carrying a `typeof` attribute, located by
//! character offsets into that text. Named HTML5 entities and numeric
//! character references are resolved. What the elements mean is decided by
//! [`crate::extract`].

use std::collections::BTreeMap;

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{AnnotationError, Result};

pub const ATTR_TYPE: &str = "typeof";
pub const ATTR_RESOURCE: &str = "resource";
pub const ATTR_SCORE: &str = "score";

/// An element of the analysed document that carries a `typeof` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Text content of the element, equal to `text[start..end]` of the document.
    pub content: String,
    /// Start character offset (inclusive) into the document text.
    pub start: usize,
    /// End character offset (exclusive) into the document text.
    pub end: usize,
}

impl AnnotatedElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Plain text of an analysed document plus its annotated elements in start-tag order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedDocument {
    pub text: String,
    pub elements: Vec<AnnotatedElement>,
}

struct OpenElement {
    name: Vec<u8>,
    annotated: Option<usize>,
    start_byte: usize,
}

impl AnnotatedDocument {
    pub fn new(text: impl Into<String>, elements: Vec<AnnotatedElement>) -> Self {
        Self {
            text: text.into(),
            elements,
        }
    }

    /// Parse XHTML-compatible annotated markup.
    pub fn parse(markup: &str) -> Result<Self> {
        let mut reader = Reader::from_str(markup);
        let mut doc = AnnotatedDocument::default();
        let mut char_len = 0usize;
        let mut open: Vec<OpenElement> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| malformed(reader.buffer_position(), e))?;
            match event {
                Event::Start(start) => {
                    let annotated = Self::push_element(&mut doc, &start, char_len)?;
                    open.push(OpenElement {
                        name: start.name().as_ref().to_vec(),
                        annotated,
                        start_byte: doc.text.len(),
                    });
                }
                Event::Empty(start) => {
                    Self::push_element(&mut doc, &start, char_len)?;
                }
                Event::End(end) => {
                    let Some(element) = open.pop() else {
                        return Err(AnnotationError::MalformedMarkup(format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(end.name().as_ref())
                        )));
                    };
                    if element.name != end.name().as_ref() {
                        return Err(AnnotationError::MalformedMarkup(format!(
                            "expected </{}>, found </{}>",
                            String::from_utf8_lossy(&element.name),
                            String::from_utf8_lossy(end.name().as_ref())
                        )));
                    }
                    if let Some(idx) = element.annotated {
                        let annotated = &mut doc.elements[idx];
                        annotated.content = doc.text[element.start_byte..].to_string();
                        annotated.end = char_len;
                    }
                }
                Event::Text(text) => {
                    let text = text
                        .unescape_with(resolve_html5_entity)
                        .map_err(|e| malformed(reader.buffer_position(), e))?;
                    char_len += text.chars().count();
                    doc.text.push_str(&text);
                }
                Event::CData(cdata) => {
                    let text = std::str::from_utf8(&cdata)
                        .map_err(|e| malformed(reader.buffer_position(), e))?;
                    char_len += text.chars().count();
                    doc.text.push_str(text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(unclosed) = open.last() {
            return Err(AnnotationError::MalformedMarkup(format!(
                "unclosed element <{}>",
                String::from_utf8_lossy(&unclosed.name)
            )));
        }

        Ok(doc)
    }

    /// Record `start` as an annotated element when it carries `typeof`.
    fn push_element(
        doc: &mut AnnotatedDocument,
        start: &BytesStart<'_>,
        offset: usize,
    ) -> Result<Option<usize>> {
        let mut attributes = BTreeMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| {
                AnnotationError::MalformedMarkup(format!("invalid attribute: {e}"))
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value_with(resolve_html5_entity)
                .map_err(|e| AnnotationError::MalformedMarkup(format!("attribute {key}: {e}")))?
                .into_owned();
            attributes.insert(key, value);
        }
        if !attributes.contains_key(ATTR_TYPE) {
            return Ok(None);
        }
        doc.elements.push(AnnotatedElement {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            content: String::new(),
            start: offset,
            end: offset,
        });
        Ok(Some(doc.elements.len() - 1))
    }
}

fn malformed(position: impl std::fmt::Display, e: impl std::fmt::Display) -> AnnotationError {
    AnnotationError::MalformedMarkup(format!("at byte {position}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_offsets() {
        let doc = AnnotatedDocument::parse(
            r#"<p>The <span typeof="term-occurrence" resource="t:parcel">parcel</span> is owned.</p>"#,
        )
        .unwrap();
        assert_eq!(doc.text, "The parcel is owned.");
        assert_eq!(doc.elements.len(), 1);
        let el = &doc.elements[0];
        assert_eq!(el.content, "parcel");
        assert_eq!((el.start, el.end), (4, 10));
        assert_eq!(el.attribute("resource"), Some("t:parcel"));
        assert_eq!(el.name, "span");
    }

    #[test]
    fn offsets_are_characters_not_bytes() {
        let doc = AnnotatedDocument::parse(
            r#"<p>Území <span typeof="term-occurrence" resource="t:obec">obce</span></p>"#,
        )
        .unwrap();
        let el = &doc.elements[0];
        assert_eq!((el.start, el.end), (6, 10));
        let chars: Vec<char> = doc.text.chars().collect();
        assert_eq!(chars[el.start..el.end].iter().collect::<String>(), "obce");
    }

    #[test]
    fn elements_without_typeof_are_plain_markup() {
        let doc =
            AnnotatedDocument::parse(r#"<div><b resource="t:x">bold</b> <i>it</i></div>"#).unwrap();
        assert_eq!(doc.text, "bold it");
        assert!(doc.elements.is_empty());
    }

    #[test]
    fn nested_elements_in_start_order() {
        let doc = AnnotatedDocument::parse(
            r#"<p><span typeof="term-suggestion">land <span typeof="term-occurrence" resource="t:plot">plot</span></span></p>"#,
        )
        .unwrap();
        assert_eq!(doc.elements.len(), 2);
        assert_eq!(doc.elements[0].content, "land plot");
        assert_eq!((doc.elements[0].start, doc.elements[0].end), (0, 9));
        assert_eq!(doc.elements[1].content, "plot");
        assert_eq!((doc.elements[1].start, doc.elements[1].end), (5, 9));
    }

    #[test]
    fn entities_are_unescaped() {
        let doc = AnnotatedDocument::parse(
            r#"<p>A&amp;B&nbsp;<span typeof="term-occurrence" resource="t:a&amp;b">x</span></p>"#,
        )
        .unwrap();
        assert_eq!(doc.text, "A&B\u{a0}x");
        assert_eq!(doc.elements[0].start, 4);
        assert_eq!(doc.elements[0].attribute("resource"), Some("t:a&b"));
    }

    #[test]
    fn html_named_entities_resolve() {
        let doc = AnnotatedDocument::parse(
            r#"<p>Obec&nbsp;Kol&iacute;n &sect;&nbsp;2 <span typeof="term-occurrence" resource="t:caf&eacute;">caf&eacute;</span>&hellip;</p>"#,
        )
        .unwrap();
        assert_eq!(doc.text, "Obec\u{a0}Kolín §\u{a0}2 café…");
        let el = &doc.elements[0];
        assert_eq!(el.content, "café");
        assert_eq!((el.start, el.end), (15, 19));
        assert_eq!(el.attribute("resource"), Some("t:café"));
    }

    #[test]
    fn numeric_references_resolve_and_unknown_names_fail() {
        let doc = AnnotatedDocument::parse("<p>&#269;&#x161;</p>").unwrap();
        assert_eq!(doc.text, "čš");
        let err = AnnotatedDocument::parse("<p>&notanentity;</p>").unwrap_err();
        assert!(matches!(err, AnnotationError::MalformedMarkup(_)));
    }

    #[test]
    fn empty_element_has_empty_content() {
        let doc = AnnotatedDocument::parse(r#"<p>a<span typeof="term-occurrence"/>b</p>"#).unwrap();
        assert_eq!(doc.elements[0].content, "");
        assert_eq!((doc.elements[0].start, doc.elements[0].end), (1, 1));
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        let err = AnnotatedDocument::parse("<p><span>x</p></span>").unwrap_err();
        assert!(matches!(err, AnnotationError::MalformedMarkup(_)));
    }

    #[test]
    fn unclosed_element_is_rejected() {
        let err = AnnotatedDocument::parse("<p><span>x</span>").unwrap_err();
        assert!(matches!(err, AnnotationError::MalformedMarkup(_)));
    }
}
