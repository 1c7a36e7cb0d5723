//! Element tree for mapping documents
//!
//! Mapping documents are small, so they are read into a plain tree with
//! `quick-xml` and walked by the driver. Only local names are kept: the
//! document's namespace is checked by schema validation, not here.

use quick_xml::Reader;
use quick_xml::encoding::{detect_encoding, Decoder};
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// A mapping document that is not well-formed XML
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct XmlSyntaxError {
    pub line: usize,
    pub message: String,
}

/// One element of a mapping document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Line where the start tag ends
    pub line: usize,
}

impl XmlElement {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            line,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First child element with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All child elements with the given local name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// Decode raw document bytes into text
///
/// The encoding comes from the byte order mark or the XML declaration and
/// falls back to UTF-8. The declaration is left in place; [`parse_document`]
/// reads the result as UTF-8 regardless.
pub fn decode_document(bytes: &[u8]) -> Result<String, XmlSyntaxError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    // The declaration, when present, is the first event and fixes the decoder.
    // A syntax error here is left for parse_document to report with context.
    let _ = reader.read_event_into(&mut buf);

    let decoder = reader.decoder();
    let bom = detect_encoding(bytes).map_or(0, |(_, len)| len);
    decoder
        .decode(&bytes[bom..])
        .map(|text| text.into_owned())
        .map_err(|_| XmlSyntaxError {
            line: 1,
            message: format!(
                "document is not valid {} text",
                decoder.encoding().name()
            ),
        })
}

/// Parse a whole document and return its root element
pub fn parse_document(source: &str) -> Result<XmlElement, XmlSyntaxError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);
    let mut lines = LineCounter::new(source);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| XmlSyntaxError {
            line: lines.line_at(reader.error_position() as usize),
            message: e.to_string(),
        })?;
        let line = lines.line_at(reader.buffer_position() as usize);

        match event {
            Event::Start(ref start) => {
                stack.push(element_from(start, line, reader.decoder())?);
            }
            Event::Empty(ref start) => {
                let element = element_from(start, line, reader.decoder())?;
                attach(&mut stack, &mut root, element, line)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| XmlSyntaxError {
                    line,
                    message: "unexpected closing tag".to_string(),
                })?;
                attach(&mut stack, &mut root, element, line)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlSyntaxError {
            line: open.line,
            message: format!("element <{}> is never closed", open.name),
        });
    }

    root.ok_or_else(|| XmlSyntaxError {
        line: 1,
        message: "document has no root element".to_string(),
    })
}

fn element_from(
    start: &BytesStart<'_>,
    line: usize,
    decoder: Decoder,
) -> Result<XmlElement, XmlSyntaxError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut element = XmlElement::new(name, line);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlSyntaxError {
            line,
            message: e.to_string(),
        })?;

        // Namespace declarations and prefixed attributes (xsi:...) carry no mapping data
        if attr.key.as_ref() == b"xmlns" || attr.key.prefix().is_some() {
            continue;
        }

        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| XmlSyntaxError {
                line,
                message: e.to_string(),
            })?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    line: usize,
) -> Result<(), XmlSyntaxError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlSyntaxError {
            line,
            message: format!("second root element <{}>", element.name),
        }),
    }
}

/// Line numbers for increasing byte offsets, counting each newline once
struct LineCounter<'a> {
    source: &'a [u8],
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, offset: usize) -> usize {
        let offset = offset.min(self.source.len());
        if offset < self.offset {
            // Error positions can point back into the last event
            return self.line - count_newlines(&self.source[offset..self.offset]);
        }
        self.line += count_newlines(&self.source[self.offset..offset]);
        self.offset = offset;
        self.line
    }
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|byte| **byte == b'\n').count()
}
