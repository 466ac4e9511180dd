//! Payload decoding
//!
//! Rig messages carry an XML document in their `msg` column. The root
//! element names the message type and values are addressed by dotted tag
//! paths below it, e.g. `fixationPosition.x` inside a
//! `CalibrationPointSetupMessage`.
//!
//! Parsing is done by `roxmltree`; the tree is then copied into owned
//! `Element`s, refusing documents nested deeper than `MAX_DEPTH`.

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::DecodeError;
use crate::types::Point;

/// A decoded element: tag name, attributes, trimmed text and children
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// First child with tag `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Descend through a dotted tag path relative to this element
    pub fn get(&self, path: &str) -> Option<&Element> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.child(segment))
    }

    pub fn text_at(&self, path: &str) -> Result<&str, DecodeError> {
        self.get(path)
            .map(|e| e.text.as_str())
            .ok_or_else(|| DecodeError::MissingPath(self.qualify(path)))
    }

    pub fn f64_at(&self, path: &str) -> Result<f64, DecodeError> {
        let text = self.text_at(path)?;
        text.trim().parse::<f64>().map_err(|_| DecodeError::InvalidNumber {
            path: self.qualify(path),
            value: text.to_string(),
        })
    }

    /// Read `<path><x/><y/></path>` as a point
    pub fn point_at(&self, path: &str) -> Result<Point, DecodeError> {
        Ok(Point::new(
            self.f64_at(&format!("{path}.x"))?,
            self.f64_at(&format!("{path}.y"))?,
        ))
    }

    fn qualify(&self, path: &str) -> String {
        format!("{}.{}", self.name, path)
    }
}

/// Outcome of looking up one record and decoding it
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// No record matched
    NotFound,
    /// A record matched but its payload could not be decoded
    Undecodable(DecodeError),
    Decoded(T),
}

impl<T> Lookup<T> {
    /// Apply `decode` to an optional payload
    pub fn from_payload<F>(payload: Option<&str>, decode: F) -> Self
    where
        F: FnOnce(&str) -> Result<T, DecodeError>,
    {
        match payload {
            None => Lookup::NotFound,
            Some(text) => match decode(text) {
                Ok(value) => Lookup::Decoded(value),
                Err(err) => Lookup::Undecodable(err),
            },
        }
    }
}

/// Deepest element nesting accepted in a payload
pub const MAX_DEPTH: usize = 64;

/// Parse a payload document and return its root element
pub fn decode(text: &str) -> Result<Element, DecodeError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options).map_err(|err| {
        let pos = err.pos();
        DecodeError::Malformed {
            line: pos.row,
            column: pos.col,
            reason: err.to_string(),
        }
    })?;
    convert(&doc, doc.root_element(), 1)
}

/// Parse a payload whose root element must be `message_type`
pub fn decode_message(text: &str, message_type: &str) -> Result<Element, DecodeError> {
    let root = decode(text)?;
    if root.name != message_type {
        return Err(DecodeError::MissingPath(message_type.to_string()));
    }
    Ok(root)
}

fn convert(doc: &Document<'_>, node: Node<'_, '_>, depth: usize) -> Result<Element, DecodeError> {
    if depth > MAX_DEPTH {
        let pos = doc.text_pos_at(node.range().start);
        return Err(DecodeError::Malformed {
            line: pos.row,
            column: pos.col,
            reason: format!("elements nested deeper than {MAX_DEPTH}"),
        });
    }

    let mut element = Element {
        name: node.tag_name().name().to_string(),
        attributes: node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect(),
        ..Element::default()
    };

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            element.children.push(convert(doc, child, depth + 1)?);
        } else if child.is_text() {
            text.push_str(child.text().unwrap_or_default());
        }
    }
    element.text = text.trim().to_string();
    Ok(element)
}
