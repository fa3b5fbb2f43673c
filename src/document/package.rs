//! EPUB package documents.
//!
//! `META-INF/container.xml` names the package (`.opf`) file; the package's
//! spine gives the reading order and its metadata block carries the book's
//! title, creator, description and language.

use std::cmp::Ordering;
use std::collections::HashMap;

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::PipelineError;

/// Location of the container document inside an EPUB.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Descriptive metadata carried from the source book to the assembled one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

/// Parsed package document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDocument {
    pub metadata: BookMetadata,
    /// Spine items in reading order, as paths from the container root.
    pub spine: Vec<String>,
}

fn parse_xml<'a>(xml: &'a str, what: &str) -> Result<Document<'a>, PipelineError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(xml, options)
        .map_err(|e| PipelineError::Extraction(format!("invalid {}: {}", what, e)))
}

fn is_element(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

/// Package path named by the first `<rootfile>` of a container document.
pub fn rootfile_path(container_xml: &str) -> Result<String, PipelineError> {
    let doc = parse_xml(container_xml, CONTAINER_PATH)?;
    doc.descendants()
        .filter(|n| is_element(n, "rootfile"))
        .find_map(|n| n.attribute("full-path"))
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::Extraction(format!("{} names no rootfile", CONTAINER_PATH))
        })
}

impl PackageDocument {
    /// Parse the package at `opf_path`; spine hrefs are resolved against its
    /// directory.
    pub fn parse(xml: &str, opf_path: &str) -> Result<Self, PipelineError> {
        let doc = parse_xml(xml, opf_path)?;
        let base = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

        let manifest: HashMap<&str, &str> = doc
            .descendants()
            .filter(|n| is_element(n, "item"))
            .filter_map(|n| Some((n.attribute("id")?, n.attribute("href")?)))
            .collect();

        let spine = doc
            .descendants()
            .filter(|n| is_element(n, "itemref"))
            .filter_map(|n| n.attribute("idref"))
            .filter_map(|idref| manifest.get(idref))
            .map(|href| resolve_href(base, href))
            .collect();

        let metadata = doc
            .descendants()
            .find(|n| is_element(n, "metadata"))
            .map(|meta| {
                let text = |name: &str| {
                    meta.children()
                        .find(|n| is_element(n, name))
                        .and_then(|n| n.text())
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                };
                BookMetadata {
                    title: text("title"),
                    creator: text("creator"),
                    description: text("description"),
                    language: text("language"),
                }
            })
            .unwrap_or_default();

        Ok(Self { metadata, spine })
    }
}

/// Join a manifest href onto the package directory, normalizing `.`/`..`
/// and dropping any fragment.
pub fn resolve_href(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or("");
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Case-insensitive ordering that compares digit runs by value, so
/// `chapter2` sorts before `chapter10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_run = take_digits(&mut left);
                let y_run = take_digits(&mut right);
                let x_num = x_run.trim_start_matches('0');
                let y_num = y_run.trim_start_matches('0');
                let by_value = x_num.len().cmp(&y_num.len()).then_with(|| x_num.cmp(y_num));
                if by_value != Ordering::Equal {
                    return by_value;
                }
            }
            (Some(x), Some(y)) => {
                let by_char = x.to_lowercase().cmp(y.to_lowercase());
                if by_char != Ordering::Equal {
                    return by_char;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}
