//! Final artifact assembly from per-unit outputs.
//!
//! Both assemblers list the output directory, take known units in document
//! order and then any other files by name.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use epub_builder::{EpubBuilder, EpubContent, ZipLibrary};
use tracing::info;
use walkdir::WalkDir;

use super::package::{natural_cmp, BookMetadata};
use super::sink::output_path;
use super::source::relative_id;
use crate::error::PipelineError;

/// Builds the output artifact from a directory of completed unit files.
pub trait Assembler: Send + Sync {
    /// `order` is the document's unit order. Returns the written artifact path.
    fn assemble(&self, output_dir: &Path, order: &[String]) -> Result<PathBuf, PipelineError>;
}

fn failure(message: String) -> PipelineError {
    PipelineError::Assembly(message)
}

/// One output file picked up for assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    id: String,
    path: PathBuf,
    /// Part of the document order rather than a stray file.
    known: bool,
}

/// Output files under `output_dir` in assembly order, skipping `target`.
///
/// A missing output directory holds no sections.
fn collect_sections(
    output_dir: &Path,
    order: &[String],
    target: &Path,
) -> Result<Vec<Section>, PipelineError> {
    if !output_dir.exists() {
        return Ok(Vec::new());
    }
    let root = dunce::canonicalize(output_dir)
        .map_err(|e| failure(format!("{}: {}", output_dir.display(), e)))?;
    let target = dunce::canonicalize(target).ok();

    let walker = WalkDir::new(&root).sort_by(|a, b| {
        natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
    });
    let mut listed = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| failure(e.to_string()))?;
        if !entry.file_type().is_file() || target.as_deref() == Some(entry.path()) {
            continue;
        }
        listed.push(relative_id(&root, entry.path())?);
    }

    let known: HashSet<&str> = order.iter().map(String::as_str).collect();
    let available: HashSet<&str> = listed.iter().map(String::as_str).collect();
    let in_order = order
        .iter()
        .filter(|id| available.contains(id.as_str()))
        .map(|id| (id, true));
    let extras = listed
        .iter()
        .filter(|id| !known.contains(id.as_str()))
        .map(|id| (id, false));

    Ok(in_order
        .chain(extras)
        .map(|(id, known)| Section {
            id: id.clone(),
            path: output_path(&root, id),
            known,
        })
        .collect())
}

fn create_parent(target: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| failure(format!("{}: {}", parent.display(), e)))?;
    }
    Ok(())
}

/// Concatenates unit outputs into one file, each behind a section marker.
#[derive(Debug, Clone)]
pub struct ConcatAssembler {
    target: PathBuf,
}

impl ConcatAssembler {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

pub fn section_marker(id: &str) -> String {
    format!("<!-- folio:section {} -->", id)
}

impl Assembler for ConcatAssembler {
    fn assemble(&self, output_dir: &Path, order: &[String]) -> Result<PathBuf, PipelineError> {
        let sections = collect_sections(output_dir, order, &self.target)?;

        let mut out = String::new();
        for section in &sections {
            let text = fs::read_to_string(&section.path)
                .map_err(|e| failure(format!("{}: {}", section.path.display(), e)))?;
            out.push_str(&section_marker(&section.id));
            out.push('\n');
            out.push_str(&text);
            if !text.ends_with('\n') {
                out.push('\n');
            }
        }

        create_parent(&self.target)?;
        fs::write(&self.target, out)
            .map_err(|e| failure(format!("{}: {}", self.target.display(), e)))?;

        info!(path = %self.target.display(), sections = sections.len(), "Assembled output document");
        Ok(self.target.clone())
    }
}

/// Writes an EPUB with one chapter per unit output and the source book's
/// metadata. Files outside the document order are packed as resources.
#[derive(Debug, Clone)]
pub struct EpubAssembler {
    target: PathBuf,
    metadata: BookMetadata,
}

impl EpubAssembler {
    pub fn new(target: impl Into<PathBuf>, metadata: BookMetadata) -> Self {
        Self {
            target: target.into(),
            metadata,
        }
    }
}

fn epub(err: impl std::fmt::Display) -> PipelineError {
    failure(err.to_string())
}

fn media_type(id: &str) -> &'static str {
    let ext = id.rsplit_once('.').map(|(_, e)| e.to_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "xhtml" | "html" | "htm" => "application/xhtml+xml",
        "css" => "text/css",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

impl Assembler for EpubAssembler {
    fn assemble(&self, output_dir: &Path, order: &[String]) -> Result<PathBuf, PipelineError> {
        let sections = collect_sections(output_dir, order, &self.target)?;

        let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(epub)?).map_err(epub)?;
        let title = self.metadata.title.as_deref().unwrap_or("Untitled");
        builder.metadata("title", title).map_err(epub)?;
        builder
            .metadata("author", self.metadata.creator.as_deref().unwrap_or(title))
            .map_err(epub)?;
        if let Some(description) = &self.metadata.description {
            builder.metadata("description", description.as_str()).map_err(epub)?;
        }
        if let Some(language) = &self.metadata.language {
            builder.metadata("lang", language.as_str()).map_err(epub)?;
        }

        let mut chapters = 0usize;
        for section in &sections {
            let bytes = fs::read(&section.path)
                .map_err(|e| failure(format!("{}: {}", section.path.display(), e)))?;
            if section.known {
                builder
                    .add_content(
                        EpubContent::new(section.id.as_str(), bytes.as_slice())
                            .title(section.id.as_str()),
                    )
                    .map_err(epub)?;
                chapters += 1;
            } else {
                builder
                    .add_resource(section.id.as_str(), bytes.as_slice(), media_type(&section.id))
                    .map_err(epub)?;
            }
        }

        create_parent(&self.target)?;
        let file = File::create(&self.target)
            .map_err(|e| failure(format!("{}: {}", self.target.display(), e)))?;
        builder.generate(file).map_err(epub)?;

        info!(path = %self.target.display(), chapters, title, "Assembled EPUB");
        Ok(self.target.clone())
    }
}
