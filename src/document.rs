//! Document collaborators: unit extraction, per-unit persistence and final
//! assembly, for EPUB archives and plain directories.

use std::path::Path;
use std::sync::Arc;

use crate::config::RunSettings;
use crate::error::PipelineError;

pub mod assembly;
pub mod package;
pub mod sink;
pub mod source;

pub use assembly::{section_marker, Assembler, ConcatAssembler, EpubAssembler};
pub use package::{BookMetadata, PackageDocument};
pub use sink::{DirectorySink, MemorySink, UnitSink};
pub use source::{DirectorySource, DocumentSource, EpubSource, StaticSource, DEFAULT_UNIT_PATTERN};

/// Input layout, picked from the input path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// An `.epub` archive.
    Epub,
    /// A directory holding an unpacked EPUB (`META-INF/container.xml`).
    ExtractedEpub,
    /// Any other directory of unit files.
    Directory,
}

impl InputFormat {
    pub fn detect(input: &Path) -> Self {
        let is_epub = input
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("epub"))
            .unwrap_or(false);
        if is_epub && !input.is_dir() {
            InputFormat::Epub
        } else if input.join(package::CONTAINER_PATH).is_file() {
            InputFormat::ExtractedEpub
        } else {
            InputFormat::Directory
        }
    }

    /// Whether the assembled artifact is an EPUB.
    pub fn assembles_epub(self) -> bool {
        !matches!(self, InputFormat::Directory)
    }
}

/// Source and assembler matched to a run's input.
pub struct OpenedDocument {
    pub format: InputFormat,
    pub source: Box<dyn DocumentSource>,
    pub assembler: Arc<dyn Assembler>,
}

impl OpenedDocument {
    /// EPUB inputs are read through their spine and reassembled as an EPUB
    /// carrying the source metadata; plain directories are concatenated.
    pub fn open(settings: &RunSettings) -> Result<Self, PipelineError> {
        let format = settings.format;
        let (source, assembler): (Box<dyn DocumentSource>, Arc<dyn Assembler>) = match format {
            InputFormat::Epub => {
                let source = EpubSource::new(&settings.input)
                    .with_output(&settings.output_dir)
                    .with_pattern(settings.unit_pattern.as_str());
                let metadata = source.package()?.metadata;
                (
                    Box::new(source),
                    Arc::new(EpubAssembler::new(&settings.assembled, metadata)),
                )
            }
            InputFormat::ExtractedEpub | InputFormat::Directory => {
                let source = DirectorySource::new(&settings.input)
                    .with_output(&settings.output_dir)
                    .with_pattern(settings.unit_pattern.as_str());
                let assembler: Arc<dyn Assembler> = match source.package()? {
                    Some(package) if format.assembles_epub() => {
                        Arc::new(EpubAssembler::new(&settings.assembled, package.metadata))
                    }
                    _ => Arc::new(ConcatAssembler::new(&settings.assembled)),
                };
                (Box::new(source), assembler)
            }
        };
        Ok(Self {
            format,
            source,
            assembler,
        })
    }
}
