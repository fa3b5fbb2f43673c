//! Unit extraction from an EPUB archive or an extracted document directory.
//!
//! Both sources follow the package spine when a container document is
//! present. A plain directory without one is walked in natural file-name
//! order.

use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use super::package::{natural_cmp, rootfile_path, PackageDocument, CONTAINER_PATH};
use super::sink::output_path;
use crate::error::PipelineError;
use crate::types::SourceEntry;

/// Default substring a file name must contain to count as a unit.
pub const DEFAULT_UNIT_PATTERN: &str = "chapter";

/// Produces the ordered `(identifier, content)` sequence of a document.
pub trait DocumentSource: Send + Sync {
    fn load(&self) -> Result<Vec<SourceEntry>, PipelineError>;
}

/// Which unit files to keep and where earlier outputs live.
#[derive(Debug, Clone)]
struct Selection {
    output: Option<PathBuf>,
    pattern: String,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            output: None,
            pattern: DEFAULT_UNIT_PATTERN.to_string(),
        }
    }
}

impl Selection {
    fn is_unit(&self, id: &str) -> bool {
        let name = id.rsplit('/').next().unwrap_or(id);
        name.to_lowercase().contains(&self.pattern)
    }

    /// Entry for `id`, preferring an existing output over the raw content.
    fn entry(
        &self,
        id: String,
        raw: impl FnOnce() -> Result<String, PipelineError>,
    ) -> Result<SourceEntry, PipelineError> {
        let existing = self.output.as_deref().map(|out| output_path(out, &id));
        match existing.filter(|p| p.is_file()) {
            Some(done) => {
                let content = fs::read_to_string(&done).map_err(|e| {
                    PipelineError::Extraction(format!("{}: {}", done.display(), e))
                })?;
                debug!(unit = %id, "Reusing existing output");
                Ok(SourceEntry::processed(id, content))
            }
            None => Ok(SourceEntry::new(id, raw()?)),
        }
    }

    /// Units named by the spine, in reading order. Unreadable items are
    /// skipped with a warning.
    fn from_spine(
        &self,
        package: &PackageDocument,
        mut read: impl FnMut(&str) -> Result<String, PipelineError>,
    ) -> Result<Vec<SourceEntry>, PipelineError> {
        let mut entries = Vec::new();
        for id in package.spine.iter().filter(|id| self.is_unit(id)) {
            match self.entry(id.clone(), || read(id.as_str())) {
                Ok(entry) => entries.push(entry),
                Err(PipelineError::Extraction(message)) => {
                    warn!(unit = %id, error = %message, "Skipping unreadable spine item");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(entries)
    }
}

fn log_loaded(origin: &Path, entries: &[SourceEntry]) {
    info!(
        root = %origin.display(),
        units = entries.len(),
        processed = entries.iter().filter(|e| e.processed).count(),
        "Loaded document units"
    );
}

/// Reads units from an extracted document directory.
///
/// With `META-INF/container.xml` present the package spine sets the order;
/// otherwise every file whose name matches the unit pattern is taken in
/// natural name order. When `output` is set, a unit that already has an
/// output file is loaded from that file and flagged processed.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    selection: Selection,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            selection: Selection::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.selection.output = Some(output.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.selection.pattern = pattern.into().to_lowercase();
        self
    }

    /// The package document, if the directory is an extracted EPUB.
    pub fn package(&self) -> Result<Option<PackageDocument>, PipelineError> {
        let container = output_path(&self.root, CONTAINER_PATH);
        if !container.is_file() {
            return Ok(None);
        }
        let opf = rootfile_path(&read_file(&container)?)?;
        let xml = read_file(&output_path(&self.root, &opf))?;
        PackageDocument::parse(&xml, &opf).map(Some)
    }

    fn walk(&self, root: &Path) -> Result<Vec<SourceEntry>, PipelineError> {
        let walker = WalkDir::new(root).sort_by(|a, b| {
            natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
        });

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| PipelineError::Extraction(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let id = relative_id(root, entry.path())?;
            if !self.selection.is_unit(&id) {
                continue;
            }
            entries.push(self.selection.entry(id, || read_file(entry.path()))?);
        }
        Ok(entries)
    }
}

fn read_file(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path)
        .map_err(|e| PipelineError::Extraction(format!("{}: {}", path.display(), e)))
}

/// Identifier for `path` under `root`, `/`-separated on every platform.
pub fn relative_id(root: &Path, path: &Path) -> Result<String, PipelineError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        PipelineError::Extraction(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

impl DocumentSource for DirectorySource {
    fn load(&self) -> Result<Vec<SourceEntry>, PipelineError> {
        let root = dunce::canonicalize(&self.root).map_err(|e| {
            PipelineError::Extraction(format!("cannot open {}: {}", self.root.display(), e))
        })?;
        if !root.is_dir() {
            return Err(PipelineError::Extraction(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let entries = match self.package()? {
            Some(package) => self
                .selection
                .from_spine(&package, |id| read_file(&output_path(&root, id)))?,
            None => self.walk(&root)?,
        };

        log_loaded(&root, &entries);
        Ok(entries)
    }
}

/// Reads units straight from an `.epub` archive, in spine order.
#[derive(Debug, Clone)]
pub struct EpubSource {
    path: PathBuf,
    selection: Selection,
}

impl EpubSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            selection: Selection::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.selection.output = Some(output.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.selection.pattern = pattern.into().to_lowercase();
        self
    }

    fn open(&self) -> Result<ZipArchive<File>, PipelineError> {
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::Extraction(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        ZipArchive::new(file).map_err(|e| {
            PipelineError::Extraction(format!("{} is not an EPUB archive: {}", self.path.display(), e))
        })
    }

    /// The archive's package document.
    pub fn package(&self) -> Result<PackageDocument, PipelineError> {
        let mut archive = self.open()?;
        read_package(&mut archive)
    }
}

fn read_package<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<PackageDocument, PipelineError> {
    let opf = rootfile_path(&read_entry(archive, CONTAINER_PATH)?)?;
    let xml = read_entry(archive, &opf)?;
    PackageDocument::parse(&xml, &opf)
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, PipelineError> {
    let failure = |e: String| PipelineError::Extraction(format!("{}: {}", name, e));
    let mut file = archive.by_name(name).map_err(|e| failure(e.to_string()))?;
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|e| failure(e.to_string()))?;
    Ok(text)
}

impl DocumentSource for EpubSource {
    fn load(&self) -> Result<Vec<SourceEntry>, PipelineError> {
        let mut archive = self.open()?;
        let package = read_package(&mut archive)?;
        let entries = self
            .selection
            .from_spine(&package, |id| read_entry(&mut archive, id))?;

        log_loaded(&self.path, &entries);
        Ok(entries)
    }
}

/// Fixed, in-memory sequence.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: Vec<SourceEntry>,
}

impl StaticSource {
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        Self { entries }
    }
}

impl DocumentSource for StaticSource {
    fn load(&self) -> Result<Vec<SourceEntry>, PipelineError> {
        Ok(self.entries.clone())
    }
}
