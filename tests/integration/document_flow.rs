//! File-backed runs: extraction, per-unit files, resume and assembly, for
//! plain directories and EPUB archives.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use folio::config::PipelineConfig;
use folio::document::{section_marker, DirectorySource, InputFormat, OpenedDocument};
use folio::pacer::RecordingPacer;
use folio::{Pipeline, Request};
use tempfile::TempDir;

use super::support::{client, ScriptedClient};

fn write_book(root: &Path) {
    let text = root.join("OEBPS").join("Text");
    fs::create_dir_all(&text).unwrap();
    fs::write(text.join("chapter01.xhtml"), "first").unwrap();
    fs::write(text.join("chapter02.xhtml"), "second").unwrap();
    fs::write(text.join("chapter03.xhtml"), "third").unwrap();
    fs::write(root.join("OEBPS").join("content.opf"), "<package/>").unwrap();
}

fn config(input: &Path, output: &Path) -> PipelineConfig {
    PipelineConfig {
        input: Some(input.to_path_buf()),
        output_dir: output.to_path_buf(),
        context_before: 1,
        context_after: 1,
        api_key: Some("test-key".into()),
        prompt: Some("PROMPT".into()),
        instruction: Some("INSTRUCTION".into()),
        model: Some("gemini-1.5-flash".into()),
        ..Default::default()
    }
}

fn request_for(stub: &ScriptedClient, content: &str) -> Request {
    stub.calls()
        .into_iter()
        .find(|r| r.text.lines().nth(1) == Some(content))
        .unwrap()
}

async fn run_once(input: &Path, output: &Path, stub: ScriptedClient) -> folio::RunSummary {
    let settings = config(input, output).resolve().unwrap();
    let (_stub, service) = client(stub);
    let source = DirectorySource::new(&settings.input).with_output(&settings.output_dir);
    Pipeline::from_settings(&settings, service)
        .with_pacer(Arc::new(RecordingPacer::new()))
        .run_source(&source)
        .await
        .unwrap()
}

#[tokio::test]
async fn writes_unit_files_and_assembles() {
    let book = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    write_book(book.path());
    let output = work.path().join("output");

    let summary = run_once(book.path(), &output, ScriptedClient::new()).await;

    assert_eq!(summary.total, 3);
    let unit = fs::read_to_string(output.join("OEBPS/Text/chapter02.xhtml")).unwrap();
    assert_eq!(unit, "done:second:1");

    let assembled = summary.assembled.unwrap();
    assert_eq!(assembled, work.path().join("output.assembled"));
    let text = fs::read_to_string(assembled).unwrap();
    let first = text.find(&section_marker("OEBPS/Text/chapter01.xhtml")).unwrap();
    let third = text.find(&section_marker("OEBPS/Text/chapter03.xhtml")).unwrap();
    assert!(first < third);
    assert!(!text.contains("<package/>"));
}

#[tokio::test]
async fn rerun_is_byte_identical() {
    let book = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    write_book(book.path());
    let first = work.path().join("first");
    let second = work.path().join("second");

    run_once(book.path(), &first, ScriptedClient::new()).await;
    run_once(book.path(), &second, ScriptedClient::new()).await;

    for name in ["chapter01.xhtml", "chapter02.xhtml", "chapter03.xhtml"] {
        let a = fs::read(first.join("OEBPS/Text").join(name)).unwrap();
        let b = fs::read(second.join("OEBPS/Text").join(name)).unwrap();
        assert_eq!(a, b, "{} differs between runs", name);
    }
}

#[tokio::test]
async fn resumes_from_existing_outputs() {
    let book = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    write_book(book.path());
    let output = work.path().join("output");
    let done = output.join("OEBPS/Text/chapter01.xhtml");
    fs::create_dir_all(done.parent().unwrap()).unwrap();
    fs::write(&done, "kept").unwrap();

    let summary = run_once(book.path(), &output, ScriptedClient::new()).await;

    assert_eq!(summary.skipped, vec!["OEBPS/Text/chapter01.xhtml".to_string()]);
    assert_eq!(summary.succeeded.len(), 2);
    assert_eq!(fs::read_to_string(&done).unwrap(), "kept");
    assert!(summary.assembled.is_some());
}

#[tokio::test]
async fn failed_units_skip_assembly() {
    let book = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    write_book(book.path());
    let output = work.path().join("output");

    let mut cfg = config(book.path(), &output);
    cfg.retry.max_attempts = 2;
    cfg.retry.initial_delay_ms = 0;
    let settings = cfg.resolve().unwrap();
    let (_stub, service) = client(ScriptedClient::new().failing("third", 10));
    let source = DirectorySource::new(&settings.input).with_output(&settings.output_dir);

    let summary = Pipeline::from_settings(&settings, service)
        .with_pacer(Arc::new(RecordingPacer::new()))
        .run_source(&source)
        .await
        .unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert!(summary.assembled.is_none());
    assert!(!work.path().join("output.assembled").exists());
    assert!(output.join("OEBPS/Text/chapter01.xhtml").exists());
    assert!(summary.ensure_complete().is_err());
}

#[tokio::test]
async fn numbered_chapters_run_in_natural_order() {
    let book = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    for (name, body) in [
        ("chapter1.xhtml", "alpha-one"),
        ("chapter2.xhtml", "beta-two"),
        ("chapter10.xhtml", "gamma-ten"),
    ] {
        fs::write(book.path().join(name), body).unwrap();
    }
    let output = work.path().join("output");

    let settings = config(book.path(), &output).resolve().unwrap();
    let (stub, service) = client(ScriptedClient::new());
    let source = DirectorySource::new(&settings.input).with_output(&settings.output_dir);
    let summary = Pipeline::from_settings(&settings, service)
        .with_pacer(Arc::new(RecordingPacer::new()))
        .run_source(&source)
        .await
        .unwrap();
    assert_eq!(summary.total, 3);

    let middle = request_for(&stub, "beta-two");
    let before = middle.text.find("alpha-one").unwrap();
    let after = middle.text.find("gamma-ten").unwrap();
    assert!(before < after);

    let text = fs::read_to_string(summary.assembled.unwrap()).unwrap();
    let second = text.find(&section_marker("chapter2.xhtml")).unwrap();
    let tenth = text.find(&section_marker("chapter10.xhtml")).unwrap();
    assert!(second < tenth);
}

#[tokio::test]
async fn document_without_units_creates_output_and_assembles() {
    let book = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::write(book.path().join("toc.ncx"), "toc").unwrap();
    let output = work.path().join("output");

    let summary = run_once(book.path(), &output, ScriptedClient::new()).await;

    assert_eq!(summary.total, 0);
    assert!(output.is_dir());
    let assembled = summary.assembled.unwrap();
    assert_eq!(fs::read_to_string(assembled).unwrap(), "");
}

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

const PACKAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Lantern Keeper</dc:title>
    <dc:description>Tales of the coast</dc:description>
    <dc:language>nl</dc:language>
  </metadata>
  <manifest>
    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="Text/chapter2.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="Text/chapter1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="cover"/><itemref idref="c1"/><itemref idref="c2"/></spine>
</package>"#;

fn write_epub(path: &Path) {
    use std::io::Write;
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, body) in [
        ("mimetype", "application/epub+zip"),
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", PACKAGE),
        ("OEBPS/cover.xhtml", "cover"),
        ("OEBPS/Text/chapter1.xhtml", "opening"),
        ("OEBPS/Text/chapter2.xhtml", "closing"),
    ] {
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[tokio::test]
async fn epub_in_epub_out() {
    let work = TempDir::new().unwrap();
    let book = work.path().join("lantern.epub");
    write_epub(&book);
    let output = work.path().join("output");

    let settings = config(&book, &output).resolve().unwrap();
    assert_eq!(settings.format, InputFormat::Epub);
    let document = OpenedDocument::open(&settings).unwrap();

    let (stub, service) = client(ScriptedClient::new());
    let summary = Pipeline::from_settings(&settings, service)
        .with_assembler(Arc::clone(&document.assembler), settings.output_dir.clone())
        .with_pacer(Arc::new(RecordingPacer::new()))
        .run_source(document.source.as_ref())
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(stub.call_count(), 2);
    assert!(request_for(&stub, "closing").text.contains("opening"));
    assert_eq!(
        fs::read_to_string(output.join("OEBPS/Text/chapter2.xhtml")).unwrap(),
        "done:closing:1"
    );

    let assembled = summary.assembled.unwrap();
    assert_eq!(assembled, work.path().join("output.epub"));
    let mut archive = zip::ZipArchive::new(fs::File::open(&assembled).unwrap()).unwrap();
    let mut opf = String::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        if file.name().ends_with(".opf") {
            std::io::Read::read_to_string(&mut file, &mut opf).unwrap();
        }
    }
    assert!(opf.contains("Lantern Keeper"));
    assert!(opf.contains("Tales of the coast"));
    assert!(opf.contains(">nl<"));
}
