//! Integration tests for the PDF clean-up library

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pdf_cleanup::geometry::Rectangle;
use pdf_cleanup::pdf::{
    clean_up_annotations_file, clean_up_file, CleanupLocation, CleanupOptions, Color,
};
use pdf_cleanup::Error;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TWO_LINES: &str = "BT /F1 12 Tf 72 700 Td (Public) Tj 0 -20 Td (Secret) Tj ET";

fn number(value: f64) -> Object {
    if value.fract() == 0.0 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value as f32)
    }
}

/// One-page letter-size document with Helvetica as /F1 and the given annotations
fn build_pdf(content: &str, annotations: Vec<Dictionary>) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    let font_id = doc.add_object(font);

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));

    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.as_bytes().to_vec()));

    let mut page = Dictionary::new();
    page.set("Type", Object::Name(b"Page".to_vec()));
    page.set("Parent", Object::Reference(pages_id));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ]),
    );
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Reference(content_id));
    if !annotations.is_empty() {
        let refs = annotations
            .into_iter()
            .map(|annotation| Object::Reference(doc.add_object(annotation)))
            .collect();
        page.set("Annots", Object::Array(refs));
    }
    let page_id = doc.add_object(page);

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    pages.set("Count", Object::Integer(1));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

fn write_pdf(dir: &TempDir, name: &str, mut doc: Document) -> PathBuf {
    let path = dir.path().join(name);
    doc.save(&path).expect("Failed to save test PDF");
    path
}

fn first_page(doc: &Document) -> ObjectId {
    *doc.get_pages().get(&1).expect("page 1")
}

fn page_operations(path: &Path) -> Vec<Operation> {
    let doc = Document::load(path).expect("Failed to load output PDF");
    let content = doc.get_page_content(first_page(&doc)).expect("page content");
    Content::decode(&content).expect("decodable content").operations
}

/// Every string shown by the operations, including strings inside TJ arrays
fn shown_strings(operations: &[Operation]) -> Vec<Vec<u8>> {
    let mut strings = Vec::new();
    for operand in operations.iter().flat_map(|op| &op.operands) {
        match operand {
            Object::String(bytes, _) => strings.push(bytes.clone()),
            Object::Array(items) => {
                for item in items {
                    if let Object::String(bytes, _) = item {
                        strings.push(bytes.clone());
                    }
                }
            }
            _ => {}
        }
    }
    strings
}

fn stream_bytes(stream: &Stream) -> Vec<u8> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().expect("decodable stream")
    } else {
        stream.content.clone()
    }
}

fn redact_annotation(quads: &[f64], overlay_text: Option<&str>) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Annot".to_vec()));
    dict.set("Subtype", Object::Name(b"Redact".to_vec()));
    dict.set("QuadPoints", Object::Array(quads.iter().map(|v| number(*v)).collect()));
    dict.set("IC", Object::Array(vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)]));
    if let Some(text) = overlay_text {
        dict.set("OverlayText", Object::String(text.as_bytes().to_vec(), StringFormat::Literal));
        dict.set("DA", Object::String(b"/Helv 8 Tf 1 g".to_vec(), StringFormat::Literal));
    }
    dict
}

#[test]
fn test_clean_up_file_removes_secret_text() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = write_pdf(&temp_dir, "input.pdf", build_pdf(TWO_LINES, vec![]));
    let output = temp_dir.path().join("output.pdf");

    let location = CleanupLocation::new(1, Rectangle::new(60.0, 670.0, 200.0, 690.0)).with_fill(Color::BLACK);
    let report = clean_up_file(&input, &output, &[location], &CleanupOptions::default())
        .expect("Failed to clean up PDF");
    assert!(report.is_complete());
    assert!(report.pages[0].content_modified);

    let strings = shown_strings(&page_operations(&output));
    assert_eq!(strings, vec![b"Public".to_vec()]);

    // The original content stream must not survive in the saved file
    let doc = Document::load(&output).expect("Failed to load output PDF");
    for object in doc.objects.values() {
        if let Object::Stream(stream) = object {
            let bytes = stream_bytes(stream);
            assert!(!bytes.windows(6).any(|w| w == b"Secret"));
        }
    }
}

#[test]
fn test_nonexistent_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let output = temp_dir.path().join("output.pdf");
    let result = clean_up_file(
        Path::new("/nonexistent/file.pdf"),
        &output,
        &[],
        &CleanupOptions::default(),
    );
    assert!(matches!(result, Err(Error::FileNotFound(_))));
}

#[test]
fn test_unknown_page_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = write_pdf(&temp_dir, "input.pdf", build_pdf(TWO_LINES, vec![]));
    let output = temp_dir.path().join("output.pdf");

    let location = CleanupLocation::new(2, Rectangle::new(0.0, 0.0, 10.0, 10.0));
    let result = clean_up_file(&input, &output, &[location], &CleanupOptions::default());
    assert!(matches!(result, Err(Error::PageNotFound(2))));
    assert!(!output.exists());
}

#[test]
fn test_disjoint_region_leaves_content_unchanged() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let content = "q 1 0 0 1 10 10 cm 0 0 m 100 100 l S Q BT /F1 12 Tf 72 700 Td [(Pub) -20 (lic)] TJ ET";
    let input = write_pdf(&temp_dir, "input.pdf", build_pdf(content, vec![]));
    let output = temp_dir.path().join("output.pdf");

    let location = CleanupLocation::new(1, Rectangle::new(500.0, 50.0, 550.0, 60.0));
    let report = clean_up_file(&input, &output, &[location], &CleanupOptions::default())
        .expect("Failed to clean up PDF");
    assert!(!report.pages[0].content_modified);

    let before = format!("{:?}", page_operations(&input));
    let after = format!("{:?}", page_operations(&output));
    assert_eq!(before, after);
}

#[test]
fn test_incomplete_clean_up_is_not_saved() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let content = format!("Q {}", TWO_LINES);
    let input = write_pdf(&temp_dir, "input.pdf", build_pdf(&content, vec![]));
    let output = temp_dir.path().join("output.pdf");

    let location = CleanupLocation::new(1, Rectangle::new(60.0, 670.0, 200.0, 690.0));
    let result = clean_up_file(&input, &output, &[location], &CleanupOptions::default());
    match result {
        Err(Error::Incomplete { failed }) => assert_eq!(failed, vec![1]),
        other => panic!("expected incomplete clean-up, got {:?}", other.map(|r| r.pages)),
    }
    assert!(!output.exists());
}

#[test]
fn test_redact_annotations_applied_and_removed() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    // One quad around the second line
    let annotation = redact_annotation(
        &[60.0, 690.0, 200.0, 690.0, 60.0, 670.0, 200.0, 670.0],
        Some("REDACTED"),
    );
    let input = write_pdf(&temp_dir, "input.pdf", build_pdf(TWO_LINES, vec![annotation]));
    let output = temp_dir.path().join("output.pdf");

    let report = clean_up_annotations_file(&input, &output, &CleanupOptions::default())
        .expect("Failed to apply redactions");
    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].annotations_removed, 1);
    assert_eq!(report.pages[0].overlays_drawn, 1);

    let doc = Document::load(&output).expect("Failed to load output PDF");
    let page = doc.get_dictionary(first_page(&doc)).expect("page dictionary");
    assert!(!page.has(b"Annots"));

    let operations = page_operations(&output);
    let strings = shown_strings(&operations);
    assert!(strings.contains(&b"Public".to_vec()));
    assert!(strings.contains(&b"REDACTED".to_vec()));
    assert!(!strings.contains(&b"Secret".to_vec()));

    // Background fill from IC comes first
    let names: Vec<&str> = operations.iter().map(|op| op.operator.as_str()).collect();
    assert_eq!(&names[..5], &["q", "rg", "re", "f", "Q"]);
}

#[test]
fn test_annotations_kept_when_requested() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let annotation = redact_annotation(&[60.0, 690.0, 200.0, 690.0, 60.0, 670.0, 200.0, 670.0], None);
    let input = write_pdf(&temp_dir, "input.pdf", build_pdf(TWO_LINES, vec![annotation]));
    let output = temp_dir.path().join("output.pdf");

    let options = CleanupOptions {
        remove_annotations: false,
        fill_regions: false,
        ..CleanupOptions::default()
    };
    let report = clean_up_annotations_file(&input, &output, &options).expect("Failed to apply redactions");
    assert_eq!(report.pages[0].annotations_removed, 0);

    let doc = Document::load(&output).expect("Failed to load output PDF");
    let page = doc.get_dictionary(first_page(&doc)).expect("page dictionary");
    assert!(page.has(b"Annots"));
    assert!(!shown_strings(&page_operations(&output)).contains(&b"Secret".to_vec()));
}
