//! In-memory documents for unit tests

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::objects::page_content;

/// One-page document (612×792) with Helvetica registered as /F1
pub(crate) fn document_with_page(content: &str) -> (Document, ObjectId) {
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
    resources.set("XObject", Object::Dictionary(Dictionary::new()));

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

    (doc, page_id)
}

/// Register `stream` in the page's XObject resources under `name`
pub(crate) fn add_xobject(doc: &mut Document, page_id: ObjectId, name: &str, stream: Stream) -> ObjectId {
    let id = doc.add_object(stream);
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .expect("page dictionary");
    let Ok(Object::Dictionary(resources)) = page.get_mut(b"Resources") else {
        panic!("page resources")
    };
    let Ok(Object::Dictionary(xobjects)) = resources.get_mut(b"XObject") else {
        panic!("XObject resources")
    };
    xobjects.set(name, Object::Reference(id));
    id
}

/// Form XObject with the given content and bounding box
pub(crate) fn form_xobject(content: &str, bbox: [i64; 4]) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Form".to_vec()));
    dict.set("BBox", Object::Array(bbox.iter().map(|v| Object::Integer(*v)).collect()));
    Stream::new(dict, content.as_bytes().to_vec())
}

/// 8-bit DeviceRGB image with raw samples
pub(crate) fn rgb_image(width: i64, height: i64, samples: Vec<u8>) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width));
    dict.set("Height", Object::Integer(height));
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    Stream::new(dict, samples)
}

/// Decoded operations of the page's (possibly multi-stream) content
pub(crate) fn page_operations(doc: &Document, page_id: ObjectId) -> Vec<Operation> {
    let content = page_content(doc, page_id).expect("page content");
    Content::decode(&content).expect("decodable content").operations
}

/// Operator names, for compact assertions
pub(crate) fn operator_names(operations: &[Operation]) -> Vec<String> {
    operations.iter().map(|op| op.operator.clone()).collect()
}

/// Numeric operand as f64
pub(crate) fn operand_number(object: &Object) -> f64 {
    super::objects::number(object).expect("numeric operand")
}
