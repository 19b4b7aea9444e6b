//! lopdf object helpers: reference resolution, numbers, page resources and contents

use std::collections::BTreeSet;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// Indirection chains longer than this are treated as broken
const MAX_REFERENCE_DEPTH: usize = 32;

/// Follow references until a direct object is reached
pub fn resolve<'d>(doc: &'d Document, object: &'d Object) -> Result<&'d Object> {
    let mut current = object;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            _ => return Ok(current),
        }
    }
    Err(Error::General("Reference chain too deep".to_string()))
}

/// Resolve a dictionary entry, `None` when the key is absent
pub fn resolve_key<'d>(
    doc: &'d Document,
    dict: &'d Dictionary,
    key: &[u8],
) -> Result<Option<&'d Object>> {
    match dict.get(key) {
        Ok(object) => resolve(doc, object).map(Some),
        Err(_) => Ok(None),
    }
}

/// Resolve an entry that must be a dictionary (or a stream, whose dictionary is used)
pub fn resolve_dict<'d>(
    doc: &'d Document,
    dict: &'d Dictionary,
    key: &[u8],
) -> Result<Option<&'d Dictionary>> {
    match resolve_key(doc, dict, key)? {
        Some(Object::Dictionary(d)) => Ok(Some(d)),
        Some(Object::Stream(s)) => Ok(Some(&s.dict)),
        _ => Ok(None),
    }
}

/// Integer or real operand as f64
pub fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Numeric dictionary entry, resolving references
pub fn dict_number(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<f64> {
    resolve_key(doc, dict, key).ok().flatten().and_then(number)
}

/// Array of numbers (resolving the array and each element)
pub fn number_array(doc: &Document, object: &Object) -> Option<Vec<f64>> {
    match resolve(doc, object).ok()? {
        Object::Array(items) => items
            .iter()
            .map(|item| resolve(doc, item).ok().and_then(number))
            .collect(),
        _ => None,
    }
}

pub fn dict_number_array(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Vec<f64>> {
    dict.get(key).ok().and_then(|o| number_array(doc, o))
}

pub fn name(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Name(n) => Some(n.as_slice()),
        _ => None,
    }
}

pub fn dict_name<'d>(doc: &'d Document, dict: &'d Dictionary, key: &[u8]) -> Option<&'d [u8]> {
    resolve_key(doc, dict, key).ok().flatten().and_then(name)
}

/// Number operand for content output; integral values stay integers
pub fn real(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value as f32)
    }
}

pub fn name_object(value: &[u8]) -> Object {
    Object::Name(value.to_vec())
}

/// Stream bytes with filters removed
pub fn stream_content(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        Ok(stream.decompressed_content()?)
    } else {
        Ok(stream.content.clone())
    }
}

/// Serialise operations as content stream bytes.
///
/// lopdf parses `BI … ID … EI` into a single `BI` operation whose operand is a
/// stream, and its encoder would write that operand in object syntax. Inline images
/// are written back in inline form here.
pub fn encode_content(operations: Vec<Operation>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut run = Vec::new();
    for operation in operations {
        match inline_image(&operation) {
            Some(image) => {
                write_run(&mut bytes, &mut run)?;
                separate(&mut bytes);
                write_inline_image(&mut bytes, image)?;
            }
            None => run.push(operation),
        }
    }
    write_run(&mut bytes, &mut run)?;
    Ok(bytes)
}

fn inline_image(operation: &Operation) -> Option<&Stream> {
    match operation.operands.as_slice() {
        [Object::Stream(image)] if operation.operator == "BI" => Some(image),
        _ => None,
    }
}

fn separate(bytes: &mut Vec<u8>) {
    if !bytes.is_empty() {
        bytes.push(b'\n');
    }
}

fn write_run(bytes: &mut Vec<u8>, run: &mut Vec<Operation>) -> Result<()> {
    if run.is_empty() {
        return Ok(());
    }
    let encoded = Content {
        operations: std::mem::take(run),
    }
    .encode()?;
    separate(bytes);
    bytes.extend_from_slice(&encoded);
    Ok(())
}

/// `BI <entries> ID <data> EI`, with the entries written by lopdf as `ID` operands
fn write_inline_image(bytes: &mut Vec<u8>, image: &Stream) -> Result<()> {
    let entries = image
        .dict
        .iter()
        .filter(|(key, _)| key.as_slice() != b"Length")
        .flat_map(|(key, value)| [Object::Name(key.clone()), value.clone()])
        .collect();
    let header = Content {
        operations: vec![Operation::new("ID", entries)],
    }
    .encode()?;
    bytes.extend_from_slice(b"BI ");
    bytes.extend_from_slice(&header);
    bytes.push(b' ');
    bytes.extend_from_slice(&image.content);
    bytes.extend_from_slice(b"\nEI");
    Ok(())
}

/// Rebuild dictionaries with sorted keys so serialisation is deterministic
pub fn canonical(object: &Object) -> Object {
    match object {
        Object::Dictionary(dict) => Object::Dictionary(canonical_dict(dict)),
        Object::Array(items) => Object::Array(items.iter().map(canonical).collect()),
        _ => object.clone(),
    }
}

fn canonical_dict(dict: &Dictionary) -> Dictionary {
    let mut entries: Vec<(&Vec<u8>, &Object)> = dict.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut sorted = Dictionary::new();
    for (key, value) in entries {
        sorted.set(key.clone(), canonical(value));
    }
    sorted
}

/// Resources in effect for a page, following the /Parent chain for inheritance
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut node = doc.get_dictionary(page_id)?;
    for _ in 0..MAX_REFERENCE_DEPTH {
        if let Some(resources) = resolve_dict(doc, node, b"Resources")? {
            return Ok(resources.clone());
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => node = doc.get_dictionary(*parent)?,
            _ => break,
        }
    }
    Ok(Dictionary::new())
}

/// Inline the resource category subdictionaries that are stored as references
pub fn inline_resource_categories(doc: &Document, resources: &mut Dictionary) -> Result<()> {
    for category in [&b"XObject"[..], b"Font"] {
        if let Ok(Object::Reference(id)) = resources.get(category) {
            let resolved = match doc.get_object(*id)? {
                Object::Dictionary(d) => d.clone(),
                _ => Dictionary::new(),
            };
            resources.set(category.to_vec(), Object::Dictionary(resolved));
        }
    }
    Ok(())
}

/// IDs of the page's content streams, in order
pub fn page_content_ids(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>> {
    let page_dict = doc.get_dictionary(page_id)?;
    let ids = match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            // Indirect array of streams
            Object::Array(arr) => references(arr),
            _ => vec![*id],
        },
        Ok(Object::Array(arr)) => references(arr),
        _ => vec![],
    };
    Ok(ids)
}

fn references(items: &[Object]) -> Vec<ObjectId> {
    items
        .iter()
        .filter_map(|o| if let Object::Reference(id) = o { Some(*id) } else { None })
        .collect()
}

/// Decoded content of all the page's streams, concatenated
pub fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let mut combined = Vec::new();
    for content_id in page_content_ids(doc, page_id)? {
        if let Object::Stream(stream) = doc.get_object(content_id)? {
            combined.extend(stream_content(stream)?);
            combined.push(b'\n');
        }
    }
    Ok(combined)
}

/// Replace the page's Contents with a single new stream
pub fn set_page_content(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<ObjectId> {
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Contents", Object::Reference(content_id));
    Ok(content_id)
}

/// Prepend a content stream to a page's Contents (drawn underneath existing content)
pub fn prepend_content_to_page(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
    let mut contents = page_content_refs(doc, page_id)?;
    let new_content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    contents.insert(0, Object::Reference(new_content_id));
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Append a content stream to a page's Contents (drawn on top of existing content)
pub fn append_content_to_page(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
    let mut contents = page_content_refs(doc, page_id)?;
    let new_content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    contents.push(Object::Reference(new_content_id));
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

fn page_content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    Ok(page_content_ids(doc, page_id)?
        .into_iter()
        .map(Object::Reference)
        .collect())
}

/// A resource name not yet used in `category` of `resources`, derived from `base`
pub fn unique_resource_name(resources: &Dictionary, category: &[u8], base: &[u8]) -> Vec<u8> {
    let taken: BTreeSet<Vec<u8>> = match resources.get(category) {
        Ok(Object::Dictionary(d)) => d.iter().map(|(k, _)| k.clone()).collect(),
        _ => BTreeSet::new(),
    };
    (1..)
        .map(|n| {
            let mut candidate = base.to_vec();
            candidate.extend_from_slice(format!("_c{}", n).as_bytes());
            candidate
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_vec())
}

/// Set `resources[category][name] = value`, creating the category if needed
pub fn set_resource(resources: &mut Dictionary, category: &[u8], name: &[u8], value: Object) {
    let mut entries = match resources.get(category) {
        Ok(Object::Dictionary(d)) => d.clone(),
        _ => Dictionary::new(),
    };
    entries.set(name.to_vec(), value);
    resources.set(category.to_vec(), Object::Dictionary(entries));
}

/// Objects created while a page is interpreted, committed only when the page succeeds
#[derive(Debug)]
pub struct PendingObjects {
    next_id: u32,
    objects: Vec<(ObjectId, Object)>,
}

impl PendingObjects {
    pub fn new(doc: &Document) -> Self {
        Self {
            next_id: doc.max_id + 1,
            objects: Vec::new(),
        }
    }

    pub fn add(&mut self, object: Object) -> ObjectId {
        let id = (self.next_id, 0);
        self.next_id += 1;
        self.objects.push((id, object));
        id
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn commit(self, doc: &mut Document) {
        for (id, object) in self.objects {
            doc.objects.insert(id, object);
        }
        doc.max_id = doc.max_id.max(self.next_id - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_image_is_written_inline() {
        let source = b"q 10 0 0 10 300 300 cm BI /W 1 /H 1 /CS /RGB /BPC 8 ID ABC EI Q 0 0 m";
        let operations = Content::decode(source).unwrap().operations;
        let bytes = encode_content(operations).unwrap();

        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("ID ABC\nEI"), "{}", text);
        assert!(!text.contains("stream"));
        assert!(!text.contains("/Length"));

        let decoded = Content::decode(&bytes).unwrap().operations;
        let names: Vec<&str> = decoded.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(names, ["q", "cm", "BI", "Q", "m"]);
        match decoded[2].operands.as_slice() {
            [Object::Stream(image)] => assert_eq!(image.content, b"ABC"),
            other => panic!("unexpected inline image operands {:?}", other),
        }
    }

    #[test]
    fn test_real_keeps_integers() {
        assert_eq!(format!("{:?}", real(12.0)), format!("{:?}", Object::Integer(12)));
        assert_eq!(format!("{:?}", real(1.5)), format!("{:?}", Object::Real(1.5)));
    }

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let mut inner = Dictionary::new();
        inner.set("Z", Object::Integer(1));
        inner.set("A", Object::Integer(2));
        let mut outer = Dictionary::new();
        outer.set("MCID", Object::Integer(3));
        outer.set("Alt", Object::Dictionary(inner));

        let sorted = canonical(&Object::Dictionary(outer));
        let Object::Dictionary(sorted) = sorted else { panic!("expected dictionary") };
        let keys: Vec<&Vec<u8>> = sorted.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"Alt".to_vec(), &b"MCID".to_vec()]);
        let Ok(Object::Dictionary(inner)) = sorted.get(b"Alt") else { panic!("expected dictionary") };
        let keys: Vec<&Vec<u8>> = inner.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"A".to_vec(), &b"Z".to_vec()]);
    }

    #[test]
    fn test_unique_resource_name_skips_taken() {
        let mut resources = Dictionary::new();
        set_resource(&mut resources, b"XObject", b"Im1", Object::Null);
        set_resource(&mut resources, b"XObject", b"Im1_c1", Object::Null);
        assert_eq!(unique_resource_name(&resources, b"XObject", b"Im1"), b"Im1_c2".to_vec());
    }

    #[test]
    fn test_pending_objects_commit_after_max_id() {
        let mut doc = Document::with_version("1.5");
        let existing = doc.add_object(Object::Null);
        let mut pending = PendingObjects::new(&doc);
        let id = pending.add(Object::Integer(7));
        assert_eq!(id.0, existing.0 + 1);
        assert!(doc.get_object(id).is_err());
        pending.commit(&mut doc);
        assert!(doc.get_object(id).is_ok());
        assert_eq!(doc.max_id, id.0);
    }
}
