//! Lossless PDF recompression.
//!
//! Recompresses every page's content streams at an explicit zlib level,
//! then deduplicates byte-identical indirect objects across the document
//! and rewrites references to the surviving copy. Already-optimized inputs
//! can come out larger; that is reported, not treated as an error.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info};

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

/// Size accounting for one compression run.
#[derive(Debug, Clone, Copy)]
pub struct CompressReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub deduplicated_objects: usize,
}

impl CompressReport {
    /// Percentage reduction relative to the input. Negative when the output
    /// grew, which is expected for already-optimized documents.
    pub fn reduction_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        (self.input_bytes as f64 - self.output_bytes as f64) * 100.0 / self.input_bytes as f64
    }
}

#[derive(Debug)]
pub enum CompressError {
    InputNotFound(PathBuf),
    InvalidLevel(u32),
    Pdf(lopdf::Error),
    Io(std::io::Error),
}

impl fmt::Display for CompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressError::InputNotFound(p) => {
                write!(f, "input file not found at '{}'", p.display())
            }
            CompressError::InvalidLevel(l) => {
                write!(f, "compression level {l} out of range (0-9)")
            }
            CompressError::Pdf(e) => write!(f, "PDF error: {e}"),
            CompressError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CompressError {}

impl From<lopdf::Error> for CompressError {
    fn from(e: lopdf::Error) -> Self {
        CompressError::Pdf(e)
    }
}

impl From<std::io::Error> for CompressError {
    fn from(e: std::io::Error) -> Self {
        CompressError::Io(e)
    }
}

/// Recompress `input` into `output` at the given zlib level (0 stores page
/// content streams plain). The page count is always preserved.
pub fn compress_pdf(
    input: &Path,
    output: &Path,
    level: u32,
) -> Result<CompressReport, CompressError> {
    if level > 9 {
        return Err(CompressError::InvalidLevel(level));
    }
    if !input.exists() {
        return Err(CompressError::InputNotFound(input.to_path_buf()));
    }

    let input_bytes = std::fs::metadata(input)?.len();
    info!(input = %input.display(), level, input_bytes, "Compressing PDF");

    let mut doc = Document::load(input)?;
    recompress_page_streams(&mut doc, level)?;
    let deduplicated_objects = dedup_identical_objects(&mut doc);
    debug!(deduplicated_objects, "Deduplicated identical objects");
    doc.save(output)?;

    let output_bytes = std::fs::metadata(output)?.len();
    let report = CompressReport {
        input_bytes,
        output_bytes,
        deduplicated_objects,
    };
    info!(
        output = %output.display(),
        output_bytes,
        reduction_percent = report.reduction_percent(),
        "Wrote compressed PDF"
    );
    Ok(report)
}

/// Human-readable file size for console reports.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

fn recompress_page_streams(doc: &mut Document, level: u32) -> Result<(), CompressError> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in pages {
        for content_id in content_stream_ids(doc, page_id)? {
            if let Ok(Object::Stream(stream)) = doc.get_object_mut(content_id) {
                recompress_stream(stream, level)?;
            }
        }
    }
    Ok(())
}

fn content_stream_ids(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>, lopdf::Error> {
    let page = doc.get_dictionary(page_id)?;
    let mut ids = Vec::new();
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => ids.push(*id),
        Ok(Object::Array(items)) => {
            for item in items {
                if let Object::Reference(id) = item {
                    ids.push(*id);
                }
            }
        }
        _ => {}
    }
    Ok(ids)
}

fn recompress_stream(stream: &mut Stream, level: u32) -> Result<(), CompressError> {
    // Only plain or flate-encoded streams are touched; exotic filters are
    // left as-is.
    let flate_or_plain = match stream.dict.get(b"Filter") {
        Err(_) => true,
        Ok(Object::Name(name)) => name.as_slice() == b"FlateDecode",
        Ok(_) => false,
    };
    if !flate_or_plain {
        return Ok(());
    }

    let data = if stream.dict.get(b"Filter").is_ok() {
        match stream.decompressed_content() {
            Ok(data) => data,
            Err(_) => return Ok(()),
        }
    } else {
        stream.content.clone()
    };

    if level == 0 {
        stream.dict.remove(b"Filter");
        stream.set_plain_content(data);
        return Ok(());
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(&data)?;
    let compressed = encoder.finish()?;
    stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    stream.set_content(compressed);
    Ok(())
}

/// Merge byte-identical indirect objects, rewriting every reference to the
/// first occurrence. Page-tree nodes are excluded so the page count can
/// never collapse. Returns the number of objects removed.
fn dedup_identical_objects(doc: &mut Document) -> usize {
    let mut canonical: HashMap<Vec<u8>, ObjectId> = HashMap::new();
    let mut remap: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();

    for (&id, object) in doc.objects.iter() {
        if is_page_tree_node(object) {
            continue;
        }
        match canonical.entry(fingerprint(object)) {
            Entry::Occupied(found) => {
                remap.insert(id, *found.get());
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
    }

    if remap.is_empty() {
        return 0;
    }

    for object in doc.objects.values_mut() {
        remap_references(object, &remap);
    }
    remap_dictionary(&mut doc.trailer, &remap);

    for id in remap.keys() {
        doc.objects.remove(id);
    }
    remap.len()
}

fn is_page_tree_node(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return false,
    };
    match dict.get(b"Type") {
        Ok(Object::Name(name)) => {
            name.as_slice() == b"Page" || name.as_slice() == b"Pages"
        }
        _ => false,
    }
}

fn remap_references(object: &mut Object, remap: &BTreeMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(target) = remap.get(id) {
                *id = *target;
            }
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                remap_references(item, remap);
            }
        }
        Object::Dictionary(dict) => remap_dictionary(dict, remap),
        Object::Stream(stream) => remap_dictionary(&mut stream.dict, remap),
        _ => {}
    }
}

fn remap_dictionary(dict: &mut Dictionary, remap: &BTreeMap<ObjectId, ObjectId>) {
    for (_key, value) in dict.iter_mut() {
        remap_references(value, remap);
    }
}

/// Canonical byte serialization used to compare objects for identity.
/// Length-prefixed so distinct structures never collide.
fn fingerprint(object: &Object) -> Vec<u8> {
    let mut buf = Vec::new();
    write_fingerprint(object, &mut buf);
    buf
}

fn write_len(len: usize, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(len as u64).to_le_bytes());
}

fn write_fingerprint(object: &Object, buf: &mut Vec<u8>) {
    match object {
        Object::Null => buf.push(b'n'),
        Object::Boolean(value) => {
            buf.push(b'b');
            buf.push(*value as u8);
        }
        Object::Integer(value) => {
            buf.push(b'i');
            buf.extend_from_slice(&value.to_le_bytes());
        }
        Object::Real(value) => {
            buf.push(b'r');
            buf.extend_from_slice(&value.to_bits().to_le_bytes());
        }
        Object::Name(name) => {
            buf.push(b'/');
            write_len(name.len(), buf);
            buf.extend_from_slice(name);
        }
        Object::String(bytes, _format) => {
            buf.push(b's');
            write_len(bytes.len(), buf);
            buf.extend_from_slice(bytes);
        }
        Object::Array(items) => {
            buf.push(b'[');
            write_len(items.len(), buf);
            for item in items {
                write_fingerprint(item, buf);
            }
        }
        Object::Dictionary(dict) => {
            buf.push(b'<');
            write_len(dict.len(), buf);
            for (key, value) in dict.iter() {
                write_len(key.len(), buf);
                buf.extend_from_slice(key);
                write_fingerprint(value, buf);
            }
        }
        Object::Stream(stream) => {
            buf.push(b'S');
            write_fingerprint(&Object::Dictionary(stream.dict.clone()), buf);
            write_len(stream.content.len(), buf);
            buf.extend_from_slice(&stream.content);
        }
        Object::Reference(id) => {
            buf.push(b'R');
            buf.extend_from_slice(&id.0.to_le_bytes());
            buf.extend_from_slice(&id.1.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::dictionary;

    fn page_content(text: &str) -> Vec<u8> {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 48.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        content.encode().unwrap()
    }

    fn sample_doc(page_texts: &[&str]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content_id = doc.add_object(Stream::new(dictionary! {}, page_content(text)));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn save_to_temp(doc: &mut Document, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        doc.save(&path).unwrap();
        path
    }

    #[test]
    fn page_count_preserved_for_all_levels() {
        let dir = tempfile::tempdir().unwrap();
        let input = save_to_temp(
            &mut sample_doc(&["one", "two", "three"]),
            dir.path(),
            "input.pdf",
        );
        for level in 0..=9u32 {
            let output = dir.path().join(format!("out_{level}.pdf"));
            compress_pdf(&input, &output, level).unwrap();
            let compressed = Document::load(&output).unwrap();
            assert_eq!(compressed.get_pages().len(), 3, "level {level}");
        }
    }

    #[test]
    fn missing_input_reports_without_writing_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pdf");
        let err = compress_pdf(&dir.path().join("absent.pdf"), &output, 9).unwrap_err();
        assert!(matches!(err, CompressError::InputNotFound(_)));
        assert!(!output.exists());
    }

    #[test]
    fn level_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = compress_pdf(
            &dir.path().join("in.pdf"),
            &dir.path().join("out.pdf"),
            10,
        )
        .unwrap_err();
        assert!(matches!(err, CompressError::InvalidLevel(10)));
    }

    #[test]
    fn identical_content_streams_are_deduplicated() {
        let mut doc = sample_doc(&["same", "same"]);
        let before = doc.objects.len();
        let removed = dedup_identical_objects(&mut doc);
        assert_eq!(removed, 1);
        assert_eq!(doc.objects.len(), before - 1);
        // Pages survive dedup even when their content was merged.
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn dedup_output_still_loads_with_all_pages() {
        let dir = tempfile::tempdir().unwrap();
        let input = save_to_temp(&mut sample_doc(&["same", "same"]), dir.path(), "in.pdf");
        let output = dir.path().join("out.pdf");
        let report = compress_pdf(&input, &output, 9).unwrap();
        assert_eq!(report.deduplicated_objects, 1);
        let compressed = Document::load(&output).unwrap();
        assert_eq!(compressed.get_pages().len(), 2);
    }

    #[test]
    fn negative_reduction_is_representable() {
        let report = CompressReport {
            input_bytes: 100,
            output_bytes: 150,
            deduplicated_objects: 0,
        };
        assert!(report.reduction_percent() < 0.0);
    }

    #[test]
    fn human_size_scales_units() {
        assert_eq!(human_size(512), "512.00 B");
        assert_eq!(human_size(2048), "2.00 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.00 MB");
    }
}
