//! Web-to-PDF merge pipeline.
//!
//! Reads `(title, url)` rows from a CSV, renders each `http(s)` URL to a
//! temporary PDF through an injected [`PageRenderer`], and concatenates the
//! rendered documents into one output file in exactly the CSV's row order.
//! That ordering guarantee is the component's main invariant: each row
//! carries its physical index through filtering, so nothing depends on
//! incidental iteration order.
//!
//! Temporary files live in a [`TempDir`] and are removed on every exit
//! path. A single render failure aborts the whole run; there is no per-page
//! retry.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};
use regex::Regex;
use tempfile::TempDir;
use tracing::{error, info};

use crate::contract::{ClientError, PageRenderer};
use crate::links::LinkRecord;
use crate::render::PrintOptions;

pub const DEFAULT_TITLE_COLUMN: &str = "Title";
pub const DEFAULT_URL_COLUMN: &str = "Link";
pub const DEFAULT_OUTPUT_FILENAME: &str = "Merged_Documentation_Output.pdf";

/// Inputs for one merge run.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub csv_path: PathBuf,
    pub output_path: PathBuf,
    pub title_column: String,
    pub url_column: String,
    pub print_options: PrintOptions,
}

/// Outcome of a successful merge.
#[derive(Debug)]
pub struct MergeReport {
    pub pages_rendered: usize,
    pub output_path: PathBuf,
    /// Temporary render directory; removed before this report is returned.
    pub scratch_dir: PathBuf,
}

#[derive(Debug)]
pub enum MergeError {
    Csv(csv::Error),
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },
    NoRecords,
    Render {
        url: String,
        /// Scratch directory of the aborted run; already removed when the
        /// error reaches the caller.
        scratch_dir: PathBuf,
        source: ClientError,
    },
    Pdf(lopdf::Error),
    Malformed(&'static str),
    Io(std::io::Error),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::Csv(e) => write!(f, "CSV error: {e}"),
            MergeError::MissingColumns { missing, available } => write!(
                f,
                "missing required column(s) {}; available columns are: {}",
                missing.join(", "),
                available.join(", ")
            ),
            MergeError::NoRecords => write!(f, "no URLs to process"),
            MergeError::Render { url, source, .. } => {
                write!(f, "failed to render '{url}': {source}")
            }
            MergeError::Pdf(e) => write!(f, "PDF error: {e}"),
            MergeError::Malformed(what) => write!(f, "malformed PDF input: {what}"),
            MergeError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<csv::Error> for MergeError {
    fn from(e: csv::Error) -> Self {
        MergeError::Csv(e)
    }
}

impl From<lopdf::Error> for MergeError {
    fn from(e: lopdf::Error) -> Self {
        MergeError::Pdf(e)
    }
}

impl From<std::io::Error> for MergeError {
    fn from(e: std::io::Error) -> Self {
        MergeError::Io(e)
    }
}

/// A link record paired with the physical CSV row it came from.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub row: usize,
    pub record: LinkRecord,
}

/// Read `(title, url)` rows from a CSV, locating the columns by name. Rows
/// keep their physical index.
pub fn read_link_records(
    csv_path: &Path,
    title_column: &str,
    url_column: &str,
) -> Result<Vec<IndexedRecord>, MergeError> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let title_idx = headers.iter().position(|h| h == title_column);
    let url_idx = headers.iter().position(|h| h == url_column);

    let (title_idx, url_idx) = match (title_idx, url_idx) {
        (Some(t), Some(u)) => (t, u),
        (t, u) => {
            let mut missing = Vec::new();
            if t.is_none() {
                missing.push(title_column.to_string());
            }
            if u.is_none() {
                missing.push(url_column.to_string());
            }
            let available = headers.iter().map(str::to_string).collect();
            return Err(MergeError::MissingColumns { missing, available });
        }
    };

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        records.push(IndexedRecord {
            row,
            record: LinkRecord {
                title: record.get(title_idx).unwrap_or("").trim().to_string(),
                url: record.get(url_idx).unwrap_or("").trim().to_string(),
            },
        });
    }
    Ok(records)
}

/// Keep only rows whose URL starts with `http`, preserving relative order
/// and original row indices.
pub fn filter_http(records: Vec<IndexedRecord>) -> Vec<IndexedRecord> {
    records
        .into_iter()
        .filter(|r| r.record.url.starts_with("http"))
        .collect()
}

/// Turn a title into a filesystem-safe file stem. Total and idempotent:
/// characters disallowed in file names become `_`, and a title that reduces
/// to nothing falls back to a positional placeholder.
pub fn sanitize_filename(title: &str, row: usize) -> String {
    let disallowed = Regex::new(r#"[\\/:*?"<>|]+"#).expect("static regex is valid");
    let cleaned = disallowed.replace_all(title, "_").trim().to_string();
    if cleaned.is_empty() {
        format!("page_{}", row + 1)
    } else {
        cleaned
    }
}

/// Render the given records in order and concatenate the results into
/// `output_path`. Temporary PDFs are removed on success and on error.
pub async fn merge_records<R>(
    records: &[IndexedRecord],
    output_path: &Path,
    options: &PrintOptions,
    renderer: &R,
) -> Result<MergeReport, MergeError>
where
    R: PageRenderer + ?Sized,
{
    if records.is_empty() {
        return Err(MergeError::NoRecords);
    }

    let temp_dir = TempDir::new()?;
    let scratch_dir = temp_dir.path().to_path_buf();
    info!(
        count = records.len(),
        scratch = %scratch_dir.display(),
        "Rendering pages to temporary PDFs"
    );

    let mut rendered: Vec<PathBuf> = Vec::new();
    for item in records {
        let stem = sanitize_filename(&item.record.title, item.row);
        let mut path = temp_dir.path().join(format!("{stem}.pdf"));
        if path.exists() {
            // Duplicate titles must not overwrite each other or the order
            // invariant breaks.
            path = temp_dir.path().join(format!("{stem}_{}.pdf", item.row));
        }
        info!(row = item.row, url = %item.record.url, file = %path.display(), "Rendering page");
        let bytes = renderer
            .render_pdf(&item.record.url, options)
            .await
            .map_err(|e| {
                error!(url = %item.record.url, error = %e, "Page render failed, aborting run");
                MergeError::Render {
                    url: item.record.url.clone(),
                    scratch_dir: scratch_dir.clone(),
                    source: e,
                }
            })?;
        fs::write(&path, &bytes)?;
        rendered.push(path);
    }

    concat_pdfs(&rendered, output_path)?;
    info!(
        pages = rendered.len(),
        output = %output_path.display(),
        "Merged rendered pages"
    );

    temp_dir.close()?;
    Ok(MergeReport {
        pages_rendered: rendered.len(),
        output_path: output_path.to_path_buf(),
        scratch_dir,
    })
}

/// Read, filter and merge in one call.
pub async fn merge_from_csv<R>(
    config: &MergeConfig,
    renderer: &R,
) -> Result<MergeReport, MergeError>
where
    R: PageRenderer + ?Sized,
{
    let records = filter_http(read_link_records(
        &config.csv_path,
        &config.title_column,
        &config.url_column,
    )?);
    merge_records(&records, &config.output_path, &config.print_options, renderer).await
}

/// Concatenate the given PDF files into one document, preserving input
/// order exactly.
///
/// The first input's page-tree root becomes the root of the merged
/// document and later roots are dropped, so inheritable attributes
/// (`Resources`, `MediaBox`, `Rotate`) set only on a later document's
/// `Pages` node do not carry over. Browser-rendered inputs always carry
/// these per page.
pub fn concat_pdfs(inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
    let mut max_id = 1;
    // Pages in encounter order; collection must not be keyed by object id
    // or the output order would drift from the input order.
    let mut page_objects: Vec<(ObjectId, Object)> = Vec::new();
    let mut all_objects: Vec<(ObjectId, Object)> = Vec::new();

    for path in inputs {
        let mut doc = Document::load(path)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;
        for (_page_no, page_id) in doc.get_pages() {
            let object = doc.get_object(page_id)?.clone();
            page_objects.push((page_id, object));
        }
        for (id, object) in std::mem::take(&mut doc.objects) {
            all_objects.push((id, object));
        }
    }

    let mut merged = Document::with_version("1.5");
    let mut pages_root: Option<(ObjectId, Object)> = None;
    let mut catalog_root: Option<(ObjectId, Object)> = None;

    for (id, object) in all_objects {
        match object_type(&object) {
            Some(b"Catalog") => {
                catalog_root.get_or_insert((id, object));
            }
            Some(b"Pages") => {
                pages_root.get_or_insert((id, object));
            }
            // Pages are re-inserted below with a rewritten parent.
            Some(b"Page") => {}
            Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let (pages_id, pages_object) =
        pages_root.ok_or(MergeError::Malformed("no page tree root found"))?;
    let (catalog_id, catalog_object) =
        catalog_root.ok_or(MergeError::Malformed("no catalog found"))?;

    for (id, object) in &page_objects {
        let mut dict = object.as_dict().map_err(MergeError::Pdf)?.clone();
        dict.set("Parent", pages_id);
        merged.objects.insert(*id, Object::Dictionary(dict));
    }

    let mut pages_dict = pages_object.as_dict().map_err(MergeError::Pdf)?.clone();
    pages_dict.set("Count", page_objects.len() as u32);
    pages_dict.set(
        "Kids",
        page_objects
            .iter()
            .map(|(id, _)| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    merged.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog_dict = catalog_object.as_dict().map_err(MergeError::Pdf)?.clone();
    catalog_dict.set("Pages", pages_id);
    catalog_dict.remove(b"Outlines");
    merged
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();
    merged.save(output)?;
    Ok(())
}

fn object_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|value| value.as_name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_csv(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("links.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize_filename("My: Doc?", 0), "My_ Doc_");
        assert_eq!(sanitize_filename("a/b\\c", 0), "a_b_c");
        assert_eq!(sanitize_filename("plain title", 0), "plain title");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for title in ["My: Doc?", "a/b\\c", "  spaced  ", "???", ""] {
            let once = sanitize_filename(title, 3);
            assert_eq!(sanitize_filename(&once, 3), once);
            assert!(!once.is_empty());
        }
    }

    #[test]
    fn empty_title_falls_back_to_positional_name() {
        assert_eq!(sanitize_filename("", 4), "page_5");
        assert_eq!(sanitize_filename("   ", 4), "page_5");
    }

    #[test]
    fn reads_records_with_row_indices() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(
            dir.path(),
            "Title,Link\nA,https://a\nB,ftp://b\nC,https://c\n",
        );
        let records = read_link_records(&csv, "Title", "Link").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].row, 1);
        assert_eq!(records[1].record.title, "B");
    }

    #[test]
    fn missing_columns_report_available_headers() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), "Name,Href\nA,https://a\n");
        let err = read_link_records(&csv, "Title", "Link").unwrap_err();
        match err {
            MergeError::MissingColumns { missing, available } => {
                assert_eq!(missing, vec!["Title".to_string(), "Link".to_string()]);
                assert_eq!(available, vec!["Name".to_string(), "Href".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn filter_keeps_http_rows_in_order_with_original_indices() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(
            dir.path(),
            "Title,Link\nA,https://a\nB,ftp://b\nC,http://c\n",
        );
        let records = filter_http(read_link_records(&csv, "Title", "Link").unwrap());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record.title, "A");
        assert_eq!(records[0].row, 0);
        assert_eq!(records[1].record.title, "C");
        assert_eq!(records[1].row, 2);
    }
}
