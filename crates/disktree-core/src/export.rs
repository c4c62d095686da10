/// Flat, one-row-per-child export of a node.
///
/// Pure reads of a snapshot; nothing here touches the scanner.
use crate::error::ExportError;
use crate::model::{percent_of, size::format_size, Node, SortMode};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CSV_HEADER: [&str; 7] = [
    "Name",
    "Path",
    "SizeBytes",
    "SizeHuman",
    "Files",
    "Dirs",
    "ParentShare%",
];

/// One immediate child of the exported node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    /// Empty while the child is still being measured.
    pub size_human: String,
    pub files: u64,
    pub dirs: u64,
    /// Percent of the sum of all children, one decimal.
    pub parent_share: String,
}

pub fn rows(node: &Node, sort: SortMode) -> Vec<ExportRow> {
    let total = node.children_total();
    node.sorted_children(sort)
        .into_iter()
        .map(|child| ExportRow {
            name: child.name.to_string(),
            path: child.path.to_string_lossy().into_owned(),
            size_bytes: child.size_or_zero(),
            size_human: child.size.map(format_size).unwrap_or_default(),
            files: child.files,
            dirs: child.dirs,
            parent_share: format!("{:.1}", percent_of(child.size_or_zero(), total)),
        })
        .collect()
}

/// Write the header and one row per child of `node` as CSV.
pub fn write_csv<W: Write>(node: &Node, sort: SortMode, writer: W) -> Result<(), ExportError> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for row in rows(node, sort) {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Write `du-YYYYMMDD-HHMMSS.csv` into `dir` and return its path.
pub fn export_to_dir(node: &Node, sort: SortMode, dir: &Path) -> Result<PathBuf, ExportError> {
    let name = format!("du-{}.csv", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    let path = dir.join(name);
    let file = File::create(&path).map_err(|source| ExportError::Create {
        path: path.clone(),
        source,
    })?;
    write_csv(node, sort, file)?;
    info!(
        "exported {} rows for {} to {}",
        node.children.len(),
        node.path.display(),
        path.display()
    );
    Ok(path)
}
