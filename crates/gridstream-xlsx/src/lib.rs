//! Streaming row reader for SpreadsheetML (`.xlsx`) workbooks.
//!
//! The reader walks worksheet XML while it is inflated from the ZIP container
//! and yields each row as an ordered `label -> value` record, without ever
//! materializing a whole sheet. Sparse and reference-less cell layouts are
//! densified, shared strings and number-format classification resolve cell
//! values, and merged-range anchors can propagate to their covered cells.
//!
//! ```no_run
//! use gridstream_xlsx::XlsxReader;
//!
//! # fn main() -> Result<(), gridstream_xlsx::ReadError> {
//! let file = std::fs::File::open("report.xlsx")?;
//! let mut workbook = XlsxReader::open(file)?;
//! for row in workbook.query(true, Some("Sales"), "A1")? {
//!     let row = row?;
//!     println!("{:?}", row.get("Region"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The compressed container is not seekable mid-entry, so each pass over a
//! sheet (extent probe, merge/blob pre-pass, row stream) opens a fresh
//! decompression stream. Dropping a [`Rows`] iterator releases its stream;
//! that is the cancellation point.

mod dimension;
mod merge_cells;
mod openxml;
mod path;
mod relationships;
mod shared_strings;
mod streaming;
mod styles;
mod workbook;

use std::cell::OnceCell;
use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};

use gridstream_format::DateSystem;
use gridstream_model::CellRef;
use quick_xml::Reader;
use thiserror::Error;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::dimension::probe_extent;
use crate::merge_cells::{scan_sheet_prelude, MergeMap};
use crate::streaming::RowStreamSpec;
use crate::styles::StyleTable;
use crate::workbook::{WorkbookIndex, WORKBOOK_PART, WORKBOOK_RELS_PART};

pub use crate::openxml::{RELATIONSHIP_NAMESPACES, SPREADSHEET_NAMESPACES};
pub use crate::shared_strings::SharedStringStore;
pub use crate::streaming::Rows;
pub use crate::workbook::{SheetDescriptor, SheetState};

pub use gridstream_format::{CivilDateTime, ExcelDuration};
pub use gridstream_model::{CellValue, Range, Row};

/// Rows streamed out of an open workbook.
pub type SheetRows<'a> = Rows<'a, BufReader<ZipFile<'a>>>;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("relationships xml error: {0}")]
    Rels(#[from] roxmltree::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed part: {0}")]
    Malformed(&'static str),
    #[error("missing required part: {0}")]
    MissingPart(String),
    #[error("unsupported workbook namespace: {0}")]
    UnsupportedNamespace(String),
    #[error("worksheet not found: {0}")]
    UnknownSheet(String),
    #[error("invalid cell reference: {0}")]
    InvalidCellRef(String),
    #[error("invalid worksheet dimension: {0}")]
    InvalidDimension(String),
}

/// Read-time configuration.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Propagate merged-range anchor values to every covered cell.
    pub fill_merged_cells: bool,
    /// Suppress the all-null records that fill row-index gaps.
    pub ignore_empty_rows: bool,
    /// Allow the shared-string table to spill to a temporary file.
    pub enable_shared_string_cache: bool,
    /// Part-size threshold (bytes) at which the spill kicks in.
    pub shared_string_cache_size: u64,
    /// Recognize `@@@fileid@@@,<part>` string payloads and load the named
    /// part's bytes as the cell value.
    pub enable_convert_byte_array: bool,
    /// Strip surrounding whitespace from header-derived column labels.
    pub trim_column_names: bool,
    /// Logical sheet aliases resolved when no sheet of that exact name exists.
    pub dynamic_sheets: HashMap<String, String>,
    /// Force the 1904 date epoch even if the workbook does not declare it.
    pub date1904: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fill_merged_cells: false,
            ignore_empty_rows: false,
            enable_shared_string_cache: true,
            shared_string_cache_size: 5 * 1024 * 1024,
            enable_convert_byte_array: false,
            trim_column_names: true,
            dynamic_sheets: HashMap::new(),
            date1904: false,
        }
    }
}

/// Per-sheet extent, as reported by [`XlsxReader::dimensions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetDimensions {
    pub sheet: String,
    /// Number of rows, 0 for an empty sheet.
    pub rows: u32,
    /// Number of columns, 0 for an empty sheet.
    pub columns: u32,
    pub start_cell: String,
    pub end_cell: String,
}

/// Parsed styles, deferred until the first styled cell needs them.
struct LazyStyles {
    raw: Option<Vec<u8>>,
    table: OnceCell<StyleTable>,
}

impl LazyStyles {
    fn new(raw: Option<Vec<u8>>) -> Self {
        Self {
            raw,
            table: OnceCell::new(),
        }
    }

    fn table(&self) -> &StyleTable {
        self.table.get_or_init(|| {
            // An absent or unparseable styles part degrades to "no styled
            // rewrapping", it does not fail the query.
            self.raw
                .as_deref()
                .and_then(|bytes| StyleTable::parse(bytes).ok())
                .unwrap_or_default()
        })
    }
}

/// An open workbook bound to a seekable byte source.
///
/// The shared-string table and style table are built once per document and
/// are read-only afterwards; every query walks its worksheet part with fresh
/// streams.
pub struct XlsxReader<RS: Read + Seek> {
    archive: ZipArchive<RS>,
    options: ReadOptions,
    index: WorkbookIndex,
    shared: SharedStringStore,
    styles: LazyStyles,
    date1904: bool,
}

impl<RS: Read + Seek> XlsxReader<RS> {
    pub fn open(reader: RS) -> Result<Self, ReadError> {
        Self::open_with_options(reader, ReadOptions::default())
    }

    pub fn open_with_options(reader: RS, options: ReadOptions) -> Result<Self, ReadError> {
        let mut archive = ZipArchive::new(reader)?;

        let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?
            .ok_or_else(|| ReadError::MissingPart(WORKBOOK_PART.to_string()))?;
        let rels_xml = read_part(&mut archive, WORKBOOK_RELS_PART)?;
        let index = WorkbookIndex::parse(&workbook_xml, rels_xml.as_deref())?;

        let shared = match archive.by_name(&index.shared_strings_part) {
            Ok(file) => {
                let part_size = file.size();
                let spill_threshold = options
                    .enable_shared_string_cache
                    .then_some(options.shared_string_cache_size);
                SharedStringStore::read_from(BufReader::new(file), part_size, spill_threshold)?
            }
            Err(ZipError::FileNotFound) => SharedStringStore::empty(),
            Err(err) => return Err(err.into()),
        };

        let styles_raw = read_part(&mut archive, &index.styles_part)?;
        let date1904 = index.date1904 || options.date1904;

        Ok(Self {
            archive,
            options,
            index,
            shared,
            styles: LazyStyles::new(styles_raw),
            date1904,
        })
    }

    /// Worksheet names in document order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.index.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Worksheet descriptors in document order.
    pub fn sheets(&self) -> &[SheetDescriptor] {
        &self.index.sheets
    }

    /// The workbook's shared-string table.
    pub fn shared_strings(&self) -> &SharedStringStore {
        &self.shared
    }

    /// True when serial dates use the 1904 epoch.
    pub fn date1904(&self) -> bool {
        self.date1904
    }

    /// Stream rows from `start_cell` to the end of the sheet.
    ///
    /// `sheet_name: None` targets the active sheet. With `use_header_row` the
    /// first streamed row supplies column labels and is not yielded.
    pub fn query(
        &mut self,
        use_header_row: bool,
        sheet_name: Option<&str>,
        start_cell: &str,
    ) -> Result<SheetRows<'_>, ReadError> {
        self.query_inner(use_header_row, sheet_name, start_cell, None)
    }

    /// Stream rows restricted to the `start_cell..=end_cell` rectangle.
    /// An empty `end_cell` disables the bound.
    pub fn query_range(
        &mut self,
        use_header_row: bool,
        sheet_name: Option<&str>,
        start_cell: &str,
        end_cell: &str,
    ) -> Result<SheetRows<'_>, ReadError> {
        let end = match end_cell.trim() {
            "" => None,
            trimmed => Some(
                CellRef::from_a1(trimmed)
                    .map_err(|_| ReadError::InvalidCellRef(trimmed.to_string()))?,
            ),
        };
        self.query_inner(use_header_row, sheet_name, start_cell, end)
    }

    /// Probe every sheet's extent without streaming rows.
    pub fn dimensions(&mut self) -> Result<Vec<SheetDimensions>, ReadError> {
        let sheets: Vec<(String, String)> = self
            .index
            .sheets
            .iter()
            .map(|s| (s.name.clone(), s.part.clone()))
            .collect();

        let mut out = Vec::with_capacity(sheets.len());
        for (name, part) in sheets {
            let extent = {
                let file = self.archive.by_name(&part)?;
                let mut reader = xml_reader(file);
                probe_extent(&mut reader)?
            };
            out.push(match extent {
                Some(extent) => SheetDimensions {
                    sheet: name,
                    rows: extent.max_row + 1,
                    columns: extent.max_col + 1,
                    start_cell: "A1".to_string(),
                    end_cell: CellRef::new(extent.max_row, extent.max_col).to_a1(),
                },
                None => SheetDimensions {
                    sheet: name,
                    rows: 0,
                    columns: 0,
                    start_cell: "A1".to_string(),
                    end_cell: "A1".to_string(),
                },
            });
        }
        Ok(out)
    }

    fn query_inner(
        &mut self,
        use_header_row: bool,
        sheet_name: Option<&str>,
        start_cell: &str,
        end: Option<CellRef>,
    ) -> Result<SheetRows<'_>, ReadError> {
        let start = CellRef::from_a1(start_cell)
            .map_err(|_| ReadError::InvalidCellRef(start_cell.to_string()))?;
        let sheet_part = self
            .index
            .resolve(sheet_name, &self.options.dynamic_sheets)?
            .part
            .clone();

        // Pass 1: extent.
        let extent = {
            let file = self.archive.by_name(&sheet_part)?;
            let mut reader = xml_reader(file);
            probe_extent(&mut reader)?
        };

        // Pass 2: merged ranges and byte-blob targets, only when configured.
        let want_merges = self.options.fill_merged_cells;
        let want_blobs = self.options.enable_convert_byte_array;
        let (merges, blob_parts) = if extent.is_some() && (want_merges || want_blobs) {
            let file = self.archive.by_name(&sheet_part)?;
            let mut reader = xml_reader(file);
            let prelude = scan_sheet_prelude(&mut reader, &self.shared, want_merges, want_blobs)?;
            (prelude.merges, prelude.blob_parts)
        } else {
            (MergeMap::default(), Vec::new())
        };

        let mut blobs = HashMap::new();
        for part in blob_parts {
            let entry = part.trim_start_matches('/').to_string();
            if let Some(bytes) = read_part(&mut self.archive, &entry)? {
                blobs.insert(part, bytes);
            }
        }

        let spec = RowStreamSpec {
            start,
            end,
            max_col: extent
                .map(|e| e.max_col)
                .unwrap_or(0)
                .min(end.map_or(u32::MAX, |e| e.col)),
            date_system: if self.date1904 {
                DateSystem::V1904
            } else {
                DateSystem::V1900
            },
            use_header_row,
            fill_merged_cells: self.options.fill_merged_cells,
            ignore_empty_rows: self.options.ignore_empty_rows,
            convert_byte_array: self.options.enable_convert_byte_array,
            trim_column_names: self.options.trim_column_names,
        };

        // Final pass: the row stream itself. Field-split so the iterator can
        // hold the archive's entry stream alongside the shared tables.
        let Self {
            archive,
            shared,
            styles,
            ..
        } = self;
        let table = styles.table();
        let file = archive.by_name(&sheet_part)?;
        let reader = xml_reader(file);

        Ok(Rows::new(
            reader,
            shared,
            table,
            merges,
            blobs,
            spec,
            extent.is_some(),
        ))
    }
}

fn xml_reader<R: Read>(input: R) -> Reader<BufReader<R>> {
    let mut reader = Reader::from_reader(BufReader::new(input));
    reader.config_mut().trim_text(false);
    reader
}

/// Inflate a whole part, or `None` when the archive has no such entry.
fn read_part<RS: Read + Seek>(
    archive: &mut ZipArchive<RS>,
    name: &str,
) -> Result<Option<Vec<u8>>, ReadError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            if file.is_dir() {
                return Ok(None);
            }
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            Ok(Some(bytes))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
