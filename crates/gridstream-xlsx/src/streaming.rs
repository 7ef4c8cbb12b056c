use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use chrono::{Datelike, Timelike};
use gridstream_format::{serial_to_datetime, serial_to_duration, CivilDateTime, DateSystem, SectionKind};
use gridstream_model::{column_label, CellRef, CellValue, Row};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::merge_cells::MergeMap;
use crate::openxml::{decode_char_escapes, local_name};
use crate::shared_strings::SharedStringStore;
use crate::styles::StyleTable;
use crate::ReadError;

/// Marker prefix for cells whose string payload names a package part holding
/// the real (binary) value.
pub(crate) const BYTE_BLOB_SENTINEL: &str = "@@@fileid@@@,";

/// Everything the row stream needs to know up front.
#[derive(Debug, Clone)]
pub(crate) struct RowStreamSpec {
    pub start: CellRef,
    /// Inclusive lower-right clip, from a ranged query.
    pub end: Option<CellRef>,
    /// Inclusive 0-based upper column of the emitted span, already clipped.
    pub max_col: u32,
    pub date_system: DateSystem,
    pub use_header_row: bool,
    pub fill_merged_cells: bool,
    pub ignore_empty_rows: bool,
    pub convert_byte_array: bool,
    pub trim_column_names: bool,
}

/// A lazy, forward-only sequence of worksheet rows.
///
/// Rows come out in ascending row-index order; when gap suppression is off,
/// indices are consecutive and missing rows materialize as all-null records.
/// Dropping the iterator releases the XML cursor and the part stream.
pub struct Rows<'a, R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    shared: &'a SharedStringStore,
    styles: &'a StyleTable,
    merges: MergeMap,
    blobs: HashMap<String, Vec<u8>>,
    spec: RowStreamSpec,
    headers: Option<Vec<String>>,
    /// Index the next emitted row must have (gap accounting).
    emit_cursor: u32,
    /// A parsed row waiting while gap rows are emitted ahead of it.
    parked: Option<SparseRow>,
    /// Index of the most recent `<row>` element, for rows without `r`.
    row_cursor: i64,
    in_sheet_data: bool,
    finished: bool,
}

struct SparseRow {
    index: u32,
    cells: Vec<(u32, CellValue)>,
}

struct PendingCell {
    col: u32,
    style: Option<usize>,
    cell_type: Option<String>,
    value_text: Option<String>,
    inline_text: Option<String>,
}

impl<'a, R: BufRead> Rows<'a, R> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        reader: Reader<R>,
        shared: &'a SharedStringStore,
        styles: &'a StyleTable,
        merges: MergeMap,
        blobs: HashMap<String, Vec<u8>>,
        spec: RowStreamSpec,
        has_cells: bool,
    ) -> Self {
        let emit_cursor = spec.start.row;
        Self {
            reader,
            buf: Vec::new(),
            shared,
            styles,
            merges,
            blobs,
            spec,
            headers: None,
            emit_cursor,
            parked: None,
            row_cursor: -1,
            in_sheet_data: false,
            finished: !has_cells,
        }
    }

    /// Header or alphabetic label for an absolute column index.
    fn label_for(&self, col: u32) -> String {
        if let Some(headers) = &self.headers {
            if let Some(label) = headers.get((col - self.spec.start.col) as usize) {
                return label.clone();
            }
        }
        column_label(col)
    }

    /// Build the dense record for `index` from sparse `(col, value)` writes.
    /// Later writes to the same column win. With merge fill on, columns the
    /// XML omitted still receive their anchor's value.
    fn dense_row(&self, index: u32, cells: &[(u32, CellValue)]) -> Row {
        let start_col = self.spec.start.col;
        let max_col = self.spec.max_col;

        let mut row = Row::new(index);
        for col in start_col..=max_col {
            row.insert(self.label_for(col), CellValue::Null);
        }
        for (col, value) in cells {
            if *col >= start_col && *col <= max_col {
                row.insert(self.label_for(*col), value.clone());
            }
        }

        if self.spec.fill_merged_cells {
            for col in start_col..=max_col {
                let label = self.label_for(col);
                let untouched = row.get(&label).is_some_and(CellValue::is_null);
                if untouched {
                    if let Some(value) = self.merges.anchor_value(CellRef::new(index, col)) {
                        if !value.is_null() {
                            row.insert(label, value);
                        }
                    }
                }
            }
        }

        row
    }

    /// Derive header labels from the first non-skipped row.
    fn header_labels(&self, cells: &[(u32, CellValue)]) -> Vec<String> {
        let mut labels = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();

        for col in self.spec.start.col..=self.spec.max_col {
            // Last write to the column wins, as in the data rows.
            let value = cells
                .iter()
                .rev()
                .find(|(c, _)| *c == col)
                .map(|(_, v)| v);
            let mut label = match value {
                Some(CellValue::Text(s)) | Some(CellValue::Raw(s)) => s.clone(),
                Some(CellValue::Number(n)) => number_label(*n),
                Some(CellValue::Bool(b)) => b.to_string(),
                Some(CellValue::DateTime(dt)) => dt.to_string(),
                _ => String::new(),
            };
            if self.spec.trim_column_names {
                label = label.trim().to_string();
            }
            if label.is_empty() {
                label = column_label(col);
            }
            if !taken.insert(label.clone()) {
                label = format!("{label}_{}", column_label(col));
                taken.insert(label.clone());
            }
            labels.push(label);
        }
        labels
    }

    /// Pull the next `<row>` element off the XML cursor as sparse cells.
    /// `Ok(None)` means the sheet data ran out.
    fn next_sparse_row(&mut self) -> Result<Option<SparseRow>, ReadError> {
        let mut row: Option<SparseRow> = None;
        let mut col_cursor: i64 = -1;
        let mut cell: Option<PendingCell> = None;

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    self.in_sheet_data = true;
                }
                Event::End(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    self.in_sheet_data = false;
                    return Ok(row);
                }

                Event::Start(ref e)
                    if self.in_sheet_data && local_name(e.name().as_ref()) == b"row" =>
                {
                    let index = next_row_index(e, self.row_cursor)?;
                    self.row_cursor = i64::from(index);
                    row = Some(SparseRow {
                        index,
                        cells: Vec::new(),
                    });
                    col_cursor = -1;
                }
                Event::Empty(ref e)
                    if self.in_sheet_data && local_name(e.name().as_ref()) == b"row" =>
                {
                    let index = next_row_index(e, self.row_cursor)?;
                    self.row_cursor = i64::from(index);
                    return Ok(Some(SparseRow {
                        index,
                        cells: Vec::new(),
                    }));
                }
                Event::End(ref e)
                    if self.in_sheet_data && local_name(e.name().as_ref()) == b"row" =>
                {
                    if let Some(done) = row.take() {
                        return Ok(Some(done));
                    }
                }

                Event::Start(ref e)
                    if row.is_some() && local_name(e.name().as_ref()) == b"c" =>
                {
                    cell = Some(open_cell(e, &mut col_cursor)?);
                }
                Event::Empty(ref e)
                    if row.is_some() && local_name(e.name().as_ref()) == b"c" =>
                {
                    // Value-less cell: occupies its ordinal, contributes null.
                    open_cell(e, &mut col_cursor)?;
                }
                Event::End(ref e) if cell.is_some() && local_name(e.name().as_ref()) == b"c" => {
                    let pending = cell.take().expect("cell is_some checked");
                    let col = pending.col;
                    let mut value = finish_cell(
                        pending,
                        self.shared,
                        self.styles,
                        &self.blobs,
                        &self.spec,
                    );
                    if self.spec.fill_merged_cells {
                        let current = row.as_ref().expect("cell implies open row");
                        let at = CellRef::new(current.index, col);
                        if let Some(substitute) = self.merges.observe(at, &value) {
                            value = substitute;
                        }
                    }
                    if let Some(current) = row.as_mut() {
                        current.cells.push((col, value));
                    }
                }

                Event::Start(ref e)
                    if cell.is_some() && local_name(e.name().as_ref()) == b"v" =>
                {
                    let text = read_text(&mut self.reader, b"v")?;
                    if let Some(pending) = cell.as_mut() {
                        pending.value_text = Some(text);
                    }
                }
                Event::Start(ref e)
                    if cell.is_some() && local_name(e.name().as_ref()) == b"is" =>
                {
                    let text = read_inline_string(&mut self.reader)?;
                    if let Some(pending) = cell.as_mut() {
                        pending.inline_text = Some(text);
                    }
                }
                Event::Start(ref e) if self.in_sheet_data => {
                    // Formulas, extension lists and anything else inside
                    // sheetData that is not cell payload.
                    self.reader.read_to_end_into(e.name(), &mut Vec::new())?;
                }

                Event::Eof => return Ok(row),
                _ => {}
            }
        }
    }
}

impl<'a, R: BufRead> Iterator for Rows<'a, R> {
    type Item = Result<Row, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(sparse) = self.parked.take() {
                if !self.spec.ignore_empty_rows && self.emit_cursor < sparse.index {
                    let gap = self.dense_row(self.emit_cursor, &[]);
                    self.emit_cursor += 1;
                    self.parked = Some(sparse);
                    return Some(Ok(gap));
                }
                let row = self.dense_row(sparse.index, &sparse.cells);
                self.emit_cursor = sparse.index + 1;
                return Some(Ok(row));
            }

            match self.next_sparse_row() {
                Ok(Some(sparse)) => {
                    if sparse.index < self.spec.start.row {
                        continue;
                    }
                    if let Some(end) = self.spec.end {
                        if sparse.index > end.row {
                            self.finished = true;
                            return None;
                        }
                    }
                    if self.spec.use_header_row && self.headers.is_none() {
                        self.headers = Some(self.header_labels(&sparse.cells));
                        self.emit_cursor = sparse.index + 1;
                        continue;
                    }
                    self.parked = Some(sparse);
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Row index for a `<row>` element: its `r` attribute (1-based) when present,
/// otherwise one past the previous row.
fn next_row_index(e: &BytesStart<'_>, row_cursor: i64) -> Result<u32, ReadError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            let raw = attr.unescape_value()?;
            if let Ok(r_1) = raw.trim().parse::<u32>() {
                if r_1 > 0 {
                    return Ok(r_1 - 1);
                }
            }
        }
    }
    Ok((row_cursor + 1) as u32)
}

/// Read a `<c>` element's attributes into a pending cell, advancing the
/// positional column ordinal.
fn open_cell(e: &BytesStart<'_>, col_cursor: &mut i64) -> Result<PendingCell, ReadError> {
    let mut reference: Option<CellRef> = None;
    let mut style = None;
    let mut cell_type = None;

    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                let a1 = attr.unescape_value()?;
                let parsed = CellRef::from_a1(&a1)
                    .map_err(|_| ReadError::InvalidCellRef(a1.into_owned()))?;
                reference = Some(parsed);
            }
            b"s" => style = attr.unescape_value()?.trim().parse::<usize>().ok(),
            b"t" => cell_type = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    // Column recovery: the reference when present, the element ordinal when
    // the sheet omits references.
    let col = match reference {
        Some(cell) => cell.col,
        None => (*col_cursor + 1) as u32,
    };
    *col_cursor = i64::from(col);

    Ok(PendingCell {
        col,
        style,
        cell_type,
        value_text: None,
        inline_text: None,
    })
}

/// Resolve a completed `<c>` element to its typed value.
///
/// Per-cell failures (bad shared-string index, unparseable payloads) degrade
/// to null or the raw text; they never abort the stream.
fn finish_cell(
    pending: PendingCell,
    shared: &SharedStringStore,
    styles: &StyleTable,
    blobs: &HashMap<String, Vec<u8>>,
    spec: &RowStreamSpec,
) -> CellValue {
    let PendingCell {
        style,
        cell_type,
        value_text,
        inline_text,
        ..
    } = pending;

    let mut value = match cell_type.as_deref() {
        Some("s") => value_text
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .and_then(|idx| shared.get(idx))
            .map(CellValue::Text)
            .unwrap_or(CellValue::Null),
        Some("inlineStr") => inline_text.map(CellValue::Text).unwrap_or(CellValue::Null),
        Some("str") => value_text.map(CellValue::Text).unwrap_or(CellValue::Null),
        Some("b") => value_text
            .map(|raw| CellValue::Bool(raw.trim() == "1"))
            .unwrap_or(CellValue::Null),
        Some("d") => match value_text {
            Some(raw) => match parse_iso_datetime(&raw) {
                Some(dt) => CellValue::DateTime(dt),
                None => CellValue::Raw(raw),
            },
            None => CellValue::Null,
        },
        Some("e") => value_text.map(CellValue::Raw).unwrap_or(CellValue::Null),
        _ => match value_text {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Raw(raw),
            },
            None => inline_text.map(CellValue::Text).unwrap_or(CellValue::Null),
        },
    };

    if let (Some(xf), CellValue::Number(n)) = (style, &value) {
        match styles.kind_for(xf, *n) {
            SectionKind::Date => {
                value = CellValue::DateTime(serial_to_datetime(*n, spec.date_system));
            }
            SectionKind::Duration => {
                value = CellValue::Duration(serial_to_duration(*n));
            }
            SectionKind::General | SectionKind::Text => {}
        }
    }

    if spec.convert_byte_array {
        if let CellValue::Text(text) = &value {
            if let Some(part) = text.strip_prefix(BYTE_BLOB_SENTINEL) {
                if let Some(bytes) = blobs.get(part) {
                    value = CellValue::Bytes(bytes.clone());
                }
            }
        }
    }

    value
}

fn number_label(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// ISO `yyyy-MM-dd`, optionally followed by a `T`/space time. Anything else
/// is a parse failure the caller keeps as raw text.
fn parse_iso_datetime(raw: &str) -> Option<CivilDateTime> {
    let trimmed = raw.trim();
    let (date_part, time_part) = match trimmed.split_once(['T', ' ']) {
        Some((date, time)) => (date, Some(time)),
        None => (trimmed, None),
    };

    let date = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    let mut out = CivilDateTime::new(date.year(), date.month() as u8, date.day() as u8);

    if let Some(time_part) = time_part {
        let time = chrono::NaiveTime::parse_from_str(time_part.trim_end_matches('Z'), "%H:%M:%S%.f")
            .ok()?;
        out = out.with_time(
            time.hour() as u8,
            time.minute() as u8,
            time.second() as u8,
            (time.nanosecond() / 1_000_000) as u16,
        );
    }
    Some(out)
}

fn read_inline_string<R: BufRead>(reader: &mut Reader<R>) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut out = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"t" => {
                out.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"r" => {
                out.push_str(&read_inline_run(reader)?);
            }
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"is" => break,
            Event::Eof => return Err(ReadError::Malformed("unexpected eof in <is>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn read_inline_run<R: BufRead>(reader: &mut Reader<R>) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut out = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"t" => {
                out.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"r" => break,
            Event::Eof => return Err(ReadError::Malformed("unexpected eof in <r>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn read_text<R: BufRead>(reader: &mut Reader<R>, end_local: &[u8]) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&decode_char_escapes(&e.unescape()?)),
            Event::CData(e) => {
                text.push_str(&decode_char_escapes(std::str::from_utf8(e.as_ref())?))
            }
            Event::End(e) if local_name(e.name().as_ref()) == end_local => break,
            Event::Eof => return Err(ReadError::Malformed("unexpected eof in cell text")),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
