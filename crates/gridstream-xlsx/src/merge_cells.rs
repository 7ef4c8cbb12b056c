use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use gridstream_model::{CellRef, CellValue, Range};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::shared_strings::SharedStringStore;
use crate::streaming::BYTE_BLOB_SENTINEL;
use crate::ReadError;

/// Merged-range bookkeeping for value propagation.
///
/// The anchor (top-left) cell of a merged rectangle is the only one that
/// stores a value; every other cell of the rectangle is a slave pointing back
/// at it. Anchors precede their slaves in document order, so an anchor's
/// value is always known by the time a slave is read.
#[derive(Debug, Default)]
pub(crate) struct MergeMap {
    anchors: HashMap<CellRef, CellValue>,
    slaves: HashMap<CellRef, CellRef>,
}

impl MergeMap {
    pub(crate) fn insert_range(&mut self, range: Range) {
        let anchor = range.start;
        self.anchors.entry(anchor).or_insert(CellValue::Null);
        for cell in range.cells() {
            if cell != anchor {
                self.slaves.insert(cell, anchor);
            }
        }
    }

    /// Feed one streamed cell through the map.
    ///
    /// An anchor has its value captured and keeps it; a slave gets the
    /// anchor's captured value back as a substitute (possibly null).
    pub(crate) fn observe(&mut self, at: CellRef, value: &CellValue) -> Option<CellValue> {
        if let Some(stored) = self.anchors.get_mut(&at) {
            *stored = value.clone();
            return None;
        }
        self.slaves
            .get(&at)
            .map(|anchor| self.anchors.get(anchor).cloned().unwrap_or(CellValue::Null))
    }

    /// The anchor value owed to a slave coordinate, for cells the sheet XML
    /// omitted entirely.
    pub(crate) fn anchor_value(&self, at: CellRef) -> Option<CellValue> {
        self.slaves
            .get(&at)
            .map(|anchor| self.anchors.get(anchor).cloned().unwrap_or(CellValue::Null))
    }
}

pub(crate) struct SheetPrelude {
    pub merges: MergeMap,
    pub blob_parts: Vec<String>,
}

/// Pre-pass over a worksheet stream: collect `<mergeCell>` rectangles and the
/// package parts referenced by byte-blob sentinel strings, so the row pass
/// can run over a single forward-only stream.
pub(crate) fn scan_sheet_prelude<R: BufRead>(
    reader: &mut Reader<R>,
    shared: &SharedStringStore,
    want_merges: bool,
    want_blobs: bool,
) -> Result<SheetPrelude, ReadError> {
    let mut merges = MergeMap::default();
    let mut blob_parts: Vec<String> = Vec::new();
    let mut seen_parts: HashSet<String> = HashSet::new();

    let mut buf = Vec::new();
    let mut cell_type: Option<String> = None;
    let mut cell_text = String::new();
    let mut in_cell = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if want_merges && local_name(e.name().as_ref()) == b"mergeCell" =>
            {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"ref" {
                        // Malformed rectangles are skipped, not fatal.
                        if let Ok(range) = Range::from_a1(&attr.unescape_value()?) {
                            merges.insert_range(range);
                        }
                    }
                }
            }

            Event::Start(e) if want_blobs && local_name(e.name().as_ref()) == b"c" => {
                in_cell = true;
                cell_type = None;
                cell_text.clear();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"t" {
                        cell_type = Some(attr.unescape_value()?.into_owned());
                    }
                }
            }
            Event::Text(e) if in_cell => {
                cell_text.push_str(&e.unescape()?);
            }
            Event::End(e) if in_cell && local_name(e.name().as_ref()) == b"c" => {
                in_cell = false;
                let candidate = match cell_type.as_deref() {
                    Some("s") => cell_text
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|idx| shared.get(idx)),
                    Some("str") | Some("inlineStr") => Some(cell_text.clone()),
                    _ => None,
                };
                if let Some(text) = candidate {
                    if let Some(part) = text.strip_prefix(BYTE_BLOB_SENTINEL) {
                        if seen_parts.insert(part.to_string()) {
                            blob_parts.push(part.to_string());
                        }
                    }
                }
            }

            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(SheetPrelude { merges, blob_parts })
}
