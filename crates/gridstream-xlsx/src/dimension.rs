use std::io::BufRead;

use gridstream_model::{CellRef, Range};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::ReadError;

/// The rectangular extent of a worksheet, 0-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SheetExtent {
    pub max_row: u32,
    pub max_col: u32,
}

/// Derive a sheet's extent.
///
/// A `<dimension ref>` element settles it immediately. Otherwise the stream
/// is walked once: cells carrying `r="A1"` references contribute their
/// coordinates, reference-less cells contribute their ordinal within the row
/// and the running row count. `None` means the sheet has no cells at all.
pub(crate) fn probe_extent<R: BufRead>(
    reader: &mut Reader<R>,
) -> Result<Option<SheetExtent>, ReadError> {
    let mut buf = Vec::new();

    let mut max_row: Option<u32> = None;
    let mut max_col: Option<u32> = None;
    let mut row_cursor: i64 = -1;
    let mut cells_in_row = 0u32;
    let mut any_cell = false;

    fn bump(slot: &mut Option<u32>, value: u32) {
        *slot = Some(slot.map_or(value, |current| current.max(value)));
    }

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"dimension" =>
            {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"ref" {
                        let raw = attr.unescape_value()?;
                        let range = Range::from_a1(&raw)
                            .map_err(|_| ReadError::InvalidDimension(raw.clone().into_owned()))?;
                        return Ok(Some(SheetExtent {
                            max_row: range.end.row,
                            max_col: range.end.col,
                        }));
                    }
                }
            }

            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                if cells_in_row > 0 {
                    bump(&mut max_col, cells_in_row - 1);
                    cells_in_row = 0;
                }
                let mut explicit = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"r" {
                        explicit = attr.unescape_value()?.parse::<u32>().ok();
                    }
                }
                row_cursor = match explicit {
                    Some(r_1) if r_1 > 0 => i64::from(r_1) - 1,
                    _ => row_cursor + 1,
                };
                bump(&mut max_row, row_cursor as u32);
            }

            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                any_cell = true;
                let mut reference = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"r" {
                        reference = CellRef::from_a1(&attr.unescape_value()?).ok();
                    }
                }
                match reference {
                    Some(cell) => {
                        bump(&mut max_row, cell.row);
                        bump(&mut max_col, cell.col);
                    }
                    None => cells_in_row += 1,
                }
            }

            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if cells_in_row > 0 {
        bump(&mut max_col, cells_in_row - 1);
    }

    if !any_cell {
        return Ok(None);
    }
    Ok(Some(SheetExtent {
        max_row: max_row.unwrap_or(0),
        max_col: max_col.unwrap_or(0),
    }))
}
