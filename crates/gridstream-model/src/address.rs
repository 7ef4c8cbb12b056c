use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A reference to a single cell within a worksheet.
///
/// Rows and columns are **0-indexed** internally: `row = 0` is Excel row `1`,
/// `col = 0` is Excel column `A`. The A1 form uses 1-based rows and base-26
/// column letters (`A=1 … Z=26, AA=27`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    /// 0-indexed row.
    pub row: u32,
    /// 0-indexed column.
    pub col: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum A1ParseError {
    #[error("empty cell reference")]
    Empty,
    #[error("cell reference has no column letters")]
    MissingColumn,
    #[error("cell reference has no row number")]
    MissingRow,
    #[error("column is out of bounds")]
    InvalidColumn,
    #[error("row is out of bounds")]
    InvalidRow,
    #[error("trailing characters after cell reference")]
    TrailingCharacters,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Format in A1 notation (`A1`, `BC32`).
    pub fn to_a1(self) -> String {
        format!("{}{}", column_label(self.col), self.row + 1)
    }

    /// Parse an A1-style reference. Absolute markers (`$B$2`) and lowercase
    /// column letters are accepted.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let mut chars = s.char_indices().peekable();
        if let Some((_, '$')) = chars.peek() {
            chars.next();
        }

        let mut letters = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_ascii_alphabetic() {
                letters.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if letters.is_empty() {
            return Err(A1ParseError::MissingColumn);
        }

        if let Some(&(_, '$')) = chars.peek() {
            chars.next();
        }

        let mut digits = String::new();
        for (_, c) in chars {
            if c.is_ascii_digit() {
                digits.push(c);
            } else {
                return Err(A1ParseError::TrailingCharacters);
            }
        }
        if digits.is_empty() {
            return Err(A1ParseError::MissingRow);
        }

        let col = column_index(&letters)?;
        let row_1: u32 = digits.parse().map_err(|_| A1ParseError::InvalidRow)?;
        if row_1 == 0 || row_1 > crate::EXCEL_MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self {
            row: row_1 - 1,
            col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Format a 0-indexed column as base-26 letters.
pub fn column_label(col: u32) -> String {
    let mut n = col + 1;
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).expect("column letters are ASCII")
}

/// Parse base-26 column letters into a 0-indexed column.
pub fn column_index(letters: &str) -> Result<u32, A1ParseError> {
    if letters.is_empty() {
        return Err(A1ParseError::MissingColumn);
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        let v = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    if col > crate::EXCEL_MAX_COLS {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col - 1)
}

/// A rectangular, inclusive region of a worksheet, normalized so that
/// `start <= end` on both axes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

#[derive(Debug, Error)]
pub enum RangeParseError {
    #[error("empty range reference")]
    Empty,
    #[error("invalid cell reference in range: {0}")]
    Cell(#[from] A1ParseError),
}

impl Range {
    pub const fn new(a: CellRef, b: CellRef) -> Self {
        let (start_row, end_row) = if a.row <= b.row {
            (a.row, b.row)
        } else {
            (b.row, a.row)
        };
        let (start_col, end_col) = if a.col <= b.col {
            (a.col, b.col)
        } else {
            (b.col, a.col)
        };
        Self {
            start: CellRef::new(start_row, start_col),
            end: CellRef::new(end_row, end_col),
        }
    }

    /// Parse `A1:B2` or a single-cell `C3`.
    pub fn from_a1(a1: &str) -> Result<Self, RangeParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(RangeParseError::Empty);
        }
        match s.split_once(':') {
            None => {
                let cell = CellRef::from_a1(s)?;
                Ok(Range::new(cell, cell))
            }
            Some((a, b)) => Ok(Range::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?)),
        }
    }

    #[inline]
    pub const fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    #[inline]
    pub const fn is_single_cell(&self) -> bool {
        self.start.row == self.end.row && self.start.col == self.end.col
    }

    /// All cells of the rectangle in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        let cols = self.start.col..=self.end.col;
        (self.start.row..=self.end.row)
            .flat_map(move |row| cols.clone().map(move |col| CellRef::new(row, col)))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}
