//! Excel-compatible number-format classification and serial-date arithmetic.
//!
//! This crate provides the two pieces of Excel's "display" layer that a
//! *reader* needs in order to type cells correctly:
//!
//! - A parser for OOXML number format codes (`#,##0.00`, `m/d/yyyy`,
//!   `[h]:mm:ss`, multi-section codes like `positive;negative;zero;text`) that
//!   classifies each `;`-delimited section as General, Date, Duration or Text.
//!   Rendering is out of scope; classification decides whether a numeric cell
//!   payload is a calendar instant, an elapsed time, or a plain number.
//! - Conversion between OLE automation serials (fractional days since an
//!   epoch) and civil date-time tuples, for both the 1900 date system (with
//!   the Lotus 1-2-3 leap-year bug) and the 1904 date system.

mod builtin;
mod cursor;
mod datetime;
mod parse;

pub use crate::builtin::builtin_format_code;
pub use crate::datetime::{
    datetime_to_serial, serial_to_datetime, serial_to_duration, CivilDateTime, DateSystem,
    ExcelDuration,
};
pub use crate::parse::{FormatCode, FormatError, Section, SectionKind, Token};
