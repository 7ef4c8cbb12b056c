use gridstream_format::{CivilDateTime, ExcelDuration};
use serde::{Deserialize, Serialize};

/// A typed cell value.
///
/// The enum uses an explicit `{type, value}` tagged layout so records
/// serialize stably.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// An empty or omitted cell.
    #[default]
    Null,
    Bool(bool),
    /// IEEE-754 double, the native numeric payload of SpreadsheetML.
    Number(f64),
    Text(String),
    /// A calendar instant produced by a date-classified number format or a
    /// `t="d"` literal.
    DateTime(CivilDateTime),
    /// An elapsed time produced by a duration-classified number format.
    Duration(ExcelDuration),
    /// Binary payload loaded from a sibling package part.
    Bytes(Vec<u8>),
    /// The original text of a payload that failed its declared type (kept
    /// verbatim; such failures never abort a read).
    Raw(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_layout_is_tagged() {
        let v = CellValue::Number(2.5);
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"{"type":"number","value":2.5}"#
        );
        let back: CellValue = serde_json::from_str(r#"{"type":"text","value":"hi"}"#).unwrap();
        assert_eq!(back, CellValue::Text("hi".to_string()));
    }
}
