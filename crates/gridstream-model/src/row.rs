use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::CellValue;

/// One worksheet row as an ordered `label -> value` record.
///
/// Labels are either alphabetic column letters or header-derived names, and
/// densely cover the queried column span; absent cells hold
/// [`CellValue::Null`]. Insertion order is the column order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    index: u32,
    cells: IndexMap<String, CellValue>,
}

impl Row {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            cells: IndexMap::new(),
        }
    }

    /// 0-indexed sheet row this record came from.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn insert(&mut self, label: impl Into<String>, value: CellValue) {
        self.cells.insert(label.into(), value);
    }

    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.cells.get(label)
    }

    /// Number of columns in the record.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every cell is null.
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_null)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for Row {
    type Item = (String, CellValue);
    type IntoIter = indexmap::map::IntoIter<String, CellValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}
