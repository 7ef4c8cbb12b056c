use std::io::{Cursor, Write};

use gridstream_xlsx::{CellValue, ReadOptions, XlsxReader};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;

const WORKBOOK_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

// A1:B2 merged; only the anchor carries the value, the covered cells are
// present but empty, as Excel writes them.
const SHEET: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <dimension ref="A1:B2"/>
  <sheetData>
    <row r="1"><c r="A1" t="inlineStr"><is><t>X</t></is></c><c r="B1"/></row>
    <row r="2"><c r="A2"/><c r="B2"/></row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B2"/></mergeCells>
</worksheet>"#;

fn xlsx_bytes(sheet: &str) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in [
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", sheet),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn read_rows(sheet: &str, fill_merged_cells: bool) -> Vec<gridstream_xlsx::Row> {
    let mut options = ReadOptions::default();
    options.fill_merged_cells = fill_merged_cells;
    let mut workbook =
        XlsxReader::open_with_options(Cursor::new(xlsx_bytes(sheet)), options).unwrap();
    workbook
        .query(false, None, "A1")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn anchor_values_propagate_when_fill_is_on() {
    let rows = read_rows(SHEET, true);
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.get("A"), Some(&CellValue::Text("X".into())));
        assert_eq!(row.get("B"), Some(&CellValue::Text("X".into())));
    }
}

#[test]
fn only_the_anchor_observes_the_value_when_fill_is_off() {
    let rows = read_rows(SHEET, false);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("A"), Some(&CellValue::Text("X".into())));
    assert_eq!(rows[0].get("B"), Some(&CellValue::Null));
    assert_eq!(rows[1].get("A"), Some(&CellValue::Null));
    assert_eq!(rows[1].get("B"), Some(&CellValue::Null));
}

#[test]
fn covered_cells_omitted_from_the_xml_still_receive_the_anchor_value() {
    // Same merge, but the sheet omits the covered cells and row 2 entirely
    // except for a bare row element.
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <dimension ref="A1:B2"/>
  <sheetData>
    <row r="1"><c r="A1" t="inlineStr"><is><t>X</t></is></c></row>
    <row r="2"/>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B2"/></mergeCells>
</worksheet>"#;

    let rows = read_rows(sheet, true);
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.get("A"), Some(&CellValue::Text("X".into())));
        assert_eq!(row.get("B"), Some(&CellValue::Text("X".into())));
    }
}

#[test]
fn merges_between_value_cells_do_not_disturb_neighbours() {
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="inlineStr"><is><t>head</t></is></c>
      <c r="B1"/>
      <c r="C1"><v>7</v></c>
    </row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells>
</worksheet>"#;

    let rows = read_rows(sheet, true);
    assert_eq!(rows[0].get("A"), Some(&CellValue::Text("head".into())));
    assert_eq!(rows[0].get("B"), Some(&CellValue::Text("head".into())));
    assert_eq!(rows[0].get("C"), Some(&CellValue::Number(7.0)));
}
