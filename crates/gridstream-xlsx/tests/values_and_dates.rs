use std::io::{Cursor, Write};

use gridstream_xlsx::{CellValue, CivilDateTime, ReadOptions, Row, XlsxReader};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const WORKBOOK_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy-mm-dd hh:mm"/></numFmts>
  <cellXfs count="3">
    <xf numFmtId="0"/>
    <xf numFmtId="164"/>
    <xf numFmtId="46"/>
  </cellXfs>
</styleSheet>"#;

fn workbook_xml(date1904: bool) -> String {
    let pr = if date1904 {
        r#"<workbookPr date1904="1"/>"#
    } else {
        ""
    };
    format!(
        r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  {pr}
  <sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#
    )
}

fn xlsx_bytes(sheet: &str, date1904: bool, extra_parts: &[(&str, &[u8])]) -> Vec<u8> {
    let workbook = workbook_xml(date1904);
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    for (name, content) in [
        ("xl/workbook.xml", workbook.as_str()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", sheet),
        ("xl/styles.xml", STYLES),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    for (name, bytes) in extra_parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn first_row(sheet: &str, date1904: bool, options: ReadOptions) -> Row {
    let bytes = xlsx_bytes(sheet, date1904, &[]);
    let mut workbook = XlsxReader::open_with_options(Cursor::new(bytes), options).unwrap();
    let row = workbook
        .query(false, None, "A1")
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    row
}

#[test]
fn styled_serials_become_dates_and_durations() {
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" s="1"><v>45000.5</v></c>
      <c r="B1" s="2"><v>1.5</v></c>
      <c r="C1" s="0"><v>45000.5</v></c>
      <c r="D1" s="1" t="s"/>
    </row>
  </sheetData>
</worksheet>"#;

    let row = first_row(sheet, false, ReadOptions::default());

    assert_eq!(
        row.get("A"),
        Some(&CellValue::DateTime(
            CivilDateTime::new(2023, 3, 15).with_time(12, 0, 0, 0)
        ))
    );
    match row.get("B") {
        Some(CellValue::Duration(d)) => {
            assert_eq!((d.days(), d.hours(), d.minutes()), (1, 12, 0));
        }
        other => panic!("expected a duration, got {other:?}"),
    }
    // No date style: the serial stays numeric.
    assert_eq!(row.get("C"), Some(&CellValue::Number(45000.5)));
    // Styled but value-less cell stays null.
    assert_eq!(row.get("D"), Some(&CellValue::Null));
}

#[test]
fn the_1900_leap_bug_window_is_preserved() {
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" s="1"><v>60</v></c>
      <c r="B1" s="1"><v>61</v></c>
    </row>
  </sheetData>
</worksheet>"#;

    let row = first_row(sheet, false, ReadOptions::default());
    match row.get("A") {
        Some(CellValue::DateTime(dt)) => {
            assert_eq!((dt.year, dt.month, dt.day), (1900, 2, 29));
        }
        other => panic!("expected the fictitious leap day, got {other:?}"),
    }
    match row.get("B") {
        Some(CellValue::DateTime(dt)) => {
            assert_eq!((dt.year, dt.month, dt.day), (1900, 3, 1));
        }
        other => panic!("expected 1900-03-01, got {other:?}"),
    }
}

#[test]
fn the_1904_epoch_starts_at_january_1904() {
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1"><c r="A1" s="1"><v>0</v></c></row>
  </sheetData>
</worksheet>"#;

    let row = first_row(sheet, true, ReadOptions::default());
    match row.get("A") {
        Some(CellValue::DateTime(dt)) => {
            assert_eq!((dt.year, dt.month, dt.day), (1904, 1, 1));
        }
        other => panic!("expected 1904-01-01, got {other:?}"),
    }
}

#[test]
fn typed_payloads_resolve_and_failures_stay_raw() {
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="b"><v>1</v></c>
      <c r="B1" t="b"><v>0</v></c>
      <c r="C1" t="e"><v>#DIV/0!</v></c>
      <c r="D1" t="d"><v>2024-03-09</v></c>
      <c r="E1" t="d"><v>09/03/2024</v></c>
      <c r="F1"><v>not-a-number</v></c>
      <c r="G1" t="str"><v>kept</v></c>
    </row>
  </sheetData>
</worksheet>"#;

    let row = first_row(sheet, false, ReadOptions::default());

    assert_eq!(row.get("A"), Some(&CellValue::Bool(true)));
    assert_eq!(row.get("B"), Some(&CellValue::Bool(false)));
    assert_eq!(row.get("C"), Some(&CellValue::Raw("#DIV/0!".into())));
    assert_eq!(
        row.get("D"),
        Some(&CellValue::DateTime(CivilDateTime::new(2024, 3, 9)))
    );
    assert_eq!(row.get("E"), Some(&CellValue::Raw("09/03/2024".into())));
    assert_eq!(row.get("F"), Some(&CellValue::Raw("not-a-number".into())));
    assert_eq!(row.get("G"), Some(&CellValue::Text("kept".into())));
}

#[test]
fn byte_blob_sentinels_load_the_named_part() {
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="str"><v>@@@fileid@@@,xl/media/payload.bin</v></c>
      <c r="B1" t="str"><v>@@@fileid@@@,xl/media/missing.bin</v></c>
    </row>
  </sheetData>
</worksheet>"#;
    let payload: &[u8] = &[0xDE, 0xAD, 0xBE, 0xEF];
    let bytes = xlsx_bytes(sheet, false, &[("xl/media/payload.bin", payload)]);

    let mut options = ReadOptions::default();
    options.enable_convert_byte_array = true;
    let mut workbook = XlsxReader::open_with_options(Cursor::new(bytes.clone()), options).unwrap();
    let row = workbook
        .query(false, None, "A1")
        .unwrap()
        .next()
        .unwrap()
        .unwrap();

    assert_eq!(row.get("A"), Some(&CellValue::Bytes(payload.to_vec())));
    // A sentinel naming an absent part keeps its text form.
    assert_eq!(
        row.get("B"),
        Some(&CellValue::Text("@@@fileid@@@,xl/media/missing.bin".into()))
    );

    // Without the option the sentinel is just a string.
    let mut workbook = XlsxReader::open(Cursor::new(bytes)).unwrap();
    let row = workbook
        .query(false, None, "A1")
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(
        row.get("A"),
        Some(&CellValue::Text("@@@fileid@@@,xl/media/payload.bin".into()))
    );
}
