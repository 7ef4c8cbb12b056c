use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::{is_relationship_type, is_spreadsheet_namespace, local_name, parse_xml_bool};
use crate::path::resolve_target;
use crate::relationships::parse_relationships;
use crate::ReadError;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// Worksheet visibility, from `sheet/@state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

/// One worksheet entry of the workbook descriptor, with its payload part
/// resolved through the relationships file.
#[derive(Debug, Clone)]
pub struct SheetDescriptor {
    pub name: String,
    pub sheet_id: u32,
    pub relationship_id: String,
    pub state: SheetState,
    /// ZIP entry name of the worksheet XML (e.g. `xl/worksheets/sheet1.xml`).
    pub part: String,
    /// True for the workbook's active tab.
    pub active: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct WorkbookIndex {
    pub sheets: Vec<SheetDescriptor>,
    pub active_tab: usize,
    pub date1904: bool,
    pub shared_strings_part: String,
    pub styles_part: String,
}

struct RawSheet {
    name: String,
    sheet_id: u32,
    relationship_id: Option<String>,
    state: SheetState,
}

impl WorkbookIndex {
    /// Parse `xl/workbook.xml` plus its relationships part.
    ///
    /// The relationships part may be absent for single-sheet workbooks, in
    /// which case the conventional worksheet path is assumed.
    pub(crate) fn parse(
        workbook_xml: &[u8],
        rels_xml: Option<&[u8]>,
    ) -> Result<Self, ReadError> {
        let (raw_sheets, active_tab, date1904) = parse_workbook_part(workbook_xml)?;

        let rels = rels_xml.map(parse_relationships).transpose()?;

        let mut shared_strings_part = "xl/sharedStrings.xml".to_string();
        let mut styles_part = "xl/styles.xml".to_string();
        let mut targets_by_id: HashMap<&str, &str> = HashMap::new();
        if let Some(rels) = &rels {
            for rel in rels {
                if is_relationship_type(&rel.rel_type, "sharedStrings") {
                    shared_strings_part = resolve_target(WORKBOOK_PART, &rel.target);
                } else if is_relationship_type(&rel.rel_type, "styles") {
                    styles_part = resolve_target(WORKBOOK_PART, &rel.target);
                }
                targets_by_id.insert(&rel.id, &rel.target);
            }
        }

        let single_sheet = raw_sheets.len() == 1;
        let mut sheets = Vec::with_capacity(raw_sheets.len());
        for raw in raw_sheets {
            let part = match raw
                .relationship_id
                .as_deref()
                .and_then(|id| targets_by_id.get(id))
            {
                Some(target) => resolve_target(WORKBOOK_PART, target),
                None if single_sheet => "xl/worksheets/sheet1.xml".to_string(),
                None => {
                    return Err(ReadError::MissingPart(format!(
                        "{WORKBOOK_RELS_PART} (needed to resolve sheet {:?})",
                        raw.name
                    )))
                }
            };
            sheets.push(SheetDescriptor {
                name: raw.name,
                sheet_id: raw.sheet_id,
                relationship_id: raw.relationship_id.unwrap_or_default(),
                state: raw.state,
                part,
                active: false,
            });
        }

        let active_tab = active_tab.min(sheets.len().saturating_sub(1));
        if let Some(sheet) = sheets.get_mut(active_tab) {
            sheet.active = true;
        }

        Ok(Self {
            sheets,
            active_tab,
            date1904,
            shared_strings_part,
            styles_part,
        })
    }

    /// Find a sheet by exact name, through the alias table, or fall back to
    /// the active tab when no name was given.
    pub(crate) fn resolve(
        &self,
        name: Option<&str>,
        aliases: &HashMap<String, String>,
    ) -> Result<&SheetDescriptor, ReadError> {
        let Some(name) = name else {
            return self
                .sheets
                .get(self.active_tab)
                .ok_or_else(|| ReadError::UnknownSheet("<active>".to_string()));
        };

        if let Some(sheet) = self.sheets.iter().find(|s| s.name == name) {
            return Ok(sheet);
        }
        if let Some(real) = aliases.get(name) {
            if let Some(sheet) = self.sheets.iter().find(|s| s.name == *real) {
                return Ok(sheet);
            }
        }
        Err(ReadError::UnknownSheet(name.to_string()))
    }
}

fn parse_workbook_part(xml: &[u8]) -> Result<(Vec<RawSheet>, usize, bool), ReadError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut sheets = Vec::new();
    let mut active_tab = 0usize;
    let mut date1904 = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"workbook" => {
                for attr in e.attributes().with_checks(false) {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    if attr.key.as_ref() == b"xmlns" {
                        let ns = attr.unescape_value()?;
                        if !is_spreadsheet_namespace(&ns) {
                            return Err(ReadError::UnsupportedNamespace(ns.into_owned()));
                        }
                    }
                }
            }
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"workbookPr" =>
            {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"date1904" {
                        date1904 = parse_xml_bool(&attr.unescape_value()?);
                    }
                }
            }
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"workbookView" =>
            {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"activeTab" {
                        active_tab = attr.unescape_value()?.parse().unwrap_or(0);
                    }
                }
            }
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"sheet" => {
                let mut name = None;
                let mut sheet_id = 0u32;
                let mut relationship_id = None;
                let mut state = SheetState::Visible;
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = attr.key.as_ref();
                    match key {
                        b"name" => name = Some(attr.unescape_value()?.into_owned()),
                        b"sheetId" => {
                            sheet_id = attr.unescape_value()?.parse().unwrap_or(0);
                        }
                        b"state" => {
                            state = match attr.unescape_value()?.as_ref() {
                                "hidden" => SheetState::Hidden,
                                "veryHidden" => SheetState::VeryHidden,
                                _ => SheetState::Visible,
                            };
                        }
                        _ if local_name(key) == b"id" => {
                            relationship_id = Some(attr.unescape_value()?.into_owned());
                        }
                        _ => {}
                    }
                }
                sheets.push(RawSheet {
                    name: name.unwrap_or_else(|| format!("Sheet{}", sheets.len() + 1)),
                    sheet_id,
                    relationship_id,
                    state,
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, active_tab, date1904))
}
