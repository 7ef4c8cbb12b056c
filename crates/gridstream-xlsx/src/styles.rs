use std::collections::HashMap;

use gridstream_format::{builtin_format_code, FormatCode, SectionKind};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::ReadError;

/// Style table mapping a cell's `s` attribute (cellXfs index) to the parsed
/// number format that governs its classification.
///
/// Only formats with a date or duration section are retained; everything else
/// classifies as General and needs no per-cell work. Formats that fail to
/// parse are treated as General too.
#[derive(Debug, Default)]
pub(crate) struct StyleTable {
    xf_formats: Vec<Option<FormatCode>>,
}

impl StyleTable {
    pub(crate) fn parse(xml: &[u8]) -> Result<Self, ReadError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        let mut custom_codes: HashMap<u32, String> = HashMap::new();
        let mut xf_num_fmt_ids: Vec<u32> = Vec::new();
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e)
                    if local_name(e.name().as_ref()) == b"numFmt" =>
                {
                    let mut id = None;
                    let mut code = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"numFmtId" => id = attr.unescape_value()?.parse::<u32>().ok(),
                            b"formatCode" => code = Some(attr.unescape_value()?.into_owned()),
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(code)) = (id, code) {
                        custom_codes.insert(id, code);
                    }
                }

                Event::Start(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    in_cell_xfs = true;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"cellXfs" => break,
                Event::Start(e) | Event::Empty(e)
                    if in_cell_xfs && local_name(e.name().as_ref()) == b"xf" =>
                {
                    let mut num_fmt_id = 0u32;
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"numFmtId" {
                            num_fmt_id = attr.unescape_value()?.parse().unwrap_or(0);
                        }
                    }
                    xf_num_fmt_ids.push(num_fmt_id);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let mut resolved: HashMap<u32, Option<FormatCode>> = HashMap::new();
        let xf_formats = xf_num_fmt_ids
            .into_iter()
            .map(|id| {
                resolved
                    .entry(id)
                    .or_insert_with(|| resolve_format(id, &custom_codes))
                    .clone()
            })
            .collect();

        Ok(Self { xf_formats })
    }

    /// How a numeric payload styled with `xf` should be interpreted.
    /// Unknown indices classify as General.
    pub(crate) fn kind_for(&self, xf: usize, value: f64) -> SectionKind {
        self.xf_formats
            .get(xf)
            .and_then(Option::as_ref)
            .map(|code| code.section_for_number(value).kind)
            .unwrap_or(SectionKind::General)
    }
}

/// Resolve a numFmtId to its parsed format, custom codes first, then the
/// built-in table. Returns `None` when the format cannot re-type a number
/// (plain General/Text/number codes, or a syntax error recovered as General).
fn resolve_format(num_fmt_id: u32, custom_codes: &HashMap<u32, String>) -> Option<FormatCode> {
    let code = match custom_codes.get(&num_fmt_id) {
        Some(custom) => custom.as_str(),
        None => {
            let id = u16::try_from(num_fmt_id).ok()?;
            builtin_format_code(id)?
        }
    };

    let parsed = FormatCode::parse(code).ok()?;
    parsed
        .sections()
        .iter()
        .any(|s| matches!(s.kind, SectionKind::Date | SectionKind::Duration))
        .then_some(parsed)
}
