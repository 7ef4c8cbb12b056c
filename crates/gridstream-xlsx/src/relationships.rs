use roxmltree::Document;

use crate::ReadError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// Parse a `.rels` part.
///
/// Relationship parts are tiny, so a DOM parse is fine here; the entries are
/// matched by local name so both the transitional and strict vocabularies
/// work. Entries without an `Id` or `Target` are skipped.
pub(crate) fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, ReadError> {
    let text = std::str::from_utf8(xml)?;
    let doc = Document::parse(text)?;

    let mut rels = Vec::new();
    for node in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
    {
        let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target")) else {
            continue;
        };
        rels.push(Relationship {
            id: id.to_string(),
            rel_type: node.attribute("Type").unwrap_or_default().to_string(),
            target: target.to_string(),
        });
    }
    Ok(rels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entries_and_skips_incomplete_ones() {
        let xml = br#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Target="sharedStrings.xml"/>
  <Relationship Type="orphan" Target="nothing.xml"/>
</Relationships>"#;

        let rels = parse_relationships(xml).unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].id, "rId1");
        assert_eq!(rels[0].target, "worksheets/sheet1.xml");
        assert_eq!(rels[1].rel_type, "");
    }
}
