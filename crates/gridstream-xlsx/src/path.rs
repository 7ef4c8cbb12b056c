/// The `_rels` sidecar part for a package part
/// (`xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`).
pub(crate) fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that declared it.
///
/// Targets starting with `/` are package-absolute; anything else is relative
/// to the declaring part's directory. `.` and `..` segments are collapsed and
/// the returned name never has a leading slash, matching ZIP entry names.
pub(crate) fn resolve_target(declaring_part: &str, target: &str) -> String {
    let (base, relative) = match target.strip_prefix('/') {
        Some(absolute) => ("", absolute),
        None => (
            declaring_part.rsplit_once('/').map_or("", |(dir, _)| dir),
            target,
        ),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    segments.join("/")
}
