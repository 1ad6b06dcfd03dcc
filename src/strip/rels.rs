//! Relationship (`.rels`) repair after macro parts are removed.

use std::collections::BTreeSet;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};

use super::StripError;
use super::content_types::local_name;

/// Relationship type of the VBA project stream.
const VBA_PROJECT_REL_TYPE: &str =
    "http://schemas.microsoft.com/office/2006/relationships/vbaProject";

/// Drop relationships that point at removed parts (or carry the VBA project
/// relationship type) from a `.rels` part.
///
/// `rels_part` is the name of the `.rels` part itself; targets are resolved
/// relative to its source part. External-mode relationships are never
/// touched. Returns `Ok(None)` when nothing had to change.
pub(super) fn drop_relationships_to(
    xml: &[u8],
    rels_part: &str,
    removed: &BTreeSet<String>,
) -> Result<Option<Vec<u8>>, StripError> {
    let base_dir = source_base_dir(rels_part);

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();

    let mut changed = false;
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            _ if skip_depth > 0 => match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            },
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                if relationship_is_doomed(e, &base_dir, removed)? {
                    changed = true;
                    if matches!(event, Event::Start(_)) {
                        skip_depth = 1;
                    }
                } else {
                    writer.write_event(event)?;
                }
            }
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    if changed {
        Ok(Some(writer.into_inner()))
    } else {
        Ok(None)
    }
}

fn relationship_is_doomed(
    e: &BytesStart<'_>,
    base_dir: &str,
    removed: &BTreeSet<String>,
) -> Result<bool, StripError> {
    let mut rel_type = None;
    let mut target = None;
    let mut external = false;
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        match local_name(attr.key.as_ref()) {
            b"Type" => rel_type = Some(attr.unescape_value()?.into_owned()),
            b"Target" => target = Some(attr.unescape_value()?.into_owned()),
            b"TargetMode" => external = attr.unescape_value()? == "External",
            _ => {}
        }
    }

    if external {
        return Ok(false);
    }
    if rel_type.as_deref() == Some(VBA_PROJECT_REL_TYPE) {
        return Ok(true);
    }
    if let Some(target) = target {
        return Ok(removed.contains(&resolve_target(base_dir, &target)));
    }
    Ok(false)
}

/// Directory of the part a `.rels` file describes
/// (`xl/_rels/workbook.xml.rels` → `xl`, `_rels/.rels` → package root).
fn source_base_dir(rels_part: &str) -> String {
    match rels_part.rsplit_once("_rels/") {
        Some((prefix, _)) => prefix.trim_end_matches('/').to_string(),
        None => String::new(),
    }
}

/// Resolve a relationship target to a package part name.
fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if base_dir.is_empty() {
        target.to_string()
    } else {
        format!("{base_dir}/{target}")
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
