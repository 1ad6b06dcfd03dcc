//! `[Content_Types].xml` repair after macro parts are removed.

use std::collections::BTreeSet;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};

use super::StripError;

/// Content type advertised by a macro-free workbook part.
const WORKBOOK_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

/// Content types a macro-enabled workbook part may advertise.
const MACRO_ENABLED_WORKBOOK_TYPES: [&str; 2] = [
    "application/vnd.ms-excel.sheet.macroEnabled.main+xml",
    "application/vnd.ms-excel.template.macroEnabled.main+xml",
];

/// Content type of the VBA project binary.
const VBA_PROJECT_CONTENT_TYPE: &str = "application/vnd.ms-office.vbaProject";

/// Strip a namespace prefix from a qualified XML name.
pub(super) fn local_name(qname: &[u8]) -> &[u8] {
    match qname.iter().rposition(|&b| b == b':') {
        Some(pos) => &qname[pos + 1..],
        None => qname,
    }
}

/// Rewrite `[Content_Types].xml` so it no longer mentions macros:
/// the `/xl/workbook.xml` override is downgraded to the macro-free content
/// type, overrides for removed parts are dropped, and the
/// `Extension="bin"` default for the VBA project goes away.
///
/// Returns `Ok(None)` when no change is required.
pub(super) fn rewrite_for_macro_removal(
    xml: &[u8],
    removed: &BTreeSet<String>,
) -> Result<Option<Vec<u8>>, StripError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();

    let mut changed = false;
    // Depth of a skipped non-empty element; its children are dropped too.
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
                if local_name(e.name().as_ref()) == b"Override" =>
            {
                let empty = matches!(event, Event::Empty(_));
                match classify_override(e, removed)? {
                    OverrideAction::Drop => {
                        changed = true;
                        if !empty {
                            skip_depth = 1;
                        }
                    }
                    OverrideAction::Patch(patched) => {
                        changed = true;
                        if empty {
                            writer.write_event(Event::Empty(patched))?;
                        } else {
                            writer.write_event(Event::Start(patched))?;
                        }
                    }
                    OverrideAction::Keep => {
                        writer.write_event(event)?;
                    }
                }
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"Default" =>
            {
                if default_is_vba_project(e)? {
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

enum OverrideAction {
    Keep,
    Drop,
    Patch(BytesStart<'static>),
}

fn classify_override(
    e: &BytesStart<'_>,
    removed: &BTreeSet<String>,
) -> Result<OverrideAction, StripError> {
    let mut part_name = None;
    let mut content_type = None;
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        match local_name(attr.key.as_ref()) {
            b"PartName" => part_name = Some(attr.unescape_value()?.into_owned()),
            b"ContentType" => content_type = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    let Some(part_name) = part_name else {
        return Ok(OverrideAction::Keep);
    };
    let normalized = part_name.strip_prefix('/').unwrap_or(part_name.as_str());

    if removed.contains(normalized) {
        return Ok(OverrideAction::Drop);
    }

    if normalized == "xl/workbook.xml"
        && content_type
            .as_deref()
            .is_some_and(|ct| MACRO_ENABLED_WORKBOOK_TYPES.contains(&ct))
    {
        let name = e.name();
        let tag = std::str::from_utf8(name.as_ref()).unwrap_or("Override");
        let mut patched = BytesStart::new(tag.to_string());
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            if local_name(attr.key.as_ref()) == b"ContentType" {
                patched.push_attribute((attr.key.as_ref(), WORKBOOK_CONTENT_TYPE.as_bytes()));
            } else {
                patched.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
            }
        }
        return Ok(OverrideAction::Patch(patched.into_owned()));
    }

    Ok(OverrideAction::Keep)
}

fn default_is_vba_project(e: &BytesStart<'_>) -> Result<bool, StripError> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"ContentType" {
            return Ok(attr.unescape_value()? == VBA_PROJECT_CONTENT_TYPE);
        }
    }
    Ok(false)
}
