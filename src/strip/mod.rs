//! Macro removal at the OPC package level.
//!
//! An `.xlsm` workbook is a zip container of parts. Removing macros means
//! deleting the VBA project parts (`xl/vbaProject.bin` and friends) and then
//! repairing the package metadata that referenced them: the workbook
//! override in `[Content_Types].xml` is downgraded to the macro-free
//! content type, overrides for deleted parts are dropped, and relationship
//! parts lose any entry whose target was deleted. Everything else is
//! preserved byte-for-byte, so cell data, formulas and styles survive
//! unchanged.

mod content_types;
mod rels;

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::path::Path;

use thiserror::Error;

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Maximum allowed inflated bytes for a single zip entry.
///
/// Keeps a crafted archive from expanding into memory far beyond the upload
/// ceiling; generous enough for any workbook this tool will realistically
/// see.
pub const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

/// Maximum allowed inflated bytes across the whole package.
pub const MAX_TOTAL_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StripError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("not a workbook package: {0}")]
    Invalid(String),
    #[error("package entry {part} is {size} bytes inflated (max {max})")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("package is {total} bytes inflated (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
}

/// An OPC workbook package materialized as a part-name → bytes map.
#[derive(Debug, Clone)]
pub struct WorkbookPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl WorkbookPackage {
    /// Read a package from zip bytes.
    ///
    /// Entry names are validated against traversal tricks and inflated sizes
    /// are capped before any bytes are read, so a hostile archive fails with
    /// a typed error instead of exhausting memory or escaping a directory.
    /// Archives that unzip fine but lack `[Content_Types].xml` or
    /// `xl/workbook.xml` are rejected as non-workbooks.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StripError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = BTreeMap::new();
        let mut total: u64 = 0;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            validate_part_name(&name)?;

            let size = entry.size();
            if size > MAX_PART_BYTES {
                return Err(StripError::PartTooLarge {
                    part: name,
                    size,
                    max: MAX_PART_BYTES,
                });
            }
            total += size;
            if total > MAX_TOTAL_BYTES {
                return Err(StripError::PackageTooLarge {
                    total,
                    max: MAX_TOTAL_BYTES,
                });
            }

            let mut data = Vec::with_capacity(size as usize);
            entry.read_to_end(&mut data)?;
            parts.insert(name, data);
        }

        let package = Self { parts };
        if package.part(CONTENT_TYPES_PART).is_none() {
            return Err(StripError::Invalid(format!(
                "missing {CONTENT_TYPES_PART}"
            )));
        }
        if package.part(WORKBOOK_PART).is_none() {
            return Err(StripError::Invalid(format!("missing {WORKBOOK_PART}")));
        }
        Ok(package)
    }

    /// Raw bytes of a part, if present.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// Part names in package order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Whether the package carries a VBA project part.
    pub fn has_macros(&self) -> bool {
        self.parts.keys().any(|name| is_vba_part(name))
    }

    /// Remove the VBA project parts and repair package metadata.
    ///
    /// Deletes `xl/vbaProject.bin`, `xl/vbaProjectSignature.bin`,
    /// `xl/vbaData.xml` and their nested `.rels`, downgrades the workbook
    /// content type, and drops relationships that pointed at the deleted
    /// parts. Safe to call on a package without macros: the workbook
    /// content type is normalized and nothing else changes.
    pub fn strip_macros(&mut self) -> Result<(), StripError> {
        let doomed: Vec<String> = self
            .parts
            .keys()
            .filter(|name| is_vba_part(name))
            .cloned()
            .collect();

        let mut removed = BTreeSet::new();
        for part in doomed {
            let nested_rels = rels_part_for(&part);
            if self.parts.remove(&nested_rels).is_some() {
                removed.insert(nested_rels);
            }
            self.parts.remove(&part);
            removed.insert(part);
        }

        if let Some(existing) = self.parts.get(CONTENT_TYPES_PART)
            && let Some(updated) = content_types::rewrite_for_macro_removal(existing, &removed)?
        {
            self.parts.insert(CONTENT_TYPES_PART.to_string(), updated);
        }

        let rels_parts: Vec<String> = self
            .parts
            .keys()
            .filter(|name| name.ends_with(".rels"))
            .cloned()
            .collect();
        for rels_part in rels_parts {
            let xml = &self.parts[&rels_part];
            if let Some(updated) = rels::drop_relationships_to(xml, &rels_part, &removed)? {
                self.parts.insert(rels_part, updated);
            }
        }

        Ok(())
    }

    /// Serialize the package back to zip bytes (deflate-compressed).
    pub fn to_bytes(&self) -> Result<Vec<u8>, StripError> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, data) in &self.parts {
            writer.start_file(name.clone(), options)?;
            writer.write_all(data)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Strip macros from the workbook at `input` and write the macro-free
/// package to `output`.
///
/// Either a complete output file is produced or an error propagates; no
/// partial output is left behind (the caller's working directory is
/// discarded on failure).
pub fn remove_macros(input: &Path, output: &Path) -> Result<(), StripError> {
    let bytes = std::fs::read(input)?;
    let mut package = WorkbookPackage::from_bytes(&bytes)?;
    package.strip_macros()?;
    std::fs::write(output, package.to_bytes()?)?;
    Ok(())
}

fn is_vba_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(
        lower.as_str(),
        "xl/vbaproject.bin" | "xl/vbaprojectsignature.bin" | "xl/vbadata.xml"
    )
}

/// The `.rels` part that describes `part`, per OPC layout
/// (`dir/file` → `dir/_rels/file.rels`).
fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Reject zip entry names that could escape an extraction root: absolute
/// paths, `..` components, and backslash separators.
fn validate_part_name(name: &str) -> Result<(), StripError> {
    if name.is_empty() {
        return Err(StripError::Invalid("empty entry name".to_string()));
    }
    if name.starts_with('/') || name.as_bytes().get(1) == Some(&b':') {
        return Err(StripError::Invalid(format!("absolute entry path: {name}")));
    }
    if name.split('/').any(|segment| segment == "..") {
        return Err(StripError::Invalid(format!(
            "path traversal in entry: {name}"
        )));
    }
    if name.contains('\\') {
        return Err(StripError::Invalid(format!(
            "backslash in entry path: {name}"
        )));
    }
    Ok(())
}
