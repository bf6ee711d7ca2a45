use std::io::{Cursor, Read, Write};

use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::TemplateError;

pub const DOCUMENT_PART: &str = "word/document.xml";

// open rejects a package missing any of these outright.
const REQUIRED_PARTS: [&str; 3] = ["[Content_Types].xml", "_rels/.rels", DOCUMENT_PART];

#[derive(Debug)]
pub struct PackageEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

/// In-memory working copy of one OOXML package.
#[derive(Debug)]
pub struct OoxmlPackage {
    pub entries: Vec<PackageEntry>,
}

impl OoxmlPackage {
    pub fn open(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| TemplateError::CorruptArchive(format!("not a zip package: {e}")))?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| TemplateError::CorruptArchive(format!("zip entry {i}: {e}")))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| TemplateError::CorruptArchive(format!("read {}: {e}", file.name())))?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        let pkg = Self { entries };
        for required in REQUIRED_PARTS {
            if !pkg.has_part(required) {
                return Err(TemplateError::CorruptArchive(format!(
                    "required part missing: {required}"
                )));
            }
        }
        Ok(pkg)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.entries.iter().any(|e| !e.is_dir && e.name == name)
    }

    pub fn part_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && !e.name.ends_with('/'))
            .map(|e| e.name.as_str())
            .collect()
    }

    pub fn read_part(&self, name: &str) -> Result<String, TemplateError> {
        let entry = self
            .entries
            .iter()
            .find(|e| !e.is_dir && e.name == name)
            .ok_or_else(|| TemplateError::PartNotFound(name.to_string()))?;
        String::from_utf8(entry.data.clone())
            .map_err(|_| TemplateError::CorruptArchive(format!("{name}: not valid utf-8")))
    }

    pub fn write_part(&mut self, name: &str, text: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| !e.is_dir && e.name == name) {
            entry.data = text.as_bytes().to_vec();
            return;
        }
        self.entries.push(PackageEntry {
            name: name.to_string(),
            data: text.as_bytes().to_vec(),
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        });
    }

    // Original per-entry compression, timestamps, modes and order are kept.
    pub fn serialize(&self) -> Result<Vec<u8>, TemplateError> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts).map_err(|e| {
                    TemplateError::CorruptArchive(format!("add dir {}: {e}", ent.name))
                })?;
            } else {
                zout.start_file(&ent.name, opts).map_err(|e| {
                    TemplateError::CorruptArchive(format!("start {}: {e}", ent.name))
                })?;
                zout.write_all(&ent.data).map_err(|e| {
                    TemplateError::CorruptArchive(format!("write {}: {e}", ent.name))
                })?;
            }
        }
        let cursor = zout
            .finish()
            .map_err(|e| TemplateError::CorruptArchive(format!("finish zip: {e}")))?;
        Ok(cursor.into_inner())
    }

    // The main document plus every numbered header/footer, in part order.
    pub fn scan_targets(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && is_scan_target(&e.name))
            .map(|e| e.name.clone())
            .collect()
    }
}

fn is_scan_target(name: &str) -> bool {
    if name == DOCUMENT_PART {
        return true;
    }
    for prefix in ["word/header", "word/footer"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if let Some(num) = rest.strip_suffix(".xml") {
                return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
            }
        }
    }
    false
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize()).chars().take(10).collect()
}
