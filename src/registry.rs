use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::docx::package::fingerprint;

/// Form catalogue mapping short form codes to template files, so a caller
/// can ask for `tor` instead of carrying paths around.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateRegistry {
    pub version: u32,

    #[serde(default)]
    pub forms: BTreeMap<String, TemplateEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TemplateEntry {
    pub file: PathBuf,
    pub sha256: Option<String>,
    pub description: Option<String>,
}

impl TemplateRegistry {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let registry: TemplateRegistry =
            toml::from_str(text).context("parse template registry (toml)")?;
        if registry.version != 1 {
            return Err(anyhow!(
                "unsupported registry version: {} (expected 1)",
                registry.version
            ));
        }
        Ok(registry)
    }

    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read template registry: {}", path.display()))?;
        let text = String::from_utf8(bytes).context("template registry must be utf-8")?;
        Self::from_toml_str(&text)
    }

    pub fn entry(&self, code: &str) -> Option<&TemplateEntry> {
        self.forms.get(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.forms.keys().map(String::as_str)
    }

    /// Resolves a form code to its template path. Relative entries are taken
    /// against the registry file's own directory.
    pub fn resolve_file(&self, code: &str, registry_path: &Path) -> anyhow::Result<PathBuf> {
        let entry = self
            .entry(code)
            .ok_or_else(|| anyhow!("unknown form code: {code}"))?;
        if entry.file.is_absolute() {
            return Ok(entry.file.clone());
        }
        let base = registry_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(base.join(&entry.file))
    }

    /// Checks template bytes against the entry's pinned digest prefix.
    /// Entries without a pin always pass. The pin may be the short
    /// fingerprint or any longer prefix of the full sha256 hex.
    pub fn verify_bytes(&self, code: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let entry = self
            .entry(code)
            .ok_or_else(|| anyhow!("unknown form code: {code}"))?;
        let want = match &entry.sha256 {
            Some(pin) => pin.trim().to_ascii_lowercase(),
            None => return Ok(()),
        };
        if want.is_empty() {
            return Err(anyhow!("empty sha256 pin for form \"{code}\""));
        }
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let full = hex::encode(hasher.finalize());
        if !full.starts_with(&want) {
            return Err(anyhow!(
                "template digest mismatch for \"{code}\": archive {}, registry {want}",
                fingerprint(bytes)
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[forms.tor]
file = "templates/tor.docx"
description = "ขอบเขตของงาน"

[forms.po]
file = "/srv/share/po.docx"
"#;

    #[test]
    fn parses_forms_and_lists_codes() {
        let registry = TemplateRegistry::from_toml_str(SAMPLE).unwrap();
        let codes: Vec<&str> = registry.codes().collect();
        assert_eq!(codes, vec!["po", "tor"]);
        let tor = registry.entry("tor").unwrap();
        assert_eq!(tor.file, PathBuf::from("templates/tor.docx"));
        assert_eq!(tor.description.as_deref(), Some("ขอบเขตของงาน"));
        assert!(tor.sha256.is_none());
    }

    #[test]
    fn rejects_other_versions() {
        let err = TemplateRegistry::from_toml_str("version = 2\n").unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn unknown_code_has_no_entry() {
        let registry = TemplateRegistry::from_toml_str(SAMPLE).unwrap();
        assert!(registry.entry("memo").is_none());
        let err = registry.verify_bytes("memo", b"x").unwrap_err();
        assert!(err.to_string().contains("unknown form code"));
    }

    #[test]
    fn relative_files_resolve_against_the_registry_dir() {
        let registry = TemplateRegistry::from_toml_str(SAMPLE).unwrap();
        let base = Path::new("/etc/phatsadu/registry.toml");
        assert_eq!(
            registry.resolve_file("tor", base).unwrap(),
            PathBuf::from("/etc/phatsadu/templates/tor.docx")
        );
        assert_eq!(
            registry.resolve_file("po", base).unwrap(),
            PathBuf::from("/srv/share/po.docx")
        );
    }

    #[test]
    fn digest_pin_accepts_prefix_and_rejects_mismatch() {
        let bytes = b"template bytes";
        let pin = fingerprint(bytes);
        let text = format!(
            "version = 1\n[forms.tor]\nfile = \"t.docx\"\nsha256 = \"{pin}\"\n"
        );
        let registry = TemplateRegistry::from_toml_str(&text).unwrap();
        registry.verify_bytes("tor", bytes).unwrap();

        let err = registry.verify_bytes("tor", b"other bytes").unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
        assert!(err.to_string().contains(&pin));
    }

    #[test]
    fn missing_pin_always_passes() {
        let registry = TemplateRegistry::from_toml_str(SAMPLE).unwrap();
        registry.verify_bytes("tor", b"anything").unwrap();
    }
}
