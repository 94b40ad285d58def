//! Registry file: the whole registry as one JSON document.

use anyhow::{Context, Result};
use roomkey_core::Registry;
use std::path::Path;

/// Load the registry, or start an empty one if the file does not exist yet.
pub fn load(path: &Path) -> Result<Registry> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no registry file; starting empty");
        return Ok(Registry::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading registry {}", path.display()))?;
    Registry::from_json(&json).with_context(|| format!("parsing registry {}", path.display()))
}

/// Write the registry via a temporary file so a failed write never truncates it.
pub fn save(path: &Path, registry: &Registry) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating registry directory {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, registry.to_json()?)
        .with_context(|| format!("writing registry {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replacing registry {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        identities = registry.identities().len(),
        presets = registry.presets().len(),
        "registry saved"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomkey_core::Embedding;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("roomkey-store-{}-{name}", std::process::id()))
            .join("registry.json")
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let registry = load(&scratch_path("missing")).unwrap();
        assert!(registry.identities().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let path = scratch_path("save");
        let mut registry = Registry::new();
        registry
            .enroll_identity("Alice", Embedding::new(vec![0.5, 0.25]))
            .unwrap();
        save(&path, &registry).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.identities().len(), 1);
        assert_eq!(loaded.identities()[0].name, "Alice");

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
