use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use taglens_core::{Result, TagLensError};
use tempfile::TempDir;
use tracing::info;

/// The indexer toolchain shipped inside the executable. Release builds
/// vendor statically linked Linux binaries under `assets/`.
static EMBEDDED_BINARIES: &[(&str, &[u8])] = &[
    ("ctags", include_bytes!("../assets/ctags")),
    ("readtags", include_bytes!("../assets/readtags")),
    ("global", include_bytes!("../assets/global")),
    ("gtags", include_bytes!("../assets/gtags")),
];

/// Scoped on-disk home for the embedded indexer binaries. The directory
/// lives for the process lifetime and is removed when the cache is dropped
/// on clean shutdown; a crash leaks it.
pub struct BinaryCache {
    dir: TempDir,
}

impl BinaryCache {
    pub fn materialize() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("code-server-binaries-")
            .tempdir()?;

        for (name, bytes) in EMBEDDED_BINARIES {
            let dest = dir.path().join(name);
            fs::write(&dest, bytes).map_err(|e| {
                TagLensError::ExternalTool(format!("failed to extract {name}: {e}"))
            })?;
            fs::set_permissions(&dest, fs::Permissions::from_mode(0o755)).map_err(|e| {
                TagLensError::ExternalTool(format!("failed to chmod {name}: {e}"))
            })?;
        }

        info!(dir = %dir.path().display(), "extracted indexer binaries");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_extracts_all_binaries_executable() {
        let cache = BinaryCache::materialize().unwrap();
        for (name, _) in EMBEDDED_BINARIES {
            let path = cache.dir().join(name);
            assert!(path.is_file(), "{name} missing");
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o755, 0o755, "{name} not executable");
        }
    }

    #[test]
    fn cache_directory_is_removed_on_drop() {
        let cache = BinaryCache::materialize().unwrap();
        let dir = cache.dir().to_path_buf();
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("code-server-binaries-"));
        drop(cache);
        assert!(!dir.exists());
    }
}
