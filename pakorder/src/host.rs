//! Host collaborator inputs.
//!
//! Pakorder does not own the mod list, the profile, or activation state.
//! The host application (a mod manager) supplies them through the types in
//! this module: an ordered list of [`ModEntry`] values (highest display
//! priority first) and a [`Profile`] naming the directory that receives the
//! cache file and the synthesized settings document.

use std::path::PathBuf;

use tracing::debug;

/// Activation state of an installed mod, as reported by the host.
///
/// The two flags are set unambiguously by the host collaborator:
///
/// - `active`: the mod participates in extraction at all
/// - `manages_order`: the mod's packages may appear in the synthesized
///   module list and load order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModState {
    /// Whether the mod is enabled in the host's mod list.
    pub active: bool,

    /// Whether the host wants this mod represented in the output ordering.
    pub manages_order: bool,
}

impl ModState {
    /// State for a mod that is enabled and fully managed.
    pub const ENABLED: Self = Self {
        active: true,
        manages_order: true,
    };

    /// State for a disabled mod.
    pub const DISABLED: Self = Self {
        active: false,
        manages_order: false,
    };

    /// Create a state from explicit flags.
    pub fn new(active: bool, manages_order: bool) -> Self {
        Self {
            active,
            manages_order,
        }
    }
}

/// One installed mod as described by the host.
///
/// Entries are identified by name; the host guarantees names are unique
/// within a mod list. `pak_dir` is the absolute path to the directory
/// holding the mod's `.pak` package files.
#[derive(Debug, Clone)]
pub struct ModEntry {
    /// Host-assigned mod name (cache key and log label).
    pub name: String,

    /// Directory containing the mod's package files.
    pub pak_dir: PathBuf,

    /// Activation state reported by the host.
    pub state: ModState,
}

impl ModEntry {
    /// Create a new mod entry.
    pub fn new(name: impl Into<String>, pak_dir: impl Into<PathBuf>, state: ModState) -> Self {
        Self {
            name: name.into(),
            pak_dir: pak_dir.into(),
            state,
        }
    }

    /// List the mod's package files, sorted by file name.
    ///
    /// A missing or unreadable pak directory yields an empty list; a mod
    /// without packages is not an error.
    pub fn pak_files(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.pak_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(mod_name = %self.name, dir = %self.pak_dir.display(), error = %e,
                    "pak directory not readable");
                return Vec::new();
            }
        };

        let mut paks: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pak"))
            })
            .collect();
        paks.sort();
        paks
    }
}

/// Per-profile filesystem context supplied by the host.
///
/// The profile directory holds both the durable metadata cache and the
/// output settings document.
#[derive(Debug, Clone)]
pub struct Profile {
    dir: PathBuf,
}

impl Profile {
    /// File name of the durable metadata cache inside a profile.
    pub const CACHE_FILE: &'static str = "modsCache.json";

    /// File name of the synthesized settings document inside a profile.
    pub const SETTINGS_FILE: &'static str = "modsettings.lsx";

    /// Create a profile rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path to the metadata cache file.
    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(Self::CACHE_FILE)
    }

    /// Path to the output settings document.
    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(Self::SETTINGS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pak_files_sorted() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.pak"), b"").unwrap();
        fs::write(temp.path().join("a.pak"), b"").unwrap();
        fs::write(temp.path().join("notes.txt"), b"").unwrap();

        let entry = ModEntry::new("Test", temp.path(), ModState::ENABLED);
        let paks = entry.pak_files();

        assert_eq!(paks.len(), 2);
        assert!(paks[0].ends_with("a.pak"));
        assert!(paks[1].ends_with("b.pak"));
    }

    #[test]
    fn test_pak_files_missing_dir() {
        let entry = ModEntry::new("Test", "/nonexistent/pak/dir", ModState::ENABLED);
        assert!(entry.pak_files().is_empty());
    }

    #[test]
    fn test_pak_files_case_insensitive_extension() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("Upper.PAK"), b"").unwrap();

        let entry = ModEntry::new("Test", temp.path(), ModState::ENABLED);
        assert_eq!(entry.pak_files().len(), 1);
    }

    #[test]
    fn test_profile_paths() {
        let profile = Profile::new("/profiles/default");
        assert!(profile.cache_path().ends_with("modsCache.json"));
        assert!(profile.settings_path().ends_with("modsettings.lsx"));
    }

    #[test]
    fn test_mod_state_flags() {
        assert!(ModState::ENABLED.active && ModState::ENABLED.manages_order);
        assert!(!ModState::DISABLED.active);

        let partial = ModState::new(true, false);
        assert!(partial.active);
        assert!(!partial.manages_order);
    }
}
