use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;

/// Category value given to plugins that no compendium owns.
pub const UNMANAGED: &str = "Unmanaged";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PluginsInstalled,
    ThemesInstalled,
    MusicInstalled,
    Plugins,
    Themes,
    Music,
    ThemesDdo,
    ThemesDdoInstalled,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::PluginsInstalled,
        Category::ThemesInstalled,
        Category::MusicInstalled,
        Category::Plugins,
        Category::Themes,
        Category::Music,
        Category::ThemesDdo,
        Category::ThemesDdoInstalled,
    ];

    /// Name of the backing table. Only ever one of these constants is
    /// spliced into SQL.
    pub fn table(self) -> &'static str {
        match self {
            Category::PluginsInstalled => "plugins_installed",
            Category::ThemesInstalled => "themes_installed",
            Category::MusicInstalled => "music_installed",
            Category::Plugins => "plugins",
            Category::Themes => "themes",
            Category::Music => "music",
            Category::ThemesDdo => "themes_ddo",
            Category::ThemesDdoInstalled => "themes_ddo_installed",
        }
    }

    /// Remote catalog tables identify rows by interface id, installed ones
    /// by file path.
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            Category::Plugins | Category::Themes | Category::Music | Category::ThemesDdo
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Category, Error> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");

        Category::ALL
            .iter()
            .copied()
            .find(|c| c.table() == normalized)
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AddonRecord {
    pub name: String,
    pub category: String,
    pub version: String,
    pub author: String,
    pub file_path: PathBuf,
    pub interface_id: String,
    pub dependencies: Vec<String>,
}

impl AddonRecord {
    pub fn is_unmanaged(&self) -> bool {
        self.category == UNMANAGED
    }

    /// Key used for last-writer-wins deduplication within a table.
    pub fn key(&self, category: Category) -> String {
        if category.is_remote() {
            self.interface_id.clone()
        } else {
            self.file_path.to_string_lossy().into_owned()
        }
    }

    pub fn depends_on(&self, interface_id: &str) -> bool {
        self.dependencies.iter().any(|d| d == interface_id)
    }
}

/// Joins dependency ids the way they are kept in storage.
pub fn join_dependencies(dependencies: &[String]) -> String {
    dependencies.join(",")
}

pub fn split_dependencies(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

/// A record as it sits in the store, with its opaque row id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredAddon {
    pub row_id: i64,
    #[serde(flatten)]
    pub record: AddonRecord,
}

/// What a caller hands to the uninstall planner for one selected addon.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub interface_id: String,
    pub file_path: PathBuf,
    pub name: String,
}

impl Selection {
    pub fn new(interface_id: &str, file_path: &Path, name: &str) -> Selection {
        Selection {
            interface_id: interface_id.to_string(),
            file_path: file_path.to_path_buf(),
            name: name.to_string(),
        }
    }
}

impl From<&StoredAddon> for Selection {
    fn from(addon: &StoredAddon) -> Selection {
        Selection::new(
            &addon.record.interface_id,
            &addon.record.file_path,
            &addon.record.name,
        )
    }
}
