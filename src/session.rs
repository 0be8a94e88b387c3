use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::addon::{Category, Selection, StoredAddon};
use crate::config::Config;
use crate::deps::DependencyResolver;
use crate::error::Result;
use crate::scan::{self, ScanReport, Warning};
use crate::store::Store;
use crate::uninstall::{Confirm, UninstallPlanner, UninstallReport};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Game {
    Lotro,
    Ddo,
}

impl Game {
    /// Folder under the user's documents directory holding the game's
    /// user data.
    pub fn data_folder_name(self) -> &'static str {
        match self {
            Game::Lotro => "The Lord of the Rings Online",
            Game::Ddo => "Dungeons and Dragons Online",
        }
    }

    pub fn has_plugins(self) -> bool {
        self == Game::Lotro
    }
}

impl FromStr for Game {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Game, String> {
        match s.to_ascii_lowercase().as_str() {
            "lotro" => Ok(Game::Lotro),
            "ddo" => Ok(Game::Ddo),
            other => Err(format!("unknown game '{}'", other)),
        }
    }
}

/// One addon-manager session: owns the store between open and close and
/// keeps the installed tables in step with the disk.
pub struct Session {
    store: Store,
    game: Game,
    data_dir: PathBuf,
    last_scan: ScanReport,
}

fn count_noun(n: usize) -> String {
    if n == 1 {
        "this 1 plugin".to_string()
    } else {
        format!("these {} plugins", n)
    }
}

impl Session {
    /// Opens the store from the configured settings directory and loads the
    /// installed plugins.
    pub fn open(config: &Config) -> Result<Session> {
        let store = Store::open(&config.settings_dir)?;

        Session::with_store(store, config.game, &config.data_dir())
    }

    pub fn with_store(store: Store, game: Game, data_dir: &Path) -> Result<Session> {
        info!("{:?} session on '{}'", game, data_dir.display());

        let mut session = Session {
            store,
            game,
            data_dir: data_dir.to_path_buf(),
            last_scan: ScanReport::default(),
        };

        session.refresh_installed_plugins()?;

        Ok(session)
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// `None` for games without plugin support.
    pub fn plugins_dir(&self) -> Option<PathBuf> {
        if self.game.has_plugins() {
            Some(self.data_dir.join("Plugins"))
        } else {
            None
        }
    }

    /// Warnings of the most recent scan.
    pub fn warnings(&self) -> &[Warning] {
        &self.last_scan.warnings
    }

    /// Rescans the plugins directory and rebuilds the installed plugins
    /// table from it.
    pub fn refresh_installed_plugins(&mut self) -> Result<&ScanReport> {
        let mut report = match self.plugins_dir() {
            Some(dir) => scan::scan(&dir)?,
            None => {
                debug!("{:?} has no plugins", self.game);
                ScanReport::default()
            }
        };

        let superseded = self
            .store
            .replace_all(Category::PluginsInstalled, &report.records)?;

        report
            .warnings
            .extend(superseded.into_iter().map(|key| Warning::DuplicateAddon { key }));

        self.last_scan = report;

        Ok(&self.last_scan)
    }

    pub fn search(&self, category: Category, query: &str) -> Result<Vec<StoredAddon>> {
        self.store.search(category, query)
    }

    pub fn dependents(&self, category: Category, interface_id: &str) -> Result<Vec<String>> {
        DependencyResolver::new(&self.store).find_dependents(category, interface_id)
    }

    /// Turns row ids picked from a table view into uninstall selections.
    /// Rows that no longer exist are skipped.
    pub fn selection(&self, category: Category, row_ids: &[i64]) -> Result<Vec<Selection>> {
        let mut selection = Vec::new();

        for &row_id in row_ids {
            match self.store.addon(category, row_id)? {
                Some(addon) => selection.push(Selection::from(&addon)),
                None => warn!("{}: no row {}", category, row_id),
            }
        }

        Ok(selection)
    }

    /// Uninstalls the installed plugins in `row_ids` after `confirm` approves
    /// the whole selection, asking again for each plugin others depend on.
    /// The table is rebuilt from disk afterwards. Returns `None` when nothing
    /// was attempted.
    pub fn uninstall_plugins(
        &mut self,
        row_ids: &[i64],
        confirm: &mut dyn Confirm,
    ) -> Result<Option<UninstallReport>> {
        let root = match self.plugins_dir() {
            Some(dir) => dir,
            None => {
                info!("{:?} has no plugins to uninstall", self.game);
                return Ok(None);
            }
        };

        let selection = self.selection(Category::PluginsInstalled, row_ids)?;
        if selection.is_empty() {
            return Ok(None);
        }

        let summary = format!(
            "Are you sure you want to remove {}?",
            count_noun(selection.len())
        );
        let detail = selection
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if !confirm.confirm(&summary, &detail) {
            info!("uninstall cancelled");
            return Ok(None);
        }

        let mut report = {
            let planner = UninstallPlanner::new(&self.store, Category::PluginsInstalled, &root);
            let plan = planner.plan_uninstall(&selection)?;
            planner.confirm_and_execute(plan, confirm)
        };

        let rescan = self.refresh_installed_plugins()?;
        report.warnings.extend(rescan.warnings.iter().cloned());

        Ok(Some(report))
    }

    /// Ends the session, releasing the store.
    pub fn close(mut self) -> Result<()> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::scan::fixtures::*;

    fn store(dir: &TempDir) -> Store {
        Store::open(&dir.path().join("settings")).unwrap()
    }

    #[test]
    fn game_names() {
        assert_eq!("LOTRO".parse::<Game>().unwrap(), Game::Lotro);
        assert_eq!("ddo".parse::<Game>().unwrap(), Game::Ddo);
        assert!("eso".parse::<Game>().is_err());
    }

    #[test]
    fn ddo_has_no_plugins() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join(Game::Ddo.data_folder_name());

        let session = Session::with_store(store(&dir), Game::Ddo, &data).unwrap();

        assert_eq!(session.plugins_dir(), None);
        assert!(session
            .search(Category::PluginsInstalled, "")
            .unwrap()
            .is_empty());
        assert!(!data.join("Plugins").exists());

        session.close().unwrap();
    }

    #[test]
    fn declining_the_selection_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join(Game::Lotro.data_folder_name());
        let loose = manifest(&data.join("Plugins"), "Loose/Loose.plugin", "Loose", "Loose.Main");

        let mut session = Session::with_store(store(&dir), Game::Lotro, &data).unwrap();
        let row_id = session.search(Category::PluginsInstalled, "").unwrap()[0].row_id;

        let mut prompts = Vec::new();
        let result = session
            .uninstall_plugins(&[row_id], &mut |summary: &str, detail: &str| {
                prompts.push(format!("{}|{}", summary, detail));
                false
            })
            .unwrap();

        assert!(result.is_none());
        assert_eq!(
            prompts,
            vec!["Are you sure you want to remove this 1 plugin?|Loose"]
        );
        assert!(loose.is_file());

        session.close().unwrap();
    }

    #[test]
    fn unknown_rows_are_ignored() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join(Game::Lotro.data_folder_name());

        let mut session = Session::with_store(store(&dir), Game::Lotro, &data).unwrap();

        let result = session
            .uninstall_plugins(&[42], &mut |_: &str, _: &str| -> bool {
                panic!("nothing to confirm")
            })
            .unwrap();

        assert!(result.is_none());

        session.close().unwrap();
    }
}
