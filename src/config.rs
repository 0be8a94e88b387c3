use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};
use log::LevelFilter;

use crate::session::Game;

pub const DEFAULT_SETTINGS_DIR: &str = "~/.config/addon-index";

#[cfg(windows)]
pub const DEFAULT_DOCUMENTS_DIR: &str = "~/My Documents";
#[cfg(not(windows))]
pub const DEFAULT_DOCUMENTS_DIR: &str = "~/Documents";

#[derive(Debug, Clone)]
pub struct Config {
    pub settings_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub game: Game,
    pub log_level: LevelFilter,
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl Config {
    /// Command line shared by every subcommand.
    pub fn app() -> App<'static, 'static> {
        App::new("addon-index")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Indexes and removes installed game addons")
            .arg(
                Arg::with_name("settings-dir")
                    .long("settings-dir")
                    .value_name("DIR")
                    .help("Directory holding the addon cache")
                    .default_value(DEFAULT_SETTINGS_DIR)
                    .global(true),
            )
            .arg(
                Arg::with_name("documents-dir")
                    .long("documents-dir")
                    .value_name("DIR")
                    .help("Documents directory containing the game data folder")
                    .default_value(DEFAULT_DOCUMENTS_DIR)
                    .global(true),
            )
            .arg(
                Arg::with_name("game")
                    .long("game")
                    .value_name("GAME")
                    .possible_values(&["lotro", "ddo"])
                    .default_value("lotro")
                    .global(true),
            )
            .arg(
                Arg::with_name("log-level")
                    .long("log-level")
                    .value_name("LEVEL")
                    .possible_values(&["off", "error", "warn", "info", "debug", "trace"])
                    .default_value("info")
                    .global(true),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Config {
        Config {
            settings_dir: expand_path(
                matches
                    .value_of("settings-dir")
                    .unwrap_or(DEFAULT_SETTINGS_DIR),
            ),
            documents_dir: expand_path(
                matches
                    .value_of("documents-dir")
                    .unwrap_or(DEFAULT_DOCUMENTS_DIR),
            ),
            game: matches
                .value_of("game")
                .and_then(|g| g.parse().ok())
                .unwrap_or(Game::Lotro),
            log_level: matches
                .value_of("log-level")
                .and_then(|l| l.parse().ok())
                .unwrap_or(LevelFilter::Info),
        }
    }

    /// The game's user data folder, parent of `Plugins`.
    pub fn data_dir(&self) -> PathBuf {
        self.documents_dir.join(self.game.data_folder_name())
    }
}
