//! Addon index for LOTRO-style game clients.
//!
//! Scans the game's `Plugins` directory, reconciles compendium-managed and
//! unmanaged plugins, keeps them in a searchable SQLite cache and plans
//! dependency-aware removals.

#[macro_use]
extern crate log;

pub mod addon;
pub mod config;
mod db_meta;
pub mod deps;
pub mod descriptor;
pub mod error;
pub mod logger;
mod schema;
pub mod scan;
pub mod session;
pub mod store;
pub mod uninstall;

pub use addon::{AddonRecord, Category, Selection, StoredAddon, UNMANAGED};
pub use config::Config;
pub use deps::DependencyResolver;
pub use error::{Error, Result};
pub use scan::{scan, ScanReport, Warning};
pub use session::{Game, Session};
pub use store::Store;
pub use uninstall::{Confirm, UninstallPlan, UninstallPlanner, UninstallReport};
