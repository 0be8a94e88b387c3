use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, Row};

use crate::addon::{join_dependencies, split_dependencies, AddonRecord, Category, StoredAddon};
use crate::db_meta;
use crate::error::{Error, Result};
use crate::schema;

pub const STORE_FILE: &str = "addons_cache.sqlite";

/// SQL function lowercasing its argument with full Unicode rules, which
/// `LIKE` alone only does for ASCII.
const FOLD: &str = "addon_fold";

/// The persisted addon index. One session opens it, hands it to the
/// components that need it and closes it at the end.
pub struct Store {
    db_path: PathBuf,
    conn: Option<Connection>,
}

fn register_fold(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: String = ctx.get(0)?;
            Ok(text.to_lowercase())
        },
    )
}

fn escape_like(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);

    pattern.push('%');
    for ch in term.chars() {
        if ch == '\\' || ch == '%' || ch == '_' {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');

    pattern
}

/// Drops every record whose key reappears later, keeping the later one in
/// its own position. Returns the kept records and the superseded keys.
fn last_writer_wins(
    category: Category,
    records: &[AddonRecord],
) -> (Vec<&AddonRecord>, Vec<String>) {
    let keys: Vec<String> = records.iter().map(|r| r.key(category)).collect();

    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        if !key.is_empty() {
            last.insert(key.as_str(), i);
        }
    }

    let mut kept = Vec::with_capacity(records.len());
    let mut superseded = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let key = keys[i].as_str();

        match last.get(key) {
            Some(&winner) if winner != i => superseded.push(key.to_string()),
            _ => kept.push(record),
        }
    }

    (kept, superseded)
}

impl Store {
    /// Opens `addons_cache.sqlite` in `settings_dir`, creating the directory,
    /// the file and every category table as needed.
    pub fn open(settings_dir: &Path) -> Result<Store> {
        if let Err(e) = fs::create_dir_all(settings_dir) {
            error!(
                "can't create settings directory '{}': {}",
                settings_dir.display(),
                e
            );
            return Err(Error::StoreUnavailable(e.to_string()));
        }

        Self::open_path(&settings_dir.join(STORE_FILE))
    }

    pub fn open_path(db_path: &Path) -> Result<Store> {
        info!("using '{}'", db_path.to_string_lossy());

        let mut conn = match Connection::open(db_path) {
            Ok(c) => c,
            Err(e) => {
                error!(
                    "can't open sqlite database '{}': {}",
                    db_path.to_string_lossy(),
                    e
                );
                return Err(Error::StoreUnavailable(e.to_string()));
            }
        };

        if let Err(e) = register_fold(&conn) {
            error!("can't register {}: {}", FOLD, e);
            return Err(Error::StoreUnavailable(e.to_string()));
        }

        match db_meta::ensure_schema(&mut conn, &schema::store_schema()) {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::StoreUnavailable(format!(
                    "'{}' has an incompatible schema",
                    db_path.display()
                )))
            }
            Err(e) => return Err(Error::StoreUnavailable(e.to_string())),
        }

        Ok(Store {
            db_path: db_path.to_path_buf(),
            conn: Some(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::StoreClosed)
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(Error::StoreClosed)
    }

    fn _get_addon(row: &Row) -> rusqlite::Result<StoredAddon> {
        let file_path: String = row.get(5)?;
        let dependencies: String = row.get(7)?;

        Ok(StoredAddon {
            row_id: row.get(0)?,
            record: AddonRecord {
                name: row.get(1)?,
                category: row.get(2)?,
                version: row.get(3)?,
                author: row.get(4)?,
                file_path: PathBuf::from(file_path),
                interface_id: row.get(6)?,
                dependencies: split_dependencies(&dependencies),
            },
        })
    }

    /// Clears the category table and loads `records` in order, in one
    /// transaction. Returns the keys of records dropped because a later one
    /// had the same key. A failed write leaves the table as it was and
    /// reports the store unavailable.
    pub fn replace_all(&mut self, category: Category, records: &[AddonRecord]) -> Result<Vec<String>> {
        let (kept, superseded) = last_writer_wins(category, records);

        for key in &superseded {
            warn!("{}: duplicate addon '{}', keeping the last one", category, key);
        }

        let conn = self.connection_mut()?;

        if let Err(e) = Self::write_table(conn, category, &kept) {
            error!("can't write {}: {}", category, e);
            return Err(Error::StoreUnavailable(e.to_string()));
        }

        debug!("{}: loaded {} addons", category, kept.len());

        Ok(superseded)
    }

    fn write_table(
        conn: &mut Connection,
        category: Category,
        records: &[&AddonRecord],
    ) -> rusqlite::Result<()> {
        let tx = conn.transaction()?;

        trace!("clear {}", category);
        tx.execute(&format!("DELETE FROM {}", category.table()), [])?;

        {
            let mut st = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                category.table(),
                schema::ADDON_COLUMNS
            ))?;

            for record in records {
                st.execute(params![
                    record.name,
                    record.category,
                    record.version,
                    record.author,
                    record.file_path.to_string_lossy().into_owned(),
                    record.interface_id,
                    join_dependencies(&record.dependencies),
                ])?;
            }
        }

        tx.commit()
    }

    pub fn all(&self, category: Category) -> Result<Vec<StoredAddon>> {
        trace!("list {}", category);

        let conn = self.connection()?;
        let mut st = conn.prepare(&format!(
            "SELECT rowid, {} FROM {} ORDER BY rowid",
            schema::ADDON_COLUMNS,
            category.table()
        ))?;

        let mut rows = st.query([])?;
        let mut result = Vec::new();

        while let Some(row) = rows.next()? {
            result.push(Self::_get_addon(row)?);
        }

        Ok(result)
    }

    /// Case-insensitive substring search over author, category and name,
    /// folding case beyond ASCII.
    /// Every whitespace-separated term is matched on its own and the results
    /// are unioned in term order, each row at most once. An empty query
    /// returns the whole table.
    pub fn search(&self, category: Category, query: &str) -> Result<Vec<StoredAddon>> {
        let terms: Vec<&str> = query.split_whitespace().collect();

        if terms.is_empty() {
            return self.all(category);
        }

        let conn = self.connection()?;
        let mut st = conn.prepare(&format!(
            "SELECT rowid, {} FROM {}
            WHERE {fold}(author) LIKE ?1 ESCAPE '\\'
                OR {fold}(category) LIKE ?1 ESCAPE '\\'
                OR {fold}(name) LIKE ?1 ESCAPE '\\'
            ORDER BY rowid",
            schema::ADDON_COLUMNS,
            category.table(),
            fold = FOLD
        ))?;

        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for term in terms {
            trace!("search {} term='{}'", category, term);

            let mut rows = st.query(params![escape_like(&term.to_lowercase())])?;

            while let Some(row) = rows.next()? {
                let addon = Self::_get_addon(row)?;
                if seen.insert(addon.row_id) {
                    result.push(addon);
                }
            }
        }

        Ok(result)
    }

    pub fn addon(&self, category: Category, row_id: i64) -> Result<Option<StoredAddon>> {
        trace!("get {} row_id={}", category, row_id);

        let conn = self.connection()?;
        let mut st = conn.prepare(&format!(
            "SELECT rowid, {} FROM {} WHERE rowid = ?",
            schema::ADDON_COLUMNS,
            category.table()
        ))?;

        let mut rows = st.query(params![row_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::_get_addon(row)?))
        } else {
            Ok(None)
        }
    }

    /// Rows that declare at least one dependency, in row order.
    pub fn with_dependencies(&self, category: Category) -> Result<Vec<StoredAddon>> {
        trace!("list {} with dependencies", category);

        let conn = self.connection()?;
        let mut st = conn.prepare(&format!(
            "SELECT rowid, {} FROM {} WHERE dependencies != '' ORDER BY rowid",
            schema::ADDON_COLUMNS,
            category.table()
        ))?;

        let mut rows = st.query([])?;
        let mut result = Vec::new();

        while let Some(row) = rows.next()? {
            result.push(Self::_get_addon(row)?);
        }

        Ok(result)
    }

    /// Releases the database. Every later call, a second `close` included,
    /// fails with `Error::StoreClosed`.
    pub fn close(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(Error::StoreClosed)?;

        info!("closing '{}'", self.db_path.to_string_lossy());

        conn.close().map_err(|(_, e)| Error::from(e))
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!(
                "'{}' dropped without close",
                self.db_path.to_string_lossy()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn record(name: &str, author: &str, file: &str) -> AddonRecord {
        AddonRecord {
            name: name.to_string(),
            author: author.to_string(),
            version: "1.0".to_string(),
            file_path: PathBuf::from(file),
            ..Default::default()
        }
    }

    fn names(addons: &[StoredAddon]) -> Vec<&str> {
        addons.iter().map(|a| a.record.name.as_str()).collect()
    }

    fn loaded(dir: &TempDir) -> Store {
        let mut store = Store::open(dir.path()).unwrap();

        let mut unmanaged = record("Loose Ends", "Nobody", "/p/c.plugin");
        unmanaged.category = crate::addon::UNMANAGED.to_string();

        store
            .replace_all(
                Category::PluginsInstalled,
                &[
                    record("Foo Panel", "Alice", "/p/a.plugincompendium"),
                    record("Bar Tools", "Garan", "/p/b.plugincompendium"),
                    unmanaged,
                    record("Quux", "foo_maker", "/p/d.plugincompendium"),
                ],
            )
            .unwrap();

        store
    }

    #[test]
    fn open_is_idempotent() {
        let dir = TempDir::new().unwrap();

        let mut store = Store::open(dir.path()).unwrap();
        store.close().unwrap();

        let mut store = Store::open(dir.path()).unwrap();
        assert!(store.all(Category::ThemesDdoInstalled).unwrap().is_empty());
        store.close().unwrap();

        assert!(dir.path().join(STORE_FILE).is_file());
    }

    #[test]
    fn empty_query_returns_all_in_insertion_order() {
        let dir = TempDir::new().unwrap();
        let mut store = loaded(&dir);

        let all = store.search(Category::PluginsInstalled, "").unwrap();
        assert_eq!(names(&all), vec!["Foo Panel", "Bar Tools", "Loose Ends", "Quux"]);
        assert_eq!(all, store.search(Category::PluginsInstalled, "   ").unwrap());

        store.close().unwrap();
    }

    #[test]
    fn no_match_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = loaded(&dir);

        assert!(store
            .search(Category::PluginsInstalled, "ZZZ_NOMATCH")
            .unwrap()
            .is_empty());

        store.close().unwrap();
    }

    #[test]
    fn terms_are_ored_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let mut store = loaded(&dir);

        // "foo" hits Foo Panel by name and Quux by author, "bar" hits Bar Tools
        let result = store.search(Category::PluginsInstalled, "foo bar FOO").unwrap();
        assert_eq!(names(&result), vec!["Foo Panel", "Quux", "Bar Tools"]);

        let ids: HashSet<i64> = result.iter().map(|a| a.row_id).collect();
        assert_eq!(ids.len(), result.len());

        let unmanaged = store.search(Category::PluginsInstalled, "unmanaged").unwrap();
        assert_eq!(names(&unmanaged), vec!["Loose Ends"]);

        store.close().unwrap();
    }

    #[test]
    fn wildcards_in_terms_are_literal() {
        let dir = TempDir::new().unwrap();
        let mut store = loaded(&dir);

        assert!(store.search(Category::PluginsInstalled, "%").unwrap().is_empty());
        let result = store.search(Category::PluginsInstalled, "o_m").unwrap();
        assert_eq!(names(&result), vec!["Quux"]);

        store.close().unwrap();
    }

    #[test]
    fn replace_all_clears_previous_rows() {
        let dir = TempDir::new().unwrap();
        let mut store = loaded(&dir);

        store
            .replace_all(Category::PluginsInstalled, &[record("Only", "Me", "/p/x.plugin")])
            .unwrap();

        let all = store.all(Category::PluginsInstalled).unwrap();
        assert_eq!(names(&all), vec!["Only"]);
        assert!(store.all(Category::Plugins).unwrap().is_empty());

        store.close().unwrap();
    }

    #[test]
    fn duplicate_file_path_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        let superseded = store
            .replace_all(
                Category::PluginsInstalled,
                &[
                    record("Old", "A", "/p/same.plugin"),
                    record("Other", "B", "/p/other.plugin"),
                    record("New", "A", "/p/same.plugin"),
                ],
            )
            .unwrap();

        assert_eq!(superseded, vec!["/p/same.plugin"]);
        assert_eq!(
            names(&store.all(Category::PluginsInstalled).unwrap()),
            vec!["Other", "New"]
        );

        store.close().unwrap();
    }

    #[test]
    fn remote_catalog_deduplicates_by_interface_id() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        let mut first = record("Bar Tools 1.0", "Garan", "/cache/bar-1.0.zip");
        first.interface_id = "1042".to_string();
        let mut other = record("Panel", "Alice", "/cache/panel.zip");
        other.interface_id = "7".to_string();
        let mut second = record("Bar Tools 2.0", "Garan", "/cache/bar-2.0.zip");
        second.interface_id = "1042".to_string();

        let superseded = store
            .replace_all(Category::Plugins, &[first, other, second])
            .unwrap();

        assert_eq!(superseded, vec!["1042"]);
        let all = store.all(Category::Plugins).unwrap();
        assert_eq!(names(&all), vec!["Panel", "Bar Tools 2.0"]);
        assert_eq!(all[1].record.file_path, PathBuf::from("/cache/bar-2.0.zip"));

        store.close().unwrap();
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        store
            .replace_all(
                Category::PluginsInstalled,
                &[
                    record("Karte", "M\u{fc}ller", "/p/k.plugin"),
                    record("\u{c9}LAN", "Zed", "/p/e.plugin"),
                ],
            )
            .unwrap();

        let hits = store.search(Category::PluginsInstalled, "m\u{fc}ller").unwrap();
        assert_eq!(names(&hits), vec!["Karte"]);
        let hits = store.search(Category::PluginsInstalled, "M\u{dc}LLER").unwrap();
        assert_eq!(names(&hits), vec!["Karte"]);
        let hits = store.search(Category::PluginsInstalled, "\u{e9}lan").unwrap();
        assert_eq!(names(&hits), vec!["\u{c9}LAN"]);

        store.close().unwrap();
    }

    #[test]
    fn failed_write_is_unavailable_and_keeps_store_open() {
        let dir = TempDir::new().unwrap();
        let mut store = loaded(&dir);

        let other = Connection::open(store.path()).unwrap();
        other
            .execute_batch(&format!("DROP TABLE {}", Category::PluginsInstalled.table()))
            .unwrap();
        other.close().unwrap();

        assert!(matches!(
            store.replace_all(Category::PluginsInstalled, &[record("A", "B", "/p/a.plugin")]),
            Err(Error::StoreUnavailable(_))
        ));
        assert!(store.is_open());
        assert!(store.all(Category::Plugins).unwrap().is_empty());

        store.close().unwrap();
    }

    #[test]
    fn dependencies_round_trip_through_storage() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        let mut dependent = record("Dependent", "A", "/p/dep.plugincompendium");
        dependent.dependencies = vec!["10".to_string(), "20".to_string()];

        store
            .replace_all(
                Category::PluginsInstalled,
                &[record("Plain", "A", "/p/plain.plugin"), dependent.clone()],
            )
            .unwrap();

        let with = store.with_dependencies(Category::PluginsInstalled).unwrap();
        assert_eq!(with.len(), 1);
        assert_eq!(with[0].record, dependent);

        let fetched = store
            .addon(Category::PluginsInstalled, with[0].row_id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched, with[0]);

        store.close().unwrap();
    }

    #[test]
    fn operations_after_close_fail() {
        let dir = TempDir::new().unwrap();
        let mut store = loaded(&dir);

        store.close().unwrap();

        assert!(!store.is_open());
        assert!(matches!(
            store.search(Category::PluginsInstalled, ""),
            Err(Error::StoreClosed)
        ));
        assert!(matches!(
            store.replace_all(Category::PluginsInstalled, &[]),
            Err(Error::StoreClosed)
        ));
        assert!(matches!(store.close(), Err(Error::StoreClosed)));
    }

    #[test]
    fn unopenable_path_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();

        assert!(matches!(
            Store::open(&blocker.join("settings")),
            Err(Error::StoreUnavailable(_))
        ));
    }
}
