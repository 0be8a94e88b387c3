use rusqlite::{params, Connection, OptionalExtension, Result};

use crate::schema;

const VERSION_KEY: &str = "schema";

#[derive(Debug, PartialEq)]
enum Layout {
    Fresh,
    Current,
    Foreign(u32),
}

fn layout(conn: &Connection) -> Result<Layout> {
    let stored: Option<u32> = conn
        .query_row(
            "SELECT value FROM AddonCache WHERE key = ?1",
            params![VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match stored {
        None => Layout::Fresh,
        Some(v) if v == schema::SCHEMA_VERSION => Layout::Current,
        Some(v) => Layout::Foreign(v),
    })
}

/// Brings the addon tables in `tables` up on `conn`. A fresh cache gets the
/// tables and the version stamp in one transaction; a current one only gains
/// tables it is missing. Returns `false`, touching nothing, when the cache
/// was written by a different schema version.
pub fn ensure_schema(conn: &mut Connection, tables: &str) -> Result<bool> {
    conn.execute_batch(schema::META_SCHEMA)?;

    match layout(conn)? {
        Layout::Current => {
            trace!("cache schema v{} in place", schema::SCHEMA_VERSION);
            conn.execute_batch(tables)?;
        }
        Layout::Foreign(found) => {
            error!(
                "addon cache has schema v{}, this build reads v{}",
                found,
                schema::SCHEMA_VERSION
            );
            return Ok(false);
        }
        Layout::Fresh => {
            debug!("new addon cache, schema v{}", schema::SCHEMA_VERSION);

            let tx = conn.transaction()?;
            tx.execute_batch(tables)?;
            tx.execute(
                "INSERT INTO AddonCache (key, value) VALUES (?1, ?2)",
                params![VERSION_KEY, schema::SCHEMA_VERSION],
            )?;
            tx.commit()?;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cache_is_stamped_and_reopens() {
        let mut conn = Connection::open_in_memory().unwrap();
        let tables = schema::store_schema();

        assert!(ensure_schema(&mut conn, &tables).unwrap());
        assert_eq!(layout(&conn).unwrap(), Layout::Current);
        assert!(ensure_schema(&mut conn, &tables).unwrap());
    }

    #[test]
    fn foreign_version_is_left_alone() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(schema::META_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO AddonCache (key, value) VALUES ('schema', ?1)",
            params![schema::SCHEMA_VERSION + 1],
        )
        .unwrap();

        assert!(!ensure_schema(&mut conn, &schema::store_schema()).unwrap());
        assert_eq!(
            layout(&conn).unwrap(),
            Layout::Foreign(schema::SCHEMA_VERSION + 1)
        );

        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name = 'plugins_installed'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
