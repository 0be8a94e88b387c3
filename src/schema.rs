use crate::addon::Category;

pub const SCHEMA_VERSION: u32 = 1;

pub const META_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS AddonCache (
    key TEXT PRIMARY KEY,
    value);
";

/// Column order shared by every category table.
pub const ADDON_COLUMNS: &str =
    "name, category, version, author, file_path, interface_id, dependencies";

pub fn category_schema(category: Category) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({});",
        category.table(),
        ADDON_COLUMNS
    )
}

pub fn store_schema() -> String {
    Category::ALL
        .iter()
        .map(|c| category_schema(*c))
        .collect::<Vec<_>>()
        .join("\n")
}
