use crate::addon::Category;
use crate::error::Result;
use crate::store::Store;

pub struct DependencyResolver<'a> {
    store: &'a Store,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(store: &'a Store) -> DependencyResolver<'a> {
        DependencyResolver { store }
    }

    /// Names of the addons in `category` that list `interface_id` among
    /// their dependencies, distinct, in table order.
    pub fn find_dependents(&self, category: Category, interface_id: &str) -> Result<Vec<String>> {
        let interface_id = interface_id.trim();

        if interface_id.is_empty() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = Vec::new();

        for addon in self.store.with_dependencies(category)? {
            if addon.record.depends_on(interface_id) && !names.contains(&addon.record.name) {
                names.push(addon.record.name);
            }
        }

        debug!(
            "{}: {} addons depend on '{}'",
            category,
            names.len(),
            interface_id
        );

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use tempfile::TempDir;

    use crate::addon::AddonRecord;

    fn addon(name: &str, id: &str, dependencies: &[&str]) -> AddonRecord {
        AddonRecord {
            name: name.to_string(),
            interface_id: id.to_string(),
            file_path: PathBuf::from(format!("/p/{}.plugincompendium", name)),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn dependents_follow_declared_edges_only() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        let records = vec![
            addon("Base", "1", &[]),
            addon("Lib", "2", &["1"]),
            addon("App", "3", &["2", "1"]),
            addon("Other", "4", &["12"]),
        ];
        store.replace_all(Category::PluginsInstalled, &records).unwrap();

        {
            let resolver = DependencyResolver::new(&store);

            for b in &records {
                let dependents = resolver
                    .find_dependents(Category::PluginsInstalled, &b.interface_id)
                    .unwrap();

                for a in &records {
                    assert_eq!(
                        dependents.contains(&a.name),
                        a.dependencies.contains(&b.interface_id),
                        "{} -> {}",
                        a.name,
                        b.name
                    );
                }
            }

            assert_eq!(
                resolver.find_dependents(Category::PluginsInstalled, "1").unwrap(),
                vec!["Lib", "App"]
            );
            assert!(resolver
                .find_dependents(Category::PluginsInstalled, "")
                .unwrap()
                .is_empty());
        }

        store.close().unwrap();
    }

    #[test]
    fn dependents_are_distinct_by_name() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        let mut twin = addon("Twin", "7", &["1"]);
        twin.file_path = PathBuf::from("/elsewhere/Twin.plugincompendium");
        store
            .replace_all(Category::PluginsInstalled, &[addon("Twin", "6", &["1"]), twin])
            .unwrap();
        assert_eq!(store.all(Category::PluginsInstalled).unwrap().len(), 2);

        assert_eq!(
            DependencyResolver::new(&store)
                .find_dependents(Category::PluginsInstalled, "1")
                .unwrap(),
            vec!["Twin"]
        );

        store.close().unwrap();
    }
}
