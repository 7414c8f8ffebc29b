//! Plugin status plugin (`!p`)
//!
//! Lists every known plugin with its keyword and whether it is enabled.
//! Reads the registry catalog, never the registry itself.

use crate::plugins::registry::CatalogHandle;
use crate::plugins::{ Command, Plugin, PluginError, PluginEvent, PluginMetadata, ResultItem };

pub const KEYWORD: &str = "!p";
pub const INFO_ID: &str = "pm_info_flag";

pub struct PluginStatus {
    metadata: PluginMetadata,
    catalog: CatalogHandle,
}

impl PluginStatus {
    pub fn new(catalog: CatalogHandle) -> Self {
        Self {
            metadata: PluginMetadata::new("Plugin Manager", KEYWORD)
                .with_description("Show which plugins are enabled")
                .mandatory(),
            catalog,
        }
    }

    fn listing(&self) -> Result<Vec<ResultItem>, PluginError> {
        let catalog = self.catalog
            .read()
            .map_err(|e| PluginError::Other(format!("Plugin catalog unavailable: {}", e)))?;

        let mut mandatory = Vec::new();
        let mut optional = Vec::new();

        for meta in &catalog.enabled {
            let item = ResultItem::new(
                meta.name.clone(),
                format!("Keyword: {} | Status: enabled", meta.keyword),
                meta.keyword.clone()
            );
            if meta.mandatory {
                mandatory.push(item);
            } else {
                optional.push(item);
            }
        }

        for meta in &catalog.disabled {
            optional.push(
                ResultItem::new(
                    meta.name.clone(),
                    format!("Keyword: {} | Status: disabled (use --plugins={})", meta.keyword, meta.flag_name()),
                    meta.keyword.clone()
                )
            );
        }

        mandatory.sort_by_key(|item| item.title.to_lowercase());
        optional.sort_by_key(|item| item.title.to_lowercase());

        let mut results = mandatory;
        results.extend(optional);
        results.push(
            ResultItem::new(
                "Info",
                "Use --plugins=flag1,flag2,... at startup to enable optional plugins.",
                INFO_ID
            )
        );

        Ok(results)
    }
}

impl Plugin for PluginStatus {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn get_results(&mut self, query: &str) -> Result<Vec<ResultItem>, PluginError> {
        let results = self.listing()?;

        let filter = query.trim().to_lowercase();
        if filter.is_empty() {
            return Ok(results);
        }

        Ok(
            results
                .into_iter()
                .filter(|item| {
                    item.identifier == INFO_ID ||
                        item.title.to_lowercase().contains(&filter) ||
                        item.description.to_lowercase().contains(&filter)
                })
                .collect()
        )
    }

    fn execute(&mut self, _identifier: &str) -> Command {
        Command::None
    }

    fn update(self: Box<Self>, _event: &PluginEvent) -> (Box<dyn Plugin>, Command) {
        (self, Command::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::registry::Catalog;
    use std::sync::{ Arc, RwLock };

    fn catalog() -> CatalogHandle {
        Arc::new(
            RwLock::new(Catalog {
                enabled: vec![
                    PluginMetadata::new("calculator", "=").mandatory(),
                    PluginMetadata::new("Application Launcher", "!a").mandatory().default_plugin(),
                    PluginMetadata::new("Hello", "!hello").with_flag("hello")
                ],
                disabled: vec![PluginMetadata::new("Wikipedia", "!w").with_flag("wikipedia")],
            })
        )
    }

    #[test]
    fn test_listing_order() {
        let mut status = PluginStatus::new(catalog());
        let results = status.get_results("").unwrap();
        let titles: Vec<&str> = results
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Application Launcher", "calculator", "Hello", "Wikipedia", "Info"]);
        assert!(results[3].description.contains("--plugins=wikipedia"));
    }

    #[test]
    fn test_filter_keeps_info_entry() {
        let mut status = PluginStatus::new(catalog());
        let results = status.get_results("  DISABLED ").unwrap();
        let ids: Vec<&str> = results
            .iter()
            .map(|r| r.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["!w", INFO_ID]);

        let results = status.get_results("zzz").unwrap();
        assert_eq!(results.len(), 1);
        assert!(status.execute("!w").is_none());
    }

    #[test]
    fn test_sees_later_registrations() {
        let handle = catalog();
        let mut status = PluginStatus::new(handle.clone());
        handle.write().unwrap().enabled.push(PluginMetadata::new("Nix", "!n").with_flag("nixshell"));
        assert!(status.get_results("nix").unwrap().iter().any(|r| r.identifier == "!n"));
    }
}
