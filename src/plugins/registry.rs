//! Plugin registry and query router
//!
//! Owns every enabled plugin instance, remembers the metadata of disabled
//! plugins and decides, for each query, which plugin is active.

use std::collections::HashMap;
use std::sync::{ Arc, RwLock };

use crate::plugins::contract::{ Command, Plugin, PluginError, PluginEvent, PluginMetadata, ResultItem };
use crate::{ log_debug, log_info, log_warn };

/// Shared snapshot of registered plugin metadata
pub type CatalogHandle = Arc<RwLock<Catalog>>;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Enabled plugins in registration order
    pub enabled: Vec<PluginMetadata>,
    pub disabled: Vec<PluginMetadata>,
}

/// Outcome of routing a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub keyword: Option<String>,
    pub switched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin '{name}' has an empty keyword")]
    EmptyKeyword { name: String },
    #[error("keyword '{keyword}' from plugin '{name}' is already registered")]
    DuplicateKeyword { keyword: String, name: String },
    #[error("no active plugin available to handle query")]
    NoActivePlugin,
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

pub struct PluginRegistry {
    instances: HashMap<String, Box<dyn Plugin>>,
    metadata: HashMap<String, PluginMetadata>,
    disabled: HashMap<String, PluginMetadata>,
    /// Registration order, used by `init_all`
    order: Vec<String>,
    /// Longest keyword first; ties keep registration order
    sorted_keywords: Vec<String>,
    default_keyword: Option<String>,
    active_keyword: Option<String>,
    catalog: CatalogHandle,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
            metadata: HashMap::new(),
            disabled: HashMap::new(),
            order: Vec::new(),
            sorted_keywords: Vec::new(),
            default_keyword: None,
            active_keyword: None,
            catalog: Arc::new(RwLock::new(Catalog::default())),
        }
    }

    /// Register an enabled plugin
    ///
    /// # Errors
    /// Fails when the keyword is empty or already taken. The existing
    /// instance is left untouched in that case.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), RegistryError> {
        let metadata = plugin.metadata().clone();
        let keyword = metadata.keyword.clone();

        if keyword.is_empty() {
            return Err(RegistryError::EmptyKeyword { name: metadata.name });
        }
        if self.metadata.contains_key(&keyword) {
            return Err(RegistryError::DuplicateKeyword { keyword, name: metadata.name });
        }

        self.instances.insert(keyword.clone(), plugin);
        self.metadata.insert(keyword.clone(), metadata.clone());
        self.disabled.remove(&keyword);
        self.order.push(keyword.clone());
        self.sorted_keywords.push(keyword.clone());
        self.sorted_keywords.sort_by(|a, b| b.len().cmp(&a.len()));

        log_info!("Registered plugin '{}' with keyword '{}'", metadata.name, keyword);

        if metadata.default {
            if let Some(previous) = &self.default_keyword {
                log_warn!("Plugin '{}' overrides previous default plugin '{}'", metadata.name, previous);
            }
            self.default_keyword = Some(keyword.clone());
            if self.active_keyword.is_none() {
                self.active_keyword = Some(keyword);
            }
        }

        self.refresh_catalog();
        Ok(())
    }

    /// Record a disabled plugin so it can still be listed
    pub fn register_disabled_metadata(&mut self, metadata: PluginMetadata) -> Result<(), RegistryError> {
        if metadata.keyword.is_empty() {
            return Err(RegistryError::EmptyKeyword { name: metadata.name });
        }
        if self.metadata.contains_key(&metadata.keyword) {
            return Ok(());
        }
        if self.disabled.contains_key(&metadata.keyword) {
            log_warn!(
                "Keyword '{}' is already recorded as disabled, overwriting with '{}'",
                metadata.keyword,
                metadata.name
            );
        }

        log_debug!("Recorded disabled plugin '{}' ({})", metadata.name, metadata.keyword);
        self.disabled.insert(metadata.keyword.clone(), metadata);
        self.refresh_catalog();
        Ok(())
    }

    /// Resolve the plugin responsible for `raw`
    ///
    /// The active keyword only changes when the route switches.
    pub fn determine_active_plugin(&mut self, raw: &str) -> Route {
        let query = raw.trim();
        let resolved = self.sorted_keywords
            .iter()
            .find(|keyword| keyword_matches(query, keyword))
            .cloned()
            .or_else(|| self.default_keyword.clone());

        let switched = resolved != self.active_keyword;
        if switched {
            log_debug!("Active plugin switched from {:?} to {:?}", self.active_keyword, resolved);
            self.active_keyword = resolved.clone();
        }

        Route { keyword: resolved, switched }
    }

    /// Forward the effective query to the active plugin
    pub fn get_results(&mut self, raw: &str) -> Result<Vec<ResultItem>, RegistryError> {
        let keyword = self.current_keyword().ok_or(RegistryError::NoActivePlugin)?;
        let is_default = self.default_keyword.as_deref() == Some(keyword.as_str());
        let query = effective_query(raw, &keyword, is_default);

        let plugin = self.instances.get_mut(&keyword).ok_or(RegistryError::NoActivePlugin)?;
        Ok(plugin.get_results(&query)?)
    }

    pub fn execute(&mut self, identifier: &str) -> Command {
        let Some(keyword) = self.current_keyword() else {
            log_warn!("Execute called for '{}' but no plugin is active", identifier);
            return Command::None;
        };

        match self.instances.get_mut(&keyword) {
            Some(plugin) => plugin.execute(identifier),
            None => Command::None,
        }
    }

    /// Write an updated instance back under its keyword
    pub fn update_plugin_instance(&mut self, plugin: Box<dyn Plugin>) {
        let keyword = plugin.keyword().to_string();
        if !self.metadata.contains_key(&keyword) {
            log_warn!("Dropping update for unregistered keyword '{}'", keyword);
            return;
        }
        self.instances.insert(keyword, plugin);
    }

    /// Hand `event` to the plugin registered under `keyword`
    pub fn deliver(&mut self, keyword: &str, event: &PluginEvent) -> Command {
        let Some(plugin) = self.instances.remove(keyword) else {
            log_debug!("No plugin registered for '{}', event dropped", keyword);
            return Command::None;
        };

        let (plugin, command) = plugin.update(event);
        if plugin.keyword() != keyword {
            log_warn!(
                "Plugin '{}' reported keyword '{}' after update, keeping it under '{}'",
                keyword,
                plugin.keyword(),
                keyword
            );
            self.instances.insert(keyword.to_string(), plugin);
        } else {
            self.update_plugin_instance(plugin);
        }
        command
    }

    pub fn broadcast(&mut self, event: &PluginEvent) -> Command {
        let keywords = self.order.clone();
        Command::batch(keywords.iter().map(|keyword| self.deliver(keyword, event)))
    }

    /// Call `init` on every plugin once, default first
    pub fn init_all(&mut self) -> Command {
        let mut keywords: Vec<String> = Vec::with_capacity(self.order.len());
        if let Some(default) = &self.default_keyword {
            keywords.push(default.clone());
        }
        keywords.extend(
            self.order
                .iter()
                .filter(|keyword| Some(*keyword) != self.default_keyword.as_ref())
                .cloned()
        );

        let mut commands = Vec::with_capacity(keywords.len());
        for keyword in &keywords {
            if let Some(plugin) = self.instances.get_mut(keyword) {
                log_debug!("Initializing plugin '{}'", keyword);
                commands.push(plugin.init());
            }
        }

        Command::batch(commands)
    }

    fn current_keyword(&self) -> Option<String> {
        self.active_keyword.clone().or_else(|| self.default_keyword.clone())
    }

    pub fn active_keyword(&self) -> Option<&str> {
        self.active_keyword.as_deref().or(self.default_keyword.as_deref())
    }

    pub fn default_keyword(&self) -> Option<&str> {
        self.default_keyword.as_deref()
    }

    pub fn active_plugin(&self) -> Option<&dyn Plugin> {
        let keyword = self.active_keyword()?;
        self.instances.get(keyword).map(|plugin| plugin.as_ref())
    }

    pub fn active_view(&self) -> String {
        self.active_plugin()
            .map(|plugin| plugin.view())
            .unwrap_or_default()
    }

    pub fn get_error(&self) -> Option<String> {
        self.active_plugin().and_then(|plugin| plugin.get_error())
    }

    pub fn is_registered(&self, keyword: &str) -> bool {
        self.metadata.contains_key(keyword)
    }

    pub fn enabled_keywords(&self) -> &[String] {
        &self.order
    }

    pub fn disabled_metadata(&self) -> impl Iterator<Item = &PluginMetadata> {
        self.disabled.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn catalog(&self) -> CatalogHandle {
        Arc::clone(&self.catalog)
    }

    fn refresh_catalog(&self) {
        let enabled = self.order
            .iter()
            .filter_map(|keyword| self.metadata.get(keyword).cloned())
            .collect();
        let disabled = self.disabled.values().cloned().collect();

        match self.catalog.write() {
            Ok(mut catalog) => {
                *catalog = Catalog { enabled, disabled };
            }
            Err(e) => log_warn!("Plugin catalog lock poisoned: {}", e),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `query` selects `keyword` when it is the whole query or followed by a space
fn keyword_matches(query: &str, keyword: &str) -> bool {
    match query.strip_prefix(keyword) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

/// Query text as seen by the plugin owning `keyword`
pub fn effective_query(raw: &str, keyword: &str, is_default: bool) -> String {
    let query = raw.trim();
    if is_default || !keyword_matches(query, keyword) {
        return query.to_string();
    }
    query[keyword.len()..].trim().to_string()
}
