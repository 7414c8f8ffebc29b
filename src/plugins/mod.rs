//! Plugin system of the launcher
//!
//! Queries are routed by keyword (`!w`, `=`, ...) to exactly one plugin.
//! Plugins are either built into the binary or Lua extensions loaded at
//! startup from `<config>/quickbar/plugins/*.lua`.
//!
//! # Extension API
//!
//! An extension defines a global `new()` returning a table with a `metadata`
//! table and `get_results(self, query)` / `execute(self, identifier)`
//! functions. `init`, `update(self, event)`, `view` and `get_error` are
//! optional. Host capabilities are reached through the `quickbar` table.

pub mod api;
pub mod contract;
pub mod loader;
pub mod lua_plugin;
pub mod registry;
pub mod sandbox;

pub use contract::{ Command, Key, Plugin, PluginError, PluginEvent, PluginMetadata, ResultItem };
pub use loader::load_plugins;
pub use registry::{ CatalogHandle, PluginRegistry, RegistryError, Route };
