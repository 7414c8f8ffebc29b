//! Plugins compiled into the launcher

pub mod applauncher;
pub mod calculator;
pub mod plugin_status;

pub use applauncher::AppLauncher;
pub use calculator::Calculator;
pub use plugin_status::PluginStatus;

use crate::plugins::{ CatalogHandle, Plugin };

/// Built-in plugins, default plugin first
pub fn builtin_plugins(catalog: CatalogHandle) -> Vec<Box<dyn Plugin>> {
    vec![Box::new(AppLauncher::new()), Box::new(Calculator::new()), Box::new(PluginStatus::new(catalog))]
}
