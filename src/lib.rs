//! # Quickbar
//!
//! A keyword-routed launcher. The text typed into the bar selects a plugin by
//! its keyword prefix (`!w mars` goes to the plugin registered as `!w`), and
//! everything without a known prefix goes to the default plugin.
//!
//! Plugins come from two places:
//! - Built-ins compiled into the binary (application launcher, calculator,
//!   plugin status)
//! - Lua extension files loaded at startup from the plugin directory
//!
//! Optional plugins stay disabled unless their flag is passed with
//! `--plugins=flag1,flag2`.
//!
//! ## Library usage
//!
//! ```no_run
//! use std::time::Duration;
//! use quickbar::core::Theme;
//! use quickbar::launcher::{ frontend, Launcher };
//! use quickbar::plugins::PluginRegistry;
//! use quickbar::services::builtin_plugins;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = PluginRegistry::new();
//!     for plugin in builtin_plugins(registry.catalog()) {
//!         registry.register(plugin)?;
//!     }
//!
//!     let launcher = Launcher::new(registry, Theme::default().into_handle(), Duration::from_millis(200));
//!     frontend::spawn_stdin_reader(launcher.sender())?;
//!     frontend::run(launcher, &mut std::io::stdout(), false).await
//! }
//! ```

pub mod config;
pub mod core;
pub mod launcher;
pub mod plugins;
pub mod services;

pub use launcher::Launcher;
pub use plugins::{ Command, Plugin, PluginEvent, PluginMetadata, PluginRegistry, ResultItem };
