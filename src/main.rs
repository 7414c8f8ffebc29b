/*
 * Quickbar - keyword-routed launcher with Lua extension plugins
 * Copyright (C) 2025 Akaere Networks
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

use std::io;
use std::time::Duration;

use anyhow::{ Context, Result };
use clap::Parser;

use quickbar::config::Cli;
use quickbar::core::{ load_theme, logger };
use quickbar::launcher::{ frontend, Launcher };
use quickbar::plugins::{ load_plugins, PluginRegistry };
use quickbar::services::builtin_plugins;
use quickbar::{
    log_debug,
    log_info,
    log_init_failed,
    log_init_ok,
    log_init_ok_with_details,
    log_init_warn,
    log_notice,
    log_warn,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize logging
    logger
        ::init_from_args(args.debug, args.verbose, args.log_file.clone(), args.no_color)
        .context("Failed to initialize logger")?;
    log_info!("Starting quickbar v{}", env!("CARGO_PKG_VERSION"));

    let theme_path = args.theme_path();
    let theme = load_theme(&theme_path).into_handle();
    log_init_ok_with_details!("Theme", &format!("{:?}", theme_path));

    let flags = args.enabled_flags();
    log_debug!("Enabled plugin flags: {:?}", flags);

    let mut registry = PluginRegistry::new();

    let mut candidates = builtin_plugins(registry.catalog());
    let plugin_dir = args.plugin_dir();
    match load_plugins(&plugin_dir, &theme) {
        Ok(extensions) => {
            log_init_ok_with_details!(
                "Extension plugins",
                &format!("{} loaded from {:?}", extensions.len(), plugin_dir)
            );
            candidates.extend(extensions);
        }
        Err(e) => {
            log_init_warn!("Extension plugins", &format!("{:#}", e));
        }
    }

    // Optional plugins without their flag are only listed, never instantiated in the registry
    for plugin in candidates {
        let metadata = plugin.metadata().clone();
        if metadata.is_enabled_by(&flags) {
            if let Err(e) = registry.register(plugin) {
                log_init_failed!(&format!("plugin '{}'", metadata.name), &e.to_string());
                return Err(e).with_context(|| format!("Failed to register plugin '{}'", metadata.name));
            }
        } else {
            log_info!("Plugin '{}' ({}) is disabled", metadata.name, metadata.keyword);
            if let Err(e) = registry.register_disabled_metadata(metadata) {
                log_warn!("Ignoring disabled plugin: {}", e);
            }
        }
    }
    log_init_ok_with_details!("Plugin registry", &format!("{} plugins enabled", registry.len()));

    let launcher = Launcher::new(registry, theme, Duration::from_millis(args.debounce_ms));
    frontend::spawn_stdin_reader(launcher.sender()).context("Failed to start input reader")?;
    log_init_ok!("Launcher");

    let use_color = !args.no_color && atty::is(atty::Stream::Stdout);
    let mut stdout = io::stdout();
    frontend::run(launcher, &mut stdout, use_color).await?;

    log_notice!("Quickbar exited");
    Ok(())
}
