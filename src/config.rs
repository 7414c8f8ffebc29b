use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;

// Directory names under the user's configuration root
pub const APP_NAME: &str = "quickbar";
pub const PLUGIN_DIR_NAME: &str = "plugins";
pub const THEME_FILE_NAME: &str = "theme.toml";

// Extension files
pub const PLUGIN_FILE_SUFFIX: &str = "lua";
pub const PLUGIN_ENTRY_POINT: &str = "new";
pub const HOST_TABLE_NAME: &str = "quickbar";

// Interaction loop
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

// Lua state limits
pub const LUA_MEMORY_LIMIT: usize = 32 * 1024 * 1024;
pub const CALCULATOR_MEMORY_LIMIT: usize = 1024 * 1024;

// Background HTTP requests issued on behalf of extensions
pub const HTTP_TIMEOUT_SECS: u64 = 10;
pub const HTTP_USER_AGENT: &str = concat!("quickbar/", env!("CARGO_PKG_VERSION"));

#[derive(Parser, Debug)]
#[command(author, version, about = "A keyword-routed launcher with Lua extension plugins")]
pub struct Cli {
    /// Comma-separated list of optional plugins to enable
    #[arg(long, default_value = "")]
    pub plugins: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Enable informational logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Extension directory (default: <config>/quickbar/plugins)
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,

    /// Theme file (default: <config>/quickbar/theme.toml)
    #[arg(long)]
    pub theme: Option<PathBuf>,

    /// Debounce interval between the last keystroke and the plugin query
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
    pub debounce_ms: u64,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Enable flags given with `--plugins`
    pub fn enabled_flags(&self) -> HashSet<String> {
        parse_enabled_flags(&self.plugins)
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir
            .clone()
            .unwrap_or_else(|| config_root().join(PLUGIN_DIR_NAME))
    }

    pub fn theme_path(&self) -> PathBuf {
        self.theme
            .clone()
            .unwrap_or_else(|| config_root().join(THEME_FILE_NAME))
    }
}

/// `<config>/quickbar`, falling back to `./.config/quickbar` when no config root is known
pub fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(APP_NAME)
}

pub fn parse_enabled_flags(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|flag| !flag.is_empty())
        .map(str::to_string)
        .collect()
}
