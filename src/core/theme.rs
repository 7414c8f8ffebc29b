// Quickbar - Theme
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Base16 color theme shared between the front end and Lua extensions
//!
//! The theme lives behind a [`ThemeHandle`] created once at startup. Every
//! component that renders anything receives a clone of the handle, so a theme
//! change is visible to all of them, extensions included.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::{log_info, log_warn};

/// Shared, process-lifetime theme handle
pub type ThemeHandle = Arc<RwLock<Theme>>;

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse `#rrggbb` or `rrggbb`
    pub fn parse_hex(value: &str) -> Option<Self> {
        let hex = value.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Rgb(r, g, b))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    /// ANSI truecolor foreground escape
    pub fn fg(self) -> String {
        format!("\x1b[38;2;{};{};{}m", self.0, self.1, self.2)
    }

    /// ANSI truecolor background escape
    pub fn bg(self) -> String {
        format!("\x1b[48;2;{};{};{}m", self.0, self.1, self.2)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub const THEME_KEYS: [&str; 16] = [
    "base00", "base01", "base02", "base03", "base04", "base05", "base06", "base07",
    "base08", "base09", "base0a", "base0b", "base0c", "base0d", "base0e", "base0f",
];

/// Base16 palette
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub base00: Rgb,
    pub base01: Rgb,
    pub base02: Rgb,
    pub base03: Rgb,
    pub base04: Rgb,
    pub base05: Rgb,
    pub base06: Rgb,
    pub base07: Rgb,
    pub base08: Rgb,
    pub base09: Rgb,
    pub base0a: Rgb,
    pub base0b: Rgb,
    pub base0c: Rgb,
    pub base0d: Rgb,
    pub base0e: Rgb,
    pub base0f: Rgb,
}

impl Default for Theme {
    /// Catppuccin Mocha
    fn default() -> Self {
        Self {
            base00: Rgb(0x1e, 0x1e, 0x2e),
            base01: Rgb(0x18, 0x18, 0x25),
            base02: Rgb(0x31, 0x32, 0x44),
            base03: Rgb(0x45, 0x47, 0x5a),
            base04: Rgb(0x58, 0x5b, 0x70),
            base05: Rgb(0xcd, 0xd6, 0xf4),
            base06: Rgb(0xf5, 0xe0, 0xdc),
            base07: Rgb(0xb4, 0xbe, 0xfe),
            base08: Rgb(0xf3, 0x8b, 0xa8),
            base09: Rgb(0xfa, 0xb3, 0x87),
            base0a: Rgb(0xf9, 0xe2, 0xaf),
            base0b: Rgb(0xa6, 0xe3, 0xa1),
            base0c: Rgb(0x94, 0xe2, 0xd5),
            base0d: Rgb(0x89, 0xb4, 0xfa),
            base0e: Rgb(0xcb, 0xa6, 0xf7),
            base0f: Rgb(0xf2, 0xcd, 0xcd),
        }
    }
}

impl Theme {
    /// Look up a color by its base16 key (case-insensitive)
    pub fn get(&self, key: &str) -> Option<Rgb> {
        let color = match key.to_lowercase().as_str() {
            "base00" => self.base00,
            "base01" => self.base01,
            "base02" => self.base02,
            "base03" => self.base03,
            "base04" => self.base04,
            "base05" => self.base05,
            "base06" => self.base06,
            "base07" => self.base07,
            "base08" => self.base08,
            "base09" => self.base09,
            "base0a" => self.base0a,
            "base0b" => self.base0b,
            "base0c" => self.base0c,
            "base0d" => self.base0d,
            "base0e" => self.base0e,
            "base0f" => self.base0f,
            _ => return None,
        };
        Some(color)
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Rgb> {
        let slot = match key {
            "base00" => &mut self.base00,
            "base01" => &mut self.base01,
            "base02" => &mut self.base02,
            "base03" => &mut self.base03,
            "base04" => &mut self.base04,
            "base05" => &mut self.base05,
            "base06" => &mut self.base06,
            "base07" => &mut self.base07,
            "base08" => &mut self.base08,
            "base09" => &mut self.base09,
            "base0a" => &mut self.base0a,
            "base0b" => &mut self.base0b,
            "base0c" => &mut self.base0c,
            "base0d" => &mut self.base0d,
            "base0e" => &mut self.base0e,
            "base0f" => &mut self.base0f,
            _ => return None,
        };
        Some(slot)
    }

    /// Build a theme from raw key/value pairs, falling back per key
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let mut theme = Theme::default();

        for key in THEME_KEYS {
            let Some(raw) = pairs.get(key) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            match Rgb::parse_hex(raw) {
                Some(color) => {
                    if let Some(slot) = theme.slot_mut(key) {
                        *slot = color;
                    }
                }
                None => {
                    log_warn!("Invalid hex color '{}' for theme key {}, using default", raw, key);
                }
            }
        }

        theme
    }

    pub fn into_handle(self) -> ThemeHandle {
        Arc::new(RwLock::new(self))
    }
}

/// Load the theme file, never failing
///
/// A missing, unreadable or unparseable file yields the default theme; a
/// missing or invalid key yields that key's default color.
pub fn load_theme(path: &Path) -> Theme {
    if !path.exists() {
        log_info!("Theme file {:?} not found, using default theme", path);
        return Theme::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log_warn!("Failed to read theme file {:?}: {}, using default theme", path, e);
            return Theme::default();
        }
    };

    let table: toml::Table = match toml::from_str(&content) {
        Ok(table) => table,
        Err(e) => {
            log_warn!("Failed to parse theme file {:?}: {}, using default theme", path, e);
            return Theme::default();
        }
    };

    let pairs: HashMap<String, String> = table
        .into_iter()
        .filter_map(|(key, value)| match value {
            toml::Value::String(s) => Some((key.to_lowercase(), s)),
            other => {
                log_warn!("Theme key {} is not a string ({}), ignoring", key, other.type_str());
                None
            }
        })
        .collect();

    log_info!("Theme loaded from {:?}", path);
    Theme::from_pairs(&pairs)
}
