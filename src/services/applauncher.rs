// Quickbar - Application launcher
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Default plugin: fuzzy-ish search over installed desktop applications
//!
//! Desktop entries are scanned once, in a blocking worker, when the plugin is
//! initialized. Until the scan result arrives the plugin answers every query
//! with a loading placeholder.

use std::collections::HashSet;
use std::fs;
use std::path::{ Path, PathBuf };

use anyhow::{ bail, Context, Result };
use serde::{ Deserialize, Serialize };

use crate::core::utils::{ spawn_detached, split_command_line };
use crate::plugins::{ Command, Plugin, PluginError, PluginEvent, PluginMetadata, ResultItem };
use crate::{ log_debug, log_error, log_info, log_warn };

pub const KEYWORD: &str = "!a";
pub const SCAN_EVENT: &str = "desktop_entries";
pub const LOADING_ID: &str = "apps_loading";

const SCORE_NAME_PREFIX: u32 = 100;
const SCORE_NAME_MATCH: u32 = 50;
const SCORE_GENERIC: u32 = 30;
const SCORE_KEYWORD: u32 = 20;
const SCORE_COMMENT: u32 = 10;
const SCORE_EXEC: u32 = 5;

/// Fields of a `[Desktop Entry]` section the launcher cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopEntry {
    pub name: String,
    pub exec: String,
    pub icon: String,
    pub comment: String,
    pub generic_name: String,
    pub keywords: String,
    pub path: String,
}

impl DesktopEntry {
    fn to_result(&self) -> ResultItem {
        ResultItem::new(self.name.clone(), self.comment.clone(), self.path.clone())
    }

    /// Relevance against a lowercase query, 0 when nothing matches
    pub fn score(&self, query: &str) -> u32 {
        let name = self.name.to_lowercase();
        let fields = [
            (self.generic_name.to_lowercase(), SCORE_GENERIC),
            (self.keywords.to_lowercase(), SCORE_KEYWORD),
            (self.comment.to_lowercase(), SCORE_COMMENT),
            (self.exec.to_lowercase(), SCORE_EXEC),
        ];

        let mut score = if name.starts_with(query) {
            SCORE_NAME_PREFIX
        } else if name.contains(query) {
            SCORE_NAME_MATCH
        } else {
            0
        };

        for (field, weight) in fields {
            if field.contains(query) {
                score = score.max(weight);
            }
        }

        score
    }
}

pub struct AppLauncher {
    metadata: PluginMetadata,
    dirs: Vec<PathBuf>,
    apps: Vec<DesktopEntry>,
    loaded: bool,
    error: Option<String>,
}

impl AppLauncher {
    pub fn new() -> Self {
        Self::with_dirs(application_dirs())
    }

    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self {
            metadata: PluginMetadata::new("Application Launcher", KEYWORD)
                .with_description("Launch installed desktop applications")
                .mandatory()
                .default_plugin(),
            dirs,
            apps: Vec::new(),
            loaded: false,
            error: None,
        }
    }

    fn install(&mut self, payload: &serde_json::Value) {
        match serde_json::from_value::<Vec<DesktopEntry>>(payload.clone()) {
            Ok(apps) => {
                log_info!("Application launcher indexed {} application(s)", apps.len());
                self.apps = apps;
                self.loaded = true;
            }
            Err(e) => {
                log_error!("Invalid desktop entry payload: {}", e);
                self.error = Some(format!("Failed to index applications: {}", e));
                self.loaded = true;
            }
        }
    }
}

impl Default for AppLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for AppLauncher {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn init(&mut self) -> Command {
        let dirs = self.dirs.clone();
        Command::task(async move {
            let entries = match tokio::task::spawn_blocking(move || scan_desktop_files(&dirs)).await {
                Ok(entries) => entries,
                Err(e) => {
                    log_error!("Desktop entry scan failed: {}", e);
                    Vec::new()
                }
            };

            match serde_json::to_value(entries) {
                Ok(payload) => Some(PluginEvent::custom(KEYWORD, SCAN_EVENT, payload)),
                Err(e) => {
                    log_error!("Failed to encode desktop entries: {}", e);
                    None
                }
            }
        })
    }

    fn get_results(&mut self, query: &str) -> Result<Vec<ResultItem>, PluginError> {
        if !self.loaded {
            return Ok(vec![ResultItem::new("Loading applications...", "Scanning application directories", LOADING_ID)]);
        }

        let query = query.trim().to_lowercase();
        if query.is_empty() {
            let mut results: Vec<ResultItem> = self.apps.iter().map(DesktopEntry::to_result).collect();
            results.sort_by(|a, b| a.title.cmp(&b.title));
            return Ok(results);
        }

        let mut scored: Vec<(u32, ResultItem)> = self.apps
            .iter()
            .filter_map(|app| {
                let score = app.score(&query);
                (score > 0).then(|| (score, app.to_result()))
            })
            .collect();
        scored.sort_by(|(score_a, a), (score_b, b)| score_b.cmp(score_a).then_with(|| a.title.cmp(&b.title)));

        Ok(scored.into_iter().map(|(_, result)| result).collect())
    }

    fn execute(&mut self, identifier: &str) -> Command {
        let Some(app) = self.apps.iter().find(|app| app.path == identifier) else {
            if identifier != LOADING_ID {
                log_warn!("No application found for {}", identifier);
            }
            return Command::None;
        };

        let parts = split_command_line(&app.exec);
        let Some((program, args)) = parts.split_first() else {
            log_warn!("Could not determine command from Exec '{}' in {}", app.exec, app.path);
            return Command::None;
        };

        match spawn_detached(program, args) {
            Ok(()) => {
                log_info!("Launched {} ({})", app.name, app.path);
                Command::Quit
            }
            Err(e) => {
                log_error!("Failed to launch {}: {:#}", app.name, e);
                self.error = Some(format!("Failed to launch {}: {:#}", app.name, e));
                Command::None
            }
        }
    }

    fn update(mut self: Box<Self>, event: &PluginEvent) -> (Box<dyn Plugin>, Command) {
        if let PluginEvent::Custom { target, name, payload } = event {
            if target == KEYWORD && name == SCAN_EVENT {
                self.install(payload);
            }
        }
        (self, Command::None)
    }

    fn get_error(&self) -> Option<String> {
        self.error.clone()
    }
}

/// XDG application directories, user directory first
pub fn application_dirs() -> Vec<PathBuf> {
    let mut app_dirs: Vec<PathBuf> = Vec::new();
    if let Some(data_dir) = dirs::data_dir() {
        app_dirs.push(data_dir.join("applications"));
    }

    let system_dirs = std::env
        ::var("XDG_DATA_DIRS")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    app_dirs.extend(
        system_dirs
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join("applications"))
    );

    app_dirs
}

/// Walk `dirs` recursively and collect every displayable desktop entry
pub fn scan_desktop_files(dirs: &[PathBuf]) -> Vec<DesktopEntry> {
    let mut apps = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for dir in dirs {
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let entries = match fs::read_dir(&current) {
                Ok(entries) => entries,
                Err(e) => {
                    log_debug!("Skipping inaccessible directory {:?}: {}", current, e);
                    continue;
                }
            };

            for entry in entries.filter_map(|entry| entry.ok()) {
                let path = entry.path();
                // Directory symlinks are not followed, so link cycles cannot loop the walk
                let is_dir = entry
                    .file_type()
                    .map(|file_type| file_type.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|ext| ext.to_str()) != Some("desktop") {
                    continue;
                }

                let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
                if seen.contains(&canonical) {
                    continue;
                }

                match load_desktop_file(&path) {
                    Ok(Some(app)) => {
                        seen.insert(canonical);
                        apps.push(app);
                    }
                    Ok(None) => log_debug!("Hidden desktop entry {:?}", path),
                    Err(e) => log_debug!("Skipping {:?}: {:#}", path, e),
                }
            }
        }
    }

    apps
}

fn load_desktop_file(path: &Path) -> Result<Option<DesktopEntry>> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse_desktop_entry(&content, &path.to_string_lossy())
}

/// Parse the `[Desktop Entry]` section
///
/// Returns `Ok(None)` for entries marked `NoDisplay` or `Hidden`.
pub fn parse_desktop_entry(content: &str, path: &str) -> Result<Option<DesktopEntry>> {
    let mut entry = DesktopEntry {
        path: path.to_string(),
        ..DesktopEntry::default()
    };
    let mut in_section = false;
    let mut hidden = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == "[Desktop Entry]";
            continue;
        }
        if !in_section {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();

        match key.trim() {
            "Name" => entry.name = value,
            "Exec" => entry.exec = value,
            "Icon" => entry.icon = value,
            "Comment" => entry.comment = value,
            "GenericName" => entry.generic_name = value,
            "Keywords" => entry.keywords = value,
            "NoDisplay" | "Hidden" => hidden |= value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    if entry.name.is_empty() || entry.exec.is_empty() {
        bail!("missing Name or Exec in {}", path);
    }

    Ok(if hidden { None } else { Some(entry) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, generic: &str, keywords: &str, comment: &str, exec: &str) -> DesktopEntry {
        DesktopEntry {
            name: name.to_string(),
            exec: exec.to_string(),
            comment: comment.to_string(),
            generic_name: generic.to_string(),
            keywords: keywords.to_string(),
            path: format!("/apps/{}.desktop", name.to_lowercase()),
            ..DesktopEntry::default()
        }
    }

    fn loaded(apps: Vec<DesktopEntry>) -> AppLauncher {
        let mut launcher = AppLauncher::with_dirs(Vec::new());
        launcher.install(&serde_json::to_value(apps).unwrap());
        launcher
    }

    #[test]
    fn test_parse_desktop_entry() {
        let content = "[Desktop Entry]\nName=Firefox\nName[de]=Feuerfuchs\nExec=firefox %u\nComment=Browse the web\nKeywords=internet;www;\n\n[Desktop Action new-window]\nName=New Window\nExec=firefox --new-window\n";
        let app = parse_desktop_entry(content, "/x/firefox.desktop").unwrap().unwrap();
        assert_eq!(app.name, "Firefox");
        assert_eq!(app.exec, "firefox %u");
        assert_eq!(app.keywords, "internet;www;");

        let hidden = "[Desktop Entry]\nName=Secret\nExec=secret\nNoDisplay=true\n";
        assert!(parse_desktop_entry(hidden, "/x/secret.desktop").unwrap().is_none());

        assert!(parse_desktop_entry("[Desktop Entry]\nName=NoExec\n", "/x/n.desktop").is_err());
    }

    #[test]
    fn test_scoring_order() {
        let mut launcher = loaded(vec![
            entry("Terminal", "", "", "", "xterm"),
            entry("Files", "File Manager", "", "", "nautilus"),
            entry("Alacritty", "Terminal", "", "", "alacritty"),
            entry("Editor", "", "", "edit files in a terminal", "edit"),
            entry("Unrelated", "", "", "", "nothing"),
        ]);

        let titles: Vec<String> = launcher
            .get_results("term")
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Terminal", "Alacritty", "Editor"]);

        let all = launcher.get_results("  ").unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].title, "Alacritty");
    }

    #[test]
    fn test_loading_placeholder_until_scan_arrives() {
        let mut launcher = AppLauncher::with_dirs(Vec::new());
        let results = launcher.get_results("").unwrap();
        assert_eq!(results[0].identifier, LOADING_ID);
        assert!(launcher.execute(LOADING_ID).is_none());

        let plugin: Box<dyn Plugin> = Box::new(launcher);
        let payload = serde_json::to_value(vec![entry("Firefox", "", "", "", "firefox")]).unwrap();
        let (mut plugin, _) = plugin.update(&PluginEvent::custom(KEYWORD, SCAN_EVENT, payload));
        assert_eq!(plugin.get_results("fire").unwrap()[0].title, "Firefox");
    }

    #[test]
    fn test_scan_recurses_and_skips_hidden() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("vendor");
        fs::create_dir(&nested).unwrap();
        fs::write(temp_dir.path().join("a.desktop"), "[Desktop Entry]\nName=A\nExec=a\n").unwrap();
        fs::write(nested.join("b.desktop"), "[Desktop Entry]\nName=B\nExec=b\n").unwrap();
        fs::write(nested.join("c.desktop"), "[Desktop Entry]\nName=C\nExec=c\nHidden=true\n").unwrap();
        fs::write(nested.join("readme.txt"), "[Desktop Entry]\nName=D\nExec=d\n").unwrap();

        let dirs = vec![temp_dir.path().to_path_buf(), temp_dir.path().to_path_buf()];
        let mut names: Vec<String> = scan_desktop_files(&dirs).into_iter().map(|app| app.name).collect();
        names.sort();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_ignores_directory_symlink_cycles() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.desktop"), "[Desktop Entry]\nName=A\nExec=a\n").unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("loop1")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("loop2")).unwrap();

        let apps = scan_desktop_files(&[temp_dir.path().to_path_buf()]);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "A");
    }

    #[tokio::test]
    async fn test_init_delivers_scan_event() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.desktop"), "[Desktop Entry]\nName=A\nExec=a\n").unwrap();

        let mut launcher = AppLauncher::with_dirs(vec![temp_dir.path().to_path_buf()]);
        let Command::Task(task) = launcher.init() else {
            panic!("expected a scan task");
        };

        match task.await {
            Some(PluginEvent::Custom { target, name, payload }) => {
                assert_eq!(target, KEYWORD);
                assert_eq!(name, SCAN_EVENT);
                assert_eq!(payload[0]["name"], "A");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_execute_missing_program_records_error() {
        let mut launcher = loaded(vec![entry("Ghost", "", "", "", "definitely-not-installed-quickbar %U")]);
        assert!(launcher.execute("/apps/ghost.desktop").is_none());
        assert!(launcher.get_error().unwrap().contains("Ghost"));
    }
}
