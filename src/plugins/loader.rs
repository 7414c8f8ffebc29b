//! Extension discovery and loading
//!
//! Scans the extension directory for `*.lua` files and turns every valid one
//! into a [`LuaPlugin`]. A broken file never takes the others down with it.

use std::fs;
use std::path::{ Path, PathBuf };

use anyhow::{ anyhow, bail, Context };
use mlua::{ Table, Value };

use crate::config::{ PLUGIN_ENTRY_POINT, PLUGIN_FILE_SUFFIX };
use crate::core::theme::ThemeHandle;
use crate::plugins::contract::Plugin;
use crate::plugins::lua_plugin::LuaPlugin;
use crate::plugins::sandbox::create_plugin_state;

/// Load every extension in `dir`, in file-name order
///
/// A missing directory yields no plugins. Files that fail to load are logged
/// and skipped.
pub fn load_plugins(dir: &Path, theme: &ThemeHandle) -> anyhow::Result<Vec<Box<dyn Plugin>>> {
    if !dir.exists() {
        crate::log_info!("Plugin directory {:?} does not exist, no extensions loaded", dir);
        return Ok(Vec::new());
    }

    let mut candidates: Vec<PathBuf> = fs
        ::read_dir(dir)
        .with_context(|| format!("Failed to read plugin directory {:?}", dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_extension_file(path))
        .collect();
    candidates.sort();

    let mut plugins: Vec<Box<dyn Plugin>> = Vec::new();
    let mut skipped_count = 0;

    for path in candidates {
        match load_plugin_file(&path, theme) {
            Ok(plugin) => {
                crate::log_info!(
                    "Loaded plugin '{}' (keyword: {}) from {:?}",
                    plugin.name(),
                    plugin.keyword(),
                    path
                );
                plugins.push(Box::new(plugin));
            }
            Err(e) => {
                crate::log_warn!("Failed to load plugin from {:?}: {:#}", path, e);
                skipped_count += 1;
            }
        }
    }

    crate::log_info!("Loaded {} extension(s), skipped {}", plugins.len(), skipped_count);

    Ok(plugins)
}

fn is_extension_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(PLUGIN_FILE_SUFFIX)
}

/// Load a single extension file into its own Lua state
pub fn load_plugin_file(path: &Path, theme: &ThemeHandle) -> anyhow::Result<LuaPlugin> {
    let source = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("unknown");

    load_plugin_source(name, &source, theme)
}

/// Evaluate `source`, call its entry point and validate the returned object
pub fn load_plugin_source(name: &str, source: &str, theme: &ThemeHandle) -> anyhow::Result<LuaPlugin> {
    let lua = create_plugin_state(name, theme).map_err(|e|
        anyhow!("Failed to create Lua state: {}", e)
    )?;

    lua.load(source)
        .set_name(format!("@{}.{}", name, PLUGIN_FILE_SUFFIX))
        .exec()
        .map_err(|e| anyhow!("Failed to execute plugin code: {}", e))?;

    let entry = match lua.globals().get::<Value>(PLUGIN_ENTRY_POINT) {
        Ok(Value::Function(entry)) => entry,
        Ok(Value::Nil) => bail!("Plugin must define a global {}() function", PLUGIN_ENTRY_POINT),
        Ok(other) => bail!("{} must be a function, got {}", PLUGIN_ENTRY_POINT, other.type_name()),
        Err(e) => bail!("Failed to look up {}: {}", PLUGIN_ENTRY_POINT, e),
    };

    let object: Table = match entry.call::<Value>(()) {
        Ok(Value::Table(object)) => object,
        Ok(other) => bail!("{}() must return a table, got {}", PLUGIN_ENTRY_POINT, other.type_name()),
        Err(e) => bail!("{}() failed: {}", PLUGIN_ENTRY_POINT, e),
    };

    LuaPlugin::from_object(lua, object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::theme::Theme;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    const VALID: &str = r#"
function new()
    return {
        metadata = { name = "Hello", keyword = "!hello", flag = "hello" },
        get_results = function(self, query)
            return { { title = "Hello " .. query, identifier = "greet" } }
        end,
        execute = function(self, id) return quickbar.quit() end,
    }
end
"#;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = File::create(dir.join(name)).unwrap();
        write!(file, "{}", content).unwrap();
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let theme = Theme::default().into_handle();
        let plugins = load_plugins(&temp_dir.path().join("nope"), &theme).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_broken_file_does_not_block_later_files() {
        let temp_dir = TempDir::new().unwrap();
        write_file(temp_dir.path(), "a_broken.lua", "error('top-level failure')");
        write_file(temp_dir.path(), "b_syntax.lua", "function new( return end");
        write_file(temp_dir.path(), "c_valid.lua", VALID);
        write_file(temp_dir.path(), "d_notes.txt", VALID);
        fs::create_dir(temp_dir.path().join("e_dir.lua")).unwrap();

        let theme = Theme::default().into_handle();
        let mut plugins = load_plugins(temp_dir.path(), &theme).unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].keyword(), "!hello");

        let results = plugins[0].get_results("world").unwrap();
        assert_eq!(results[0].title, "Hello world");
        assert!(plugins[0].execute("greet").is_quit());
    }

    #[test]
    fn test_entry_point_checks() {
        let theme = Theme::default().into_handle();

        let err = load_plugin_source("none", "x = 1", &theme).unwrap_err();
        assert!(err.to_string().contains("new()"));

        let err = load_plugin_source("wrong", "new = 5", &theme).unwrap_err();
        assert!(err.to_string().contains("must be a function"));

        let err = load_plugin_source("scalar", "function new() return 1 end", &theme).unwrap_err();
        assert!(err.to_string().contains("must return a table"));

        let err = load_plugin_source("throws", "function new() error('nope') end", &theme).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_files_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let first = VALID.replace("!hello", "!one").replace("\"Hello\"", "\"One\"");
        let second = r#"
function new()
    return {
        metadata = { name = "Two", keyword = "!two", mandatory = true },
        get_results = function(self, query)
            return { { title = tostring(new_was_shared) } }
        end,
        execute = function() end,
    }
end
new_was_shared = (one_marker ~= nil)
"#;
        write_file(temp_dir.path(), "one.lua", &format!("one_marker = true\n{}", first));
        write_file(temp_dir.path(), "two.lua", second);

        let theme = Theme::default().into_handle();
        let mut plugins = load_plugins(temp_dir.path(), &theme).unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[1].get_results("").unwrap()[0].title, "false");
    }

    #[test]
    fn test_bundled_demos_load() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/plugins");
        let theme = Theme::default().into_handle();
        let mut plugins = load_plugins(&dir, &theme).unwrap();

        let keywords: Vec<&str> = plugins
            .iter()
            .map(|p| p.keyword())
            .collect();
        assert_eq!(keywords, vec!["!hello", "!n", "!w"]);
        assert!(plugins.iter().all(|p| !p.metadata().mandatory));

        let results = plugins[0].get_results("there").unwrap();
        assert_eq!(results[0].description, "You typed: there");
        assert!(plugins[0].execute("hello_result").is_quit());

        let results = plugins[2].get_results("mars").unwrap();
        assert_eq!(results[0].identifier, "search:mars");
    }
}
