//! Host capabilities exposed to Lua extensions
//!
//! Everything an extension may touch lives in one global table (`quickbar`):
//! - `theme` - live view of the shared theme
//! - `log_info`, `log_warn`, `log_error`
//! - `json_decode`, `json_encode`, `url_encode`
//! - effect constructors: `none`, `quit`, `batch`, `http_get`, `run`, `spawn`
//!
//! Effects are plain tables tagged with `kind`. The host turns them into
//! commands after the Lua call returns, so scripts never block the launcher.

use mlua::{ Lua, LuaSerdeExt, MetaMethod, Table, UserData, UserDataMethods, Value };

use crate::config::HOST_TABLE_NAME;
use crate::core::theme::ThemeHandle;

pub const EFFECT_NONE: &str = "none";
pub const EFFECT_QUIT: &str = "quit";
pub const EFFECT_BATCH: &str = "batch";
pub const EFFECT_HTTP_GET: &str = "http_get";
pub const EFFECT_RUN: &str = "run";
pub const EFFECT_SPAWN: &str = "spawn";

/// Userdata wrapper reading through the shared theme handle
struct LuaTheme(ThemeHandle);

impl LuaTheme {
    fn lookup(&self, key: &str) -> mlua::Result<Option<String>> {
        let theme = self.0
            .read()
            .map_err(|e| mlua::Error::runtime(format!("Theme lock poisoned: {}", e)))?;
        Ok(theme.get(key).map(|color| color.to_hex()))
    }
}

impl UserData for LuaTheme {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // quickbar.theme.base0d
        methods.add_meta_method(MetaMethod::Index, |_, this, key: String| this.lookup(&key));

        // quickbar.theme:get("base0D")
        methods.add_method("get", |_, this, key: String| this.lookup(&key));

        // ANSI foreground escape for inline coloring of view text
        methods.add_method("fg", |_, this, key: String| {
            let theme = this.0
                .read()
                .map_err(|e| mlua::Error::runtime(format!("Theme lock poisoned: {}", e)))?;
            Ok(theme.get(&key).map(|color| color.fg()).unwrap_or_default())
        });
    }
}

/// Install the `quickbar` table into `lua`
pub fn register_host_api(lua: &Lua, plugin_name: &str, theme: &ThemeHandle) -> mlua::Result<()> {
    let host = lua.create_table()?;

    host.set("theme", LuaTheme(theme.clone()))?;
    register_logging_api(lua, &host, plugin_name)?;
    register_data_api(lua, &host)?;
    register_effect_api(lua, &host)?;

    lua.globals().set(HOST_TABLE_NAME, host)?;
    Ok(())
}

/// Logging goes through the launcher's logger, tagged with the plugin name
fn register_logging_api(lua: &Lua, host: &Table, plugin_name: &str) -> mlua::Result<()> {
    let name = plugin_name.to_string();
    let log_info_fn = lua.create_function(move |_lua, msg: String| {
        crate::log_info!("[plugin:{}] {}", name, msg);
        Ok(())
    })?;

    let name = plugin_name.to_string();
    let log_warn_fn = lua.create_function(move |_lua, msg: String| {
        crate::log_warn!("[plugin:{}] {}", name, msg);
        Ok(())
    })?;

    let name = plugin_name.to_string();
    let log_error_fn = lua.create_function(move |_lua, msg: String| {
        crate::log_error!("[plugin:{}] {}", name, msg);
        Ok(())
    })?;

    host.set("log_info", log_info_fn)?;
    host.set("log_warn", log_warn_fn)?;
    host.set("log_error", log_error_fn)?;

    Ok(())
}

fn register_data_api(lua: &Lua, host: &Table) -> mlua::Result<()> {
    let json_decode = lua.create_function(|lua, text: String| {
        let value: serde_json::Value = serde_json
            ::from_str(&text)
            .map_err(|e| mlua::Error::runtime(format!("Invalid JSON: {}", e)))?;
        lua.to_value(&value)
    })?;

    let json_encode = lua.create_function(|lua, value: Value| {
        let value: serde_json::Value = lua.from_value(value)?;
        Ok(value.to_string())
    })?;

    let url_encode = lua.create_function(|_lua, text: String| {
        Ok(url::form_urlencoded::byte_serialize(text.as_bytes()).collect::<String>())
    })?;

    host.set("json_decode", json_decode)?;
    host.set("json_encode", json_encode)?;
    host.set("url_encode", url_encode)?;

    Ok(())
}

fn register_effect_api(lua: &Lua, host: &Table) -> mlua::Result<()> {
    let none = lua.create_function(|_lua, ()| Ok(Value::Nil))?;

    let quit = lua.create_function(|lua, ()| effect(lua, EFFECT_QUIT))?;

    let batch = lua.create_function(|lua, effects: Table| {
        let table = effect(lua, EFFECT_BATCH)?;
        table.set("effects", effects)?;
        Ok(table)
    })?;

    let http_get = lua.create_function(|lua, (url, event): (String, String)| {
        validate_url(&url)?;
        let table = effect(lua, EFFECT_HTTP_GET)?;
        table.set("url", url)?;
        table.set("event", event)?;
        Ok(table)
    })?;

    let run = lua.create_function(
        |lua, (program, args, event): (String, Option<Vec<String>>, String)| {
            let table = effect(lua, EFFECT_RUN)?;
            table.set("program", program)?;
            table.set("args", args.unwrap_or_default())?;
            table.set("event", event)?;
            Ok(table)
        }
    )?;

    let spawn = lua.create_function(|lua, (program, args): (String, Option<Vec<String>>)| {
        let table = effect(lua, EFFECT_SPAWN)?;
        table.set("program", program)?;
        table.set("args", args.unwrap_or_default())?;
        Ok(table)
    })?;

    host.set(EFFECT_NONE, none)?;
    host.set(EFFECT_QUIT, quit)?;
    host.set(EFFECT_BATCH, batch)?;
    host.set(EFFECT_HTTP_GET, http_get)?;
    host.set(EFFECT_RUN, run)?;
    host.set(EFFECT_SPAWN, spawn)?;

    Ok(())
}

fn effect(lua: &Lua, kind: &str) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("kind", kind)?;
    Ok(table)
}

/// Only absolute http(s) URLs with a host are accepted
///
/// # Examples
/// - `https://example.com/path` -> `example.com`
/// - `http://api.example.com:8080/v1` -> `api.example.com`
pub fn validate_url(url: &str) -> mlua::Result<String> {
    let parsed = url::Url
        ::parse(url)
        .map_err(|e| mlua::Error::runtime(format!("Invalid URL: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(mlua::Error::runtime(format!("Unsupported URL scheme '{}'", parsed.scheme())));
    }

    let host = parsed.host_str().ok_or_else(|| mlua::Error::runtime("URL has no host"))?;

    Ok(host.to_string())
}
