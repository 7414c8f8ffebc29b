//! Lua state construction for extensions
//!
//! Each extension file gets its own state, so globals never leak between
//! files. The state keeps the safe standard library, loses native module
//! loading and gains the `quickbar` host table.

use mlua::{ Lua, Table, Value };

use crate::config::LUA_MEMORY_LIMIT;
use crate::core::theme::ThemeHandle;
use crate::plugins::api::register_host_api;

/// Create an isolated Lua state for the extension `plugin_name`
pub fn create_plugin_state(plugin_name: &str, theme: &ThemeHandle) -> mlua::Result<Lua> {
    let lua = Lua::new();

    // No native modules
    if let Ok(package) = lua.globals().get::<Table>("package") {
        package.set("loadlib", Value::Nil)?;
        package.set("cpath", "")?;
    }

    lua.set_memory_limit(LUA_MEMORY_LIMIT)?;

    register_host_api(&lua, plugin_name, theme)?;

    // print() ends up in the log instead of on the front end
    let name = plugin_name.to_string();
    let print = lua.create_function(move |_lua, args: mlua::Variadic<Value>| {
        let line = args
            .iter()
            .map(|value| value.to_string().unwrap_or_else(|_| format!("{:?}", value)))
            .collect::<Vec<_>>()
            .join("\t");
        crate::log_info!("[plugin:{}] {}", name, line);
        Ok(())
    })?;
    lua.globals().set("print", print)?;

    Ok(lua)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HOST_TABLE_NAME;
    use crate::core::theme::Theme;

    #[test]
    fn test_state_has_host_table() {
        let lua = create_plugin_state("test", &Theme::default().into_handle()).unwrap();

        let host: Table = lua.globals().get(HOST_TABLE_NAME).unwrap();
        assert!(host.get::<Value>("log_info").unwrap().is_function());
        assert!(host.get::<Value>("http_get").unwrap().is_function());
        assert!(lua.globals().get::<Value>("string").unwrap().is_table());
        assert!(lua.globals().get::<Value>("debug").unwrap().is_nil());
    }

    #[test]
    fn test_native_loading_removed() {
        let lua = create_plugin_state("test", &Theme::default().into_handle()).unwrap();
        let loadlib: Value = lua.load("return package.loadlib").eval().unwrap();
        assert!(loadlib.is_nil());
    }

    #[test]
    fn test_print_is_redirected() {
        let lua = create_plugin_state("test", &Theme::default().into_handle()).unwrap();
        lua.load(r#"print("hello", 42, nil)"#).exec().unwrap();
    }

    #[test]
    fn test_states_are_isolated() {
        let theme = Theme::default().into_handle();
        let first = create_plugin_state("first", &theme).unwrap();
        let second = create_plugin_state("second", &theme).unwrap();

        first.load("shared = 1").exec().unwrap();
        assert!(second.globals().get::<Value>("shared").unwrap().is_nil());
    }
}
