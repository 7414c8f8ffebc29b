//! Adapter turning a Lua plugin object into a [`Plugin`]
//!
//! The object is the table returned by the script's `new()` entry point.
//! Methods are called Lua-style, with the object as first argument, and any
//! returned effect table is converted into a [`Command`] here.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{ anyhow, bail, Context };
use mlua::{ Function, Lua, LuaSerdeExt, Table, Value };
use serde_json::json;

use crate::config::{ HTTP_TIMEOUT_SECS, HTTP_USER_AGENT };
use crate::core::utils::spawn_detached;
use crate::plugins::api::{
    EFFECT_BATCH,
    EFFECT_HTTP_GET,
    EFFECT_NONE,
    EFFECT_QUIT,
    EFFECT_RUN,
    EFFECT_SPAWN,
};
use crate::plugins::contract::{ Command, Plugin, PluginError, PluginEvent, PluginMetadata, ResultItem };
use crate::{ log_debug, log_warn };

const REQUIRED_METHODS: [&str; 2] = ["get_results", "execute"];
const OPTIONAL_METHODS: [&str; 4] = ["init", "update", "view", "get_error"];

pub struct LuaPlugin {
    metadata: PluginMetadata,
    lua: Lua,
    object: Table,
    /// Last failure of init/execute/update, shown until the next successful execute
    error: Option<String>,
}

impl fmt::Debug for LuaPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaPlugin")
            .field("metadata", &self.metadata)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl LuaPlugin {
    /// Validate the object returned by `new()` and wrap it
    pub fn from_object(lua: Lua, object: Table) -> anyhow::Result<Self> {
        let metadata_table = match object.get::<Value>("metadata") {
            Ok(Value::Table(table)) => table,
            Ok(other) => bail!("metadata must be a table, got {}", other.type_name()),
            Err(e) => bail!("Failed to read metadata: {}", e),
        };
        let metadata: PluginMetadata = lua
            .from_value(Value::Table(metadata_table))
            .map_err(|e| anyhow!("Invalid metadata: {}", e))?;
        validate_metadata(&metadata)?;

        for name in REQUIRED_METHODS {
            match object.get::<Value>(name) {
                Ok(Value::Function(_)) => {}
                Ok(_) => bail!("Plugin must define a {}() function", name),
                Err(e) => bail!("Failed to read {}: {}", name, e),
            }
        }
        for name in OPTIONAL_METHODS {
            match object.get::<Value>(name) {
                Ok(Value::Function(_)) | Ok(Value::Nil) => {}
                Ok(other) => bail!("{} must be a function, got {}", name, other.type_name()),
                Err(e) => bail!("Failed to read {}: {}", name, e),
            }
        }

        Ok(Self {
            metadata,
            lua,
            object,
            error: None,
        })
    }

    fn method(&self, name: &str) -> Option<Function> {
        self.object.get::<Option<Function>>(name).ok().flatten()
    }

    fn script_error(&self, error: mlua::Error) -> PluginError {
        PluginError::Script {
            plugin: self.metadata.name.clone(),
            message: error.to_string(),
        }
    }

    fn record_failure(&mut self, operation: &str, error: mlua::Error) {
        log_warn!("Plugin '{}' {} failed: {}", self.metadata.name, operation, error);
        self.error = Some(format!("{} failed: {}", operation, error));
    }

    fn to_command(&self, value: Value) -> Command {
        let mut spawns = Vec::new();
        match self.parse_effect(value, &mut spawns) {
            Ok(command) => {
                for (program, args) in spawns {
                    if let Err(e) = spawn_detached(&program, &args) {
                        log_warn!("Plugin '{}' failed to spawn: {:#}", self.metadata.name, e);
                    }
                }
                command
            }
            Err(e) => {
                log_warn!("Plugin '{}' returned an invalid effect: {}", self.metadata.name, e);
                Command::None
            }
        }
    }

    /// Spawn requests are collected in `spawns` and only run once the whole effect parsed
    fn parse_effect(&self, value: Value, spawns: &mut Vec<(String, Vec<String>)>) -> mlua::Result<Command> {
        let table = match value {
            Value::Nil => {
                return Ok(Command::None);
            }
            Value::Table(table) => table,
            other => {
                return Err(mlua::Error::runtime(format!("effect must be a table, got {}", other.type_name())));
            }
        };

        let kind: String = table.get("kind")?;
        let target = self.metadata.keyword.clone();

        let command = match kind.as_str() {
            EFFECT_NONE => Command::None,
            EFFECT_QUIT => Command::Quit,
            EFFECT_BATCH => {
                let effects: Table = table.get("effects")?;
                let mut commands = Vec::new();
                for effect in effects.sequence_values::<Value>() {
                    commands.push(self.parse_effect(effect?, spawns)?);
                }
                Command::batch(commands)
            }
            EFFECT_HTTP_GET => {
                let url: String = table.get("url")?;
                let event: String = table.get("event")?;
                Command::task(http_get(target, event, url))
            }
            EFFECT_RUN => {
                let program: String = table.get("program")?;
                let args: Vec<String> = table.get::<Option<Vec<String>>>("args")?.unwrap_or_default();
                let event: String = table.get("event")?;
                Command::task(run_process(target, event, program, args))
            }
            EFFECT_SPAWN => {
                let program: String = table.get("program")?;
                let args: Vec<String> = table.get::<Option<Vec<String>>>("args")?.unwrap_or_default();
                spawns.push((program, args));
                Command::None
            }
            other => {
                log_warn!("Plugin '{}' returned unknown effect kind '{}'", self.metadata.name, other);
                Command::None
            }
        };

        Ok(command)
    }

    fn parse_results(&self, value: Value) -> Result<Vec<ResultItem>, PluginError> {
        let malformed = |message: String| PluginError::Malformed {
            plugin: self.metadata.name.clone(),
            message,
        };

        let table = match value {
            Value::Nil => {
                return Ok(Vec::new());
            }
            Value::Table(table) => table,
            other => {
                return Err(malformed(format!("results must be a list, got {}", other.type_name())));
            }
        };

        let mut results = Vec::new();
        for entry in table.sequence_values::<Table>() {
            let entry = entry.map_err(|e| malformed(e.to_string()))?;
            let title: String = entry.get("title").map_err(|e| malformed(format!("title: {}", e)))?;
            let description: Option<String> = entry
                .get("description")
                .map_err(|e| malformed(format!("description: {}", e)))?;
            let identifier: Option<String> = entry
                .get("identifier")
                .map_err(|e| malformed(format!("identifier: {}", e)))?;

            let identifier = identifier.unwrap_or_else(|| title.clone());
            results.push(ResultItem::new(title, description.unwrap_or_default(), identifier));
        }

        Ok(results)
    }
}

impl Plugin for LuaPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn init(&mut self) -> Command {
        let Some(init) = self.method("init") else {
            return Command::None;
        };

        match init.call::<Value>(self.object.clone()) {
            Ok(value) => self.to_command(value),
            Err(e) => {
                self.record_failure("init", e);
                Command::None
            }
        }
    }

    fn get_results(&mut self, query: &str) -> Result<Vec<ResultItem>, PluginError> {
        let get_results = self
            .method("get_results")
            .ok_or_else(|| PluginError::Other(format!("plugin '{}' lost get_results", self.metadata.name)))?;

        let value = get_results
            .call::<Value>((self.object.clone(), query))
            .map_err(|e| self.script_error(e))?;
        self.parse_results(value)
    }

    fn execute(&mut self, identifier: &str) -> Command {
        let Some(execute) = self.method("execute") else {
            return Command::None;
        };

        match execute.call::<Value>((self.object.clone(), identifier)) {
            Ok(value) => {
                self.error = None;
                self.to_command(value)
            }
            Err(e) => {
                self.record_failure("execute", e);
                Command::None
            }
        }
    }

    fn update(mut self: Box<Self>, event: &PluginEvent) -> (Box<dyn Plugin>, Command) {
        let Some(update) = self.method("update") else {
            return (self, Command::None);
        };

        let result = self.lua
            .to_value(event)
            .and_then(|event| update.call::<Value>((self.object.clone(), event)));

        let command = match result {
            Ok(value) => self.to_command(value),
            Err(e) => {
                self.record_failure("update", e);
                Command::None
            }
        };

        (self, command)
    }

    fn view(&self) -> String {
        let Some(view) = self.method("view") else {
            return String::new();
        };

        match view.call::<Option<String>>(self.object.clone()) {
            Ok(text) => text.unwrap_or_default(),
            Err(e) => {
                log_debug!("Plugin '{}' view failed: {}", self.metadata.name, e);
                String::new()
            }
        }
    }

    fn get_error(&self) -> Option<String> {
        if self.error.is_some() {
            return self.error.clone();
        }

        let get_error = self.method("get_error")?;
        match get_error.call::<Option<String>>(self.object.clone()) {
            Ok(error) => error.filter(|message| !message.is_empty()),
            Err(e) => Some(e.to_string()),
        }
    }
}

/// Metadata rules enforced for every extension
pub fn validate_metadata(metadata: &PluginMetadata) -> anyhow::Result<()> {
    if metadata.keyword.trim().is_empty() {
        bail!("Plugin keyword cannot be empty");
    }
    if !metadata.mandatory && metadata.flag_name().trim().is_empty() {
        bail!("Optional plugin '{}' must declare an enable flag", metadata.name);
    }
    if metadata.name.is_empty() {
        log_warn!("Plugin with keyword '{}' has an empty name", metadata.keyword);
    }
    Ok(())
}

async fn http_get(target: String, event: String, url: String) -> Option<PluginEvent> {
    let payload = match fetch(&url).await {
        Ok((status, body)) => json!({ "status": status, "body": body }),
        Err(e) => {
            log_warn!("HTTP request to {} failed: {:#}", url, e);
            json!({ "status": 0, "body": "", "error": format!("{:#}", e) })
        }
    };

    Some(PluginEvent::custom(target, event, payload))
}

async fn fetch(url: &str) -> anyhow::Result<(u16, String)> {
    let client = reqwest::Client
        ::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(HTTP_USER_AGENT)
        .build()
        .context("Failed to create HTTP client")?;

    let response = client.get(url).send().await.context("HTTP request failed")?;
    let status = response.status().as_u16();
    let body = response.text().await.context("Failed to read response body")?;

    Ok((status, body))
}

async fn run_process(target: String, event: String, program: String, args: Vec<String>) -> Option<PluginEvent> {
    let output = tokio::process::Command
        ::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .output().await;

    let payload = match output {
        Ok(output) =>
            json!({
                "success": output.status.success(),
                "stdout": String::from_utf8_lossy(&output.stdout),
                "stderr": String::from_utf8_lossy(&output.stderr),
            }),
        Err(e) => {
            log_warn!("Failed to run '{}': {}", program, e);
            json!({
                "success": false,
                "stdout": "",
                "stderr": format!("Failed to run '{}': {}", program, e),
            })
        }
    };

    Some(PluginEvent::custom(target, event, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::theme::Theme;
    use crate::plugins::sandbox::create_plugin_state;

    fn plugin_from_source(source: &str) -> anyhow::Result<LuaPlugin> {
        let lua = create_plugin_state("test", &Theme::default().into_handle())
            .map_err(|e| anyhow!("{}", e))?;
        lua.load(source).exec().map_err(|e| anyhow!("{}", e))?;
        let new: Function = lua.globals().get("new").map_err(|e| anyhow!("{}", e))?;
        let object: Table = new.call(()).map_err(|e| anyhow!("{}", e))?;
        LuaPlugin::from_object(lua, object)
    }

    const COUNTER: &str = r#"
        function new()
            return {
                metadata = { name = "Counter", keyword = "!c", flag = "counter" },
                hits = 0,
                get_results = function(self, query)
                    if query == "boom" then error("exploded") end
                    return {
                        { title = query, description = "hits " .. self.hits, identifier = "id-" .. query },
                        { title = "bare" },
                    }
                end,
                execute = function(self, id)
                    if id == "bad" then error("cannot run") end
                    if id == "run" then return quickbar.run("echo", { "hi" }, "echoed") end
                    return quickbar.batch({ quickbar.none(), quickbar.quit() })
                end,
                update = function(self, event)
                    if event.kind == "custom" then self.hits = self.hits + event.payload.count end
                    if event.kind == "clear_view" then self.hits = 0 end
                end,
                view = function(self)
                    if self.hits > 10 then return "many hits" end
                end,
            }
        end
    "#;

    #[test]
    fn test_results_are_converted() {
        let mut plugin = plugin_from_source(COUNTER).unwrap();
        assert_eq!(plugin.keyword(), "!c");

        let results = plugin.get_results("mars").unwrap();
        assert_eq!(results[0], ResultItem::new("mars", "hits 0", "id-mars"));
        assert_eq!(results[1], ResultItem::new("bare", "", "bare"));
    }

    #[test]
    fn test_script_error_surfaces_as_plugin_error() {
        let mut plugin = plugin_from_source(COUNTER).unwrap();
        let err = plugin.get_results("boom").unwrap_err();
        assert!(matches!(err, PluginError::Script { ref message, .. } if message.contains("exploded")));
    }

    #[test]
    fn test_execute_effects_and_sticky_error() {
        let mut plugin = plugin_from_source(COUNTER).unwrap();
        assert!(plugin.execute("anything").is_quit());

        assert!(plugin.execute("bad").is_none());
        assert!(plugin.get_error().unwrap().contains("cannot run"));

        plugin.execute("ok");
        assert!(plugin.get_error().is_none());
    }

    #[test]
    fn test_update_mutates_lua_state() {
        let plugin: Box<dyn Plugin> = Box::new(plugin_from_source(COUNTER).unwrap());
        let event = PluginEvent::custom("!c", "tick", json!({ "count": 11 }));
        let (mut plugin, command) = plugin.update(&event);
        assert!(command.is_none());
        assert_eq!(plugin.view(), "many hits");
        assert_eq!(plugin.get_results("x").unwrap()[0].description, "hits 11");

        let (plugin, _) = plugin.update(&PluginEvent::ClearView);
        assert_eq!(plugin.view(), "");
    }

    #[tokio::test]
    async fn test_run_effect_delivers_output() {
        let mut plugin = plugin_from_source(COUNTER).unwrap();
        let Command::Task(task) = plugin.execute("run") else {
            panic!("expected a task");
        };

        match task.await {
            Some(PluginEvent::Custom { target, name, payload }) => {
                assert_eq!(target, "!c");
                assert_eq!(name, "echoed");
                assert_eq!(payload["success"], true);
                assert_eq!(payload["stdout"], "hi\n");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_spawn_waits_for_the_whole_batch() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let marker = temp_dir.path().join("spawned");
        let source = format!(
            r#"
            MARKER = {:?}
            function new()
                return {{
                    metadata = {{ name = "Spawner", keyword = "!s", flag = "spawner" }},
                    get_results = function() return {{}} end,
                    execute = function(self, id)
                        if id == "broken" then
                            return quickbar.batch({{ quickbar.spawn("touch", {{ MARKER }}), 5 }})
                        end
                        return quickbar.batch({{ quickbar.spawn("touch", {{ MARKER }}), quickbar.quit() }})
                    end,
                }}
            end
            "#,
            marker.to_string_lossy()
        );
        let mut plugin = plugin_from_source(&source).unwrap();

        assert!(plugin.execute("broken").is_none());
        std::thread::sleep(Duration::from_millis(300));
        assert!(!marker.exists());

        assert!(plugin.execute("go").is_quit());
        let mut waited = 0;
        while !marker.exists() && waited < 50 {
            std::thread::sleep(Duration::from_millis(100));
            waited += 1;
        }
        assert!(marker.exists());
    }

    #[test]
    fn test_debug_shows_metadata() {
        let plugin = plugin_from_source(COUNTER).unwrap();
        let rendered = format!("{:?}", plugin);
        assert!(rendered.starts_with("LuaPlugin"));
        assert!(rendered.contains("!c"));
    }

    #[test]
    fn test_shape_validation() {
        let missing_execute = r#"
            function new()
                return { metadata = { name = "x", keyword = "!x", mandatory = true }, get_results = function() end }
            end
        "#;
        assert!(plugin_from_source(missing_execute).is_err());

        let missing_flag = r#"
            function new()
                return {
                    metadata = { name = "x", keyword = "!x" },
                    get_results = function() end,
                    execute = function() end,
                }
            end
        "#;
        let err = plugin_from_source(missing_flag).err().unwrap();
        assert!(err.to_string().contains("enable flag"));

        let bad_view = r#"
            function new()
                return {
                    metadata = { name = "x", keyword = "!x", mandatory = true },
                    get_results = function() end,
                    execute = function() end,
                    view = "not a function",
                }
            end
        "#;
        assert!(plugin_from_source(bad_view).is_err());
    }
}
