//! The contract every plugin implements
//!
//! Built-in plugins implement [`Plugin`] directly; Lua extensions are wrapped
//! in an adapter by the loader. The registry cannot tell the two apart.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use serde::{ Deserialize, Serialize };

/// Static description of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Routing token typed at the start of a query, e.g. `!w`
    #[serde(default)]
    pub keyword: String,
    /// Name used with `--plugins` to enable an optional plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    /// Always registered, cannot be disabled
    #[serde(default)]
    pub mandatory: bool,
    /// Receives every query no other keyword claims
    #[serde(default)]
    pub default: bool,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            keyword: keyword.into(),
            flag: None,
            mandatory: false,
            default: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn default_plugin(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn flag_name(&self) -> &str {
        self.flag.as_deref().unwrap_or("")
    }

    /// Whether `--plugins` enables this plugin
    pub fn is_enabled_by(&self, flags: &std::collections::HashSet<String>) -> bool {
        self.mandatory || flags.contains(self.flag_name())
    }
}

/// One selectable entry in the result list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Opaque to everyone but the plugin that produced it
    pub identifier: String,
}

impl ResultItem {
    pub fn new(title: impl Into<String>, description: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            identifier: identifier.into(),
        }
    }
}

/// Navigation keys forwarded to the active plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Up,
    Down,
}

/// Lifecycle and runtime events delivered through [`Plugin::update`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginEvent {
    /// The display area changed size
    Resize { width: u16, height: u16 },
    /// The query was cleared; drop any custom view state
    ClearView,
    Key { key: Key },
    /// Output of a background task, addressed to the plugin owning `target`
    Custom {
        target: String,
        name: String,
        payload: serde_json::Value,
    },
}

impl PluginEvent {
    pub fn custom(target: impl Into<String>, name: impl Into<String>, payload: serde_json::Value) -> Self {
        PluginEvent::Custom {
            target: target.into(),
            name: name.into(),
            payload,
        }
    }
}

/// Background unit of work; its output re-enters the interaction loop
pub type Task = BoxFuture<'static, Option<PluginEvent>>;

/// Deferred effect returned by plugin operations
#[derive(Default)]
pub enum Command {
    #[default]
    None,
    /// Terminate the launcher
    Quit,
    Task(Task),
    Batch(Vec<Command>),
}

impl Command {
    pub fn task<F>(future: F) -> Self where F: Future<Output = Option<PluginEvent>> + Send + 'static {
        Command::Task(Box::pin(future))
    }

    /// Merge commands, dropping no-ops
    pub fn batch(commands: impl IntoIterator<Item = Command>) -> Self {
        let mut merged: Vec<Command> = commands
            .into_iter()
            .filter(|c| !c.is_none())
            .collect();

        match merged.len() {
            0 => Command::None,
            1 => merged.remove(0),
            _ => Command::Batch(merged),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Command::None)
    }

    /// Whether this effect requests termination. Never runs a task.
    pub fn is_quit(&self) -> bool {
        match self {
            Command::Quit => true,
            Command::Batch(commands) => commands.iter().any(Command::is_quit),
            Command::None | Command::Task(_) => false,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::None => f.write_str("None"),
            Command::Quit => f.write_str("Quit"),
            Command::Task(_) => f.write_str("Task(..)"),
            Command::Batch(commands) => f.debug_tuple("Batch").field(commands).finish(),
        }
    }
}

/// Infrastructure failures a plugin could not express as a result entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("script error in plugin '{plugin}': {message}")]
    Script { plugin: String, message: String },
    #[error("plugin '{plugin}' returned malformed data: {message}")]
    Malformed { plugin: String, message: String },
    #[error("{0}")]
    Other(String),
}

/// Capability set of a launcher plugin
///
/// The host never calls two methods of the same instance concurrently. State
/// shared with background work must be protected inside the plugin.
pub trait Plugin: Send {
    fn metadata(&self) -> &PluginMetadata;

    /// Called once after registration. Must not block.
    fn init(&mut self) -> Command {
        Command::None
    }

    /// Called once per debounce interval with the effective query.
    /// Unbounded work must return a placeholder and finish in the background.
    fn get_results(&mut self, query: &str) -> Result<Vec<ResultItem>, PluginError>;

    fn execute(&mut self, identifier: &str) -> Command;

    /// Consumes the instance; the returned one becomes authoritative.
    fn update(self: Box<Self>, event: &PluginEvent) -> (Box<dyn Plugin>, Command);

    /// Custom rendering; empty means the default result list
    fn view(&self) -> String {
        String::new()
    }

    fn get_error(&self) -> Option<String> {
        None
    }

    fn keyword(&self) -> &str {
        &self.metadata().keyword
    }

    fn name(&self) -> &str {
        &self.metadata().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_quit_never_runs_tasks() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let task = Command::task(async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            None
        });

        assert!(!task.is_quit());
        let batch = Command::batch([task, Command::Quit]);
        assert!(batch.is_quit());
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_batch_drops_noops() {
        assert!(Command::batch([Command::None, Command::None]).is_none());
        assert!(matches!(Command::batch([Command::None, Command::Quit]), Command::Quit));
        assert!(matches!(
            Command::batch([Command::Quit, Command::task(async { None })]),
            Command::Batch(ref c) if c.len() == 2
        ));
    }

    #[test]
    fn test_metadata_enabled_by_flags() {
        let flags: std::collections::HashSet<String> = ["wikipedia".to_string()].into();
        let wiki = PluginMetadata::new("Wikipedia", "!w").with_flag("wikipedia");
        let nix = PluginMetadata::new("Nix", "!n").with_flag("nixshell");
        let calc = PluginMetadata::new("Calculator", "=").mandatory();

        assert!(wiki.is_enabled_by(&flags));
        assert!(!nix.is_enabled_by(&flags));
        assert!(calc.is_enabled_by(&flags));
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let event = PluginEvent::custom("!w", "summary", serde_json::json!({ "status": 200 }));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "custom");
        assert_eq!(json["target"], "!w");
        assert_eq!(json["payload"]["status"], 200);

        let json = serde_json::to_value(PluginEvent::Resize { width: 80, height: 24 }).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "resize", "width": 80, "height": 24 }));
    }
}
