//! Interaction loop
//!
//! A single task owns the query text, the debounce timer and the result list.
//! Everything else (keystrokes, timer firings, computed results, plugin task
//! output) reaches it as a [`Message`] on one channel, and it is the only
//! caller of the registry.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::theme::ThemeHandle;
use crate::plugins::{ Command, Key, PluginEvent, PluginRegistry, RegistryError, ResultItem };
use crate::{ log_debug, log_info, log_warn };

/// Identifier of the entry shown when a plugin fails to produce results
pub const ERROR_RESULT_ID: &str = "quickbar_error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// The query box now holds this text
    Text(String),
    Enter,
    Select(usize),
    Up,
    Down,
    Escape,
    Interrupt,
    Resize { width: u16, height: u16 },
    /// Input stream closed
    Eof,
}

#[derive(Debug)]
pub enum Message {
    Input(InputEvent),
    DebounceElapsed { query: String },
    Results { for_query: String, results: Vec<ResultItem> },
    Plugin(PluginEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    DebouncePending,
    AwaitingResult,
    Quitting,
}

/// What the front end draws
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub query: String,
    pub active: Option<String>,
    pub results: Vec<ResultItem>,
    pub selected: usize,
    /// Custom view of the active plugin; replaces the list when non-empty
    pub view: String,
    pub error: Option<String>,
}

pub struct Launcher {
    registry: PluginRegistry,
    theme: ThemeHandle,
    debounce: Duration,
    state: LoopState,
    query: String,
    results: Vec<ResultItem>,
    selected: usize,
    debounce_timer: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Launcher {
    pub fn new(registry: PluginRegistry, theme: ThemeHandle, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry,
            theme,
            debounce,
            state: LoopState::Idle,
            query: String::new(),
            results: Vec::new(),
            selected: 0,
            debounce_timer: None,
            tx,
            rx,
        }
    }

    /// Channel feeding the loop; front ends send [`Message::Input`] here
    pub fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.tx.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[ResultItem] {
        &self.results
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn theme(&self) -> &ThemeHandle {
        &self.theme
    }

    pub fn is_quitting(&self) -> bool {
        self.state == LoopState::Quitting
    }

    /// Initialize plugins and show the results for the empty query
    ///
    /// Must run inside a tokio runtime.
    pub fn start(&mut self) {
        let command = self.registry.init_all();
        self.run_command(command);

        let route = self.registry.determine_active_plugin("");
        log_info!("Launcher started with active plugin {:?}", route.keyword);
        self.results = self.fetch("");
        self.selected = 0;
    }

    /// Wait for the next message and process it
    ///
    /// Returns `false` once the launcher is quitting.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => self.handle(message),
            None => {
                self.state = LoopState::Quitting;
            }
        }
        !self.is_quitting()
    }

    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Input(event) => self.handle_input(event),
            Message::DebounceElapsed { query } => self.on_debounce(query),
            Message::Results { for_query, results } => self.on_results(for_query, results),
            Message::Plugin(event) => self.on_plugin_event(event),
        }
    }

    fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::Text(text) => self.set_query(text),
            InputEvent::Enter => self.select(self.selected),
            InputEvent::Select(index) => self.select(index),
            InputEvent::Up => {
                self.selected = self.selected.saturating_sub(1);
                self.forward_key(Key::Up);
            }
            InputEvent::Down => {
                if self.selected + 1 < self.results.len() {
                    self.selected += 1;
                }
                self.forward_key(Key::Down);
            }
            InputEvent::Escape => self.escape(),
            InputEvent::Interrupt => self.quit(),
            InputEvent::Resize { width, height } => {
                let command = self.registry.broadcast(&(PluginEvent::Resize { width, height }));
                self.run_command(command);
            }
            InputEvent::Eof => {
                self.flush_debounce();
                self.quit();
            }
        }
    }

    fn set_query(&mut self, text: String) {
        if text == self.query {
            return;
        }

        self.query = text;
        let route = self.registry.determine_active_plugin(&self.query);
        if route.switched {
            self.results.clear();
            self.selected = 0;
        }

        self.cancel_debounce();
        self.arm_debounce(self.query.clone());
    }

    fn arm_debounce(&mut self, query: String) {
        let tx = self.tx.clone();
        let delay = self.debounce;
        self.debounce_timer = Some(
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Message::DebounceElapsed { query });
            })
        );
        self.state = LoopState::DebouncePending;
    }

    /// Returns whether a timer was pending
    fn cancel_debounce(&mut self) -> bool {
        match self.debounce_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Dispatch a pending debounce right now, bypassing the message queue
    fn flush_debounce(&mut self) {
        if self.cancel_debounce() {
            let query = self.query.clone();
            self.results = self.fetch(&query);
            self.selected = 0;
            self.state = LoopState::Idle;
        }
    }

    fn on_debounce(&mut self, query: String) {
        if query != self.query {
            log_debug!("Dropping stale debounce for {:?}", query);
            return;
        }
        self.debounce_timer = None;
        self.dispatch(query);
    }

    /// Compute results for `query` and post them back to the loop
    fn dispatch(&mut self, query: String) {
        self.state = LoopState::AwaitingResult;
        let results = self.fetch(&query);
        let _ = self.tx.send(Message::Results { for_query: query, results });
    }

    fn fetch(&mut self, query: &str) -> Vec<ResultItem> {
        match self.registry.get_results(query) {
            Ok(results) => results,
            Err(RegistryError::NoActivePlugin) => Vec::new(),
            Err(e) => {
                log_warn!("Failed to get results for {:?}: {}", query, e);
                vec![ResultItem::new(format!("Error: {}", e), "The plugin could not produce results", ERROR_RESULT_ID)]
            }
        }
    }

    fn on_results(&mut self, for_query: String, results: Vec<ResultItem>) {
        if for_query != self.query {
            log_debug!("Dropping stale results for {:?} (current {:?})", for_query, self.query);
            return;
        }

        self.results = results;
        if self.selected >= self.results.len() {
            self.selected = 0;
        }
        if self.state == LoopState::AwaitingResult {
            self.state = LoopState::Idle;
        }
    }

    fn select(&mut self, index: usize) {
        self.flush_debounce();

        let Some(item) = self.results.get(index) else {
            log_debug!("No result at position {}", index);
            return;
        };
        self.selected = index;
        if item.identifier == ERROR_RESULT_ID {
            return;
        }

        let identifier = item.identifier.clone();
        let command = self.registry.execute(&identifier);
        self.run_command(command);
    }

    fn escape(&mut self) {
        self.cancel_debounce();
        if self.query.is_empty() {
            self.quit();
            return;
        }

        let previous = self.registry.active_keyword().map(str::to_string);
        self.query.clear();
        let route = self.registry.determine_active_plugin("");
        if route.switched {
            self.results.clear();
        }
        self.selected = 0;

        if let Some(keyword) = previous {
            let command = self.registry.deliver(&keyword, &PluginEvent::ClearView);
            self.run_command(command);
        }
        if !self.is_quitting() {
            // Fetched in place so a queued selection never sees the previous plugin's list
            self.results = self.fetch("");
            self.state = LoopState::Idle;
        }
    }

    fn forward_key(&mut self, key: Key) {
        if let Some(keyword) = self.registry.active_keyword().map(str::to_string) {
            let command = self.registry.deliver(&keyword, &(PluginEvent::Key { key }));
            self.run_command(command);
        }
    }

    fn on_plugin_event(&mut self, event: PluginEvent) {
        let active = self.registry.active_keyword().map(str::to_string);
        let target = match &event {
            PluginEvent::Custom { target, .. } if self.registry.is_registered(target) => Some(target.clone()),
            _ => active.clone(),
        };
        let Some(target) = target else {
            log_debug!("No plugin to receive {:?}", event);
            return;
        };

        let command = self.registry.deliver(&target, &event);
        self.run_command(command);

        // The plugin's state changed; refresh its list unless a newer query is on its way
        if !self.is_quitting() && Some(&target) == active.as_ref() && self.debounce_timer.is_none() {
            self.dispatch(self.query.clone());
        }
    }

    fn quit(&mut self) {
        self.cancel_debounce();
        self.state = LoopState::Quitting;
    }

    fn run_command(&mut self, command: Command) {
        if command.is_quit() {
            log_info!("Quit requested");
            self.quit();
            return;
        }
        self.schedule(command);
    }

    fn schedule(&self, command: Command) {
        match command {
            Command::None | Command::Quit => {}
            Command::Task(task) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Some(event) = task.await {
                        let _ = tx.send(Message::Plugin(event));
                    }
                });
            }
            Command::Batch(commands) => {
                for command in commands {
                    self.schedule(command);
                }
            }
        }
    }

    pub fn screen(&self) -> Screen {
        Screen {
            query: self.query.clone(),
            active: self.registry.active_keyword().map(str::to_string),
            results: self.results.clone(),
            selected: self.selected,
            view: self.registry.active_view(),
            error: self.registry.get_error(),
        }
    }
}
