//! Line-oriented terminal front end
//!
//! Every plain input line replaces the query text. Lines starting with `:`
//! are keys:
//!
//! | Line            | Effect                              |
//! |-----------------|-------------------------------------|
//! | `:enter`        | execute the selected result         |
//! | `:select N`     | execute result N (1-based)          |
//! | `:up`, `:down`  | move the selection                  |
//! | `:esc`          | clear the query, or quit when empty |
//! | `:quit`         | quit immediately                    |
//! | `:resize W H`   | report a new display size           |
//!
//! A literal leading colon is typed as `::`.

use std::io::{ self, BufRead, Write };
use std::thread;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::theme::{ Rgb, Theme };
use crate::launcher::event_loop::{ InputEvent, Launcher, Message, Screen };
use crate::{ log_debug, log_warn };

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Translate one input line
pub fn parse_input_line(line: &str) -> InputEvent {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(literal) = line.strip_prefix("::") {
        return InputEvent::Text(format!(":{}", literal));
    }
    let Some(command) = line.strip_prefix(':') else {
        return InputEvent::Text(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("enter"), None, None) => InputEvent::Enter,
        (Some("up"), None, None) => InputEvent::Up,
        (Some("down"), None, None) => InputEvent::Down,
        (Some("esc"), None, None) => InputEvent::Escape,
        (Some("quit" | "q"), None, None) => InputEvent::Interrupt,
        (Some("select"), Some(n), None) =>
            match n.parse::<usize>() {
                Ok(n) if n > 0 => InputEvent::Select(n - 1),
                _ => InputEvent::Text(line.to_string()),
            }
        (Some("resize"), Some(w), Some(h)) =>
            match (w.parse::<u16>(), h.parse::<u16>()) {
                (Ok(width), Ok(height)) => InputEvent::Resize { width, height },
                _ => InputEvent::Text(line.to_string()),
            }
        _ => InputEvent::Text(line.to_string()),
    }
}

fn paint(text: &str, color: Rgb, use_color: bool) -> String {
    if use_color { format!("{}{}{}", color.fg(), text, RESET) } else { text.to_string() }
}

/// Render a full frame
pub fn render(screen: &Screen, theme: &Theme, use_color: bool) -> String {
    let mut out = String::new();

    let prompt = paint(">", theme.base0d, use_color);
    let active = screen.active.as_deref().unwrap_or("-");
    out.push_str(&format!("{} {}  {}\n", prompt, screen.query, paint(&format!("[{}]", active), theme.base03, use_color)));

    if !screen.view.is_empty() {
        out.push_str(&screen.view);
        if !screen.view.ends_with('\n') {
            out.push('\n');
        }
    } else if screen.results.is_empty() {
        out.push_str(&paint("  (no results)", theme.base03, use_color));
        out.push('\n');
    } else {
        for (index, item) in screen.results.iter().enumerate() {
            let selected = index == screen.selected;
            let marker = if selected { paint("*", theme.base0b, use_color) } else { " ".to_string() };
            let title = if selected && use_color {
                format!("{}{}{}", BOLD, paint(&item.title, theme.base05, use_color), RESET)
            } else {
                paint(&item.title, theme.base05, use_color)
            };

            out.push_str(&format!("{} {:>2}. {}", marker, index + 1, title));
            if !item.description.is_empty() {
                out.push_str(&format!("  {}", paint(&item.description, theme.base04, use_color)));
            }
            out.push('\n');
        }
    }

    if let Some(error) = &screen.error {
        out.push_str(&paint(&format!("error: {}", error), theme.base08, use_color));
        out.push('\n');
    }

    out
}

fn draw<W: Write>(out: &mut W, launcher: &Launcher, use_color: bool) -> io::Result<()> {
    let frame = match launcher.theme().read() {
        Ok(theme) => render(&launcher.screen(), &theme, use_color),
        Err(_) => render(&launcher.screen(), &Theme::default(), use_color),
    };
    out.write_all(frame.as_bytes())?;
    out.flush()
}

/// Feed stdin lines into the loop from a plain thread
///
/// The thread is never joined; it ends with the process.
pub fn spawn_stdin_reader(tx: UnboundedSender<Message>) -> io::Result<()> {
    thread::Builder
        ::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log_warn!("Failed to read input: {}", e);
                        break;
                    }
                };
                if tx.send(Message::Input(parse_input_line(&line))).is_err() {
                    return;
                }
            }
            log_debug!("Input closed");
            let _ = tx.send(Message::Input(InputEvent::Eof));
        })?;
    Ok(())
}

/// Drive the launcher until it quits, redrawing after every message
pub async fn run<W: Write>(mut launcher: Launcher, out: &mut W, use_color: bool) -> anyhow::Result<()> {
    launcher.start();
    draw(out, &launcher, use_color)?;

    while launcher.step().await {
        draw(out, &launcher, use_color)?;
    }

    Ok(())
}
