//! Line-oriented operator console.

use crate::shell::{DialogSource, StatusView};
use std::fmt::Write;
use std::path::PathBuf;

pub const HELP: &str = "\
commands:
  status              show connection, last event, history and dialog
  dismiss <i>         remove notification i (0 = newest)
  add [i]             open Add Person from the last event, or history entry i
  add blank           open an empty Add Person dialog
  name <text>         set the name in the dialog
  preview <file>      write the dialog's preview JPEG to <file>
  submit              register the face in the dialog
  cancel              close the dialog
  video on|off        start or stop the camera
  help                this text
  quit                exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Dismiss(usize),
    Add(DialogSource),
    Name(String),
    Preview(PathBuf),
    Submit,
    Cancel,
    Video(bool),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. `Err` carries a message for the operator.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match (verb.to_ascii_lowercase().as_str(), rest) {
            ("status" | "s", "") => Self::Status,
            ("dismiss" | "d", i) => Self::Dismiss(index(i)?),
            ("add" | "a", "") => Self::Add(DialogSource::LastEvent),
            ("add" | "a", "blank") => Self::Add(DialogSource::Blank),
            ("add" | "a", i) => Self::Add(DialogSource::History(index(i)?)),
            ("name", "") => return Err("usage: name <text>".into()),
            ("name", name) => Self::Name(name.to_string()),
            ("preview", "") => return Err("usage: preview <file>".into()),
            ("preview", path) => Self::Preview(PathBuf::from(path)),
            ("submit", "") => Self::Submit,
            ("cancel", "") => Self::Cancel,
            ("video", "on") => Self::Video(true),
            ("video", "off") => Self::Video(false),
            ("video", _) => return Err("usage: video on|off".into()),
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit" | "q", _) => Self::Quit,
            _ => return Err(format!("unknown command `{line}` (try `help`)")),
        };
        Ok(Some(command))
    }
}

fn index(s: &str) -> Result<usize, String> {
    s.parse()
        .map_err(|_| format!("expected a notification index, got `{s}`"))
}

/// Render the shell state as console text.
pub fn render_status(view: &StatusView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "feed: {}", view.connection);
    let _ = writeln!(
        out,
        "last: {}",
        view.last_event.as_deref().unwrap_or("(no events yet)")
    );

    if view.history.is_empty() {
        let _ = writeln!(out, "notifications: none");
    } else {
        let _ = writeln!(out, "notifications:");
        for (i, line) in view.history.iter().enumerate() {
            let _ = writeln!(out, "  [{i}] {line}");
        }
    }

    if let Some(dialog) = &view.dialog {
        let vector = match dialog.vector_len {
            Some(n) => format!("{n}-d vector"),
            None => "no vector".to_string(),
        };
        let preview = if dialog.has_preview { ", preview" } else { "" };
        let name = if dialog.name.is_empty() { "-" } else { dialog.name.as_str() };
        let state = if dialog.submitting { " (submitting…)" } else { "" };
        let _ = writeln!(out, "add person: {vector}{preview}, name {name}{state}");
    }

    if let Some(error) = &view.error {
        let _ = writeln!(out, "error: {error}");
    }
    out
}
