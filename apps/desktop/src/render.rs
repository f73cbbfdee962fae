use chrono::Local;
use client_core::{ConnectionState, LogRecord, TranscriptEntry, ViewDescriptor, ViewKind};
use shared::domain::{Speaker, Status};

pub fn connection_line(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected | ConnectionState::Connecting => {
            "connecting to mycroft ...".to_string()
        }
        ConnectionState::Open => "connected".to_string(),
        ConnectionState::Errored(reason) => format!("disconnected ({reason})"),
        ConnectionState::Closed => "disconnected".to_string(),
    }
}

pub fn status_line(status: Status) -> String {
    let glyph = match status {
        Status::Resting => "( -_- )",
        Status::Listening => "( o_o )",
        Status::Thinking => "( @_@ )",
        Status::Speaking => "( ^o^ )",
        Status::Confused => "( ?_? )",
    };
    format!("{glyph} {status}")
}

/// Oldest first, so the newest line ends up at the bottom of the terminal.
pub fn transcript_lines(entries: &[TranscriptEntry]) -> Vec<String> {
    entries
        .iter()
        .rev()
        .map(|entry| {
            let time = entry.timestamp.with_timezone(&Local).format("%H:%M");
            match entry.speaker {
                Speaker::Assistant => format!("[{time}] mycroft: {}", entry.text),
                Speaker::User => format!("[{time}] {:>60}", format!("{} :you", entry.text)),
            }
        })
        .collect()
}

pub fn panel_line(view: Option<&ViewDescriptor>) -> String {
    let Some(view) = view else {
        return "panel: none".to_string();
    };
    let name = match view.kind {
        ViewKind::SchoolsData => "schools data",
        ViewKind::Wiki => "wiki",
        ViewKind::Weather => "weather",
    };
    match view.properties.get("title").and_then(|title| title.as_str()) {
        Some(title) => format!("panel: {name}/{} - {title}", view.component),
        None => format!("panel: {name}/{}", view.component),
    }
}

pub fn log_lines(records: &[LogRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let payload = serde_json::to_string_pretty(&record.payload)
                .unwrap_or_else(|_| record.payload.to_string());
            format!("{}\n{payload}", record.topic)
        })
        .collect()
}
