//! Plain-text rendering of conversation messages and connection status.

use blaze_client::{
    ChatMessage, ConnectionStatus, MessageContent, MsgStatus, MsgType, ToolStatus,
};
use serde_json::Value;

/// Render one message. `updated` marks a re-print of a message already shown.
pub fn format_message(message: &ChatMessage, updated: bool) -> String {
    let mut header = String::new();
    if updated {
        header.push_str("(updated) ");
    }
    header.push_str(match message.msg_type {
        MsgType::Input => "You",
        MsgType::Output => "Blaze",
    });
    if message.msg_type == MsgType::Output {
        match message.status {
            MsgStatus::Progress => header.push_str(" (working)"),
            MsgStatus::Error => header.push_str(" (error)"),
            MsgStatus::Success => {}
        }
    }
    header.push(':');

    let mut lines = Vec::new();
    for item in &message.content {
        lines.extend(format_content(item));
    }
    if !message.actions.is_empty() {
        lines.push(format!("[actions: {}]", message.actions.join(", ")));
    }
    if !message.tools.is_empty() {
        lines.push(format!("[tools: {}]", message.tools.join(", ")));
    }

    match lines.len() {
        0 => header,
        // Single-line messages stay on the header line.
        1 if !message.content.iter().any(MessageContent::is_tool) => {
            format!("{header} {}", lines[0])
        }
        _ => {
            let body = lines
                .iter()
                .map(|l| format!("  {l}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{header}\n{body}")
        }
    }
}

fn format_content(item: &MessageContent) -> Vec<String> {
    match item {
        MessageContent::Text { text } => text.lines().map(str::to_string).collect(),
        MessageContent::ImageUrl { image_url } => vec![format!("[image: {}]", image_url.url)],
        MessageContent::File { file } => vec![format!("[file: {}]", file.filename)],
        MessageContent::Tool {
            tool_name,
            tool_args,
            tool_response,
            tool_status,
        } => {
            let mut lines = vec![format!("Tool {tool_name} [{}]", tool_status_label(*tool_status))];
            for (key, value) in tool_args {
                lines.push(format!("  {key}: {}", format_arg(value)));
            }
            if !tool_response.is_null() {
                lines.push("  response:".to_string());
                for line in format_response(tool_response).lines() {
                    lines.push(format!("    {line}"));
                }
            }
            lines
        }
        MessageContent::Unknown => Vec::new(),
    }
}

fn tool_status_label(status: ToolStatus) -> &'static str {
    match status {
        ToolStatus::Progress => "running",
        ToolStatus::Success => "done",
        ToolStatus::Error => "failed",
    }
}

/// Strings print raw, everything else as compact JSON.
fn format_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strings print raw, everything else as pretty JSON.
fn format_response(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Status indicator text: an error wins over the connection state.
pub fn status_label(status: &ConnectionStatus) -> String {
    if let Some(err) = &status.last_error {
        return err.clone();
    }
    if status.is_connected() {
        match status.transport {
            Some(kind) => format!("Connected ({kind})"),
            None => "Connected".to_string(),
        }
    } else {
        "Connecting...".to_string()
    }
}
