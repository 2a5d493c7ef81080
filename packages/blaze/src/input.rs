use anyhow::{Result, bail};

/// One line of terminal input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    /// `None` clears the system prompt.
    SetSystemPrompt(Option<String>),
    Clear,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  /system <text>   set the system prompt sent with each message
  /system          clear the system prompt
  /clear           clear the conversation
  /status          show the connection status
  /quit            exit
Anything else is sent as a message.";

/// Parse a line of input. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Some(Command::Send(trimmed.to_string())));
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let command = match name {
        "system" => Command::SetSystemPrompt(arg),
        "clear" => Command::Clear,
        "status" => Command::Status,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command: /{other} (try /help)"),
    };
    Ok(Some(command))
}
