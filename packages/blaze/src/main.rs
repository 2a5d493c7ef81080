use anyhow::{Context, Result};
use blaze_client::{
    ChatClient, ClientConfig, ClientEvent, FileConfig, Reconciled, TransportKind, load_config,
};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

mod input;
mod render;

use crate::input::{Command, HELP};

#[derive(Parser)]
#[command(name = "blaze")]
#[command(about = "Terminal chat client for the Blaze assistant")]
struct Cli {
    /// Chat endpoint, e.g. http://localhost:8000/chat (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Path to a blaze.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// System prompt sent with every message
    #[arg(long)]
    system_prompt: Option<String>,

    /// Use HTTP long-polling only
    #[arg(long)]
    polling: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

enum Tick {
    Line(Option<String>),
    Event(Option<ClientEvent>),
    Interrupt,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "blaze=debug,blaze_client=debug,info"
    } else {
        "blaze=info,blaze_client=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = resolve_config(&cli)?;
    info!(url = %config.endpoint.origin(), transports = ?config.transports, "starting");

    let mut client = ChatClient::new(config);
    let mut system_prompt = cli.system_prompt;
    client.connect();
    println!("{}", render::status_label(&client.status()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let tick = tokio::select! {
            line = lines.next_line() => Tick::Line(line.context("failed to read stdin")?),
            event = client.next_event() => Tick::Event(event),
            _ = tokio::signal::ctrl_c() => Tick::Interrupt,
        };

        match tick {
            Tick::Line(None) | Tick::Interrupt | Tick::Event(None) => break,
            Tick::Line(Some(line)) => {
                let command = match input::parse_line(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                match command {
                    Command::Send(text) => {
                        if let Err(e) = client.send_text(text, system_prompt.clone()) {
                            println!("{}", e.user_message());
                        }
                    }
                    Command::SetSystemPrompt(prompt) => {
                        match &prompt {
                            Some(_) => println!("System prompt set."),
                            None => println!("System prompt cleared."),
                        }
                        system_prompt = prompt;
                    }
                    Command::Clear => {
                        client.clear();
                        println!("Conversation cleared.");
                    }
                    Command::Status => {
                        let status = client.status();
                        println!("{}", render::status_label(&status));
                        println!(
                            "session {} / conversation {} / {} messages",
                            client.session().session_id(),
                            client.session().conversation_id(),
                            client.messages().len()
                        );
                    }
                    Command::Help => println!("{HELP}"),
                    Command::Quit => break,
                }
            }
            Tick::Event(Some(event)) => handle_event(&client, event),
        }
    }

    debug!("shutting down");
    client.disconnect().await;
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut file_config: FileConfig = load_config(cli.config.as_deref())
        .extract()
        .context("failed to load configuration")?;
    if let Some(url) = &cli.url {
        file_config.url = url.clone();
    }
    let mut config = ClientConfig::from_file(&file_config)
        .with_context(|| format!("invalid configuration for {}", file_config.url))?;
    if cli.polling {
        config = config.with_transports(vec![TransportKind::Polling]);
    }
    Ok(config)
}

fn handle_event(client: &ChatClient, event: ClientEvent) {
    match event {
        ClientEvent::Connected { .. } => println!("{}", render::status_label(&client.status())),
        ClientEvent::Disconnected { reason } => {
            info!(%reason, "disconnected");
            println!("{}", render::status_label(&client.status()));
        }
        ClientEvent::Error(text) => println!("{text}"),
        ClientEvent::Message { outcome, .. } => {
            if let Some(message) = client.messages().get(outcome.index()) {
                let updated = matches!(outcome, Reconciled::Replaced(_));
                println!("{}", render::format_message(message, updated));
            }
        }
    }
}
