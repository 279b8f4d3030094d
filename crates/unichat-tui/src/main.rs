use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use unichat_core::{Config, Dispatcher, Settings};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "unichat", version)]
#[command(about = "Chat with local Ollama models from the terminal")]
struct Cli {
    /// Model to start with (added to the model list if missing)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Ollama server URL
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// Config file to read and update
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat window (default)
    Chat,
    /// Send a single message and print the reply
    Ask {
        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// List models pulled into the local Ollama store
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Chat) => {
            let _log_guard = match logging::default_log_path() {
                Ok(path) => logging::init_file(&path).ok(),
                Err(_) => None,
            };
            let (settings, config_path) = load_settings(&cli);
            run_chat(&settings, config_path).await
        }
        Some(Commands::Ask { ref text }) => {
            logging::init_stderr();
            let (settings, _) = load_settings(&cli);
            ask(&settings, &text.join(" ")).await
        }
        Some(Commands::Models) => {
            logging::init_stderr();
            let (settings, _) = load_settings(&cli);
            list_models(&settings).await
        }
    }
}

/// Resolve settings from the config file and command-line overrides.
///
/// A config file that cannot be read falls back to the defaults.
fn load_settings(cli: &Cli) -> (Settings, Option<PathBuf>) {
    let config_path = cli.config.clone().or_else(|| Config::default_path().ok());

    let config = match &config_path {
        Some(path) => Config::load_from(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unreadable config");
            Config::default()
        }),
        None => Config::default(),
    };

    let mut settings = config.settings();
    if let Some(endpoint) = &cli.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if let Some(model) = &cli.model {
        settings.select_model(model);
    }

    (settings, config_path)
}

async fn run_chat(settings: &Settings, config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!(
        endpoint = %settings.endpoint,
        model = %settings.default_model,
        "starting chat"
    );

    let mut app = App::new(settings, config_path)?;
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

async fn ask(settings: &Settings, text: &str) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let dispatcher = Dispatcher::new(settings.client()?);
    let mut session = settings.session();

    match dispatcher.send(&mut session, text).await {
        Ok(reply) => {
            println!("AI ({}): {}", session.model(), reply);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn list_models(settings: &Settings) -> Result<()> {
    let dispatcher = Dispatcher::new(settings.client()?);

    match dispatcher.list_models().await {
        Ok(models) if models.is_empty() => {
            println!("No models found. Pull a model with: ollama pull llama3");
        }
        Ok(models) => {
            for model in models {
                // Ollama reports tags ("llama3:latest"); config usually names the bare model
                let base = model.split(':').next().unwrap_or(&model);
                let marker = if settings.models.iter().any(|m| m == &model || m == base) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, model);
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
