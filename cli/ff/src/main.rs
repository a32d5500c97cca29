//! FlashFusion AI CLI

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use ff_ai::{find_model, is_development_mode, AiConfig, AiService, KeySource, MODELS};
use ff_protocol::{CodeType, GenerationOptions, GenerationRequest, ProviderId};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ff")]
#[command(about = "FlashFusion AI - model selection and code generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List models whose provider has an API key
    Models {
        /// Show the whole registry, marking unconfigured providers
        #[arg(long)]
        all: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage provider API keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Select the model used for generation
    Select {
        /// Model id (see `ff models --all`)
        #[arg(value_name = "MODEL_ID")]
        model: String,
    },

    /// Show the current selection and configured providers
    Status,

    /// Generate code with the selected model
    Generate {
        /// What to generate
        #[arg(short = 't', long = "type", default_value = "component")]
        code_type: CodeType,

        /// Target framework
        #[arg(short, long, default_value = "react")]
        framework: String,

        /// What the code must do
        #[arg(short, long)]
        requirements: String,

        /// Target language
        #[arg(short, long)]
        language: Option<String>,

        /// Feature tags (repeatable)
        #[arg(long = "feature")]
        features: Vec<String>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Write the code to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Generate Markdown documentation for a source file
    Docs {
        /// Source file to document
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Kind of code in the file
        #[arg(short = 't', long = "type", default_value = "component")]
        code_type: CodeType,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Store an API key in the keychain (reads stdin when KEY is omitted)
    Set {
        /// Provider (openai, anthropic, google)
        provider: ProviderId,

        /// API key
        key: Option<String>,
    },

    /// Remove a stored API key
    Remove {
        /// Provider (openai, anthropic, google)
        provider: ProviderId,
    },

    /// List providers and whether a key is configured
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG wins; otherwise verbose in development
    let default_level = if is_development_mode() { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AiConfig::load()?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Configuration loaded");
    let service = AiService::from_config(config)?;

    match cli.command {
        Commands::Models { all, json } => list_models(&service, all, json),
        Commands::Key { command } => handle_key(&service, command),
        Commands::Select { model } => select_model(&service, &model),
        Commands::Status => show_status(&service),
        Commands::Generate {
            code_type,
            framework,
            requirements,
            language,
            features,
            temperature,
            out,
        } => {
            let mut request = GenerationRequest::new(code_type, framework, requirements);
            request.language = language;
            request.features = features;
            if temperature.is_some() {
                request.options = Some(GenerationOptions {
                    temperature,
                    ..Default::default()
                });
            }
            generate(&service, request, out).await
        }
        Commands::Docs { file, code_type } => document(&service, file, code_type).await,
    }
}

type Service = AiService<ff_ai::KeychainStore, ff_ai::FileSelectionStore>;

fn list_models(service: &Service, all: bool, json: bool) -> anyhow::Result<()> {
    let configured = service.credentials().configured_providers();
    let models: Vec<_> = if all {
        MODELS.to_vec()
    } else {
        service.list_available_models()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!("{}", style("🤖 Models").bold());
    if models.is_empty() {
        println!("  No models available.");
        println!("  Use: ff key set <provider> <key>");
        return Ok(());
    }

    let selected = service.selection().map(|s| s.model_id);
    for model in models {
        let marker = if selected.as_deref() == Some(model.id) { "▶" } else { "•" };
        let mut line = format!(
            "  {} {:<28} {:<18} {}",
            marker, model.id, model.display_name, model.provider
        );
        if !model.supports_code {
            line.push_str("  (drafts only)");
        }
        if configured.contains(&model.provider) {
            println!("{line}");
        } else {
            println!("{} {}", style(line).dim(), style("(no key)").yellow());
        }
    }
    Ok(())
}

fn handle_key(service: &Service, command: KeyCommands) -> anyhow::Result<()> {
    match command {
        KeyCommands::Set { provider, key } => {
            let key = match key {
                Some(k) => k,
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line.trim().to_string()
                }
            };
            if key.is_empty() {
                anyhow::bail!("API key cannot be empty");
            }
            service.set_api_key(provider, &key)?;
            println!(
                "{}",
                style(format!("✅ API key stored for {}", provider.display_name())).green()
            );
        }
        KeyCommands::Remove { provider } => {
            service.remove_api_key(provider)?;
            println!(
                "{}",
                style(format!("🗑️  API key removed for {}", provider.display_name())).bold()
            );
            if service.selection().is_some_and(|s| s.provider == provider) {
                println!(
                    "{}",
                    style("  The selected model now has no key; select another or set a key.")
                        .yellow()
                );
            }
        }
        KeyCommands::List => {
            println!("{}", style("🔑 Provider Keys").bold());
            for provider in ProviderId::ALL {
                let status = match service.credentials().key_source(provider) {
                    Some(KeySource::Stored) => style("configured (keychain)".to_string()).green(),
                    Some(KeySource::Environment) => {
                        style(format!("configured (${})", ff_ai::credentials::env_var_for(provider))).green()
                    }
                    None => style("not configured".to_string()).dim(),
                };
                println!("  • {:<10} {}", provider.as_str(), status);
            }
        }
    }
    Ok(())
}

fn select_model(service: &Service, model_id: &str) -> anyhow::Result<()> {
    let model = service.set_model(model_id)?;
    println!(
        "{}",
        style(format!(
            "✅ Selected {} ({})",
            model.display_name,
            model.provider.display_name()
        ))
        .green()
    );
    Ok(())
}

fn show_status(service: &Service) -> anyhow::Result<()> {
    println!("{}", style("📋 FlashFusion AI").bold());
    match service.selection() {
        Some(selection) => {
            let name = find_model(&selection.model_id)
                .map(|m| m.display_name)
                .unwrap_or("unknown");
            println!("  Model:    {} ({})", selection.model_id, name);
            println!("  Provider: {}", selection.provider);
            if !service.credentials().is_configured(selection.provider) {
                println!("{}", style("  ⚠ provider has no API key").yellow());
            }
        }
        None => println!("  Model:    none selected (use: ff select <model-id>)"),
    }

    let configured = service.credentials().configured_providers();
    let names: Vec<_> = configured.iter().map(|p| p.as_str()).collect();
    println!(
        "  Keys:     {}",
        if names.is_empty() { "none".to_string() } else { names.join(", ") }
    );
    println!("  Settings: {}", service.config().settings_path().display());
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn generate(
    service: &Service,
    request: GenerationRequest,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let model = service
        .current_model()
        .map(|m| m.display_name)
        .unwrap_or("no model");
    let pb = spinner(&format!("Generating {} with {}...", request.code_type, model));

    let result = service.generate_code(&request).await;
    pb.finish_and_clear();
    let code = result?;

    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, format!("{code}\n")).await?;
            println!(
                "{}",
                style(format!("✅ Wrote {}", path.display())).green()
            );
        }
        None => println!("{code}"),
    }
    Ok(())
}

async fn document(service: &Service, file: PathBuf, code_type: CodeType) -> anyhow::Result<()> {
    let code = tokio::fs::read_to_string(&file).await?;
    let pb = spinner(&format!("Documenting {}...", file.display()));

    let result = service.generate_documentation(&code, code_type).await;
    pb.finish_and_clear();

    println!("{}", result?);
    Ok(())
}
