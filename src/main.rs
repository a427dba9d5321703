//! Prodpilot CLI entry point.

use anyhow::{Context, Result};
use prodpilot::agents::AgentRegistry;
use prodpilot::cli::init::{self, InitConfig, InitResult};
use prodpilot::cli::output::Output;
use prodpilot::cli::{AgentCommands, Cli, Commands, RequestArgs};
use prodpilot::coordination::Coordinator;
use prodpilot::memory::ContextAssembler;
use prodpilot::rag::{KnowledgeDocument, StaticKnowledgeProvider};
use prodpilot::types::{CoordinationRequest, Message};
use prodpilot::utils::toml_config::{LogFormat, LoggingConfig, PilotConfig, PilotConfigManager};
use prodpilot::ProviderRegistry;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Commands::Init { path, force } = &cli.command {
        let result = init::run(
            InitConfig {
                path: path.clone(),
                force: *force,
            },
            &output,
        );
        return match result {
            InitResult::Success | InitResult::AlreadyExists => Ok(()),
            InitResult::Error(e) => Err(anyhow::anyhow!(e)),
        };
    }

    let config = load_config(&cli.config, &output)?;
    init_tracing(&config.logging, cli.verbose);
    info!("Starting Prodpilot v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config { full, validate } = &cli.command {
        return show_config(&cli.config, &config, *full, *validate, &output);
    }

    let providers = ProviderRegistry::from_config(&config);
    let registry = Arc::new(
        AgentRegistry::from_config(&config, &providers)
            .await
            .context("Failed to build agent registry")?,
    );

    match cli.command {
        Commands::Agents(AgentCommands::List) => {
            output.agent_table(registry.descriptors());
            Ok(())
        }
        Commands::Agents(AgentCommands::Show { id }) => {
            let descriptor = registry
                .descriptor(&id)
                .ok_or_else(|| anyhow::anyhow!("Unknown agent '{}'", id))?;
            output.header(&descriptor.display_name);
            output.kv("id", &descriptor.id);
            output.kv("tier", descriptor.model_tier.as_str());
            output.kv(
                "tags",
                &descriptor
                    .capability_tags
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            output.kv("supporting", &descriptor.default_supporting.join(", "));
            Ok(())
        }
        Commands::Route { request } => {
            let coordinator = Coordinator::builder(Arc::clone(&registry))
                .with_config(&config)?
                .build()?;
            let decision = coordinator.route(&build_request(request, Vec::new()));
            output.routing(&decision);
            Ok(())
        }
        Commands::Ask {
            request,
            history,
            knowledge,
            stream,
            json,
            log_file,
        } => {
            let mut assembler = ContextAssembler::new(config.context.limits());
            if let Some(path) = knowledge {
                let documents: Vec<KnowledgeDocument> = read_json(&path)?;
                info!(documents = documents.len(), "Loaded knowledge documents");
                assembler = assembler
                    .with_knowledge(Arc::new(StaticKnowledgeProvider::from_documents(documents)));
            }
            let history: Vec<Message> = match history {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };

            let coordinator = Coordinator::builder(Arc::clone(&registry))
                .with_config(&config)?
                .with_assembler(assembler)
                .build()?;

            let request = build_request(request, history);
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; cancelling request");
                    ctrl_c.cancel();
                }
            });

            let result = if stream && !json {
                let (tx, mut rx) = mpsc::channel::<String>(64);
                let printer = tokio::spawn(async move {
                    use std::io::Write;
                    let mut stdout = std::io::stdout();
                    while let Some(chunk) = rx.recv().await {
                        let _ = write!(stdout, "{}", chunk);
                        let _ = stdout.flush();
                    }
                    println!();
                });
                let result = coordinator.coordinate_streaming(request, tx, cancel).await;
                let _ = printer.await;
                result
            } else {
                coordinator.coordinate_with_cancel(request, cancel).await
            };

            if let Some(path) = log_file {
                append_log(&coordinator, &path)?;
            }

            match result {
                Ok(result) if json => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    Ok(())
                }
                Ok(result) => {
                    if !stream {
                        output.answer(&result.final_response_text);
                    }
                    output.run_summary(&result);
                    Ok(())
                }
                Err(failure) => {
                    output.run_failure(&failure);
                    Err(failure.into())
                }
            }
        }
        Commands::Init { .. } | Commands::Config { .. } => Ok(()),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_filter = if verbose {
        "prodpilot=debug".to_string()
    } else {
        format!("prodpilot={}", logging.level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    let result = match logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("failed to initialize tracing subscriber: {}", e);
    }
}

fn load_config(path: &Path, output: &Output) -> Result<PilotConfig> {
    if !path.exists() {
        output.warning(&format!(
            "{} not found; using the starter configuration (run `prodpilot init` to create it)",
            path.display()
        ));
        return PilotConfig::parse(init::STARTER_CONFIG).context("Invalid starter configuration");
    }
    let manager = PilotConfigManager::new(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(manager.config().as_ref().clone())
}

fn show_config(
    path: &Path,
    config: &PilotConfig,
    full: bool,
    validate: bool,
    output: &Output,
) -> Result<()> {
    output.header("Configuration");
    output.kv("file", &path.display().to_string());

    if validate {
        config.validate()?;
        output.success("Configuration is valid");
    }

    if full {
        println!("{}", toml::to_string_pretty(config)?);
    } else {
        output.kv("providers", &config.providers.len().to_string());
        output.kv("models", &config.models.len().to_string());
        output.kv("agent overrides", &config.agents.len().to_string());
        output.kv("default mode", config.coordination.default_mode.as_str());
        output.kv("routing rules", &config.routing.rules.len().to_string());
    }
    Ok(())
}

fn build_request(args: RequestArgs, history: Vec<Message>) -> CoordinationRequest {
    let mut request = CoordinationRequest::new(args.query).with_history(history);
    request.explicit_primary_agent = args.primary;
    request.explicit_supporting_agents = args.support;
    request.mode = args.mode;
    request.scope_id = args.scope;
    request
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn append_log(coordinator: &Coordinator, path: &Path) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    coordinator.log().write_jsonl(std::io::BufWriter::new(file))?;
    Ok(())
}
