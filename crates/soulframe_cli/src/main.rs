use clap::Parser;
use soulframe_core::telemetry::TracingTelemetry;
use soulframe_core::{Identity, ModeGate, Platform, SoulframeConfig, StateStore, SystemMode};
use soulframe_limbic::TaskScheduler;
use soulframe_memory::{InMemoryStore, SqliteStore};
use soulframe_reasoning::{providers, Soulframe, TurnRequest};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod repl;

use repl::Command;

#[derive(Parser, Debug)]
#[command(name = "soulframe", author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "soulframe.toml", env = "SOULFRAME_CONFIG")]
    config: String,

    /// Path to the state database; in-memory when omitted
    #[arg(short, long, env = "SOULFRAME_DB")]
    db: Option<String>,

    /// Responder provider (mock or openai), overrides the config file
    #[arg(short, long)]
    responder: Option<String>,

    /// Host platform: desktop or mobile
    #[arg(short, long, default_value = "desktop")]
    platform: String,

    /// Host name used to key state
    #[arg(long, default_value = "host")]
    host: String,

    /// Allow the local model when the primary responder fails
    #[arg(long)]
    local_fallback: bool,

    /// Emit JSON logs
    #[arg(long)]
    log_json: bool,
}

const SYNTH_ID: &str = "soulframe";

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

fn parse_platform(s: &str) -> anyhow::Result<Platform> {
    match s.trim().to_ascii_lowercase().as_str() {
        "desktop" => Ok(Platform::Desktop),
        "mobile" => Ok(Platform::Mobile),
        other => anyhow::bail!("unknown platform: {}", other),
    }
}

async fn open_store(path: Option<&str>) -> anyhow::Result<Arc<dyn StateStore>> {
    match path {
        Some(path) => {
            info!("Connecting to state store at {}...", path);
            Ok(Arc::new(SqliteStore::new(path).await?))
        }
        None => {
            info!("No database given, state lives in memory");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

fn prompt() -> anyhow::Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    let platform = parse_platform(&args.platform)?;
    let mut config = SoulframeConfig::load_or_default(&args.config);
    if let Some(provider) = &args.responder {
        config.responder.provider = provider.clone();
    }
    let db = args
        .db
        .clone()
        .or_else(|| config.memory.db_path.as_ref().map(|p| p.display().to_string()));

    info!("Initializing Soulframe...");
    let store = open_store(db.as_deref()).await?;
    let primary = providers::primary_from_config(&config.responder)?;
    let local = providers::local_from_config(&config.responder)?;
    info!(
        "Responder: {} (local fallback: {})",
        config.responder.provider,
        if local.is_some() { "available" } else { "none" }
    );

    let frame = Soulframe::assemble(
        config,
        store,
        Arc::new(ModeGate::new(SystemMode::Normal)),
        primary,
        local,
        Arc::new(TracingTelemetry),
    );

    let shutdown = CancellationToken::new();
    let mut scheduler = TaskScheduler::new(shutdown.clone());
    let (ambient_tx, mut ambient_rx) = mpsc::channel(16);
    frame.spawn_background(&mut scheduler, ambient_tx);

    let identity = Identity::new(SYNTH_ID, args.host.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Soulframe online. Type '/help' for commands, 'quit' to exit.");
    prompt()?;

    loop {
        tokio::select! {
            Some(line) = ambient_rx.recv() => {
                println!("\n({})", line.text);
                prompt()?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match repl::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Skip) => {}
                    Ok(Command::Help) => println!("{}", repl::HELP),
                    Ok(Command::Mode(mode)) => {
                        frame.mode.set(mode);
                        println!("[mode: {}]", mode);
                    }
                    Ok(Command::Climate) => {
                        let climate = frame.emotion.climate(&identity).await;
                        println!(
                            "[weather: {}, stability {:.2}, short-term valence {:.2}]",
                            climate.weather, climate.stability_score, climate.short_term.valence
                        );
                    }
                    Ok(Command::Mood) => match frame.emotion.snapshot(&identity).await {
                        Some(s) => println!("[mood: {}, valence {:.2}]", s.dominant_mood.label(), s.valence),
                        None => println!("[mood: unknown]"),
                    },
                    Ok(Command::Say(message)) => {
                        let mut request = TurnRequest::new(identity.clone(), message, platform);
                        if args.local_fallback {
                            request = request.allow_local_fallback();
                        }
                        let reply = frame.orchestrator.respond(request, &shutdown).await;
                        println!("\n{}: {}\n", SYNTH_ID, reply.text);
                        for intent in &reply.pending_tool_intents {
                            println!("[pending {}: {}]", intent.tool, intent.description);
                        }
                    }
                    Err(e) => {
                        error!("{}", e);
                        println!("[{}]", e);
                    }
                }
                prompt()?;
            }
        }
    }

    info!("Shutting down background tasks...");
    scheduler.shutdown().await;
    Ok(())
}
