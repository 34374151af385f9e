// Daimon CLI — terminal chat plus inspection of the memory store.

use clap::{Parser, Subcommand};
use daimon::engine::config::default_config_path;
use daimon::engine::trace::read_trace;
use daimon::{CycleEngine, EngineConfig, EngineResult};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "daimon")]
#[command(about = "Daimon - cognitive cycle engine for a persistent chat persona", long_about = None)]
struct Cli {
    /// Config file (TOML). Defaults to the platform data directory.
    #[arg(long, global = true, env = "DAIMON_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the backend from this terminal (no persona, no profile)
    Chat {
        #[arg(long, default_value = "local")]
        thread: String,
    },
    /// Run one full cognitive cycle as if a channel delivered the message
    Send {
        text: String,
        #[arg(long, default_value = "cli")]
        channel: String,
        #[arg(long, default_value = "main")]
        thread: String,
        #[arg(long, default_value = "cli-user")]
        user: String,
        #[arg(long, default_value = "You")]
        name: String,
    },
    /// Show every memory entry and trace event of one cycle
    Trace { trace_id: String },
    /// Print a user's profile document
    Profile { user_id: String },
    /// Print the persona's global state
    State,
    /// Sweep old working memory and stale session mappings
    Cleanup,
}

fn load_config(path: Option<PathBuf>) -> EngineResult<EngineConfig> {
    let path = path.unwrap_or_else(default_config_path);
    log::debug!("[cli] Using config {}", path.display());
    let config = EngineConfig::load_or_default(&path)?;
    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(config)
}

async fn chat(engine: &CycleEngine, thread: &str) -> EngineResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text == "/quit" || text == "/exit" {
            break;
        }
        if !text.is_empty() {
            let reply = engine.process_terminal(text, thread).await?;
            stdout.write_all(format!("{}\n\n", reply).as_bytes()).await?;
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> EngineResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> EngineResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let engine = CycleEngine::open(config)?;

    match cli.command {
        Commands::Chat { thread } => chat(&engine, &thread).await?,

        Commands::Send { text, channel, thread, user, name } => {
            let reply = engine.process_cycle(&text, &channel, &thread, &user, &name).await?;
            if cli.json {
                print_json(&serde_json::json!({ "reply": reply }))?;
            } else {
                println!("{}", reply);
            }
        }

        Commands::Trace { trace_id } => {
            let entries = engine.store().get_trace(&trace_id)?;
            let events = match &engine.config().trace_path {
                Some(path) if path.exists() => read_trace(path, &trace_id)?,
                _ => Vec::new(),
            };
            if cli.json {
                print_json(&serde_json::json!({ "entries": entries, "events": events }))?;
            } else {
                for e in &entries {
                    let verb = e.verb.as_deref().map(|v| format!(" ({})", v)).unwrap_or_default();
                    println!("#{} [{}] {}{}: {}", e.id, e.entry_type.as_str(), e.actor, verb, e.content);
                }
                for ev in &events {
                    println!("{} {:?} {}", ev.at, ev.phase, ev.summary);
                }
                if entries.is_empty() && events.is_empty() {
                    eprintln!("no trace {}", trace_id);
                }
            }
        }

        Commands::Profile { user_id } => match engine.store().get_profile(&user_id)? {
            Some(p) if cli.json => print_json(&serde_json::to_value(&p)?)?,
            Some(p) => println!("{}", p.profile_text),
            None => eprintln!("no profile for {}", user_id),
        },

        Commands::State => {
            let state = engine.store().global_state()?;
            if cli.json {
                let map: serde_json::Map<String, serde_json::Value> =
                    state.iter().map(|(k, v)| (k.to_string(), v.into())).collect();
                print_json(&serde_json::Value::Object(map))?;
            } else {
                for (k, v) in state.iter() {
                    println!("{}: {}", k, v);
                }
            }
        }

        Commands::Cleanup => {
            let (entries, sessions) = engine.cleanup()?;
            if cli.json {
                print_json(&serde_json::json!({ "entries": entries, "sessions": sessions }))?;
            } else {
                println!("removed {} entr(ies), {} session mapping(s)", entries, sessions);
            }
        }
    }
    Ok(())
}
