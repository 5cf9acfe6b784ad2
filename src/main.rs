//! noetic CLI: a symbolic cognitive engine over KIF terms, a per-context
//! belief base, and truth-maintained forward/backward reasoning.
//!
//! Every subcommand is a thin wrapper over the [`noetic::cognition::Cognition`]
//! facade — the CLI does not duplicate engine logic, it just parses
//! arguments, loads/saves a persistence snapshot around a single invocation,
//! and prints results.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use noetic::bus::EventBus;
use noetic::client::{discover_server, NoeticClient};
use noetic::cognition::Cognition;
use noetic::config::EngineConfig;
use noetic::event::{QueryType, RetractTarget};
use noetic::kb::GLOBAL_CONTEXT;
use noetic::notes::NoteStatus;
use noetic::paths::NoeticPaths;
use noetic::persistence;
use noetic::term::Term;

#[derive(Parser)]
#[command(name = "noetic", version, about = "Symbolic cognitive engine")]
struct Cli {
    /// Path to the persistence snapshot (default: XDG data dir).
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Path to the engine config file (default: XDG config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Talk to a running `noetic-server` instead of an in-process engine.
    #[arg(long, global = true)]
    remote: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assert a KIF sentence as an input fact.
    Assert {
        /// KIF sentence, e.g. "(instance rex Dog)".
        kif: String,
        /// Context id (defaults to the global context).
        #[arg(long)]
        kb: Option<String>,
        /// Note id this assertion belongs to, if any.
        #[arg(long)]
        note: Option<String>,
    },

    /// Ask a question against the belief base.
    Query {
        /// KIF pattern, e.g. "(instance rex ?what)".
        pattern: String,
        /// Query shape.
        #[arg(long, value_enum, default_value = "bindings")]
        r#type: QueryKind,
        /// Context id to query (defaults to the global context).
        #[arg(long)]
        kb: Option<String>,
    },

    /// Retract a fact by assertion id, exact KIF text, or note.
    Retract {
        /// Context id (defaults to the global context).
        #[arg(long)]
        kb: Option<String>,
        #[command(subcommand)]
        target: RetractArg,
    },

    /// Add a rule (implication, biconditional, or rewrite).
    Rule {
        /// KIF rule form, e.g. "(=> (instance ?x Dog) (instance ?x Mammal))".
        form: String,
        /// Priority used to break contradictions (higher wins).
        #[arg(long, default_value = "1.0")]
        priority: f64,
        /// Note id this rule belongs to, if any.
        #[arg(long)]
        note: Option<String>,
    },

    /// List every active rule.
    Rules,

    /// Manage notes (lightweight per-note contexts, §4.9).
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Invoke a named tool directly, bypassing trigger-pattern matching.
    Tool {
        name: String,
        /// Context id (defaults to the global context).
        #[arg(long)]
        kb: Option<String>,
        /// `key=value` parameters, repeatable.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Persistence snapshot management.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum NoteAction {
    Create { title: String },
    List,
    Rename { id: String, title: String },
    SetText { id: String, text: String },
    Archive { id: String },
    Activate { id: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum RetractArg {
    Id { id: String },
    Kif { kif: String },
    Note { id: String },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Write the current belief base and notes to the snapshot file.
    Save,
    /// Load the snapshot file into a fresh engine and report what it contains.
    Inspect,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum QueryKind {
    Bindings,
    TrueFalse,
    Goal,
}

impl From<QueryKind> for QueryType {
    fn from(k: QueryKind) -> Self {
        match k {
            QueryKind::Bindings => QueryType::AskBindings,
            QueryKind::TrueFalse => QueryType::AskTrueFalse,
            QueryKind::Goal => QueryType::AchieveGoal,
        }
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected key=value, got {s:?}")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    if let Some(base_url) = &cli.remote {
        let client = NoeticClient::remote(base_url.clone());
        return run_remote(&cli, &client);
    }

    let paths = NoeticPaths::resolve().into_diagnostic()?;
    paths.ensure_dirs().into_diagnostic()?;

    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let config = if config_path.exists() { EngineConfig::load(&config_path).into_diagnostic()? } else { EngineConfig::default() };

    let snapshot_path = cli.snapshot.clone().unwrap_or_else(|| paths.snapshot_file());

    let bus = Arc::new(EventBus::start());
    let llm_enabled = config.llm_enabled;
    let (llm_base_url, llm_model, dialogue_timeout_ms) = (config.llm_base_url.clone(), config.llm_model.clone(), config.dialogue_timeout_ms);
    let cognition = Cognition::new(config, bus);
    if llm_enabled {
        cognition.set_llm_client(Arc::new(noetic::llm::HttpLlmClient::new(llm_base_url, llm_model)), dialogue_timeout_ms);
    }

    if snapshot_path.exists() {
        persistence::load(&snapshot_path, &cognition).into_diagnostic()?;
    }

    let client = NoeticClient::local(Arc::clone(&cognition));
    run_local(&cli, &cognition, &client, &snapshot_path)
}

/// Commands that mutate or read engine state, run against a local engine,
/// auto-saving the snapshot afterward so a CLI session behaves like a REPL
/// across invocations.
fn run_local(cli: &Cli, cognition: &Arc<Cognition>, client: &NoeticClient, snapshot_path: &PathBuf) -> Result<()> {
    match &cli.command {
        Commands::Assert { kif, kb, note } => {
            let kb = kb.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            let id = client.assert_kif(&kb, kif, note.clone()).into_diagnostic()?;
            println!("{id}");
        }
        Commands::Query { pattern, r#type, kb } => {
            let answer = client.query((*r#type).into(), pattern, kb.clone()).into_diagnostic()?;
            print_answer(&answer);
        }
        Commands::Retract { kb, target } => {
            let kb = kb.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            let target = match target {
                RetractArg::Id { id } => {
                    let raw = id.trim_start_matches('a').parse::<u64>().into_diagnostic()?;
                    let assertion_id = noetic::ids::AssertionId::new(raw).ok_or_else(|| miette::miette!("invalid assertion id: {id}"))?;
                    RetractTarget::ById(assertion_id)
                }
                RetractArg::Kif { kif } => RetractTarget::ByKif(kif.clone()),
                RetractArg::Note { id } => RetractTarget::ByNote(id.clone()),
            };
            client.retract(&kb, target).into_diagnostic()?;
        }
        Commands::Rule { form, priority, note } => {
            let term = Term::parse_kif(form).into_diagnostic()?;
            let ids = cognition.add_rule(term, *priority, note.clone()).into_diagnostic()?;
            for id in ids {
                println!("{id}");
            }
        }
        Commands::Rules => {
            for rule in cognition.all_rules() {
                println!("{}\tpriority={}\t{}", rule.id, rule.priority, rule.form.to_kif());
            }
        }
        Commands::Note { action } => run_note_action(cognition, action)?,
        Commands::Tool { name, kb, params } => {
            let kb = kb.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            let result = client.run_tool(&kb, name, params.clone()).into_diagnostic()?;
            println!("{result}");
        }
        Commands::Snapshot { action } => match action {
            SnapshotAction::Save => {
                persistence::save(cognition, snapshot_path).into_diagnostic()?;
                println!("saved {}", snapshot_path.display());
                return Ok(());
            }
            SnapshotAction::Inspect => {
                let notes = cognition.note_list();
                let rules = cognition.all_rules();
                println!("notes: {}", notes.len());
                println!("rules: {}", rules.len());
                return Ok(());
            }
        },
    }

    persistence::save(cognition, snapshot_path).into_diagnostic()?;
    Ok(())
}

fn run_note_action(cognition: &Arc<Cognition>, action: &NoteAction) -> Result<()> {
    match action {
        NoteAction::Create { title } => {
            let note = cognition.note_create(title.clone());
            println!("{}", note.id);
        }
        NoteAction::List => {
            for note in cognition.note_list() {
                println!("{}\t{:?}\t{}", note.id, note.status, note.title);
            }
        }
        NoteAction::Rename { id, title } => {
            cognition.note_rename(id, title.clone()).into_diagnostic()?;
        }
        NoteAction::SetText { id, text } => {
            cognition.note_set_text(id, text.clone()).into_diagnostic()?;
        }
        NoteAction::Archive { id } => {
            cognition.note_set_status(id, NoteStatus::Archived).into_diagnostic()?;
        }
        NoteAction::Activate { id } => {
            cognition.note_set_status(id, NoteStatus::Active).into_diagnostic()?;
        }
        NoteAction::Delete { id } => {
            cognition.note_delete(id).into_diagnostic()?;
        }
    }
    Ok(())
}

/// Commands against a `--remote` engine. Snapshot save/inspect and raw rule
/// listing need direct `Cognition` access and are unavailable in this mode.
fn run_remote(cli: &Cli, client: &NoeticClient) -> Result<()> {
    match &cli.command {
        Commands::Assert { kif, kb, note } => {
            let kb = kb.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            let id = client.assert_kif(&kb, kif, note.clone()).into_diagnostic()?;
            println!("{id}");
        }
        Commands::Query { pattern, r#type, kb } => {
            let answer = client.query((*r#type).into(), pattern, kb.clone()).into_diagnostic()?;
            print_answer(&answer);
        }
        Commands::Retract { kb, target } => {
            let kb = kb.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            let target = match target {
                RetractArg::Id { id } => {
                    let raw = id.trim_start_matches('a').parse::<u64>().into_diagnostic()?;
                    let assertion_id = noetic::ids::AssertionId::new(raw).ok_or_else(|| miette::miette!("invalid assertion id: {id}"))?;
                    RetractTarget::ById(assertion_id)
                }
                RetractArg::Kif { kif } => RetractTarget::ByKif(kif.clone()),
                RetractArg::Note { id } => RetractTarget::ByNote(id.clone()),
            };
            client.retract(&kb, target).into_diagnostic()?;
        }
        Commands::Tool { name, kb, params } => {
            let kb = kb.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            let result = client.run_tool(&kb, name, params.clone()).into_diagnostic()?;
            println!("{result}");
        }
        other => {
            return Err(miette::miette!(
                "{} requires direct engine access; drop --remote to run it locally",
                command_name(other)
            ))
        }
    }
    Ok(())
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Assert { .. } => "assert",
        Commands::Query { .. } => "query",
        Commands::Retract { .. } => "retract",
        Commands::Rule { .. } => "rule",
        Commands::Rules => "rules",
        Commands::Note { .. } => "note",
        Commands::Tool { .. } => "tool",
        Commands::Snapshot { .. } => "snapshot",
    }
}

fn print_answer(answer: &noetic::event::Answer) {
    println!("status: {:?}", answer.status);
    for (i, binding_set) in answer.bindings.iter().enumerate() {
        let rendered: Vec<String> = binding_set.iter().map(|(k, v)| format!("{k}={}", v.to_kif())).collect();
        println!("[{i}] {}", rendered.join(", "));
    }
}

/// Find a running server's address via the discovery pid file, for tooling
/// that wants to default to `--remote` when one is already up.
#[allow(dead_code)]
fn discover_local_server() -> Option<String> {
    let paths = NoeticPaths::resolve().ok()?;
    discover_server(&paths.pid_file()).map(|info| info.base_url())
}
