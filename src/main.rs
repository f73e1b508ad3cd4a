//! audit CLI: goal-driven facility compliance audits.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use facility_audit::agent::{
    AuditPlanner, Controller, DecisionOracle, InMemoryCollaborators, OllamaOracle,
    SessionStatus,
};
use facility_audit::clock::{Clock, FixedClock, SystemClock, parse_instant};
use facility_audit::collab::DirectiveIndex;
use facility_audit::compliance;
use facility_audit::config::{AuditConfig, ConfigError};
use facility_audit::error::{AuditError, AuditResult};
use facility_audit::message::{AuditMessage, JsonSink, MessageSink, StdoutSink};
use facility_audit::paths::AuditPaths;
use facility_audit::store::{MemStore, RecordStore};

#[derive(Parser)]
#[command(name = "audit", version, about = "Goal-driven facility compliance audits")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/facility-audit/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pin the clock (RFC 3339 or YYYY-MM-DD) for reproducible runs.
    #[arg(long, global = true)]
    now: Option<String>,

    /// Emit newline-delimited JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal to completion.
    Run {
        /// The goal, e.g. "Audit facility FAC-AB-001".
        #[arg(required = true, num_args = 1..)]
        goal: Vec<String>,

        /// Decision oracle.
        #[arg(long, value_enum, default_value_t = OracleKind::Rules)]
        oracle: OracleKind,

        /// Override the iteration cap.
        #[arg(long)]
        cap: Option<usize>,

        /// Save the transcript under the state directory.
        #[arg(long)]
        save: bool,
    },

    /// List registered capabilities.
    Capabilities,

    /// List facilities in the record store.
    Facilities,

    /// Evaluate calibration compliance for one facility.
    Check {
        /// Facility id, e.g. FAC-AB-001.
        facility_id: String,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum OracleKind {
    /// Deterministic rule-based planner.
    Rules,
    /// Local language model via Ollama.
    Ollama,
}

fn main() -> miette::Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    run(cli).map_err(|err| {
        if json {
            JsonSink.emit(&AuditMessage::from_diagnostic(&err));
        }
        miette::Report::new(err)
    })
}

fn run(cli: Cli) -> AuditResult<()> {
    let paths = AuditPaths::resolve();
    let config_path = match (&cli.config, &paths) {
        (Some(p), _) => p.clone(),
        (None, Ok(paths)) => paths.config_file(),
        (None, Err(_)) => PathBuf::from("facility-audit.toml"),
    };
    let config = AuditConfig::load_or_default(&config_path)?;

    let clock: Arc<dyn Clock> = match &cli.now {
        Some(raw) => {
            let instant = parse_instant(raw).ok_or_else(|| AuditError::InvalidFlag {
                flag: "--now".into(),
                message: format!("{raw} is neither RFC 3339 (2025-01-15T12:00:00Z) nor a date (2025-01-15)"),
            })?;
            Arc::new(FixedClock(instant))
        }
        None => Arc::new(SystemClock),
    };
    let sink: Arc<dyn MessageSink> = if cli.json {
        Arc::new(JsonSink)
    } else {
        Arc::new(StdoutSink)
    };

    match cli.command {
        Commands::Run {
            goal,
            oracle,
            cap,
            save,
        } => {
            let goal = goal.join(" ");
            let config = match cap {
                Some(cap) => config.with_iteration_cap(cap).map_err(|err| AuditError::InvalidFlag {
                    flag: "--cap".into(),
                    message: match err {
                        ConfigError::Invalid { message, .. } => format!("{cap} ({message})"),
                        other => other.to_string(),
                    },
                })?,
                None => config,
            };
            let collab = collaborators(&config, clock.now())?;
            let oracle: Arc<dyn DecisionOracle> = match oracle {
                OracleKind::Rules => Arc::new(AuditPlanner::new(
                    config.notify_recipient.clone(),
                    config.follow_up_offset_days,
                    Arc::clone(&clock),
                )),
                OracleKind::Ollama => {
                    let ollama = OllamaOracle::new(config.ollama.clone());
                    if !ollama.is_reachable() {
                        tracing::warn!(
                            base_url = %config.ollama.base_url,
                            "Ollama did not answer on /api/tags; the session will likely fail"
                        );
                    }
                    Arc::new(ollama)
                }
            };

            let loop_config = config.controller();
            let controller = Controller::with_builtins(oracle, collab.context(clock))?
                .with_config(loop_config)
                .with_sink(Arc::clone(&sink));

            let session = controller.run(&goal);

            if save {
                let dir = paths.as_ref().map(|p| p.sessions_dir()).unwrap_or_else(|_| {
                    PathBuf::from("sessions")
                });
                let file = dir.join(session.file_name());
                session.save(&file)?;
                sink.emit(&AuditMessage::system(format!(
                    "Transcript saved to {}",
                    file.display()
                )));
            }

            if let SessionStatus::Failed { reason } = session.status {
                return Err(AuditError::SessionFailed {
                    id: session.id,
                    reason,
                });
            }
        }

        Commands::Capabilities => {
            let registry = facility_audit::agent::builtin_registry()?;
            for contract in registry.list() {
                if cli.json {
                    println!("{}", serde_json::to_string(contract)?);
                } else {
                    println!("{}  [{}]", contract.signature(), contract.side_effect);
                    println!("    {}", contract.description);
                }
            }
        }

        Commands::Facilities => {
            let store = MemStore::seeded(clock.now());
            for facility in store.list_facilities()? {
                if cli.json {
                    println!("{}", serde_json::to_string(&facility)?);
                } else {
                    println!(
                        "{}  {} ({}) - {} items",
                        facility.id,
                        facility.name,
                        facility.location,
                        facility.equipment_ids.len()
                    );
                }
            }
        }

        Commands::Check { facility_id } => {
            let store = MemStore::seeded(clock.now());
            let equipment = store.get_equipment(&facility_id)?;
            let report = compliance::evaluate_all(&facility_id, &equipment, clock.now());
            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print!("{}", report.render());
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    return Err(AuditError::ConfigExists {
                        path: config_path.display().to_string(),
                    });
                }
                if let Ok(paths) = &paths {
                    paths.ensure_dirs()?;
                }
                AuditConfig::default().save(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                print!("{}", config.to_toml()?);
            }
        },
    }

    Ok(())
}

fn collaborators(
    config: &AuditConfig,
    now: chrono::DateTime<chrono::Utc>,
) -> AuditResult<InMemoryCollaborators> {
    let directives = match &config.directives_path {
        Some(path) => DirectiveIndex::load(path)?,
        None => DirectiveIndex::builtin(),
    };
    Ok(InMemoryCollaborators::with_directives(
        MemStore::seeded(now),
        directives,
    ))
}
