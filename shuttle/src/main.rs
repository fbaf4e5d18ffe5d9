use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shuttle::{
    Credential, ExperimentDefinition, Plan, RunOutcome, Session, ShuttleConfig, ShuttleError,
    TerminalConsole,
};
use shuttle_gateway::{DeviceFlowAuthenticator, GatewayClient};

#[derive(Parser)]
#[command(name = "shuttle")]
#[command(about = "Plan, launch and monitor application runs on remote compute", long_about = None)]
struct Cli {
    /// Credential cache file (defaults to the user config directory)
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in through the identity provider's device flow
    Login,

    /// Forget the cached credential
    Logout,

    /// Show who the cached credential belongs to
    Whoami,

    /// Build a plan file from an experiment definition
    Plan {
        /// Experiment definition (YAML or JSON)
        experiment: PathBuf,

        /// Where to write the plan
        #[arg(short, long, default_value = "plan.json")]
        output: PathBuf,
    },

    /// Print the tasks of a plan
    Describe {
        plan: PathBuf,
    },

    /// Confirm and launch a plan, recording execution references in the file
    Run {
        plan: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// Tasks launched at once
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Print the current state of every task
    Status {
        plan: PathBuf,
    },

    /// Wait until every task has finished
    Join {
        plan: PathBuf,

        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,

        /// Disable progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Ask every task to terminate
    Stop {
        plan: PathBuf,
    },

    /// Download every task's outputs
    Collect {
        plan: PathBuf,

        /// Destination directory
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "shuttle=info,shuttle_gateway=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Err(e) if e.downcast_ref::<ShuttleError>().is_some_and(ShuttleError::is_expected) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        other => other,
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let mut config = ShuttleConfig::from_env()?;
    if cli.credentials.is_some() {
        config.credentials_path = cli.credentials;
    }
    let store = config.credential_store()?;

    match cli.command {
        Commands::Login => {
            let auth = DeviceFlowAuthenticator::new(config.gateway.auth.clone())?;
            let tokens = auth
                .login(|code| {
                    println!("User code: {}", code.user_code);
                    println!("Please authenticate by visiting: {}", code.verification_url());
                })
                .await?;
            let credential = Credential::from_tokens(tokens);
            store.save(&credential)?;
            println!(
                "Logged in as {}",
                credential.username().unwrap_or_else(|| "unknown user".into())
            );
        }

        Commands::Logout => {
            if store.clear()? {
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }

        Commands::Whoami => match store.load()? {
            Some(credential) => println!(
                "{} (since {})",
                credential.username().unwrap_or_else(|| "unknown user".into()),
                credential.issued_at().format("%Y-%m-%d %H:%M UTC")
            ),
            None => println!("Not logged in"),
        },

        Commands::Plan { experiment, output } => {
            let session = open_session(&config, &store)?;
            let definition = ExperimentDefinition::load(&experiment)
                .with_context(|| format!("reading experiment {}", experiment.display()))?;
            let plan = definition.build(&session)?.plan();
            plan.save(&output)?;
            println!("{}", plan.describe());
            println!("Plan with {} task(s) written to {}", plan.len(), output.display());
        }

        Commands::Describe { plan } => {
            let plan = load_plan(&plan, &config, &store)?;
            println!("{}", plan.describe());
        }

        Commands::Run {
            plan: path,
            yes,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
                config.validate()?;
            }
            let mut plan = load_plan(&path, &config, &store)?;
            let mut console = TerminalConsole;

            match plan.run(yes, &mut console).await {
                Ok(RunOutcome::Launched(report)) => {
                    plan.save(&path)?;
                    print!("{}", report);
                }
                Ok(RunOutcome::Aborted) => {}
                Err(e @ ShuttleError::LaunchFailed { .. }) => {
                    // Keep references of whatever did start
                    plan.save(&path)?;
                    if let ShuttleError::LaunchFailed { report, .. } = &e {
                        eprint!("{}", report);
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Status { plan } => {
            let plan = load_plan(&plan, &config, &store)?;
            let states = plan.statuses().await?;
            for (index, (task, state)) in plan.tasks().iter().zip(states).enumerate() {
                let execution = task.execution_ref().map(|r| r.to_string()).unwrap_or_default();
                let state = state.map_or_else(|| "NOT LAUNCHED".to_string(), |s| s.to_string());
                println!("[{}] {:<32} {:<38} {}", index, task.name(), execution, state);
            }
        }

        Commands::Join {
            plan,
            interval,
            no_progress,
        } => {
            if no_progress {
                config.show_progress = false;
            }
            let poll_interval = interval.map(Duration::from_secs).unwrap_or(config.poll_interval);
            let plan = load_plan(&plan, &config, &store)?;
            let report = plan.join(poll_interval).await?;

            for (task, state) in plan.tasks().iter().zip(&report.states) {
                println!("{}: {}", task.name(), state);
            }
            println!("Finished after {} poll(s)", report.polls);
        }

        Commands::Stop { plan } => {
            let plan = load_plan(&plan, &config, &store)?;
            plan.stop().await?;
            println!("Stop requested for {} task(s)", plan.len());
        }

        Commands::Collect { plan, dest } => {
            let dest = dest.unwrap_or_else(|| config.results_dir.clone());
            let plan = load_plan(&plan, &config, &store)?;
            let files = plan.collect_results(&dest).await?;

            for (task, paths) in plan.tasks().iter().zip(&files) {
                println!("{}: {} file(s)", task.name(), paths.len());
                for path in paths {
                    println!("  {}", path.display());
                }
            }
        }
    }

    Ok(())
}

fn open_session(config: &ShuttleConfig, store: &shuttle::CredentialStore) -> Result<Session> {
    let gateway = GatewayClient::new(config.gateway.clone())?;
    let mut session = Session::anonymous().with_gateway(Arc::new(gateway));
    if let Some(credential) = store.load()? {
        session.login(credential);
    }
    Ok(session)
}

fn load_plan(path: &Path, config: &ShuttleConfig, store: &shuttle::CredentialStore) -> Result<Plan> {
    let session = open_session(config, store)?;
    let plan = Plan::load(path, &session)
        .with_context(|| format!("loading plan {}", path.display()))?;
    Ok(plan.with_options(config.execution_options()))
}
