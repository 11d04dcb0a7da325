//! Launch a sandboxed container session for the current repository.

mod gitmeta;
mod preflight;

use anyhow::Result;
use clap::{ArgAction, Parser};
use config_probe::DiscoveredConfig;
use session::{ensure_image, Engine, HostCredentials, LaunchSpec, Session};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "burrowctl",
    version,
    disable_version_flag = true,
    about = "Launch a sandboxed, short-lived container session for the current repository"
)]
struct Cli {
    /// Print the assembled launch plan instead of starting a session
    #[arg(long)]
    dry_run: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let engine = Engine::from_env();
    let agent_socket = preflight::check_requirements(&engine).await?;

    let repository = gitmeta::repository_reference().await?;
    info!(
        repo = %repository.name,
        branch = %repository.branch,
        "validated repository reference"
    );

    let config = DiscoveredConfig::discover();
    let credentials = HostCredentials::detect(agent_socket);

    let image = if cli.dry_run {
        // A dry run reports the plan without provisioning anything.
        session::IMAGE_NAME.to_string()
    } else {
        ensure_image(&engine).await?
    };

    let tty = atty::is(atty::Stream::Stdin);
    let spec = LaunchSpec::assemble(&image, &repository, &config, &credentials, tty);

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&spec)?);
        println!();
        println!("{} {}", engine.binary(), spec.run_args().join(" "));
        return Ok(0);
    }

    let outcome = Session::new(engine, spec).run().await?;
    if !outcome.cleanup.all_ok() {
        warn!("one or more session volumes could not be removed; see warnings above");
    }
    Ok(outcome.exit_code)
}
