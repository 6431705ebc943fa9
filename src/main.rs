//! Harbormaster - remote FreeBSD jail lifecycle manager
//!
//! Drives the iocage administrative tool on a jail host over a local or
//! SSH shell, converging each declared jail to its configured state.

mod admin;
mod cli;
mod error;
mod exec;
mod jail;
mod manifest;
mod report;
mod template;
mod zfs;

use cli::{Cli, Commands};
use error::{Error, Result};
use jail::Master;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        // Aborted operations already logged their diagnostics
        if !matches!(e, Error::Aborted) {
            tracing::error!("{e}");
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Completion { shell } = &cli.command {
        Cli::generate_completion(*shell);
        return Ok(());
    }

    let config = manifest::load(&cli.config)?;

    if let Commands::Check = cli.command {
        println!(
            "Configuration OK: {} jail(s), {} ZFS dataset(s)",
            config.jails.len(),
            config.zfs.len()
        );
        return Ok(());
    }

    let mut master = Master::new(config);
    match cli.command {
        Commands::Start { jail } => master.start(&jail),
        Commands::Stop { jail } => master.stop(&jail),
        Commands::Terminate { jail } => master.terminate(&jail),
        Commands::Status { jail, json } => {
            if json {
                let names = match &jail {
                    Some(name) => vec![name.clone()],
                    None => master.jail_names(),
                };
                let reports = names
                    .iter()
                    .map(|name| master.status_report(name))
                    .collect::<Result<Vec<_>>>()?;
                println!("{}", serde_json::to_string_pretty(&reports)?);
                Ok(())
            } else {
                report::reporter(&mut master, jail.as_deref()).status()
            }
        }
        Commands::List { json } => {
            let jails = master.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jails)?);
            } else {
                for (tag, record) in &jails {
                    println!(
                        "{:<20} {:<3} {:>4} {:<15} {}",
                        tag, record.status, record.jid, record.ip, record.root
                    );
                }
            }
            Ok(())
        }
        Commands::Console { jail, command } => {
            let output = master.console(&jail, &command.join(" "))?;
            print!("{output}");
            Ok(())
        }
        Commands::Fingerprint { jail } => {
            let fingerprint = master.fingerprint(&jail)?;
            println!("{fingerprint}");
            Ok(())
        }
        Commands::Check | Commands::Completion { .. } => unreachable!(),
    }
}
