use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use slick::cli::commands;
use slick::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let repo_root = cli
        .repo
        .clone()
        .or_else(|| std::env::var_os("SLICK_REPO").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("packages"));

    match cli.command {
        Commands::Parse { ref spec } => {
            println!("{}", commands::run_parse(spec, &cli.format)?);
        }

        Commands::Info { ref package } => {
            println!("{}", commands::run_info(&repo_root, package, &cli.format)?);
        }

        Commands::List => {
            println!("{}", commands::run_list(&repo_root, &cli.format)?);
        }

        Commands::Versions { ref package } => {
            println!(
                "{}",
                commands::run_versions(&repo_root, package, &cli.format)?
            );
        }

        Commands::Url {
            ref package,
            ref version,
        } => {
            println!(
                "{}",
                commands::run_url(&repo_root, package, version, &cli.format)?
            );
        }

        Commands::Providers { ref name } => {
            println!(
                "{}",
                commands::run_providers(&repo_root, name, &cli.format)?
            );
        }

        Commands::Audit => {
            let (output, has_errors) = commands::run_audit(&repo_root, &cli.format)?;
            println!("{}", output);
            if has_errors {
                std::process::exit(1);
            }
        }

        Commands::Bootstrap { dry_run } => {
            let code = commands::run_bootstrap(dry_run)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
