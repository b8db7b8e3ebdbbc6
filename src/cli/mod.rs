use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub mod commands;
pub mod output;

#[derive(Parser)]
#[command(
    name = "slick",
    version,
    about = "Package spec parsing and package repository tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Package repository path (default: ./packages, or $SLICK_REPO)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a spec string and print its components
    Parse {
        /// The spec, e.g. "hdf5@1.10:1.12 +mpi %gcc@12 ^zlib@1.2:"
        spec: String,
    },

    /// Show a package's metadata, versions, and variants
    Info {
        /// Package name
        package: String,
    },

    /// List packages in the repository
    List,

    /// Show declared versions with their download URLs
    Versions {
        /// Package name
        package: String,
    },

    /// Resolve the download URL for one version of a package
    Url {
        /// Package name
        package: String,
        /// Version to resolve, e.g. "1.2.13"
        #[arg(long)]
        version: String,
    },

    /// List packages providing a virtual package
    Providers {
        /// Virtual package name, e.g. "mpi"
        name: String,
    },

    /// Validate every manifest in the repository
    Audit,

    /// Build and install the constraint solver into the active virtual environment
    Bootstrap {
        /// Print the command plan without running anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Compact,
}
