use clap::{Parser, Subcommand};

use crate::{fuzz::Fuzz, test::Test};

mod build;
mod doc;
mod fuzz;
mod run;
mod test;

/// The crate every feature flag is passed to.
const CORE_CRATE: &str = "bootpicker-rs-core";

#[derive(Parser)]
#[command(about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build all crates in workspace
    Build {
        /// Build with release profile
        #[arg(short, long, default_value_t = false)]
        release: bool,

        /// Build with target architecture
        #[arg(short, long, default_value = "x86_64-unknown-uefi")]
        target: String,

        /// Space separated list of features of the core crate
        #[arg(short, long)]
        features: Option<Vec<String>>,

        /// Build with no default features (except global allocator and panic handler)
        #[arg(long, default_value_t = false)]
        no_default_features: bool,
    },

    /// Build docs for bootpicker-rs crate
    Doc {
        /// Document private items in crate
        #[arg(short, long, default_value_t = false)]
        private: bool,

        /// Open in web browser after documenting
        #[arg(short, long, default_value_t = false)]
        open: bool,
    },

    /// Run a bootpicker-rs front end in VM with uefi-run
    Run {
        /// Path to the OVMF code file
        #[arg(long)]
        ovmf_code: Option<String>,

        /// Build with release profile
        #[arg(short, long, default_value_t = false)]
        release: bool,

        /// Add an additional file to the root of the image
        #[arg(long)]
        add_file: Option<String>,

        /// The front end to run
        #[arg(long, default_value = "bootpicker-rs-minimal")]
        bin: String,
    },

    /// Run unit tests and clippy on host
    Test {
        #[command(subcommand)]
        command: Option<Test>,
    },

    /// Run a fuzz target
    Fuzz {
        #[command(subcommand)]
        command: Fuzz,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Build {
            release,
            target,
            features,
            no_default_features,
        } => build::build_all_crates(release, &target, features, no_default_features)?,
        Commands::Doc { private, open } => doc::doc_crate(private, open)?,
        Commands::Run {
            ovmf_code,
            release,
            add_file,
            bin,
        } => run::run_picker(ovmf_code.as_deref(), release, add_file.as_deref(), &bin)?,
        Commands::Test { command } => test::test_crate(command)?,
        Commands::Fuzz { command } => fuzz::fuzz_target(command)?,
    }
    Ok(())
}
