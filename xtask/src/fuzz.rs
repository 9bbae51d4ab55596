use clap::Subcommand;
use duct::cmd;

#[derive(Subcommand)]
pub enum Fuzz {
    /// Run command line argument editing
    Args,

    /// Run disk image chunklist parser
    Chunklist,

    /// Run picker config parser
    Config,

    /// Run device path parser
    DevicePath,

    /// Run EFI_LOAD_OPTION parser
    LoadOption,

    /// Run load option and var file parser
    Vars,
}

pub fn fuzz_target(command: Fuzz) -> anyhow::Result<()> {
    let mut args = vec!["fuzz", "run"];
    match command {
        Fuzz::Args => args.push("args"),
        Fuzz::Chunklist => args.push("chunklist"),
        Fuzz::Config => args.push("config"),
        Fuzz::DevicePath => args.push("device_path"),
        Fuzz::LoadOption => args.push("load_option"),
        Fuzz::Vars => args.push("vars"),
    }

    cmd!("cargo", "install", "cargo-fuzz").run()?; // will not install if its already installed
    cmd("cargo", args).run()?;
    Ok(())
}
