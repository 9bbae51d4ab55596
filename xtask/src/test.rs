use clap::Subcommand;
use duct::cmd;

use crate::{
    CORE_CRATE,
    run::{build_efi, run_efi},
};

#[derive(Subcommand)]
pub enum Test {
    /// Run unit tests and clippy on the host
    Host,

    /// Run the integration tests in a VM with uefi-run
    Vm {
        /// Path to the OVMF code file
        #[arg(long)]
        ovmf_code: Option<String>,
    },
}

pub fn test_on_host() -> anyhow::Result<()> {
    cmd!("cargo", "clippy", "--package", CORE_CRATE, "--", "-C", "panic=abort").run()?;
    cmd!("cargo", "test", "--package", CORE_CRATE, "--lib").run()?;
    Ok(())
}

pub fn test_on_vm(ovmf_code: Option<&str>) -> anyhow::Result<()> {
    let image = build_efi("bootpicker-rs-tests", false)?;
    run_efi(ovmf_code, None, &image)
}

pub fn test_crate(command: Option<Test>) -> anyhow::Result<()> {
    match command {
        None | Some(Test::Host) => test_on_host(),
        Some(Test::Vm { ovmf_code }) => test_on_vm(ovmf_code.as_deref()),
    }
}
