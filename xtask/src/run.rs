use duct::cmd;

use crate::CORE_CRATE;

/// Builds a front end for `x86_64-unknown-uefi` and returns the path of the image.
pub fn build_efi(bin: &str, release: bool) -> anyhow::Result<String> {
    let features = format!("{CORE_CRATE}/global_allocator,{CORE_CRATE}/panic_handler");
    let mut build_args = vec![
        "build",
        "--bin",
        bin,
        "--target",
        "x86_64-unknown-uefi",
        "--features",
        &features,
    ];

    let profile = if release {
        build_args.extend(["--profile", "release-lto"]);
        "release-lto"
    } else {
        "debug"
    };

    cmd("cargo", build_args).run()?;
    Ok(format!("target/x86_64-unknown-uefi/{profile}/{bin}.efi"))
}

/// Boots an image in a virtual machine.
pub fn run_efi(ovmf_code: Option<&str>, add_file: Option<&str>, image: &str) -> anyhow::Result<()> {
    let mut run_args = vec!["-d"];

    if let Some(ovmf_code) = ovmf_code {
        run_args.extend(["-b", ovmf_code]);
    }

    if let Some(add_file) = add_file {
        run_args.extend(["-f", add_file]);
    }
    run_args.push(image);

    cmd!("cargo", "install", "uefi-run").run()?; // will not install if its already installed
    if let Err(e) = cmd("uefi-run", run_args).run() {
        println!(
            "hint: if the error was that the PC BIOS could not be loaded, you may have to specify ovmf-code"
        );
        return Err(e.into());
    }
    Ok(())
}

pub fn run_picker(
    ovmf_code: Option<&str>,
    release: bool,
    add_file: Option<&str>,
    bin: &str,
) -> anyhow::Result<()> {
    let image = build_efi(bin, release)?;
    run_efi(ovmf_code, add_file, &image)
}
