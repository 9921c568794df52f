//! Environment readiness check.

use crate::browser::find_chromium;
use crate::engine::{default_bundle_path, find_axe_bundle};
use anyhow::Result;

/// Check Chromium and engine-bundle availability.
pub async fn run() -> Result<()> {
    println!("axscan Doctor");
    println!("=============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set AXSCAN_CHROMIUM_PATH."
        ),
    }

    let bundle = find_axe_bundle();
    match &bundle {
        Some(path) => println!("[OK] axe-core bundle found: {}", path.display()),
        None => match default_bundle_path() {
            Some(path) => println!(
                "[!!] axe-core bundle NOT found. Run `axscan install` to cache it at {}.",
                path.display()
            ),
            None => println!("[!!] axe-core bundle NOT found and no home directory to cache it."),
        },
    }

    println!();
    if chromium.is_some() && bundle.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        if bundle.is_none() {
            println!("  Run `axscan install` to fetch the audit engine.");
        }
    }

    Ok(())
}
