//! `axscan install` — fetch and cache the axe-core engine bundle.

use crate::browser::find_chromium;
use crate::engine::{install_bundle, AXE_VERSION};
use anyhow::Result;

/// Download the engine bundle into `~/.axscan/`.
pub async fn run(force: bool) -> Result<()> {
    let path = install_bundle(force).await?;
    println!("[OK] axe-core {AXE_VERSION} cached at {}", path.display());

    if find_chromium().is_none() {
        println!("[!!] Chromium still missing — install Chrome/Chromium separately.");
    }
    Ok(())
}
