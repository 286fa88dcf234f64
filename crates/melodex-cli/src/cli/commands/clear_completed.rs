//! `melodex clear-completed` — `spec.md` §6.

use anyhow::Result;
use melodex_core::control_surface::ControlSurface;

pub async fn run_clear_completed(surface: &ControlSurface) -> Result<()> {
    let n = surface.clear_completed().await?;
    println!("Cleared {n} completed job(s)");
    Ok(())
}
