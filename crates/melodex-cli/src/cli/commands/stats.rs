//! `melodex stats` — `spec.md` §6.

use anyhow::Result;
use melodex_core::control_surface::ControlSurface;

pub async fn run_stats(surface: &ControlSurface) -> Result<()> {
    let counts = surface.stats().await?;
    println!(
        "total={} pending={} downloading={} completed={} failed={}",
        counts.total, counts.pending, counts.downloading, counts.completed, counts.failed
    );
    Ok(())
}
