//! `melodex stop-all` — `spec.md` §6: cancels every non-terminal job and
//! empties the store.

use anyhow::Result;
use melodex_core::control_surface::ControlSurface;

pub async fn run_stop_all(surface: &ControlSurface) -> Result<()> {
    surface.stop_all().await?;
    println!("Stopped all jobs and cleared the queue");
    Ok(())
}
