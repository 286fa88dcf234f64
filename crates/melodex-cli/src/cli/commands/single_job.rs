//! `melodex pause|resume|cancel|retry <job-id>` — `spec.md` §6.

use anyhow::Result;
use melodex_core::control_surface::ControlSurface;

pub async fn run_pause(surface: &ControlSurface, job_id: &str) -> Result<()> {
    surface.pause(job_id).await?;
    println!("Paused {job_id}");
    Ok(())
}

pub async fn run_resume(surface: &ControlSurface, job_id: &str) -> Result<()> {
    surface.resume(job_id).await?;
    println!("Resumed {job_id}");
    Ok(())
}

pub async fn run_cancel(surface: &ControlSurface, job_id: &str) -> Result<()> {
    surface.cancel(job_id).await?;
    println!("Cancelled {job_id}");
    Ok(())
}

pub async fn run_retry(surface: &ControlSurface, job_id: &str) -> Result<()> {
    surface.retry(job_id).await?;
    println!("Retrying {job_id}");
    Ok(())
}
