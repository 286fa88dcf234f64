//! `melodex list` — `spec.md` §6, modeled on the teacher's `status` table
//! layout.

use anyhow::Result;
use melodex_core::control_surface::ControlSurface;
use melodex_core::model::JobStatus;

pub async fn run_list(surface: &ControlSurface, offset: u64, limit: u64, status: Option<JobStatus>) -> Result<()> {
    let page = surface.list(offset, limit, status).await?;
    if page.items.is_empty() {
        println!("No jobs in queue.");
        return Ok(());
    }
    println!(
        "{:<24} {:<10} {:<12} {:<5} {:<10} {}",
        "ID", "KIND", "STATUS", "PCT", "BYTES", "PARENT"
    );
    for job in &page.items {
        println!(
            "{:<24} {:<10} {:<12} {:<5} {:<10} {}",
            job.id,
            job.kind.as_str(),
            job.status.as_str(),
            job.progress,
            job.bytes_downloaded,
            job.parent_id.as_deref().unwrap_or("-"),
        );
    }
    println!("({} of {} total)", page.items.len(), page.total);
    Ok(())
}
