//! `melodex set-download-path <dir>` — `spec.md` §6.

use anyhow::Result;
use melodex_core::control_surface::ControlSurface;
use std::path::PathBuf;

pub fn run_set_download_path(surface: &ControlSurface, path: PathBuf) -> Result<()> {
    surface.set_download_path(path.clone())?;
    println!("Download path set to {}", path.display());
    Ok(())
}
