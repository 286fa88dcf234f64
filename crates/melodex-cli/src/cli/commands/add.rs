//! `melodex add-track|add-album|add-playlist|add-custom` — the enqueue half
//! of the control surface, `spec.md` §6.

use anyhow::Result;
use melodex_core::control_surface::{ControlSurface, CustomListRequest};
use melodex_core::model::Quality;

pub async fn run_add_track(surface: &ControlSurface, settings: &melodex_core::config::CoreSettings, track_id: &str, quality: Option<Quality>) -> Result<()> {
    let job_id = surface.enqueue_track(settings, track_id, quality).await?;
    println!("Queued track {job_id}");
    Ok(())
}

pub async fn run_add_album(surface: &ControlSurface, settings: &melodex_core::config::CoreSettings, album_id: &str, quality: Option<Quality>) -> Result<()> {
    let job_id = surface.enqueue_album(settings, album_id, quality).await?;
    println!("Queued album {job_id}");
    Ok(())
}

pub async fn run_add_playlist(surface: &ControlSurface, settings: &melodex_core::config::CoreSettings, playlist_id: &str, quality: Option<Quality>) -> Result<()> {
    let job_id = surface.enqueue_playlist(settings, playlist_id, quality).await?;
    println!("Queued playlist {job_id}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_add_custom(
    surface: &ControlSurface,
    settings: &melodex_core::config::CoreSettings,
    id: &str,
    title: &str,
    creator: Option<String>,
    track_ids: Vec<String>,
    quality: Option<Quality>,
) -> Result<()> {
    let request = CustomListRequest {
        id: id.to_string(),
        title: title.to_string(),
        creator,
        track_ids,
    };
    let job_id = surface.enqueue_custom_list(settings, request, quality).await?;
    println!("Queued custom list {job_id}");
    Ok(())
}
