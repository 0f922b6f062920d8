//! Demo data for the in-memory backend.

use std::{io::Cursor, sync::Arc, time::Duration};

use backend_memory::{DialogSeed, MemoryBackend};
use image::{ImageFormat, Rgb, RgbImage};
use sync_core::{BackendError, ConversationId};
use tracing::{info, warn};

/// Scripted incoming line: conversation, sender, text.
pub type ChatterLine = (ConversationId, String, String);

/// Populate `backend` with a handful of dialogs and their history.
/// Returns the lines used for the background chatter.
pub async fn seed(backend: &MemoryBackend) -> Result<Vec<ChatterLine>, BackendError> {
    let alice = backend.add_dialog(DialogSeed::direct("Alice Martin")).await;
    let rustaceans = backend.add_dialog(DialogSeed::group("Rustaceans")).await;
    let bob = backend.add_dialog(DialogSeed::direct("Bob")).await;
    let old_team = backend
        .add_dialog(DialogSeed::group("Old team \u{2014} 2019").archived())
        .await;
    let _quiet = backend.add_dialog(DialogSeed::direct("")).await;

    backend
        .push_incoming(old_team, "Carol", "Last one out turns off the lights")
        .await?;
    backend.push_incoming(bob, "Bob", "Are we still on for Friday?").await?;
    backend
        .push_incoming(rustaceans, "Dana", "Has anyone tried let-chains yet?")
        .await?;
    backend
        .push_incoming(rustaceans, "Eve", "Yes \u{2026} stable in edition 2024")
        .await?;
    backend.push_incoming(alice, "Alice", "Hi!").await?;
    backend
        .push_incoming(alice, "Alice", "Sending you the\nsketch from yesterday")
        .await?;

    match gradient_png(48, 24) {
        Ok(bytes) => {
            backend
                .push_incoming_media(alice, "Alice", "", bytes)
                .await?;
        }
        Err(err) => warn!(error = %err, "demo image could not be encoded"),
    }

    info!("demo backend seeded");
    Ok(vec![
        (rustaceans, "Dana".to_owned(), "Anyone around?".to_owned()),
        (bob, "Bob".to_owned(), "Ping".to_owned()),
        (alice, "Alice".to_owned(), "Did the sketch come through?".to_owned()),
        (
            rustaceans,
            "Eve".to_owned(),
            "New release notes are out".to_owned(),
        ),
    ])
}

/// Seed and start background chatter every `interval`.
pub async fn start(backend: &Arc<MemoryBackend>, interval: Duration) -> Result<(), BackendError> {
    let lines = seed(backend).await?;
    backend.start_chatter(interval, lines).await
}

/// Horizontal light-to-dark gradient encoded as PNG.
pub fn gradient_png(width: u32, height: u32) -> Result<Vec<u8>, image::ImageError> {
    let image = RgbImage::from_fn(width, height, |x, _| {
        let shade = 255 - (x * 255 / width.max(1)).min(255) as u8;
        Rgb([shade, shade, shade])
    });
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
