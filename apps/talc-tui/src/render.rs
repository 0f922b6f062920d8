//! Row renderers for the dialog and message lists.

use std::collections::HashMap;

use chrono::DateTime;
use sync_core::{
    Folder, MediaRef, MediaSlot, PendingSend, RemoteItem, RenderedFields, RowRenderer, SendStatus,
    normalization::{
        PREVIEW_MAX_CHARS, avatar_initial, normalize_line, normalize_multiline, truncate_preview,
    },
};

const UNTITLED: &str = "Untitled";
const NO_MESSAGES: &str = "No messages";
const EMPTY_MESSAGE: &str = "Empty message";
const UNKNOWN_SENDER: &str = "Unknown";
const OWN_PREFIX: &str = "You: ";
const ARCHIVE_LABEL: &str = "[Archive]";

/// `HH:MM` (UTC) for a millisecond timestamp; empty when unknown.
pub fn format_clock(timestamp_ms: u64) -> String {
    if timestamp_ms == 0 {
        return String::new();
    }
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|time| time.format("%H:%M").to_string())
        .unwrap_or_default()
}

pub fn status_marker(status: SendStatus) -> &'static str {
    match status {
        SendStatus::Sending => "sending…",
        SendStatus::Sent => "sent",
        SendStatus::Delivered => "delivered",
    }
}

pub struct DialogRenderer {
    pub folder: Folder,
}

impl RowRenderer for DialogRenderer {
    fn render_item(&self, item: &RemoteItem) -> RenderedFields {
        let display = &item.display;
        let mut title = normalize_line(&display.title);
        if title.is_empty() {
            title = UNTITLED.to_owned();
        }

        let text = normalize_line(&display.text);
        let preview = if text.is_empty() {
            NO_MESSAGES.to_owned()
        } else if display.from_self {
            format!("{OWN_PREFIX}{text}")
        } else {
            text
        };

        let clock = format_clock(display.timestamp_ms);
        let meta = match self.folder {
            Folder::Archive if clock.is_empty() => ARCHIVE_LABEL.to_owned(),
            Folder::Archive => format!("{ARCHIVE_LABEL} {clock}"),
            Folder::Main => clock,
        };

        RenderedFields {
            badge: Some(avatar_initial(&title)),
            title,
            body: truncate_preview(&preview, PREVIEW_MAX_CHARS),
            meta,
            is_own: display.from_self,
            ..RenderedFields::default()
        }
    }

    fn render_pending(&self, pending: &PendingSend) -> RenderedFields {
        RenderedFields {
            body: normalize_line(&pending.payload.text),
            delivery: Some(pending.status),
            is_own: true,
            ..RenderedFields::default()
        }
    }
}

/// Message renderer; media slots come from the resolved-artifact map.
pub struct MessageRenderer<'a> {
    pub media: &'a HashMap<MediaRef, MediaSlot>,
}

impl RowRenderer for MessageRenderer<'_> {
    fn render_item(&self, item: &RemoteItem) -> RenderedFields {
        let display = &item.display;
        let title = if display.from_self {
            String::new()
        } else {
            let sender = display
                .sender_name
                .as_deref()
                .map(normalize_line)
                .unwrap_or_default();
            if sender.is_empty() {
                UNKNOWN_SENDER.to_owned()
            } else {
                sender
            }
        };

        let mut body = normalize_multiline(&display.text);
        if body.is_empty() && item.media.is_none() {
            body = EMPTY_MESSAGE.to_owned();
        }

        let media = match &item.media {
            Some(media) => self
                .media
                .get(media)
                .cloned()
                .unwrap_or_else(|| MediaSlot::Pending(media.clone())),
            None => MediaSlot::None,
        };

        RenderedFields {
            title,
            body,
            meta: format_clock(display.timestamp_ms),
            is_own: display.from_self,
            media,
            ..RenderedFields::default()
        }
    }

    fn render_pending(&self, pending: &PendingSend) -> RenderedFields {
        RenderedFields {
            body: normalize_multiline(&pending.payload.text),
            meta: status_marker(pending.status).to_owned(),
            is_own: true,
            delivery: Some(pending.status),
            ..RenderedFields::default()
        }
    }
}
