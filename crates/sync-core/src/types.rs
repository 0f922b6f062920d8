use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend-assigned item identity, unique within one list.
///
/// Negative values are reserved for optimistic rows that have not been
/// confirmed by the backend yet (see [`ItemId::pending`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub i64);

impl ItemId {
    /// Sentinel identity for an optimistic row created from `local_id`.
    pub fn pending(local_id: LocalId) -> Self {
        let raw = i64::try_from(local_id.0).unwrap_or(i64::MAX);
        Self(-raw)
    }

    /// Whether this id is an optimistic-row sentinel.
    pub fn is_pending(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-local, monotonic identity of a submitted message. Starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Identity of one conversation (the id of its dialog row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ItemId> for ConversationId {
    fn from(id: ItemId) -> Self {
        Self(id.0)
    }
}

/// Opaque handle that can be exchanged for media bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef(pub String);

/// Dialog folder filter passed to `list_dialogs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Folder {
    /// Regular, non-archived dialogs.
    #[default]
    Main,
    /// Archived dialogs.
    Archive,
}

/// Which mirrored list a request, row set or fault belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    Dialogs,
    Messages,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dialogs => "dialogs",
            Self::Messages => "messages",
        }
    }
}

/// Display payload of a remote item, decoded once at the fetch boundary.
///
/// Optional sub-fields are explicit so nothing downstream has to probe for
/// their presence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFields {
    /// Dialog name (dialog items) or empty (message items).
    pub title: String,
    /// Message body, or the last message preview for dialog items.
    pub text: String,
    /// Event timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Sender display name when the backend resolved one.
    pub sender_name: Option<String>,
    /// Whether the (last) message was authored by the current account.
    pub from_self: bool,
    /// Whether the dialog is a group conversation.
    pub is_group: bool,
    /// Message this item replies to.
    pub reply_to: Option<ItemId>,
}

/// One item as reported by the backend for a single poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: ItemId,
    pub display: DisplayFields,
    pub media: Option<MediaRef>,
}

impl RemoteItem {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// Text submitted by the user for sending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingPayload {
    pub text: String,
    pub reply_to: Option<ItemId>,
}

impl OutgoingPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_to: None,
        }
    }
}

/// Delivery progress of an optimistic send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    /// Submitted locally; the send call has not returned yet.
    Sending,
    /// Backend accepted the send and assigned a remote id.
    Sent,
    /// Backend confirmed delivery for the remote id.
    Delivered,
}

/// Locally created outgoing item tracked until it is reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub local_id: LocalId,
    pub conversation: ConversationId,
    pub remote_id: Option<ItemId>,
    pub status: SendStatus,
    pub payload: OutgoingPayload,
}

impl PendingSend {
    /// Identity of the optimistic row shown for this send.
    pub fn sentinel_id(&self) -> ItemId {
        ItemId::pending(self.local_id)
    }
}

/// Media state attached to a rendered row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MediaSlot {
    #[default]
    None,
    /// Media exists but its artifact has not been resolved yet.
    Pending(MediaRef),
    /// Resolved ASCII-art rendering.
    Ready(String),
    /// Download or derivation failed.
    Unavailable,
}

/// Display-ready fields of a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedFields {
    pub title: String,
    pub body: String,
    /// Secondary line: send time, folder label or delivery marker.
    pub meta: String,
    /// Avatar initial for dialog rows.
    pub badge: Option<char>,
    pub is_own: bool,
    pub media: MediaSlot,
    pub delivery: Option<SendStatus>,
}

/// Notification pushed by the backend event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendEvent {
    NewItem {
        conversation: ConversationId,
        item_id: ItemId,
    },
    ItemEdited {
        conversation: ConversationId,
        item_id: ItemId,
    },
    ItemDeleted {
        conversation: ConversationId,
        item_id: ItemId,
    },
    DeliveryConfirmed {
        conversation: ConversationId,
        remote_id: ItemId,
    },
}

impl BackendEvent {
    pub fn conversation(&self) -> ConversationId {
        match self {
            Self::NewItem { conversation, .. }
            | Self::ItemEdited { conversation, .. }
            | Self::ItemDeleted { conversation, .. }
            | Self::DeliveryConfirmed { conversation, .. } => *conversation,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewItem { .. } => "new_item",
            Self::ItemEdited { .. } => "item_edited",
            Self::ItemDeleted { .. } => "item_deleted",
            Self::DeliveryConfirmed { .. } => "delivery_confirmed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_ids_are_negative_and_distinct() {
        let a = ItemId::pending(LocalId(1));
        let b = ItemId::pending(LocalId(2));
        assert!(a.is_pending());
        assert!(b.is_pending());
        assert_ne!(a, b);
        assert!(!ItemId(42).is_pending());
    }

    #[test]
    fn event_routes_to_its_conversation() {
        let event = BackendEvent::DeliveryConfirmed {
            conversation: ConversationId(7),
            remote_id: ItemId(99),
        };
        assert_eq!(event.conversation(), ConversationId(7));
        assert_eq!(event.kind(), "delivery_confirmed");
    }
}
