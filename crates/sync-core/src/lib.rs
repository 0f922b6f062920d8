//! Sync engine that mirrors polled remote chat state onto local rows.
//!
//! This crate defines the data model, the identity-preserving list
//! reconciler, optimistic send tracking, the debounced query state machine,
//! per-list refresh guards, and the backend/display-sink seams.

/// Backend fetch/command service contract.
pub mod backend;
/// Backend notification feed.
pub mod channel;
/// Debounced free-text query.
pub mod debounce;
/// Backend error types and the contained-fault taxonomy.
pub mod error;
/// Per-list refresh phase and reentrancy guard.
pub mod list_phase;
/// Text cleanup for display fields.
pub mod normalization;
/// Keyed list reconciliation.
pub mod reconcile;
/// Optimistic send tracking.
pub mod send_tracker;
/// Display sink contract and input events.
pub mod sink;
/// Shared data model.
pub mod types;

pub use backend::{ChatBackend, DialogQuery};
pub use channel::{EventFeed, EventStream};
pub use debounce::{DebounceState, DebounceTicket, DebounceTimer, DebouncedQuery};
pub use error::{BackendError, BackendErrorCategory, SyncFault};
pub use list_phase::{ListGuard, ListPhase};
pub use reconcile::{
    ListReconciler, MountId, ReconcileReport, Row, RowList, RowRenderer, SelectionDefault,
};
pub use send_tracker::{DeliveryOutcome, SendTracker};
pub use sink::{DisplaySink, KeyCode, Notice, NoticeLevel, SinkEvent, ViewContext, WidgetId};
pub use types::{
    BackendEvent, ConversationId, DisplayFields, Folder, ItemId, ListKind, LocalId, MediaRef,
    MediaSlot, OutgoingPayload, PendingSend, RemoteItem, RenderedFields, SendStatus,
};
