use async_trait::async_trait;

use crate::{
    channel::EventStream,
    error::BackendError,
    types::{ConversationId, Folder, MediaRef, OutgoingPayload, RemoteItem},
};

/// Parameters of one dialog-list fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogQuery {
    pub limit: usize,
    pub folder: Folder,
    /// Settled search text; `None` lists everything.
    pub query: Option<String>,
}

/// Remote chat service as seen by the sync engine.
///
/// Every list call returns a complete top-N snapshot in display order
/// (dialogs most recent first, messages oldest first). Implementations
/// decode their wire records into [`RemoteItem`] before returning.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_dialogs(&self, query: DialogQuery) -> Result<Vec<RemoteItem>, BackendError>;

    async fn list_messages(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> Result<Vec<RemoteItem>, BackendError>;

    /// Send a message and return the item the backend created for it.
    async fn send_message(
        &self,
        conversation: ConversationId,
        payload: OutgoingPayload,
    ) -> Result<RemoteItem, BackendError>;

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, BackendError>;

    /// Subscribe to the push notification feed.
    fn subscribe(&self) -> EventStream;
}
