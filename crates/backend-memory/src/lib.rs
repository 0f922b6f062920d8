//! In-process chat backend.
//!
//! Holds dialogs and messages in memory, answers the polling calls of
//! [`ChatBackend`] with top-N snapshots, and pushes notifications through an
//! [`EventFeed`]. Latency and failures can be scripted per call so the sync
//! engine can be exercised deterministically.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use sync_core::{
    BackendError, BackendErrorCategory, BackendEvent, ChatBackend, ConversationId, DialogQuery,
    DisplayFields, EventFeed, EventStream, Folder, ItemId, MediaRef, OutgoingPayload, RemoteItem,
    normalization::matches_query,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const EVENT_BUFFER: usize = 256;
const CLOCK_STEP_MS: u64 = 60_000;
const DEFAULT_START_MS: u64 = 1_700_000_000_000;

/// Backend call kinds, used for scripting and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCall {
    ListDialogs,
    ListMessages,
    SendMessage,
    DownloadMedia,
}

#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Delay applied to every call before it answers.
    pub latency: Duration,
    /// Display name of the local account.
    pub self_name: String,
    /// Emit `DeliveryConfirmed` for every accepted send.
    pub auto_confirm_delivery: bool,
    /// Timestamp of the first seeded item.
    pub start_ms: u64,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            self_name: "You".to_owned(),
            auto_confirm_delivery: true,
            start_ms: DEFAULT_START_MS,
        }
    }
}

/// Dialog to seed into the backend.
#[derive(Debug, Clone)]
pub struct DialogSeed {
    pub title: String,
    pub is_group: bool,
    pub folder: Folder,
}

impl DialogSeed {
    pub fn direct(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_group: false,
            folder: Folder::Main,
        }
    }

    pub fn group(title: impl Into<String>) -> Self {
        Self {
            is_group: true,
            ..Self::direct(title)
        }
    }

    pub fn archived(mut self) -> Self {
        self.folder = Folder::Archive;
        self
    }
}

#[derive(Debug, Clone)]
struct DialogRecord {
    id: ConversationId,
    title: String,
    is_group: bool,
    folder: Folder,
}

#[derive(Debug, Clone)]
struct MessageRecord {
    id: ItemId,
    sender: Option<String>,
    from_self: bool,
    text: String,
    timestamp_ms: u64,
    reply_to: Option<ItemId>,
    media: Option<MediaRef>,
}

#[derive(Debug, Default)]
struct Store {
    dialogs: Vec<DialogRecord>,
    messages: HashMap<ConversationId, Vec<MessageRecord>>,
    media: HashMap<MediaRef, Vec<u8>>,
    failures: HashMap<BackendCall, VecDeque<BackendError>>,
    calls: HashMap<BackendCall, u64>,
    latency_overrides: HashMap<BackendCall, Duration>,
    next_id: i64,
    clock_ms: u64,
}

impl Store {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&mut self) -> u64 {
        self.clock_ms += CLOCK_STEP_MS;
        self.clock_ms
    }

    fn dialog(&self, conversation: ConversationId) -> Result<&DialogRecord, BackendError> {
        self.dialogs
            .iter()
            .find(|dialog| dialog.id == conversation)
            .ok_or_else(|| not_found("conversation_not_found", conversation))
    }

    fn last_message(&self, conversation: ConversationId) -> Option<&MessageRecord> {
        self.messages.get(&conversation).and_then(|list| list.last())
    }

    /// Record a call and pop its scripted failure, if any.
    fn begin_call(&mut self, call: BackendCall) -> (Duration, Option<BackendError>) {
        *self.calls.entry(call).or_default() += 1;
        let failure = self
            .failures
            .get_mut(&call)
            .and_then(|queue| queue.pop_front());
        let latency = self.latency_overrides.get(&call).copied();
        (latency.unwrap_or_default(), failure)
    }
}

#[derive(Debug)]
struct RunningChatter {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// In-memory [`ChatBackend`].
#[derive(Debug)]
pub struct MemoryBackend {
    config: MemoryBackendConfig,
    store: Mutex<Store>,
    feed: EventFeed,
    chatter: Mutex<Option<RunningChatter>>,
}

impl MemoryBackend {
    pub fn new(config: MemoryBackendConfig) -> Self {
        let store = Store {
            clock_ms: config.start_ms,
            ..Store::default()
        };
        Self {
            config,
            store: Mutex::new(store),
            feed: EventFeed::new(EVENT_BUFFER),
            chatter: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MemoryBackendConfig {
        &self.config
    }

    pub async fn add_dialog(&self, seed: DialogSeed) -> ConversationId {
        let mut store = self.store.lock().await;
        let id = ConversationId(store.allocate_id());
        store.dialogs.push(DialogRecord {
            id,
            title: seed.title,
            is_group: seed.is_group,
            folder: seed.folder,
        });
        store.messages.entry(id).or_default();
        id
    }

    /// Append a message from another participant and emit `NewItem`.
    pub async fn push_incoming(
        &self,
        conversation: ConversationId,
        sender: &str,
        text: &str,
    ) -> Result<ItemId, BackendError> {
        self.append(conversation, Some(sender.to_owned()), false, text, None, None)
            .await
    }

    /// Append an incoming message carrying downloadable media bytes.
    pub async fn push_incoming_media(
        &self,
        conversation: ConversationId,
        sender: &str,
        caption: &str,
        bytes: Vec<u8>,
    ) -> Result<ItemId, BackendError> {
        let media = {
            let mut store = self.store.lock().await;
            let media = MediaRef(format!("media-{}", store.allocate_id()));
            store.media.insert(media.clone(), bytes);
            media
        };
        self.append(
            conversation,
            Some(sender.to_owned()),
            false,
            caption,
            None,
            Some(media),
        )
        .await
    }

    pub async fn edit_message(
        &self,
        conversation: ConversationId,
        item_id: ItemId,
        text: &str,
    ) -> Result<(), BackendError> {
        {
            let mut store = self.store.lock().await;
            let message = store
                .messages
                .get_mut(&conversation)
                .and_then(|list| list.iter_mut().find(|message| message.id == item_id))
                .ok_or_else(|| not_found("message_not_found", conversation))?;
            message.text = text.to_owned();
        }
        self.feed.emit(BackendEvent::ItemEdited {
            conversation,
            item_id,
        });
        Ok(())
    }

    pub async fn delete_message(
        &self,
        conversation: ConversationId,
        item_id: ItemId,
    ) -> Result<(), BackendError> {
        {
            let mut store = self.store.lock().await;
            let list = store
                .messages
                .get_mut(&conversation)
                .ok_or_else(|| not_found("conversation_not_found", conversation))?;
            let before = list.len();
            list.retain(|message| message.id != item_id);
            if list.len() == before {
                return Err(not_found("message_not_found", conversation));
            }
        }
        self.feed.emit(BackendEvent::ItemDeleted {
            conversation,
            item_id,
        });
        Ok(())
    }

    /// Emit a delivery confirmation for an earlier send.
    pub fn confirm_delivery(&self, conversation: ConversationId, remote_id: ItemId) {
        self.feed.emit(BackendEvent::DeliveryConfirmed {
            conversation,
            remote_id,
        });
    }

    /// Make the next call of `call` fail with `error`. Failures queue up.
    pub async fn fail_next(&self, call: BackendCall, error: BackendError) {
        let mut store = self.store.lock().await;
        store.failures.entry(call).or_default().push_back(error);
    }

    /// Override the latency of one call kind.
    pub async fn set_latency(&self, call: BackendCall, latency: Duration) {
        let mut store = self.store.lock().await;
        store.latency_overrides.insert(call, latency);
    }

    /// Number of times `call` was issued.
    pub async fn calls(&self, call: BackendCall) -> u64 {
        let store = self.store.lock().await;
        store.calls.get(&call).copied().unwrap_or(0)
    }

    pub async fn message_count(&self, conversation: ConversationId) -> usize {
        let store = self.store.lock().await;
        store.messages.get(&conversation).map_or(0, Vec::len)
    }

    /// Start a background task that posts scripted incoming messages at a
    /// fixed interval until [`MemoryBackend::stop_chatter`].
    pub async fn start_chatter(
        self: &Arc<Self>,
        interval: Duration,
        lines: Vec<(ConversationId, String, String)>,
    ) -> Result<(), BackendError> {
        let mut guard = self.chatter.lock().await;
        if guard.is_some() {
            return Err(BackendError::new(
                BackendErrorCategory::Internal,
                "chatter_already_running",
                "chatter task is already running",
            ));
        }

        let stop = CancellationToken::new();
        let stop_child = stop.child_token();
        let backend = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut script = lines.into_iter().cycle();
            loop {
                tokio::select! {
                    _ = stop_child.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let Some((conversation, sender, text)) = script.next() else {
                            break;
                        };
                        if let Err(err) = backend.push_incoming(conversation, &sender, &text).await {
                            debug!(error = %err, "chatter message dropped");
                        }
                    }
                }
            }
        });

        *guard = Some(RunningChatter { stop, task });
        Ok(())
    }

    pub async fn stop_chatter(&self) {
        let running = {
            let mut guard = self.chatter.lock().await;
            guard.take()
        };
        if let Some(running) = running {
            running.stop.cancel();
            let _ = running.task.await;
        }
    }

    async fn append(
        &self,
        conversation: ConversationId,
        sender: Option<String>,
        from_self: bool,
        text: &str,
        reply_to: Option<ItemId>,
        media: Option<MediaRef>,
    ) -> Result<ItemId, BackendError> {
        let item_id = {
            let mut store = self.store.lock().await;
            store.dialog(conversation)?;
            let id = ItemId(store.allocate_id());
            let timestamp_ms = store.tick();
            store
                .messages
                .entry(conversation)
                .or_default()
                .push(MessageRecord {
                    id,
                    sender,
                    from_self,
                    text: text.to_owned(),
                    timestamp_ms,
                    reply_to,
                    media,
                });
            id
        };
        trace!(%conversation, %item_id, "message appended");
        self.feed.emit(BackendEvent::NewItem {
            conversation,
            item_id,
        });
        Ok(item_id)
    }

    async fn enter(&self, call: BackendCall) -> Result<(), BackendError> {
        let (latency, failure) = {
            let mut store = self.store.lock().await;
            store.begin_call(call)
        };
        let latency = if latency.is_zero() {
            self.config.latency
        } else {
            latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(error) => {
                debug!(?call, error = %error, "scripted backend failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn message_item(&self, record: &MessageRecord) -> RemoteItem {
        RemoteItem {
            id: record.id,
            display: DisplayFields {
                title: String::new(),
                text: record.text.clone(),
                timestamp_ms: record.timestamp_ms,
                sender_name: record.sender.clone(),
                from_self: record.from_self,
                is_group: false,
                reply_to: record.reply_to,
            },
            media: record.media.clone(),
        }
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn list_dialogs(&self, query: DialogQuery) -> Result<Vec<RemoteItem>, BackendError> {
        self.enter(BackendCall::ListDialogs).await?;
        let store = self.store.lock().await;
        let filter = query.query.as_deref().unwrap_or("");

        let mut dialogs: Vec<(u64, RemoteItem)> = store
            .dialogs
            .iter()
            .filter(|dialog| dialog.folder == query.folder)
            .filter(|dialog| matches_query(&dialog.title, filter))
            .map(|dialog| {
                let last = store.last_message(dialog.id);
                let timestamp_ms = last.map_or(0, |message| message.timestamp_ms);
                let item = RemoteItem {
                    id: ItemId(dialog.id.0),
                    display: DisplayFields {
                        title: dialog.title.clone(),
                        text: last.map(|message| message.text.clone()).unwrap_or_default(),
                        timestamp_ms,
                        sender_name: last.and_then(|message| message.sender.clone()),
                        from_self: last.is_some_and(|message| message.from_self),
                        is_group: dialog.is_group,
                        reply_to: None,
                    },
                    media: None,
                };
                (timestamp_ms, item)
            })
            .collect();

        dialogs.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        Ok(dialogs
            .into_iter()
            .take(query.limit)
            .map(|(_, item)| item)
            .collect())
    }

    async fn list_messages(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> Result<Vec<RemoteItem>, BackendError> {
        self.enter(BackendCall::ListMessages).await?;
        let store = self.store.lock().await;
        store.dialog(conversation)?;
        let messages = store
            .messages
            .get(&conversation)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..]
            .iter()
            .map(|record| self.message_item(record))
            .collect())
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        payload: OutgoingPayload,
    ) -> Result<RemoteItem, BackendError> {
        self.enter(BackendCall::SendMessage).await?;
        if payload.text.trim().is_empty() {
            return Err(BackendError::new(
                BackendErrorCategory::Rejected,
                "empty_message",
                "message text is empty",
            ));
        }
        let item_id = self
            .append(
                conversation,
                Some(self.config.self_name.clone()),
                true,
                &payload.text,
                payload.reply_to,
                None,
            )
            .await?;
        if self.config.auto_confirm_delivery {
            self.confirm_delivery(conversation, item_id);
        }

        let store = self.store.lock().await;
        store
            .messages
            .get(&conversation)
            .and_then(|list| list.iter().find(|message| message.id == item_id))
            .map(|record| self.message_item(record))
            .ok_or_else(|| not_found("message_not_found", conversation))
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, BackendError> {
        self.enter(BackendCall::DownloadMedia).await?;
        let store = self.store.lock().await;
        store.media.get(media).cloned().ok_or_else(|| {
            BackendError::new(
                BackendErrorCategory::NotFound,
                "media_not_found",
                format!("no media stored for '{}'", media.0),
            )
        })
    }

    fn subscribe(&self) -> EventStream {
        self.feed.subscribe()
    }
}

fn not_found(code: &str, conversation: ConversationId) -> BackendError {
    BackendError::new(
        BackendErrorCategory::NotFound,
        code,
        format!("conversation {conversation} has no such item"),
    )
}
