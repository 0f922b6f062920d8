//! Poll scheduler: owns the chat state and drives it from ticks, input,
//! backend events and completed fetches.
//!
//! Every backend call runs on its own spawned task and reports back over
//! the completion channel, so all state mutation happens on the scheduler
//! task. A completion is re-validated by [`ChatState`] before it touches
//! rows.

use std::{collections::HashMap, future, sync::Arc, time::Duration};

use sync_core::{
    BackendError, BackendEvent, ChatBackend, ConversationId, DebounceTimer, DisplaySink,
    EventStream, ListKind, LocalId, MediaRef, MediaSlot, Notice, PendingSend, RemoteItem,
    SinkEvent, SyncFault, ViewContext,
};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
    time::{Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::TuiConfig,
    input::{self, Command},
    media::MediaResolver,
    state::{ChatLimits, ChatState},
};

/// Fixed-rate cycle periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub dialogs: Duration,
    pub messages: Duration,
}

/// Result of a spawned backend call, applied on the scheduler task.
#[derive(Debug)]
enum Completion {
    Dialogs {
        generation: u64,
        result: Result<Vec<RemoteItem>, BackendError>,
    },
    Messages {
        generation: u64,
        conversation: ConversationId,
        result: Result<Vec<RemoteItem>, BackendError>,
    },
    Send {
        local_id: LocalId,
        conversation: ConversationId,
        result: Result<RemoteItem, BackendError>,
    },
    Media {
        media: MediaRef,
        result: Result<Vec<u8>, BackendError>,
    },
    SearchSettled {
        generation: u64,
    },
}

#[derive(Debug, Default)]
struct Dirty {
    dialogs: bool,
    messages: bool,
}

impl Dirty {
    fn mark(&mut self, list: ListKind) {
        match list {
            ListKind::Dialogs => self.dialogs = true,
            ListKind::Messages => self.messages = true,
        }
    }

    fn mark_all(&mut self) {
        self.dialogs = true;
        self.messages = true;
    }
}

pub struct PollScheduler<B, S> {
    backend: Arc<B>,
    sink: S,
    state: ChatState,
    media: MediaResolver,
    intervals: PollIntervals,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    events: Option<EventStream>,
    debounce: DebounceTimer,
    message_interval: Option<Interval>,
    message_cycle: Option<ConversationId>,
    dialog_task: Option<JoinHandle<()>>,
    message_task: Option<JoinHandle<()>>,
    media_tasks: HashMap<MediaRef, JoinHandle<()>>,
    send_tasks: HashMap<LocalId, JoinHandle<()>>,
    dirty: Dirty,
    published_context: Option<ViewContext>,
}

impl<B, S> PollScheduler<B, S>
where
    B: ChatBackend + 'static,
    S: DisplaySink,
{
    pub fn new(
        backend: Arc<B>,
        sink: S,
        state: ChatState,
        media: MediaResolver,
        intervals: PollIntervals,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let events = Some(backend.subscribe());
        Self {
            backend,
            sink,
            state,
            media,
            intervals,
            completion_tx,
            completion_rx,
            events,
            debounce: DebounceTimer::new(),
            message_interval: None,
            message_cycle: None,
            dialog_task: None,
            message_task: None,
            media_tasks: HashMap::new(),
            send_tasks: HashMap::new(),
            dirty: Dirty::default(),
            published_context: None,
        }
    }

    pub fn from_config(backend: Arc<B>, sink: S, config: &TuiConfig) -> Self {
        let limits = ChatLimits {
            dialog_limit: config.dialog_limit,
            message_page: config.message_page,
            message_limit_max: config.message_limit_max,
        };
        let media = MediaResolver::open(
            &config.media_cache_dir(),
            config.media_cache_max_bytes,
            config.art_bounds,
        );
        let intervals = PollIntervals {
            dialogs: config.dialog_poll,
            messages: config.message_poll,
        };
        Self::new(
            backend,
            sink,
            ChatState::new(limits, config.search_debounce),
            media,
            intervals,
        )
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Run until `shutdown` fires, the input source closes or the user
    /// quits. Returns the sink so callers can inspect or restore it.
    pub async fn run(
        mut self,
        mut input: mpsc::UnboundedReceiver<SinkEvent>,
        shutdown: CancellationToken,
    ) -> S {
        info!(
            dialog_poll_ms = self.intervals.dialogs.as_millis() as u64,
            message_poll_ms = self.intervals.messages.as_millis() as u64,
            persistent_media_cache = self.media.is_persistent(),
            "poll scheduler started"
        );
        let mut dialog_interval = fixed_rate(self.intervals.dialogs);
        self.dirty.mark_all();

        loop {
            let running = tokio::select! {
                _ = shutdown.cancelled() => false,
                _ = dialog_interval.tick() => {
                    self.refresh_dialogs();
                    true
                }
                _ = next_tick(&mut self.message_interval) => {
                    self.refresh_messages();
                    true
                }
                event = input.recv() => match event {
                    Some(event) => self.handle_input(event),
                    None => false,
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                    true
                }
                event = next_event(&mut self.events) => {
                    self.handle_backend_event(event);
                    true
                }
            };

            self.sync_message_cycle();
            self.flush();
            if !running {
                break;
            }
        }

        self.teardown().await;
        self.sink
    }

    fn refresh_dialogs(&mut self) {
        let Some((generation, query)) = self.state.begin_dialog_fetch() else {
            trace!(
                skipped = self.state.guard(ListKind::Dialogs).skipped(),
                "dialog refresh dropped while busy"
            );
            return;
        };
        trace!(generation, ?query, "dialog fetch started");

        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();
        let task = tokio::spawn(async move {
            let result = backend.list_dialogs(query).await;
            let _ = tx.send(Completion::Dialogs { generation, result });
        });
        if let Some(previous) = self.dialog_task.replace(task) {
            previous.abort();
        }
    }

    fn refresh_messages(&mut self) {
        let Some((generation, conversation, limit)) = self.state.begin_message_fetch() else {
            return;
        };
        trace!(generation, %conversation, limit, "message fetch started");

        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();
        let task = tokio::spawn(async move {
            let result = backend.list_messages(conversation, limit).await;
            let _ = tx.send(Completion::Messages {
                generation,
                conversation,
                result,
            });
        });
        if let Some(previous) = self.message_task.replace(task) {
            previous.abort();
        }
    }

    fn spawn_send(&mut self, pending: PendingSend) {
        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();
        let PendingSend {
            local_id,
            conversation,
            payload,
            ..
        } = pending;
        let task = tokio::spawn(async move {
            let result = backend.send_message(conversation, payload).await;
            let _ = tx.send(Completion::Send {
                local_id,
                conversation,
                result,
            });
        });
        self.send_tasks.insert(local_id, task);
    }

    fn spawn_download(&mut self, media: MediaRef) {
        if self.media_tasks.contains_key(&media) {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();
        let key = media.clone();
        let task = tokio::spawn(async move {
            let result = backend.download_media(&media).await;
            let _ = tx.send(Completion::Media { media, result });
        });
        self.media_tasks.insert(key, task);
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Dialogs { generation, result } => {
                match self.state.complete_dialogs(generation, result) {
                    Ok(report) => {
                        debug!(
                            inserted = report.inserted,
                            updated = report.updated,
                            removed = report.removed,
                            "dialogs reconciled"
                        );
                        if report.changed() {
                            self.dirty.mark(ListKind::Dialogs);
                        }
                    }
                    Err(fault) => self.report_fault(fault),
                }
            }
            Completion::Messages {
                generation,
                conversation,
                result,
            } => match self.state.complete_messages(generation, conversation, result) {
                Ok(applied) => {
                    let report = applied.report;
                    debug!(
                        %conversation,
                        inserted = report.inserted,
                        updated = report.updated,
                        removed = report.removed,
                        pending = report.pending_rows,
                        "messages reconciled"
                    );
                    if report.changed() {
                        self.dirty.mark(ListKind::Messages);
                    }
                    for media in applied.new_media {
                        self.spawn_download(media);
                    }
                }
                Err(fault) => self.report_fault(fault),
            },
            Completion::Send {
                local_id,
                conversation,
                result,
            } => {
                self.send_tasks.remove(&local_id);
                if let Err(fault) = self.state.on_send_finished(local_id, conversation, result) {
                    self.report_fault(fault);
                }
                self.dirty.mark(ListKind::Messages);
            }
            Completion::Media { media, result } => {
                self.media_tasks.remove(&media);
                let slot = match result {
                    Ok(bytes) => self.media.resolve(&media, &bytes),
                    Err(error) => {
                        debug!(media = %media.0, %error, "media download failed");
                        MediaSlot::Unavailable
                    }
                };
                if self.state.set_media(&media, slot) {
                    self.dirty.mark(ListKind::Messages);
                }
            }
            Completion::SearchSettled { generation } => {
                if self.state.on_search_settled(generation) {
                    self.refresh_dialogs();
                }
            }
        }
    }

    fn handle_backend_event(&mut self, event: Result<BackendEvent, RecvError>) {
        match event {
            Ok(event) => {
                trace!(kind = event.kind(), conversation = %event.conversation(), "backend event");
                let effect = self.state.on_backend_event(&event);
                if effect.messages_changed {
                    self.dirty.mark(ListKind::Messages);
                }
                if effect.refresh_dialogs {
                    self.refresh_dialogs();
                }
                if effect.refresh_messages {
                    self.refresh_messages();
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "backend event feed lagged; refreshing both lists");
                self.refresh_dialogs();
                self.refresh_messages();
            }
            Err(RecvError::Closed) => {
                info!("backend event feed closed; continuing with polling only");
                self.events = None;
            }
        }
    }

    /// Apply one input event. Returns `false` when the user quit.
    fn handle_input(&mut self, event: SinkEvent) -> bool {
        let command = input::route(
            self.state.focus(),
            self.state.open_id().is_some(),
            self.state.search_text(),
            self.state.composer(),
            event,
        );
        trace!(?command, "input routed");

        match command {
            Command::Move { list, delta } => {
                if self.state.move_selection(list, delta) {
                    self.dirty.mark(list);
                }
            }
            Command::JumpFirst(list) => {
                if self.state.jump(list, false) {
                    self.dirty.mark(list);
                }
            }
            Command::JumpLast(list) => {
                if self.state.jump(list, true) {
                    self.dirty.mark(list);
                }
            }
            Command::Select { list, index } => {
                if self.state.select(list, index) {
                    self.dirty.mark(list);
                }
            }
            Command::OpenSelected => {
                if self.state.open_selected().is_some() {
                    self.abort_message_fetch();
                }
                self.dirty.mark_all();
            }
            Command::CloseConversation => {
                if self.state.close_conversation().is_some() {
                    self.abort_message_fetch();
                }
                self.dirty.mark_all();
            }
            Command::Focus(widget) => {
                if self.state.set_focus(widget) {
                    self.debounce.cancel();
                }
                self.dirty.mark_all();
            }
            Command::CycleFocus => {
                if self.state.cycle_focus() {
                    self.debounce.cancel();
                }
                self.dirty.mark_all();
            }
            Command::SwitchFolder(folder) => {
                if self.state.switch_folder(folder) {
                    self.dirty.mark(ListKind::Dialogs);
                    self.refresh_dialogs();
                }
            }
            Command::LoadMore => {
                if self.state.load_more() {
                    self.refresh_messages();
                } else if self.state.open_id().is_some() {
                    self.sink
                        .notify(Notice::info("message history limit reached"));
                }
            }
            Command::Submit => {
                if let Some(pending) = self.state.submit() {
                    self.dirty.mark(ListKind::Messages);
                    self.spawn_send(pending);
                }
            }
            Command::SearchEdited(text) => {
                let ticket = self.state.on_search_edit(text);
                self.debounce
                    .arm(ticket, self.completion_tx.clone(), |generation| {
                        Completion::SearchSettled { generation }
                    });
            }
            Command::ComposerEdited(text) => self.state.set_composer(text),
            Command::Quit => return false,
            Command::Ignore => {}
        }
        true
    }

    fn abort_message_fetch(&mut self) {
        if let Some(task) = self.message_task.take() {
            task.abort();
        }
        for (_, task) in self.media_tasks.drain() {
            task.abort();
        }
    }

    /// Start, restart or stop the message cycle to follow the open
    /// conversation.
    fn sync_message_cycle(&mut self) {
        let open = self.state.open_id();
        if open == self.message_cycle {
            return;
        }
        self.message_cycle = open;
        self.message_interval = match open {
            Some(conversation) => {
                debug!(%conversation, "message cycle started");
                Some(fixed_rate(self.intervals.messages))
            }
            None => {
                debug!("message cycle stopped");
                None
            }
        };
    }

    fn report_fault(&mut self, fault: SyncFault) {
        match &fault {
            SyncFault::StaleResultDiscarded { .. } => {
                debug!(fault = fault.label(), reason = %fault, "result discarded");
            }
            SyncFault::TransientFetch { error: cause, .. } if !cause.is_transient() => {
                error!(fault = fault.label(), error = %fault, "fetch failed and will keep failing");
            }
            _ if fault.is_user_visible() => {
                warn!(fault = fault.label(), error = %fault, "user-visible failure");
                self.sink.notify(Notice::error(fault.to_string()));
            }
            _ => warn!(fault = fault.label(), error = %fault, "contained failure"),
        }
    }

    fn flush(&mut self) {
        if std::mem::take(&mut self.dirty.dialogs) {
            self.sink
                .publish(ListKind::Dialogs, self.state.rows(ListKind::Dialogs));
        }
        if std::mem::take(&mut self.dirty.messages) {
            self.sink
                .publish(ListKind::Messages, self.state.rows(ListKind::Messages));
        }
        let context = self.state.view_context();
        if self.published_context.as_ref() != Some(&context) {
            self.sink.set_context(&context);
            self.published_context = Some(context);
        }
        self.sink.flush();
    }

    async fn teardown(&mut self) {
        self.debounce.cancel();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.extend(self.dialog_task.take());
        tasks.extend(self.message_task.take());
        tasks.extend(self.media_tasks.drain().map(|(_, task)| task));
        tasks.extend(self.send_tasks.drain().map(|(_, task)| task));

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }

        if let Some(stats) = self.media.stats() {
            info!(
                hits = stats.hits,
                misses = stats.misses,
                evictions = stats.evictions,
                io_errors = stats.io_errors,
                "media cache usage"
            );
        }
        info!(
            dialog_skips = self.state.guard(ListKind::Dialogs).skipped(),
            message_skips = self.state.guard(ListKind::Messages).skipped(),
            "poll scheduler stopped"
        );
    }
}

fn fixed_rate(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn next_event(events: &mut Option<EventStream>) -> Result<BackendEvent, RecvError> {
    match events {
        Some(events) => events.recv().await,
        None => future::pending().await,
    }
}
