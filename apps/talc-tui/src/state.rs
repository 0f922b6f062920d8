//! Chat state reducer driven by the poll scheduler.
//!
//! Everything here runs on the scheduler task. Methods that finish an
//! asynchronous fetch re-validate that the result still belongs to the
//! current context before touching rows.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use sync_core::{
    BackendError, BackendEvent, ConversationId, DebounceTicket, DebouncedQuery, DeliveryOutcome,
    DialogQuery, Folder, ItemId, ListGuard, ListKind, LocalId, MediaRef, MediaSlot,
    OutgoingPayload, PendingSend, ReconcileReport, RemoteItem, Row, RowList, SelectionDefault,
    SendTracker, SyncFault, ViewContext, WidgetId,
};
use tracing::{debug, trace};

use crate::render::{DialogRenderer, MessageRenderer};

/// List sizes used when polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLimits {
    pub dialog_limit: usize,
    pub message_page: usize,
    pub message_limit_max: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConversation {
    pub id: ConversationId,
    pub title: String,
    /// Current `list_messages` window.
    pub limit: usize,
}

/// A message snapshot that was merged into the rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagesApplied {
    pub report: ReconcileReport,
    /// Media references seen for the first time; their artifacts must be
    /// resolved.
    pub new_media: Vec<MediaRef>,
}

/// Refreshes requested by a backend notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventEffect {
    pub refresh_dialogs: bool,
    pub refresh_messages: bool,
    /// Message rows were re-rendered in place.
    pub messages_changed: bool,
}

#[derive(Debug)]
pub struct ChatState {
    limits: ChatLimits,
    dialogs: RowList,
    messages: RowList,
    dialog_guard: ListGuard,
    message_guard: ListGuard,
    search: DebouncedQuery,
    tracker: SendTracker,
    folder: Folder,
    open: Option<OpenConversation>,
    focus: WidgetId,
    composer: String,
    message_snapshot: Vec<RemoteItem>,
    media: HashMap<MediaRef, MediaSlot>,
}

impl ChatState {
    pub fn new(limits: ChatLimits, search_quiet: Duration) -> Self {
        Self {
            limits,
            dialogs: RowList::new(SelectionDefault::First),
            messages: RowList::new(SelectionDefault::Last),
            dialog_guard: ListGuard::new(ListKind::Dialogs),
            message_guard: ListGuard::new(ListKind::Messages),
            search: DebouncedQuery::new(search_quiet),
            tracker: SendTracker::new(),
            folder: Folder::Main,
            open: None,
            focus: WidgetId::DialogList,
            composer: String::new(),
            message_snapshot: Vec::new(),
            media: HashMap::new(),
        }
    }

    pub fn rows(&self, list: ListKind) -> &[Row] {
        match list {
            ListKind::Dialogs => self.dialogs.rows(),
            ListKind::Messages => self.messages.rows(),
        }
    }

    pub fn guard(&self, list: ListKind) -> &ListGuard {
        match list {
            ListKind::Dialogs => &self.dialog_guard,
            ListKind::Messages => &self.message_guard,
        }
    }

    pub fn focus(&self) -> WidgetId {
        self.focus
    }

    pub fn folder(&self) -> Folder {
        self.folder
    }

    pub fn open_conversation(&self) -> Option<&OpenConversation> {
        self.open.as_ref()
    }

    pub fn open_id(&self) -> Option<ConversationId> {
        self.open.as_ref().map(|open| open.id)
    }

    pub fn search_text(&self) -> &str {
        self.search.raw_query()
    }

    pub fn composer(&self) -> &str {
        &self.composer
    }

    pub fn tracker(&self) -> &SendTracker {
        &self.tracker
    }

    pub fn view_context(&self) -> ViewContext {
        ViewContext {
            focus: self.focus,
            folder: self.folder,
            search_text: self.search.raw_query().to_owned(),
            composer_text: self.composer.clone(),
            conversation: self.open.as_ref().map(|open| open.title.clone()),
        }
    }

    /// Dialog request for the current folder and settled query.
    pub fn dialog_query(&self) -> DialogQuery {
        let settled = self.search.settled_query().trim();
        DialogQuery {
            limit: self.limits.dialog_limit,
            folder: self.folder,
            query: (!settled.is_empty()).then(|| settled.to_owned()),
        }
    }

    /// Claim the dialog list for a fetch. `None` means the request is dropped.
    pub fn begin_dialog_fetch(&mut self) -> Option<(u64, DialogQuery)> {
        let generation = self.dialog_guard.try_begin_fetch()?;
        Some((generation, self.dialog_query()))
    }

    pub fn complete_dialogs(
        &mut self,
        generation: u64,
        result: Result<Vec<RemoteItem>, BackendError>,
    ) -> Result<ReconcileReport, SyncFault> {
        if !self.dialog_guard.begin_reconcile(generation) {
            return Err(SyncFault::stale(ListKind::Dialogs, "superseded by a newer request"));
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.dialog_guard.finish();
                return Err(SyncFault::transient_fetch(ListKind::Dialogs, error));
            }
        };

        let renderer = DialogRenderer {
            folder: self.folder,
        };
        let report = self.dialogs.apply(&snapshot, &[], &renderer);
        self.dialog_guard.finish();
        Ok(report)
    }

    /// Claim the message list for a fetch of the open conversation.
    ///
    /// Dropped when nothing is open, when the list is busy, or while a send
    /// to the open conversation has not returned.
    pub fn begin_message_fetch(&mut self) -> Option<(u64, ConversationId, usize)> {
        let open = self.open.as_ref()?;
        let (conversation, limit) = (open.id, open.limit);
        if self.tracker.has_outstanding(conversation) {
            trace!(%conversation, "message cycle paused while a send is outstanding");
            return None;
        }
        let generation = self.message_guard.try_begin_fetch()?;
        Some((generation, conversation, limit))
    }

    pub fn complete_messages(
        &mut self,
        generation: u64,
        conversation: ConversationId,
        result: Result<Vec<RemoteItem>, BackendError>,
    ) -> Result<MessagesApplied, SyncFault> {
        if self.open_id() != Some(conversation) {
            return Err(SyncFault::stale(ListKind::Messages, "conversation is no longer open"));
        }
        if !self.message_guard.begin_reconcile(generation) {
            return Err(SyncFault::stale(ListKind::Messages, "superseded by a newer request"));
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.message_guard.finish();
                return Err(SyncFault::transient_fetch(ListKind::Messages, error));
            }
        };

        let overlay = self.tracker.overlay(conversation);
        let report = self.messages.apply(
            &snapshot,
            &overlay,
            &MessageRenderer { media: &self.media },
        );
        let snapshot_ids: HashSet<ItemId> = snapshot.iter().map(|item| item.id).collect();
        self.tracker.retire_reconciled(conversation, &snapshot_ids);

        let mut new_media = Vec::new();
        for media in snapshot.iter().filter_map(|item| item.media.as_ref()) {
            if !self.media.contains_key(media) {
                self.media
                    .insert(media.clone(), MediaSlot::Pending(media.clone()));
                new_media.push(media.clone());
            }
        }

        self.message_snapshot = snapshot;
        self.message_guard.finish();
        Ok(MessagesApplied { report, new_media })
    }

    /// Create an optimistic send from the composer text.
    ///
    /// The composer is cleared right away; a rejected send puts the text back
    /// (see [`ChatState::on_send_finished`]).
    pub fn submit(&mut self) -> Option<PendingSend> {
        let conversation = self.open_id()?;
        let text = self.composer.trim();
        if text.is_empty() {
            return None;
        }
        let pending = self
            .tracker
            .submit(conversation, OutgoingPayload::text(text));
        self.composer.clear();
        self.rerender_messages();
        Some(pending)
    }

    pub fn on_send_finished(
        &mut self,
        local_id: LocalId,
        conversation: ConversationId,
        result: Result<RemoteItem, BackendError>,
    ) -> Result<(), SyncFault> {
        match result {
            Ok(item) => {
                self.tracker.on_submit_accepted(local_id, item.id);
                if self.open_id() == Some(conversation) {
                    self.rerender_messages();
                }
                Ok(())
            }
            Err(error) => {
                if let Some(record) = self.tracker.on_submit_failed(local_id)
                    && self.open_id() == Some(conversation)
                {
                    self.messages.remove_row(record.sentinel_id());
                    if self.composer.trim().is_empty() {
                        self.composer = record.payload.text;
                    }
                }
                Err(SyncFault::SendRejected { error })
            }
        }
    }

    pub fn on_backend_event(&mut self, event: &BackendEvent) -> EventEffect {
        let conversation = event.conversation();
        let is_open = self.open_id() == Some(conversation);
        match event {
            BackendEvent::DeliveryConfirmed { remote_id, .. } => {
                let outcome = self.tracker.on_delivery_confirmed(*remote_id);
                trace!(%remote_id, ?outcome, "delivery confirmation");
                let messages_changed = matches!(outcome, DeliveryOutcome::Advanced(_)) && is_open;
                if messages_changed {
                    self.rerender_messages();
                }
                EventEffect {
                    messages_changed,
                    ..EventEffect::default()
                }
            }
            BackendEvent::NewItem { .. }
            | BackendEvent::ItemEdited { .. }
            | BackendEvent::ItemDeleted { .. } => EventEffect {
                refresh_dialogs: true,
                refresh_messages: is_open,
                messages_changed: false,
            },
        }
    }

    /// Record a resolved media artifact. Returns whether rows changed.
    pub fn set_media(&mut self, media: &MediaRef, slot: MediaSlot) -> bool {
        let Some(current) = self.media.get_mut(media) else {
            trace!(media = %media.0, "media resolved for a closed conversation");
            return false;
        };
        *current = slot;
        self.rerender_messages();
        true
    }

    /// Re-run reconciliation of the last message snapshot with the current
    /// overlay and media slots. Rows are patched in place.
    fn rerender_messages(&mut self) {
        let Some(conversation) = self.open_id() else {
            return;
        };
        let overlay = self.tracker.overlay(conversation);
        self.messages.apply(
            &self.message_snapshot,
            &overlay,
            &MessageRenderer { media: &self.media },
        );
    }

    /// Switch dialog folder. The in-flight dialog fetch becomes stale.
    pub fn switch_folder(&mut self, folder: Folder) -> bool {
        if self.folder == folder {
            return false;
        }
        debug!(?folder, "dialog folder switched");
        self.folder = folder;
        self.dialog_guard.reset();
        self.dialogs.select(0);
        true
    }

    pub fn on_search_edit(&mut self, text: String) -> DebounceTicket {
        self.search.on_edit(text)
    }

    /// Apply a debounce firing. On `true` the in-flight dialog fetch is
    /// stale and a refresh with the settled query is due.
    pub fn on_search_settled(&mut self, generation: u64) -> bool {
        let Some(settled) = self.search.fire(generation) else {
            return false;
        };
        debug!(query = settled, "search query settled");
        self.dialog_guard.reset();
        true
    }

    pub fn set_composer(&mut self, text: String) {
        self.composer = text;
    }

    /// Move focus. Returns `true` when a pending search debounce was
    /// cancelled because the search edit lost focus.
    pub fn set_focus(&mut self, widget: WidgetId) -> bool {
        let needs_conversation = matches!(widget, WidgetId::MessageList | WidgetId::MessageInput);
        if needs_conversation && self.open.is_none() {
            return false;
        }
        let blurred_search = self.focus == WidgetId::SearchEdit && widget != WidgetId::SearchEdit;
        self.focus = widget;
        self.dialogs.set_focused(widget == WidgetId::DialogList);
        self.messages.set_focused(widget == WidgetId::MessageList);
        blurred_search && self.search.cancel()
    }

    pub fn cycle_focus(&mut self) -> bool {
        let next = match (self.focus, self.open.is_some()) {
            (WidgetId::SearchEdit, _) => WidgetId::DialogList,
            (WidgetId::DialogList, true) => WidgetId::MessageList,
            (WidgetId::DialogList, false) => WidgetId::SearchEdit,
            (WidgetId::MessageList, _) => WidgetId::MessageInput,
            (WidgetId::MessageInput, _) => WidgetId::SearchEdit,
        };
        self.set_focus(next)
    }

    /// Open the selected dialog. Returns the conversation when it changed.
    pub fn open_selected(&mut self) -> Option<ConversationId> {
        let row = self.dialogs.selected_row()?;
        if row.is_pending() {
            return None;
        }
        let id = ConversationId::from(row.id());
        if self.open_id() == Some(id) {
            self.set_focus(WidgetId::MessageInput);
            return None;
        }

        debug!(conversation = %id, "conversation opened");
        self.open = Some(OpenConversation {
            id,
            title: row.fields.title.clone(),
            limit: self.limits.message_page,
        });
        self.reset_messages();
        self.set_focus(WidgetId::MessageInput);
        Some(id)
    }

    pub fn close_conversation(&mut self) -> Option<ConversationId> {
        let closed = self.open.take()?;
        debug!(conversation = %closed.id, "conversation closed");
        self.reset_messages();
        self.set_focus(WidgetId::DialogList);
        Some(closed.id)
    }

    /// Grow the message window by one page. Returns whether it grew.
    pub fn load_more(&mut self) -> bool {
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        let next = (open.limit + self.limits.message_page).min(self.limits.message_limit_max);
        if next == open.limit {
            return false;
        }
        open.limit = next;
        true
    }

    pub fn move_selection(&mut self, list: ListKind, delta: isize) -> bool {
        self.list_mut(list).move_selection(delta)
    }

    pub fn select(&mut self, list: ListKind, index: usize) -> bool {
        self.list_mut(list).select(index)
    }

    pub fn jump(&mut self, list: ListKind, to_last: bool) -> bool {
        let rows = self.list_mut(list);
        match (to_last, rows.len()) {
            (_, 0) => false,
            (false, _) => rows.select(0),
            (true, len) => rows.select(len - 1),
        }
    }

    fn list_mut(&mut self, list: ListKind) -> &mut RowList {
        match list {
            ListKind::Dialogs => &mut self.dialogs,
            ListKind::Messages => &mut self.messages,
        }
    }

    fn reset_messages(&mut self) {
        self.messages.clear();
        self.message_snapshot.clear();
        self.media.clear();
        self.composer.clear();
        self.message_guard.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{DisplayFields, ListPhase, SendStatus};

    const LIMITS: ChatLimits = ChatLimits {
        dialog_limit: 10,
        message_page: 20,
        message_limit_max: 50,
    };

    fn state() -> ChatState {
        ChatState::new(LIMITS, Duration::from_millis(300))
    }

    fn dialog(id: i64, title: &str) -> RemoteItem {
        RemoteItem {
            id: ItemId(id),
            display: DisplayFields {
                title: title.to_owned(),
                ..DisplayFields::default()
            },
            media: None,
        }
    }

    fn message(id: i64, text: &str) -> RemoteItem {
        RemoteItem {
            id: ItemId(id),
            display: DisplayFields {
                text: text.to_owned(),
                sender_name: Some("Alice".to_owned()),
                ..DisplayFields::default()
            },
            media: None,
        }
    }

    fn load_dialogs(state: &mut ChatState, items: Vec<RemoteItem>) {
        let (generation, _) = state.begin_dialog_fetch().expect("dialog fetch starts");
        state
            .complete_dialogs(generation, Ok(items))
            .expect("dialogs apply");
    }

    fn open_first(state: &mut ChatState) -> ConversationId {
        load_dialogs(state, vec![dialog(1, "Alice"), dialog(2, "Bob")]);
        state.open_selected().expect("conversation opens")
    }

    fn load_messages(state: &mut ChatState, items: Vec<RemoteItem>) -> MessagesApplied {
        let (generation, conversation, _) =
            state.begin_message_fetch().expect("message fetch starts");
        state
            .complete_messages(generation, conversation, Ok(items))
            .expect("messages apply")
    }

    #[test]
    fn busy_dialog_list_drops_refresh_requests() {
        let mut state = state();
        let (generation, query) = state.begin_dialog_fetch().expect("first fetch");
        assert_eq!(query.folder, Folder::Main);
        assert!(state.begin_dialog_fetch().is_none());
        assert_eq!(state.guard(ListKind::Dialogs).skipped(), 1);

        state
            .complete_dialogs(generation, Ok(vec![dialog(1, "Alice")]))
            .expect("apply");
        assert_eq!(state.guard(ListKind::Dialogs).phase(), ListPhase::Idle);
    }

    #[test]
    fn failed_poll_keeps_previous_rows() {
        let mut state = state();
        load_dialogs(&mut state, vec![dialog(1, "Alice"), dialog(2, "Bob")]);
        let before = state.rows(ListKind::Dialogs).to_vec();

        let (generation, _) = state.begin_dialog_fetch().expect("fetch");
        let fault = state
            .complete_dialogs(generation, Err(BackendError::network("offline")))
            .expect_err("failure is reported");

        assert_eq!(fault.label(), "transient_fetch");
        assert_eq!(state.rows(ListKind::Dialogs), before.as_slice());
        assert!(!state.guard(ListKind::Dialogs).is_busy());
    }

    #[test]
    fn folder_switch_makes_in_flight_result_stale() {
        let mut state = state();
        load_dialogs(&mut state, vec![dialog(1, "Alice"), dialog(2, "Bob")]);
        state.move_selection(ListKind::Dialogs, 1);
        let (generation, _) = state.begin_dialog_fetch().expect("fetch");

        assert!(state.switch_folder(Folder::Archive));
        assert_eq!(state.dialog_query().folder, Folder::Archive);

        let fault = state
            .complete_dialogs(generation, Ok(vec![dialog(9, "Stale")]))
            .expect_err("stale result");
        assert!(matches!(fault, SyncFault::StaleResultDiscarded { .. }));
        assert_eq!(state.rows(ListKind::Dialogs)[0].id(), ItemId(1));
        assert!(state.rows(ListKind::Dialogs)[0].selected);
    }

    #[test]
    fn settled_search_is_sent_as_query() {
        let mut state = state();
        let ticket = state.on_search_edit("  rust ".to_owned());
        assert_eq!(state.dialog_query().query, None);

        assert!(state.on_search_settled(ticket.generation));
        assert_eq!(state.dialog_query().query.as_deref(), Some("rust"));
    }

    #[test]
    fn blurring_search_cancels_pending_debounce() {
        let mut state = state();
        state.set_focus(WidgetId::SearchEdit);
        let ticket = state.on_search_edit("ru".to_owned());

        assert!(state.set_focus(WidgetId::DialogList));
        assert!(!state.on_search_settled(ticket.generation));
        assert_eq!(state.dialog_query().query, None);
    }

    #[test]
    fn opening_conversation_starts_message_window() {
        let mut state = state();
        let conversation = open_first(&mut state);

        assert_eq!(conversation, ConversationId(1));
        assert_eq!(state.focus(), WidgetId::MessageInput);
        let (_, fetched, limit) = state.begin_message_fetch().expect("fetch");
        assert_eq!(fetched, conversation);
        assert_eq!(limit, LIMITS.message_page);
    }

    #[test]
    fn messages_default_to_last_row_selected() {
        let mut state = state();
        open_first(&mut state);
        load_messages(&mut state, vec![message(10, "a"), message(11, "b")]);

        let rows = state.rows(ListKind::Messages);
        assert!(rows[1].selected);
        assert_eq!(rows[1].fields.title, "Alice");
    }

    #[test]
    fn result_for_closed_conversation_is_stale() {
        let mut state = state();
        open_first(&mut state);
        let (generation, conversation, _) = state.begin_message_fetch().expect("fetch");
        state.close_conversation();

        let fault = state
            .complete_messages(generation, conversation, Ok(vec![message(10, "late")]))
            .expect_err("stale");
        assert_eq!(fault.label(), "stale_result_discarded");
        assert!(state.rows(ListKind::Messages).is_empty());
    }

    #[test]
    fn optimistic_send_round_trip() {
        let mut state = state();
        let conversation = open_first(&mut state);
        load_messages(&mut state, vec![message(10, "hi")]);
        state.set_composer("hello back".to_owned());

        let pending = state.submit().expect("submit");
        assert_eq!(state.composer(), "");
        let rows = state.rows(ListKind::Messages);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].is_pending());
        assert_eq!(rows[1].fields.meta, "sending…");
        assert!(state.begin_message_fetch().is_none());

        let mut sent = message(11, "hello back");
        sent.display.from_self = true;
        state
            .on_send_finished(pending.local_id, conversation, Ok(sent.clone()))
            .expect("accepted");
        assert_eq!(state.composer(), "");
        assert_eq!(state.rows(ListKind::Messages)[1].fields.delivery, Some(SendStatus::Sent));

        load_messages(&mut state, vec![message(10, "hi"), sent]);
        let ids: Vec<_> = state
            .rows(ListKind::Messages)
            .iter()
            .map(|row| row.id())
            .collect();
        assert_eq!(ids, vec![ItemId(10), ItemId(11)]);
        assert!(state.tracker().is_empty());
    }

    #[test]
    fn rejected_send_removes_row_and_keeps_text() {
        let mut state = state();
        let conversation = open_first(&mut state);
        load_messages(&mut state, vec![message(10, "hi")]);
        state.set_composer("draft".to_owned());
        let pending = state.submit().expect("submit");

        let fault = state
            .on_send_finished(
                pending.local_id,
                conversation,
                Err(BackendError::new(
                    sync_core::BackendErrorCategory::Rejected,
                    "forbidden",
                    "not allowed",
                )),
            )
            .expect_err("rejected");

        assert!(fault.is_user_visible());
        assert_eq!(state.composer(), "draft");
        assert_eq!(state.rows(ListKind::Messages).len(), 1);
        assert!(state.tracker().is_empty());
    }

    #[test]
    fn repeated_submit_sends_message_once() {
        let mut state = state();
        open_first(&mut state);
        load_messages(&mut state, vec![message(10, "hi")]);
        state.set_composer("hello".to_owned());

        assert!(state.submit().is_some());
        assert!(state.submit().is_none());

        let pending: Vec<_> = state
            .rows(ListKind::Messages)
            .iter()
            .filter(|row| row.is_pending())
            .map(|row| row.id())
            .collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(state.tracker().len(), 1);
    }

    #[test]
    fn rejected_send_does_not_clobber_newer_draft() {
        let mut state = state();
        let conversation = open_first(&mut state);
        load_messages(&mut state, vec![]);
        state.set_composer("first".to_owned());
        let pending = state.submit().expect("submit");
        state.set_composer("second".to_owned());

        state
            .on_send_finished(
                pending.local_id,
                conversation,
                Err(BackendError::network("down")),
            )
            .expect_err("rejected");

        assert_eq!(state.composer(), "second");
        assert!(state.rows(ListKind::Messages).is_empty());
    }

    #[test]
    fn delivered_row_survives_poll_that_lacks_it() {
        let mut state = state();
        let conversation = open_first(&mut state);
        load_messages(&mut state, vec![message(10, "hi")]);
        state.set_composer("ping".to_owned());
        let pending = state.submit().expect("submit");
        state
            .on_send_finished(pending.local_id, conversation, Ok(message(20, "ping")))
            .expect("accepted");
        state.on_backend_event(&BackendEvent::DeliveryConfirmed {
            conversation,
            remote_id: ItemId(20),
        });

        load_messages(&mut state, vec![message(10, "hi")]);
        let rows = state.rows(ListKind::Messages);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id(), pending.sentinel_id());
        assert_eq!(rows[1].fields.meta, "delivered");

        load_messages(&mut state, vec![message(10, "hi"), message(20, "ping")]);
        let ids: Vec<_> = state
            .rows(ListKind::Messages)
            .iter()
            .map(|row| row.id())
            .collect();
        assert_eq!(ids, vec![ItemId(10), ItemId(20)]);
        assert!(state.tracker().is_empty());
    }

    #[test]
    fn delivery_event_marks_row_delivered() {
        let mut state = state();
        let conversation = open_first(&mut state);
        load_messages(&mut state, vec![]);
        state.set_composer("ping".to_owned());
        let pending = state.submit().expect("submit");
        state
            .on_send_finished(pending.local_id, conversation, Ok(message(20, "ping")))
            .expect("accepted");

        let effect = state.on_backend_event(&BackendEvent::DeliveryConfirmed {
            conversation,
            remote_id: ItemId(20),
        });

        assert!(effect.messages_changed);
        assert_eq!(state.rows(ListKind::Messages)[0].fields.meta, "delivered");
    }

    #[test]
    fn new_item_events_refresh_affected_lists() {
        let mut state = state();
        let conversation = open_first(&mut state);

        let open_effect = state.on_backend_event(&BackendEvent::NewItem {
            conversation,
            item_id: ItemId(30),
        });
        let other_effect = state.on_backend_event(&BackendEvent::ItemDeleted {
            conversation: ConversationId(2),
            item_id: ItemId(31),
        });

        assert!(open_effect.refresh_dialogs && open_effect.refresh_messages);
        assert!(other_effect.refresh_dialogs && !other_effect.refresh_messages);
    }

    #[test]
    fn media_is_requested_once_and_patched_in_place() {
        let mut state = state();
        open_first(&mut state);
        let mut with_media = message(10, "");
        with_media.media = Some(MediaRef("m1".to_owned()));

        let first = load_messages(&mut state, vec![with_media.clone()]);
        let mount = state.rows(ListKind::Messages)[0].mount();
        let second = load_messages(&mut state, vec![with_media]);

        assert_eq!(first.new_media, vec![MediaRef("m1".to_owned())]);
        assert!(second.new_media.is_empty());

        assert!(state.set_media(&MediaRef("m1".to_owned()), MediaSlot::Ready("art".to_owned())));
        let row = &state.rows(ListKind::Messages)[0];
        assert_eq!(row.mount(), mount);
        assert_eq!(row.fields.media, MediaSlot::Ready("art".to_owned()));
    }

    #[test]
    fn load_more_grows_until_cap() {
        let mut state = state();
        open_first(&mut state);

        assert!(state.load_more());
        assert_eq!(state.open_conversation().map(|open| open.limit), Some(40));
        assert!(state.load_more());
        assert_eq!(state.open_conversation().map(|open| open.limit), Some(50));
        assert!(!state.load_more());
    }

    #[test]
    fn focus_cycles_through_open_conversation() {
        let mut state = state();
        state.cycle_focus();
        assert_eq!(state.focus(), WidgetId::SearchEdit);
        state.cycle_focus();
        assert_eq!(state.focus(), WidgetId::DialogList);

        open_first(&mut state);
        state.set_focus(WidgetId::DialogList);
        state.cycle_focus();
        assert_eq!(state.focus(), WidgetId::MessageList);
        assert!(!state.set_focus(WidgetId::MessageList));
    }
}
