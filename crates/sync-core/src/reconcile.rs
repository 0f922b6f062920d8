//! Identity-preserving merge of polled snapshots into displayed rows.
//!
//! A row whose id survives from one snapshot to the next is moved into the
//! new output and patched in place; it is never dropped and re-mounted. The
//! [`MountId`] a row receives when it is first mounted stays with it for its
//! whole lifetime, which is what the display sink keys widget state on.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::types::{ItemId, PendingSend, RemoteItem, RenderedFields};

/// Identity of one mounted row instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(u64);

/// Unit rendered by the display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    id: ItemId,
    mount: MountId,
    pub fields: RenderedFields,
    pub selected: bool,
    pub focused: bool,
}

impl Row {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn mount(&self) -> MountId {
        self.mount
    }

    /// Whether this is an optimistic row for an unconfirmed send.
    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }
}

/// Produces display fields for snapshot items and optimistic sends.
pub trait RowRenderer {
    fn render_item(&self, item: &RemoteItem) -> RenderedFields;
    fn render_pending(&self, pending: &PendingSend) -> RenderedFields;
}

/// Where selection lands when a non-empty list had no selection before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionDefault {
    #[default]
    First,
    Last,
}

/// Counters describing what one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Optimistic rows present in the output.
    pub pending_rows: usize,
    /// Overlay entries whose remote id showed up in the snapshot.
    pub reconciled_sends: usize,
    /// Snapshot entries skipped because their id was already emitted.
    pub duplicates_skipped: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0 || self.removed > 0
    }
}

/// Keyed diff engine shared by the dialog and message lists.
#[derive(Debug, Default)]
pub struct ListReconciler {
    next_mount: u64,
}

impl ListReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `snapshot` and `overlay` into `previous`.
    ///
    /// Runs in O(n) over the combined list sizes. Never mutates `snapshot`
    /// or `overlay` and never emits two rows with the same id.
    pub fn reconcile<R>(
        &mut self,
        previous: Vec<Row>,
        snapshot: &[RemoteItem],
        overlay: &[PendingSend],
        renderer: &R,
        default: SelectionDefault,
    ) -> (Vec<Row>, ReconcileReport)
    where
        R: RowRenderer + ?Sized,
    {
        let mut report = ReconcileReport::default();
        let old_selected = previous.iter().position(|row| row.selected);
        let old_focused = previous.iter().position(|row| row.focused);
        let selected_sentinel = old_selected
            .map(|index| previous[index].id)
            .filter(|id| id.is_pending());

        let mut mounted: HashMap<ItemId, Row> = HashMap::with_capacity(previous.len());
        for row in previous {
            mounted.entry(row.id).or_insert(row);
        }

        let mut emitted: HashSet<ItemId> = HashSet::with_capacity(snapshot.len() + overlay.len());
        let mut rows = Vec::with_capacity(snapshot.len() + overlay.len());

        for item in snapshot {
            if !emitted.insert(item.id) {
                report.duplicates_skipped += 1;
                continue;
            }
            let fields = renderer.render_item(item);
            rows.push(self.patch_or_mount(&mut mounted, item.id, fields, &mut report));
        }

        let mut inherited_from: Option<ItemId> = None;
        for pending in overlay {
            if let Some(remote_id) = pending.remote_id
                && emitted.contains(&remote_id)
            {
                report.reconciled_sends += 1;
                if selected_sentinel == Some(pending.sentinel_id()) {
                    inherited_from = Some(remote_id);
                }
                continue;
            }
            let sentinel = pending.sentinel_id();
            if !emitted.insert(sentinel) {
                report.duplicates_skipped += 1;
                continue;
            }
            let fields = renderer.render_pending(pending);
            rows.push(self.patch_or_mount(&mut mounted, sentinel, fields, &mut report));
            report.pending_rows += 1;
        }

        report.removed = mounted.len();

        carry_flag(
            &mut rows,
            old_selected,
            default,
            inherited_from,
            true,
            |row| &mut row.selected,
        );
        carry_flag(
            &mut rows,
            old_focused,
            default,
            inherited_from,
            false,
            |row| &mut row.focused,
        );

        trace!(
            inserted = report.inserted,
            updated = report.updated,
            removed = report.removed,
            pending = report.pending_rows,
            "reconciled rows"
        );
        (rows, report)
    }

    fn patch_or_mount(
        &mut self,
        mounted: &mut HashMap<ItemId, Row>,
        id: ItemId,
        fields: RenderedFields,
        report: &mut ReconcileReport,
    ) -> Row {
        match mounted.remove(&id) {
            Some(mut row) => {
                if row.fields == fields {
                    report.unchanged += 1;
                } else {
                    row.fields = fields;
                    report.updated += 1;
                }
                row
            }
            None => {
                report.inserted += 1;
                self.next_mount += 1;
                Row {
                    id,
                    mount: MountId(self.next_mount),
                    fields,
                    selected: false,
                    focused: false,
                }
            }
        }
    }
}

/// Keep at most one row flagged and clamp a lost flag to a valid index.
///
/// When the flagged row was an optimistic sentinel that just got reconciled,
/// the matching real row does not take the flag over unless it is the only
/// row left.
fn carry_flag(
    rows: &mut [Row],
    old_index: Option<usize>,
    default: SelectionDefault,
    reconciled_real: Option<ItemId>,
    required: bool,
    flag: impl Fn(&mut Row) -> &mut bool,
) {
    let mut seen = false;
    for row in rows.iter_mut() {
        let value = flag(row);
        if *value {
            if seen {
                *value = false;
            }
            seen = true;
        }
    }
    if seen || rows.is_empty() {
        return;
    }

    let index = match old_index {
        Some(old) => {
            let clamped = old.min(rows.len() - 1);
            match reconciled_real {
                Some(real) if rows[clamped].id == real => {
                    if clamped > 0 {
                        clamped - 1
                    } else if clamped + 1 < rows.len() {
                        clamped + 1
                    } else {
                        clamped
                    }
                }
                _ => clamped,
            }
        }
        None if required => match default {
            SelectionDefault::First => 0,
            SelectionDefault::Last => rows.len() - 1,
        },
        None => return,
    };
    *flag(&mut rows[index]) = true;
}

/// Ordered rows of one list together with the reconciler that owns them.
#[derive(Debug, Default)]
pub struct RowList {
    rows: Vec<Row>,
    reconciler: ListReconciler,
    default_selection: SelectionDefault,
}

impl RowList {
    pub fn new(default_selection: SelectionDefault) -> Self {
        Self {
            rows: Vec::new(),
            reconciler: ListReconciler::new(),
            default_selection,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reconcile the list against a fresh snapshot plus optimistic overlay.
    pub fn apply<R>(
        &mut self,
        snapshot: &[RemoteItem],
        overlay: &[PendingSend],
        renderer: &R,
    ) -> ReconcileReport
    where
        R: RowRenderer + ?Sized,
    {
        let previous = std::mem::take(&mut self.rows);
        let (rows, report) = self.reconciler.reconcile(
            previous,
            snapshot,
            overlay,
            renderer,
            self.default_selection,
        );
        self.rows = rows;
        report
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.rows.iter().position(|row| row.selected)
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.rows.iter().find(|row| row.selected)
    }

    pub fn has_focus(&self) -> bool {
        self.rows.iter().any(|row| row.focused)
    }

    /// Select the row at `index`; out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.rows.len() {
            return false;
        }
        let focused = self.has_focus();
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.selected = i == index;
            row.focused = focused && i == index;
        }
        true
    }

    /// Move selection by `delta`, clamped to the list bounds.
    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        let current = self.selected_index().unwrap_or(0);
        let last = self.rows.len() - 1;
        let target = current.saturating_add_signed(delta).min(last);
        self.select(target)
    }

    /// Mark the selected row as holding (or not holding) input focus.
    pub fn set_focused(&mut self, focused: bool) {
        let selected = self.selected_index();
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.focused = focused && Some(i) == selected;
        }
    }

    /// Patch one row in place by id.
    pub fn update_row(&mut self, id: ItemId, patch: impl FnOnce(&mut RenderedFields)) -> bool {
        match self.rows.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                patch(&mut row.fields);
                true
            }
            None => false,
        }
    }

    /// Remove one row by id, keeping a valid selection.
    pub fn remove_row(&mut self, id: ItemId) -> bool {
        let Some(index) = self.rows.iter().position(|row| row.id == id) else {
            return false;
        };
        let removed = self.rows.remove(index);
        if removed.selected && !self.rows.is_empty() {
            let target = index.min(self.rows.len() - 1);
            self.rows[target].selected = true;
            self.rows[target].focused = removed.focused;
        }
        true
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
