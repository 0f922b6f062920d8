use crate::{
    reconcile::Row,
    types::{Folder, ListKind},
};

/// Input widgets the display sink reports events for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetId {
    SearchEdit,
    DialogList,
    MessageList,
    MessageInput,
}

/// Key codes the core routes on; layout-specific keys stay in the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Enter,
    Esc,
    Tab,
    Backspace,
    Char(char),
}

impl KeyCode {
    /// Keys that move the selection of the focused (or underlying) list,
    /// even while an edit has focus. They are never debounced.
    pub fn is_navigation(self) -> bool {
        matches!(
            self,
            Self::Up | Self::Down | Self::PageUp | Self::PageDown | Self::Home | Self::End
        )
    }
}

/// Input reported back by the display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Key(KeyCode),
    EditChanged { widget: WidgetId, text: String },
    FocusChanged { widget: WidgetId, index: usize },
    Quit,
}

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Non-blocking notification shown by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Non-row view state: focus, edit buffers and headings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
    pub focus: WidgetId,
    pub folder: Folder,
    pub search_text: String,
    pub composer_text: String,
    /// Title of the open conversation.
    pub conversation: Option<String>,
}

impl Default for ViewContext {
    fn default() -> Self {
        Self {
            focus: WidgetId::DialogList,
            folder: Folder::Main,
            search_text: String::new(),
            composer_text: String::new(),
            conversation: None,
        }
    }
}

/// Consumer of reconciled rows.
pub trait DisplaySink {
    fn publish(&mut self, list: ListKind, rows: &[Row]);

    fn notify(&mut self, notice: Notice);

    fn set_context(&mut self, _context: &ViewContext) {}

    /// Called once per scheduler turn after all updates of that turn.
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_keys_bypass_the_edit() {
        assert!(KeyCode::Down.is_navigation());
        assert!(KeyCode::End.is_navigation());
        assert!(!KeyCode::Enter.is_navigation());
        assert!(!KeyCode::Tab.is_navigation());
        assert!(!KeyCode::Char('j').is_navigation());
        assert!(!KeyCode::Backspace.is_navigation());
    }
}
