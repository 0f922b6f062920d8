//! Key routing from sink events to chat commands.
//!
//! Navigation keys always reach the focused (or underlying) list, even while
//! an edit widget has focus; only printable characters and backspace edit
//! text.

use sync_core::{Folder, KeyCode, ListKind, SinkEvent, WidgetId};

const PAGE_STEP: isize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move { list: ListKind, delta: isize },
    JumpFirst(ListKind),
    JumpLast(ListKind),
    Select { list: ListKind, index: usize },
    OpenSelected,
    CloseConversation,
    Focus(WidgetId),
    CycleFocus,
    SwitchFolder(Folder),
    LoadMore,
    Submit,
    SearchEdited(String),
    ComposerEdited(String),
    Quit,
    Ignore,
}

/// Translate one sink event into a command.
///
/// `search_text` and `composer_text` are the current edit buffers, used to
/// apply typed characters.
pub fn route(
    focus: WidgetId,
    conversation_open: bool,
    search_text: &str,
    composer_text: &str,
    event: SinkEvent,
) -> Command {
    match event {
        SinkEvent::Quit => Command::Quit,
        SinkEvent::EditChanged { widget, text } => match widget {
            WidgetId::SearchEdit => Command::SearchEdited(text),
            WidgetId::MessageInput => Command::ComposerEdited(text),
            WidgetId::DialogList | WidgetId::MessageList => Command::Ignore,
        },
        SinkEvent::FocusChanged { widget, index } => match widget {
            WidgetId::DialogList => Command::Select {
                list: ListKind::Dialogs,
                index,
            },
            WidgetId::MessageList => Command::Select {
                list: ListKind::Messages,
                index,
            },
            edit => Command::Focus(edit),
        },
        SinkEvent::Key(key) => route_key(focus, conversation_open, search_text, composer_text, key),
    }
}

fn route_key(
    focus: WidgetId,
    conversation_open: bool,
    search_text: &str,
    composer_text: &str,
    key: KeyCode,
) -> Command {
    if key == KeyCode::Tab {
        return Command::CycleFocus;
    }

    let list = match focus {
        WidgetId::SearchEdit | WidgetId::DialogList => ListKind::Dialogs,
        WidgetId::MessageList | WidgetId::MessageInput => ListKind::Messages,
    };
    if key.is_navigation() {
        return navigation(list, key);
    }

    match (focus, key) {
        (WidgetId::SearchEdit, KeyCode::Enter) | (WidgetId::DialogList, KeyCode::Enter) => {
            Command::OpenSelected
        }
        (WidgetId::SearchEdit, KeyCode::Esc) => Command::Focus(WidgetId::DialogList),
        (WidgetId::SearchEdit, KeyCode::Char(ch)) => Command::SearchEdited(push(search_text, ch)),
        (WidgetId::SearchEdit, KeyCode::Backspace) => Command::SearchEdited(pop(search_text)),

        (WidgetId::DialogList, KeyCode::Char('/')) => Command::Focus(WidgetId::SearchEdit),
        (WidgetId::DialogList, KeyCode::Char('[')) => Command::SwitchFolder(Folder::Main),
        (WidgetId::DialogList, KeyCode::Char(']')) => Command::SwitchFolder(Folder::Archive),
        (WidgetId::DialogList, KeyCode::Char('q')) => Command::Quit,
        (WidgetId::DialogList, KeyCode::Esc) if conversation_open => Command::CloseConversation,

        (WidgetId::MessageList, KeyCode::Enter) | (WidgetId::MessageList, KeyCode::Char('i')) => {
            Command::Focus(WidgetId::MessageInput)
        }
        (WidgetId::MessageList, KeyCode::Char('l')) => Command::LoadMore,
        (WidgetId::MessageList, KeyCode::Char('q')) => Command::Quit,
        (WidgetId::MessageList, KeyCode::Esc) | (WidgetId::MessageInput, KeyCode::Esc) => {
            Command::CloseConversation
        }

        (WidgetId::MessageInput, KeyCode::Enter) => Command::Submit,
        (WidgetId::MessageInput, KeyCode::Char(ch)) => Command::ComposerEdited(push(composer_text, ch)),
        (WidgetId::MessageInput, KeyCode::Backspace) => Command::ComposerEdited(pop(composer_text)),

        _ => Command::Ignore,
    }
}

fn navigation(list: ListKind, key: KeyCode) -> Command {
    match key {
        KeyCode::Up => Command::Move { list, delta: -1 },
        KeyCode::Down => Command::Move { list, delta: 1 },
        KeyCode::PageUp => Command::Move {
            list,
            delta: -PAGE_STEP,
        },
        KeyCode::PageDown => Command::Move {
            list,
            delta: PAGE_STEP,
        },
        KeyCode::Home => Command::JumpFirst(list),
        KeyCode::End => Command::JumpLast(list),
        _ => Command::Ignore,
    }
}

fn push(text: &str, ch: char) -> String {
    let mut out = text.to_owned();
    out.push(ch);
    out
}

fn pop(text: &str) -> String {
    let mut out = text.to_owned();
    out.pop();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(focus: WidgetId, key: KeyCode) -> Command {
        route(focus, false, "ru", "draft", SinkEvent::Key(key))
    }

    #[test]
    fn navigation_in_search_goes_to_dialog_list() {
        assert_eq!(
            key(WidgetId::SearchEdit, KeyCode::Down),
            Command::Move {
                list: ListKind::Dialogs,
                delta: 1
            }
        );
        assert_eq!(key(WidgetId::SearchEdit, KeyCode::Enter), Command::OpenSelected);
    }

    #[test]
    fn navigation_keys_never_reach_an_edit_buffer() {
        let keys = [
            KeyCode::Up,
            KeyCode::Down,
            KeyCode::PageUp,
            KeyCode::PageDown,
            KeyCode::Home,
            KeyCode::End,
        ];
        let focuses = [
            WidgetId::SearchEdit,
            WidgetId::DialogList,
            WidgetId::MessageList,
            WidgetId::MessageInput,
        ];
        for code in keys {
            assert!(code.is_navigation());
            for focus in focuses {
                let command = key(focus, code);
                assert!(
                    matches!(
                        command,
                        Command::Move { .. } | Command::JumpFirst(_) | Command::JumpLast(_)
                    ),
                    "{code:?} in {focus:?} routed to {command:?}"
                );
            }
        }
    }

    #[test]
    fn typing_edits_the_focused_buffer() {
        assert_eq!(
            key(WidgetId::SearchEdit, KeyCode::Char('s')),
            Command::SearchEdited("rus".to_owned())
        );
        assert_eq!(
            key(WidgetId::MessageInput, KeyCode::Backspace),
            Command::ComposerEdited("draf".to_owned())
        );
    }

    #[test]
    fn list_shortcuts() {
        assert_eq!(
            key(WidgetId::DialogList, KeyCode::Char('/')),
            Command::Focus(WidgetId::SearchEdit)
        );
        assert_eq!(
            key(WidgetId::DialogList, KeyCode::Char(']')),
            Command::SwitchFolder(Folder::Archive)
        );
        assert_eq!(key(WidgetId::DialogList, KeyCode::Char('q')), Command::Quit);
        assert_eq!(key(WidgetId::MessageList, KeyCode::Char('l')), Command::LoadMore);
        assert_eq!(key(WidgetId::DialogList, KeyCode::Tab), Command::CycleFocus);
    }

    #[test]
    fn q_in_an_edit_is_text() {
        assert_eq!(
            key(WidgetId::SearchEdit, KeyCode::Char('q')),
            Command::SearchEdited("ruq".to_owned())
        );
    }

    #[test]
    fn composer_enter_submits_and_esc_closes() {
        assert_eq!(key(WidgetId::MessageInput, KeyCode::Enter), Command::Submit);
        assert_eq!(
            key(WidgetId::MessageInput, KeyCode::Esc),
            Command::CloseConversation
        );
        assert_eq!(
            key(WidgetId::MessageInput, KeyCode::PageUp),
            Command::Move {
                list: ListKind::Messages,
                delta: -10
            }
        );
    }

    #[test]
    fn sink_edit_and_focus_events_map_directly() {
        assert_eq!(
            route(
                WidgetId::DialogList,
                false,
                "",
                "",
                SinkEvent::EditChanged {
                    widget: WidgetId::SearchEdit,
                    text: "abc".to_owned()
                }
            ),
            Command::SearchEdited("abc".to_owned())
        );
        assert_eq!(
            route(
                WidgetId::DialogList,
                false,
                "",
                "",
                SinkEvent::FocusChanged {
                    widget: WidgetId::DialogList,
                    index: 3
                }
            ),
            Command::Select {
                list: ListKind::Dialogs,
                index: 3
            }
        );
    }
}
