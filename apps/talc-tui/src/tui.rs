//! Terminal display sink and keyboard reader.

use std::{thread, time::Duration};

use crossterm::event::{self, Event, KeyCode as TermKey, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect, Size},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use sync_core::{
    DisplaySink, Folder, KeyCode, ListKind, MediaSlot, Notice, NoticeLevel, Row, SinkEvent,
    ViewContext, WidgetId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::render::status_marker;

const INPUT_POLL: Duration = Duration::from_millis(100);
const LOADING_MEDIA: &str = "[loading media]";
const MEDIA_UNAVAILABLE: &str = "[media unavailable]";
const HINTS: &str = "Tab focus | / search | [ ] folder | Enter open | l more | Esc close | q quit";

/// Display sink drawing both lists with ratatui.
pub struct TerminalSink<T: Backend> {
    terminal: Terminal<T>,
    dialogs: Vec<Row>,
    messages: Vec<Row>,
    dialog_state: ListState,
    message_state: ListState,
    context: ViewContext,
    notice: Option<Notice>,
    dirty: bool,
    last_size: Option<Size>,
}

impl<T: Backend> TerminalSink<T> {
    pub fn new(terminal: Terminal<T>) -> Self {
        Self {
            terminal,
            dialogs: Vec::new(),
            messages: Vec::new(),
            dialog_state: ListState::default(),
            message_state: ListState::default(),
            context: ViewContext::default(),
            notice: None,
            dirty: true,
            last_size: None,
        }
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<T> {
        &mut self.terminal
    }

    pub fn into_terminal(self) -> Terminal<T> {
        self.terminal
    }

    fn draw(&mut self) {
        let Self {
            terminal,
            dialogs,
            messages,
            dialog_state,
            message_state,
            context,
            notice,
            ..
        } = self;
        dialog_state.select(dialogs.iter().position(|row| row.selected));
        message_state.select(messages.iter().position(|row| row.selected));

        let result = terminal.draw(|frame| {
            draw_frame(
                frame,
                DrawInput {
                    dialogs: &dialogs[..],
                    messages: &messages[..],
                    context: &*context,
                    notice: notice.as_ref(),
                },
                dialog_state,
                message_state,
            );
        });
        if let Err(err) = result {
            warn!(error = %err, "terminal draw failed");
        }
    }
}

impl<T: Backend> DisplaySink for TerminalSink<T> {
    fn publish(&mut self, list: ListKind, rows: &[Row]) {
        match list {
            ListKind::Dialogs => self.dialogs = rows.to_vec(),
            ListKind::Messages => self.messages = rows.to_vec(),
        }
        self.dirty = true;
    }

    fn notify(&mut self, notice: Notice) {
        self.notice = Some(notice);
        self.dirty = true;
    }

    fn set_context(&mut self, context: &ViewContext) {
        if self.context.composer_text != context.composer_text
            || self.context.search_text != context.search_text
        {
            self.notice = None;
        }
        self.context = context.clone();
        self.dirty = true;
    }

    fn flush(&mut self) {
        let size = self.terminal.size().ok();
        if !self.dirty && size == self.last_size {
            return;
        }
        self.last_size = size;
        self.dirty = false;
        self.draw();
    }
}

struct DrawInput<'a> {
    dialogs: &'a [Row],
    messages: &'a [Row],
    context: &'a ViewContext,
    notice: Option<&'a Notice>,
}

fn draw_frame(
    frame: &mut Frame,
    input: DrawInput<'_>,
    dialog_state: &mut ListState,
    message_state: &mut ListState,
) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(outer[0]);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(columns[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(columns[1]);

    let focus = input.context.focus;
    let search = Paragraph::new(input.context.search_text.as_str())
        .block(panel("search", focus == WidgetId::SearchEdit));
    frame.render_widget(search, left[0]);

    let folder_title = match input.context.folder {
        Folder::Main => "chats",
        Folder::Archive => "archive",
    };
    let dialogs = List::new(input.dialogs.iter().map(dialog_item))
        .block(panel(folder_title, focus == WidgetId::DialogList))
        .highlight_style(highlight(focus == WidgetId::DialogList));
    frame.render_stateful_widget(dialogs, left[1], dialog_state);

    let conversation = input
        .context
        .conversation
        .as_deref()
        .unwrap_or("no conversation");
    let messages = List::new(input.messages.iter().map(message_item))
        .block(panel(conversation, focus == WidgetId::MessageList))
        .highlight_style(highlight(focus == WidgetId::MessageList));
    frame.render_stateful_widget(messages, right[0], message_state);

    let composer = Paragraph::new(input.context.composer_text.as_str())
        .block(panel("compose", focus == WidgetId::MessageInput))
        .wrap(Wrap { trim: false });
    frame.render_widget(composer, right[1]);

    draw_status(frame, outer[1], input.notice);
}

fn draw_status(frame: &mut Frame, area: Rect, notice: Option<&Notice>) {
    let line = match notice {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(notice.text.clone(), Style::default().fg(color)))
        }
        None => Line::from(Span::styled(HINTS, Style::default().fg(Color::DarkGray))),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn panel(title: &str, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border)
        .title(Span::styled(format!(" {title} "), Style::default().add_modifier(Modifier::BOLD)))
}

fn highlight(focused: bool) -> Style {
    let style = Style::default().add_modifier(Modifier::REVERSED);
    if focused {
        style
    } else {
        style.add_modifier(Modifier::DIM)
    }
}

fn dialog_item(row: &Row) -> ListItem<'static> {
    let fields = &row.fields;
    let badge = fields.badge.unwrap_or('?');
    let header = Line::from(vec![
        Span::styled(format!("[{badge}] "), Style::default().fg(Color::Cyan)),
        Span::styled(fields.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(fields.meta.clone(), Style::default().fg(Color::DarkGray)),
    ]);
    ListItem::new(Text::from(vec![header, Line::from(fields.body.clone())]))
}

fn message_item(row: &Row) -> ListItem<'static> {
    let fields = &row.fields;
    let mut lines = Vec::new();

    let author = if fields.is_own {
        Span::styled("You", Style::default().fg(Color::Green))
    } else {
        Span::styled(fields.title.clone(), Style::default().fg(Color::Cyan))
    };
    let meta = match fields.delivery {
        Some(status) if fields.meta.is_empty() => status_marker(status).to_owned(),
        _ => fields.meta.clone(),
    };
    lines.push(Line::from(vec![
        author,
        Span::raw("  "),
        Span::styled(meta, Style::default().fg(Color::DarkGray)),
    ]));

    lines.extend(fields.body.lines().map(|line| Line::from(line.to_owned())));
    match &fields.media {
        MediaSlot::None => {}
        MediaSlot::Pending(_) => lines.push(Line::from(LOADING_MEDIA)),
        MediaSlot::Ready(art) => lines.extend(art.lines().map(|line| Line::from(line.to_owned()))),
        MediaSlot::Unavailable => lines.push(Line::from(MEDIA_UNAVAILABLE)),
    }

    let style = if row.is_pending() {
        Style::default().add_modifier(Modifier::ITALIC)
    } else {
        Style::default()
    };
    ListItem::new(Text::from(lines)).style(style)
}

/// Translate a terminal key press into a sink event.
pub fn map_key(key: KeyEvent) -> Option<SinkEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == TermKey::Char('c') {
        return Some(SinkEvent::Quit);
    }
    let code = match key.code {
        TermKey::Up => KeyCode::Up,
        TermKey::Down => KeyCode::Down,
        TermKey::PageUp => KeyCode::PageUp,
        TermKey::PageDown => KeyCode::PageDown,
        TermKey::Home => KeyCode::Home,
        TermKey::End => KeyCode::End,
        TermKey::Enter => KeyCode::Enter,
        TermKey::Esc => KeyCode::Esc,
        TermKey::Tab | TermKey::BackTab => KeyCode::Tab,
        TermKey::Backspace => KeyCode::Backspace,
        TermKey::Char(ch) => KeyCode::Char(ch),
        _ => return None,
    };
    Some(SinkEvent::Key(code))
}

/// Read terminal events on a dedicated thread until `stop` fires or the
/// receiver goes away.
pub fn spawn_input_reader(
    tx: mpsc::UnboundedSender<SinkEvent>,
    stop: CancellationToken,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("talc-input".to_owned())
        .spawn(move || {
            while !stop.is_cancelled() {
                match event::poll(INPUT_POLL) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(err) => {
                        warn!(error = %err, "terminal event poll failed");
                        break;
                    }
                }
                let event = match event::read() {
                    Ok(Event::Key(key)) => map_key(key),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(error = %err, "terminal event read failed");
                        break;
                    }
                };
                if let Some(event) = event
                    && tx.send(event).is_err()
                {
                    break;
                }
            }
            debug!("input reader stopped");
        })
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;
    use sync_core::{DisplayFields, ItemId, RemoteItem, RowList, SelectionDefault, SendStatus};

    use super::*;
    use crate::render::DialogRenderer;

    fn buffer_text(sink: &mut TerminalSink<TestBackend>) -> String {
        let buffer = sink.terminal_mut().backend().buffer().clone();
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    fn dialog_rows() -> Vec<Row> {
        let mut rows = RowList::new(SelectionDefault::First);
        let item = RemoteItem {
            id: ItemId(1),
            display: DisplayFields {
                title: "Alice".to_owned(),
                text: "see you".to_owned(),
                ..DisplayFields::default()
            },
            media: None,
        };
        rows.apply(&[item], &[], &DialogRenderer { folder: Folder::Main });
        rows.rows().to_vec()
    }

    #[test]
    fn draws_published_rows_and_notice() {
        let terminal = Terminal::new(TestBackend::new(100, 20)).expect("test terminal");
        let mut sink = TerminalSink::new(terminal);

        sink.publish(ListKind::Dialogs, &dialog_rows());
        sink.notify(Notice::error("send rejected"));
        sink.flush();

        let text = buffer_text(&mut sink);
        assert!(text.contains("[A] Alice"));
        assert!(text.contains("see you"));
        assert!(text.contains("send rejected"));
    }

    #[test]
    fn editing_clears_the_notice() {
        let terminal = Terminal::new(TestBackend::new(100, 20)).expect("test terminal");
        let mut sink = TerminalSink::new(terminal);
        sink.notify(Notice::error("send rejected"));

        sink.set_context(&ViewContext {
            composer_text: "retry".to_owned(),
            ..ViewContext::default()
        });
        sink.flush();

        let text = buffer_text(&mut sink);
        assert!(!text.contains("send rejected"));
        assert!(text.contains("retry"));
    }

    #[test]
    fn message_media_placeholders() {
        let mut pending = Row::clone(&dialog_rows()[0]);
        pending.fields.media = MediaSlot::Pending(sync_core::MediaRef("m".to_owned()));
        let mut failed = pending.clone();
        failed.fields.media = MediaSlot::Unavailable;
        let mut own = pending.clone();
        own.fields.is_own = true;
        own.fields.meta.clear();
        own.fields.delivery = Some(SendStatus::Sent);

        let render = |row: &Row| {
            let terminal = Terminal::new(TestBackend::new(100, 20)).expect("test terminal");
            let mut sink = TerminalSink::new(terminal);
            sink.publish(ListKind::Messages, std::slice::from_ref(row));
            sink.flush();
            buffer_text(&mut sink)
        };

        assert!(render(&pending).contains(LOADING_MEDIA));
        assert!(render(&failed).contains(MEDIA_UNAVAILABLE));
        assert!(render(&own).contains("You  sent"));
    }

    #[test]
    fn maps_terminal_keys() {
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(map_key(press(TermKey::Down)), Some(SinkEvent::Key(KeyCode::Down)));
        assert_eq!(map_key(press(TermKey::BackTab)), Some(SinkEvent::Key(KeyCode::Tab)));
        assert_eq!(map_key(press(TermKey::F(1))), None);
        assert_eq!(
            map_key(KeyEvent::new(TermKey::Char('c'), KeyModifiers::CONTROL)),
            Some(SinkEvent::Quit)
        );
    }
}
