use crate::client::{
    AppSnapshot,
    SlotView,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use unicode_width::{
    UnicodeWidthChar,
    UnicodeWidthStr,
};
use word_chain::{
    SLOT_COUNT,
    StatusLevel,
    Tribe,
    validation::{
        MAX_NAME_LEN,
        MAX_WORD_LEN,
        check_word,
        validate_registration,
    },
};

pub type InputEventReceiver = EventStream;

/// Slots per row when moving the cursor up and down.
const GRID_COLUMNS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Reload,
    /// The user asked to edit the slot under the cursor.
    RequestContribute(usize),
    OpenRegistration,
    DisconnectWallet,
    ConfirmContribution {
        index: usize,
        word: String,
    },
    ConfirmRegistration {
        name: String,
        tribe: Tribe,
    },
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    cursor: usize,
    editable: Vec<bool>,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    Contribute(ContributeState),
    Register(RegisterState),
    QuitModal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ContributeState {
    index: usize,
    input: String,
    error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct RegisterState {
    name: String,
    tribe: Option<Tribe>,
    error: Option<String>,
}

impl UiState {
    pub fn open_contribute(&mut self, index: usize) {
        self.mode = Mode::Contribute(ContributeState {
            index,
            input: String::new(),
            error: None,
        });
    }

    pub fn open_registration(&mut self) {
        self.mode = Mode::Register(RegisterState::default());
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // one persistent Terminal keeps buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.editable = snap.slots.iter().map(SlotView::is_editable).collect();
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

/// Applies a key press to the UI state and returns what the run loop
/// should do about it, if anything.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }

    match &mut state.mode {
        Mode::Contribute(cs) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => match check_word(cs.input.trim()) {
                    Ok(()) => {
                        let event = UserEvent::ConfirmContribution {
                            index: cs.index,
                            word: cs.input.trim().to_string(),
                        };
                        state.mode = Mode::Normal;
                        Some(event)
                    }
                    Err(invalid) => {
                        cs.error = Some(invalid.to_string());
                        Some(UserEvent::Redraw)
                    }
                },
                KeyCode::Backspace => {
                    cs.input.pop();
                    cs.error = None;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) if !c.is_control() => {
                    if cs.input.chars().count() < MAX_WORD_LEN + 8 {
                        cs.input.push(c);
                    }
                    cs.error = None;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Register(rs) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => match validate_registration(rs.name.trim(), rs.tribe) {
                    Ok(tribe) => {
                        let event = UserEvent::ConfirmRegistration {
                            name: rs.name.trim().to_string(),
                            tribe,
                        };
                        state.mode = Mode::Normal;
                        Some(event)
                    }
                    Err(invalid) => {
                        rs.error = Some(invalid.to_string());
                        Some(UserEvent::Redraw)
                    }
                },
                KeyCode::Tab | KeyCode::Right => {
                    rs.tribe = Some(next_tribe(rs.tribe));
                    Some(UserEvent::Redraw)
                }
                KeyCode::BackTab | KeyCode::Left => {
                    rs.tribe = Some(prev_tribe(rs.tribe));
                    Some(UserEvent::Redraw)
                }
                KeyCode::Backspace => {
                    rs.name.pop();
                    rs.error = None;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) if !c.is_control() => {
                    if rs.name.chars().count() < MAX_NAME_LEN + 8 {
                        rs.name.push(c);
                    }
                    rs.error = None;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::QuitModal => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Right | KeyCode::Char('l') => move_cursor(state, 1),
        KeyCode::Left | KeyCode::Char('h') => move_cursor(state, -1),
        KeyCode::Down | KeyCode::Char('j') => move_cursor(state, GRID_COLUMNS as isize),
        KeyCode::Up | KeyCode::Char('k') => move_cursor(state, -(GRID_COLUMNS as isize)),
        KeyCode::Enter | KeyCode::Char('e') => {
            let editable = state.editable.get(state.cursor).copied().unwrap_or(true);
            editable.then_some(UserEvent::RequestContribute(state.cursor))
        }
        KeyCode::Char('g') => Some(UserEvent::OpenRegistration),
        KeyCode::Char('r') => Some(UserEvent::Reload),
        KeyCode::Char('d') => Some(UserEvent::DisconnectWallet),
        _ => None,
    }
}

fn move_cursor(state: &mut UiState, delta: isize) -> Option<UserEvent> {
    let target = state.cursor as isize + delta;
    if (0..SLOT_COUNT as isize).contains(&target) {
        state.cursor = target as usize;
        Some(UserEvent::Redraw)
    } else {
        None
    }
}

fn next_tribe(current: Option<Tribe>) -> Tribe {
    match current {
        None => Tribe::ALL[0],
        Some(tribe) => Tribe::ALL[(tribe.id() as usize + 1) % Tribe::ALL.len()],
    }
}

fn prev_tribe(current: Option<Tribe>) -> Tribe {
    let len = Tribe::ALL.len();
    match current {
        None => Tribe::ALL[len - 1],
        Some(tribe) => Tribe::ALL[(tribe.id() as usize + len - 1) % len],
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // wallet
            Constraint::Min(10),   // words
            Constraint::Length(3), // selected slot
            Constraint::Length(3), // status
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], snap);
    draw_words(f, chunks[1], state, snap);
    draw_selection(f, chunks[2], state, snap);
    draw_status(f, chunks[3], snap);
    draw_help(f, chunks[4]);
    draw_modals(f, state, snap);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut spans = vec![Span::raw(format!("Wallet: {}", snap.wallet_label))];
    if let Some(tribe) = snap.wallet_tribe {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(tribe.kanji(), tribe_style(tribe)));
    }
    spans.push(Span::raw(format!(" | Network: {}", snap.network)));
    if snap.queued_updates > 0 {
        spans.push(Span::raw(format!(" | Queued updates: {}", snap.queued_updates)));
    }
    let widget = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Word Chain"));
    f.render_widget(widget, area);
}

fn draw_words(f: &mut Frame, area: Rect, state: &UiState, snap: &AppSnapshot) {
    let block = Block::default().borders(Borders::ALL).title("Words");
    if snap.loading && snap.slots.iter().all(|slot| !slot.loaded) {
        let p = Paragraph::new("Loading words...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let mut spans = Vec::with_capacity(snap.slots.len() * 2);
    for slot in &snap.slots {
        let mut style = if !slot.loaded {
            Style::default().fg(Color::DarkGray)
        } else if slot.pending {
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC)
        } else {
            tribe_style(slot.tribe)
        };
        if slot.index == state.cursor {
            style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
        }
        let text = if slot.loaded {
            slot.word.clone()
        } else {
            String::from("...")
        };
        spans.push(Span::styled(text, style));
        spans.push(Span::raw(" "));
    }
    let p = Paragraph::new(Line::from(spans))
        .wrap(Wrap { trim: false })
        .block(block);
    f.render_widget(p, area);
}

fn draw_selection(f: &mut Frame, area: Rect, state: &UiState, snap: &AppSnapshot) {
    let text = match snap.slots.get(state.cursor) {
        Some(slot) if slot.loaded => {
            let marker = if slot.pending {
                String::from(" (pending)")
            } else {
                format!(" {}", slot.tribe.kanji())
            };
            format!("#{}, by {}{}", slot.index, slot.author, marker)
        }
        _ => format!("#{}", state.cursor),
    };
    let width = area.width.saturating_sub(2) as usize;
    let p = Paragraph::new(truncate_to_width(&text, width))
        .block(Block::default().borders(Borders::ALL).title("Selected"));
    f.render_widget(p, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (text, color) = match &snap.status {
        Some((text, level)) => (text.as_str(), level_color(*level)),
        None if snap.loading => ("Loading...", Color::DarkGray),
        None => ("Ready", Color::Green),
    };
    let p = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        "←/→/↑/↓ move | Enter/e contribute | g register | d disconnect | r reload | q/Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    match &state.mode {
        Mode::Contribute(cs) => {
            let area = centered_rect(50, 30, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("Contribute to #{}", cs.index));
            let current = snap
                .slots
                .get(cs.index)
                .map(|slot| format!("#{}, by {}", slot.index, slot.author))
                .unwrap_or_default();
            let mut lines = vec![
                Line::from(current),
                Line::from(format!("Word: {}_", cs.input)),
            ];
            if let Some(error) = &cs.error {
                lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
            }
            lines.push(Line::from("Enter=submit Esc=cancel"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
            let inner = block.inner(area);
            let cursor_x = inner.x + ("Word: ".width() + cs.input.width()) as u16;
            f.set_cursor_position(Position::new(
                cursor_x.min(inner.right().saturating_sub(1)),
                inner.y + 1,
            ));
        }
        Mode::Register(rs) => {
            let area = centered_rect(50, 35, f.area());
            let block = Block::default().borders(Borders::ALL).title("Register");
            let mut tribe_spans = vec![Span::raw("Tribe: ")];
            for tribe in Tribe::ALL {
                let mut style = tribe_style(tribe);
                if rs.tribe == Some(tribe) {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                tribe_spans.push(Span::styled(format!(" {} ", tribe.kanji()), style));
            }
            let mut lines = vec![
                Line::from(format!("Name: {}_", rs.name)),
                Line::from(tribe_spans),
            ];
            if let Some(error) = &rs.error {
                lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
            }
            lines.push(Line::from("Tab/←/→ tribe Enter=register Esc=cancel"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn tribe_style(tribe: Tribe) -> Style {
    let color = match tribe {
        Tribe::Yellow => Color::Yellow,
        Tribe::Red => Color::Red,
        Tribe::Green => Color::Green,
        Tribe::Blue => Color::Blue,
    };
    Style::default().fg(color)
}

fn level_color(level: StatusLevel) -> Color {
    match level {
        StatusLevel::Info => Color::Cyan,
        StatusLevel::Success => Color::Green,
        StatusLevel::Warning => Color::Yellow,
        StatusLevel::Error => Color::Red,
    }
}

/// Cuts `text` to at most `width` terminal columns, ending in `…` when cut.
fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
