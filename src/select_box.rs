use std::io::Write;

use crate::display::MenuItem;
use crate::input::SearchInput;
use crate::terminal::Terminal;

use ratatui::prelude::*;
use ratatui::widgets::*;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};

const TITLE: &str = " PuTTY Sessions  (arrows / / = search / Enter = connect / Esc = quit)";
const INFO_TEXT_NORMAL_MODE: &str = "(Esc) quit | (↑) move up | (↓) move down | (Enter) connect | (/) search";
const INFO_TEXT_SEARCH_MODE: &str = "(Esc) quit search | (↑) move up | (↓) move down | (Enter) connect";
const SEARCH_SYMBOL: &str = "🔍 ";
const CURSOR: &str = "➜ ";

/// Interactive choice among menu items.
pub trait Menu {
    /// Shows `items` and returns the index of the chosen one, or `None` when cancelled.
    fn show(&mut self, items: &[MenuItem]) -> anyhow::Result<Option<usize>>;
}

/// Full-screen session picker with fuzzy search.
#[derive(Debug, Default)]
pub struct SelectBox;

impl SelectBox {
    pub fn new() -> Self {
        Self
    }
}

impl Menu for SelectBox {
    fn show(&mut self, items: &[MenuItem]) -> anyhow::Result<Option<usize>> {
        let mut terminal = Terminal::new()?;
        let mut menu = MenuState::new(items);
        let selected = menu.run(&mut terminal)?;
        terminal.clear()?;
        Ok(selected)
    }
}

enum Mode {
    Normal,
    Search,
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Continue,
    Select(usize),
    Cancel,
}

/// An item currently on screen, with the label positions matched by the search.
struct VisibleRow {
    index: usize,
    matched: Vec<usize>,
}

struct MenuState<'a> {
    items: &'a [MenuItem],
    rows: Vec<VisibleRow>,
    state: TableState,
    search: SearchInput,
    mode: Mode,
}

impl<'a> MenuState<'a> {
    fn new(items: &'a [MenuItem]) -> Self {
        let mut menu = Self {
            items,
            rows: Vec::new(),
            state: TableState::default(),
            search: SearchInput::new(SEARCH_SYMBOL),
            mode: Mode::Normal,
        };
        menu.refresh();
        menu
    }

    fn run(&mut self, terminal: &mut Terminal<impl Write>) -> anyhow::Result<Option<usize>> {
        loop {
            terminal.draw(|frame| self.ui(frame))?;
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match self.handle_key(key) {
                    Action::Continue => {}
                    Action::Select(index) => return Ok(Some(index)),
                    Action::Cancel => return Ok(None),
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Down => self.step(true),
            KeyCode::Up => self.step(false),
            KeyCode::Enter => {
                if let Some(index) = self.selected() {
                    return Action::Select(index);
                }
            }
            KeyCode::Esc => match self.mode {
                Mode::Normal => return Action::Cancel,
                Mode::Search => {
                    self.search.clear();
                    self.mode = Mode::Normal;
                    self.refresh();
                }
            },
            KeyCode::Char('/') if matches!(self.mode, Mode::Normal) => {
                self.search.clear();
                self.mode = Mode::Search;
            }
            _ => {
                if matches!(self.mode, Mode::Search) && self.search.handle(Event::Key(key)) {
                    self.refresh();
                }
            }
        }
        Action::Continue
    }

    /// Recomputes visible rows from the query and selects the first selectable one.
    fn refresh(&mut self) {
        let query = self.search.query();
        self.rows = if query.is_empty() {
            (0..self.items.len())
                .map(|index| VisibleRow {
                    index,
                    matched: Vec::new(),
                })
                .collect()
        } else {
            let matcher = SkimMatcherV2::default();
            self.items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.is_selectable())
                .filter_map(|(index, item)| {
                    matcher
                        .fuzzy_indices(item.label(), query)
                        .map(|(_, matched)| VisibleRow { index, matched })
                })
                .collect()
        };

        let first = self
            .rows
            .iter()
            .position(|row| self.items[row.index].is_selectable());
        self.state.select(first);
    }

    fn is_selectable_row(&self, position: usize) -> bool {
        self.rows
            .get(position)
            .map_or(false, |row| self.items[row.index].is_selectable())
    }

    /// Moves the cursor to the next (or previous) selectable row, wrapping around.
    fn step(&mut self, forward: bool) {
        let len = self.rows.len();
        if len == 0 {
            return;
        }
        let start = self.state.selected().unwrap_or(if forward { len - 1 } else { 0 });

        let next = (1..=len)
            .map(|offset| {
                if forward {
                    (start + offset) % len
                } else {
                    (start + len - offset % len) % len
                }
            })
            .find(|&position| self.is_selectable_row(position));
        if next.is_some() {
            self.state.select(next);
        }
    }

    /// Index into the items of the highlighted row, if it can be chosen.
    fn selected(&self) -> Option<usize> {
        self.state
            .selected()
            .filter(|&position| self.is_selectable_row(position))
            .map(|position| self.rows[position].index)
    }

    fn ui(&mut self, f: &mut Frame) {
        let items = self.items;
        let rows: Vec<Row> = self
            .rows
            .iter()
            .map(|row| {
                match &items[row.index] {
                    MenuItem::Header(label) => Row::new([Cell::from(label.as_str())])
                        .style(Style::default().add_modifier(Modifier::DIM)),
                    MenuItem::Selectable { label, .. } => Row::new([Cell::from(Line::from(
                        Self::get_highlight_spans(label, &row.matched),
                    ))]),
                }
            })
            .collect();

        let table = Table::new(rows, [Constraint::Percentage(100)])
            .header(
                Row::new([Cell::from("Please select a session:")])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .highlight_style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD | Modifier::REVERSED),
            )
            .highlight_symbol(CURSOR)
            .highlight_spacing(HighlightSpacing::Always);

        let (info_text, search_height) = match self.mode {
            Mode::Normal => (INFO_TEXT_NORMAL_MODE, 0),
            Mode::Search => (INFO_TEXT_SEARCH_MODE, 3),
        };
        let info = Paragraph::new(Line::from(info_text)).alignment(Alignment::Center);
        let title = Paragraph::new(Line::from(TITLE))
            .block(Block::default().borders(Borders::TOP | Borders::BOTTOM));

        let recs = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(search_height),
            Constraint::Length(1),
        ])
        .split(f.size());

        f.render_widget(title, recs[0]);
        f.render_stateful_widget(table, recs[1], &mut self.state);
        f.render_widget(info, recs[3]);

        if matches!(self.mode, Mode::Search) {
            let input = Paragraph::new(
                Text::from(self.search.line()).style(Style::default().fg(Color::Cyan)),
            )
            .block(Block::default().borders(Borders::ALL));
            f.render_widget(input, recs[2]);
            f.set_cursor(
                recs[2].x + 1 + self.search.cursor_column() as u16,
                recs[2].y + 1,
            );
        }
    }

    fn get_highlight_spans<'b>(input: &str, indices: &[usize]) -> Vec<Span<'b>> {
        let mut spans = Vec::new();
        let mut current_segment = String::new();

        let highlight_style = Style::default()
            .fg(Color::Rgb(250, 0, 0))
            .bg(Color::Rgb(0xFF, 0xFC, 0x67))
            .add_modifier(Modifier::BOLD);
        for (i, c) in input.chars().enumerate() {
            if indices.contains(&i) {
                if !current_segment.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_segment)));
                }
                spans.push(Span::styled(c.to_string(), highlight_style));
            } else {
                current_segment.push(c);
            }
        }

        if !current_segment.is_empty() {
            spans.push(Span::raw(current_segment));
        }

        spans
    }
}
