use crossterm::event::Event;
use unicode_width::UnicodeWidthStr;

use tui_input::{backend::crossterm::EventHandler, Input};

/// Search line of the session menu: a fixed prompt followed by the typed query.
pub(crate) struct SearchInput {
    input: Input,
    prompt: String,
}

impl SearchInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            prompt: prompt.into(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.input.reset();
    }

    pub(crate) fn query(&self) -> &str {
        self.input.value()
    }

    /// Prompt and query as rendered.
    pub(crate) fn line(&self) -> String {
        format!("{}{}", self.prompt, self.input.value())
    }

    /// Cursor column relative to the start of the prompt.
    pub(crate) fn cursor_column(&self) -> usize {
        UnicodeWidthStr::width(self.prompt.as_str()) + self.input.visual_cursor()
    }

    /// Feeds a key event to the query, returning whether the query changed.
    pub(crate) fn handle(&mut self, event: Event) -> bool {
        self.input
            .handle_event(&event)
            .map_or(false, |change| change.value)
    }
}
