use tui_input::{Input, InputRequest};

use crate::data_access::TableRow;
use crate::keys::Key;

const PAGE_STEP: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectList {
    items: Vec<String>,
    selected: usize,
}

impl SelectList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&mut self, items: Vec<String>) {
        self.items = items;
        self.selected = self.selected.min(self.items.len().saturating_sub(1));
    }

    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }

    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.selected)
    }

    #[must_use]
    pub fn selected_item(&self) -> Option<&str> {
        self.items.get(self.selected).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn handle_key(&mut self, key: Key) -> bool {
        let Some(last) = self.items.len().checked_sub(1) else {
            return false;
        };
        self.selected = match key {
            Key::Up | Key::Char('k') => self.selected.saturating_sub(1),
            Key::Down | Key::Char('j') => (self.selected + 1).min(last),
            Key::Home => 0,
            Key::End => last,
            Key::PageUp => self.selected.saturating_sub(PAGE_STEP),
            Key::PageDown => (self.selected + PAGE_STEP).min(last),
            _ => return false,
        };
        true
    }
}

#[derive(Debug, Clone)]
pub struct TextInput {
    input: Input,
    focused: bool,
    masked: bool,
    prompt: String,
    placeholder: String,
    char_limit: Option<usize>,
}

impl PartialEq for TextInput {
    fn eq(&self, other: &Self) -> bool {
        self.input.value() == other.input.value()
            && self.input.cursor() == other.input.cursor()
            && self.focused == other.focused
            && self.masked == other.masked
            && self.prompt == other.prompt
            && self.placeholder == other.placeholder
            && self.char_limit == other.char_limit
    }
}

impl Eq for TextInput {}

impl TextInput {
    #[must_use]
    pub fn new(prompt: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            focused: false,
            masked: false,
            prompt: prompt.into(),
            placeholder: placeholder.into(),
            char_limit: None,
        }
    }

    #[must_use]
    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }

    #[must_use]
    pub fn with_char_limit(mut self, limit: usize) -> Self {
        self.char_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn value(&self) -> &str {
        self.input.value()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.input.cursor()
    }

    /// Terminal column of the cursor relative to the start of the value.
    #[must_use]
    pub fn visual_cursor(&self) -> usize {
        if self.masked {
            self.input.cursor()
        } else {
            self.input.visual_cursor()
        }
    }

    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.masked
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    #[must_use]
    pub fn display_value(&self) -> String {
        if self.masked {
            "*".repeat(self.input.value().chars().count())
        } else {
            self.input.value().to_string()
        }
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn reset(&mut self) {
        self.input.reset();
    }

    pub fn handle_key(&mut self, key: Key) -> bool {
        if !self.focused {
            return false;
        }
        let request = match key {
            Key::Char(ch) => {
                if self.is_full() {
                    return true;
                }
                InputRequest::InsertChar(ch)
            }
            Key::Backspace => InputRequest::DeletePrevChar,
            Key::Delete => InputRequest::DeleteNextChar,
            Key::Left => InputRequest::GoToPrevChar,
            Key::Right => InputRequest::GoToNextChar,
            Key::Home => InputRequest::GoToStart,
            Key::End => InputRequest::GoToEnd,
            _ => return false,
        };
        self.input.handle(request);
        true
    }

    fn is_full(&self) -> bool {
        self.char_limit
            .is_some_and(|limit| self.input.value().chars().count() >= limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataGrid {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    selected: usize,
}

impl DataGrid {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, columns: Vec<String>, rows: &[TableRow]) {
        self.rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| row.get(column).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        self.columns = columns;
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        (!self.rows.is_empty()).then_some(self.selected)
    }

    pub fn handle_key(&mut self, key: Key) -> bool {
        let Some(last) = self.rows.len().checked_sub(1) else {
            return false;
        };
        self.selected = match key {
            Key::Up | Key::Char('k') => self.selected.saturating_sub(1),
            Key::Down | Key::Char('j') => (self.selected + 1).min(last),
            Key::Home => 0,
            Key::End => last,
            Key::PageUp => self.selected.saturating_sub(PAGE_STEP),
            Key::PageDown => (self.selected + PAGE_STEP).min(last),
            _ => return false,
        };
        true
    }
}
