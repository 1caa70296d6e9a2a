//! Session prompt for the interactive loop

use reedline::{Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus};
use std::borrow::Cow;

/// Prompt showing the connection and its current database
///
/// Database names render as `conn/db> `; Redis labels such as `[db3]` are
/// appended directly (`conn[db3]> `), the way `redis-cli` shows them.
#[derive(Debug, Clone)]
pub struct ShellPrompt {
    connection: String,
    database: Option<String>,
}

impl ShellPrompt {
    pub fn new(connection: impl Into<String>, database: Option<String>) -> Self {
        Self {
            connection: connection.into(),
            database,
        }
    }

    /// Track a database change reported by the executor
    pub fn set_database(&mut self, database: impl Into<String>) {
        self.database = Some(database.into());
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl Prompt for ShellPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        match &self.database {
            Some(db) if db.starts_with('[') => format!("{}{}> ", self.connection, db).into(),
            Some(db) => format!("{}/{}> ", self.connection, db).into(),
            None => format!("{}> ", self.connection).into(),
        }
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        "".into()
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
        "".into()
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        "... ".into()
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };

        format!("({}reverse-search: {}) ", prefix, history_search.term).into()
    }
}
