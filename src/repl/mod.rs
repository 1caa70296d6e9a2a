//! Interactive line loop
//!
//! Reads commands with reedline, runs them through the [`Executor`] on one
//! session and prints the rendered text. The prompt follows database
//! changes reported by the executor.

mod prompt;

pub use prompt::ShellPrompt;

use reedline::{FileBackedHistory, Reedline, Signal};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{Result, ShellError};
use crate::executor::{CommandRequest, Executor};
use crate::pool::BackendKind;

/// Number of history entries kept on disk
const HISTORY_CAPACITY: usize = 1000;

/// Words that end the loop
const EXIT_COMMANDS: &[&str] = &["exit", "quit", ".exit"];

/// Line editor plus the session the loop runs in
pub struct ReplEngine {
    editor: Reedline,
    prompt: ShellPrompt,
    backend: BackendKind,
    connection_id: String,
    session_id: String,
}

impl ReplEngine {
    /// Create a line loop for one connection and session
    ///
    /// # Arguments
    /// * `backend` - Dialect of the connection
    /// * `connection_id` - Profile id passed to the executor
    /// * `session_id` - Session owning the pooled connection
    /// * `database` - Database shown in the prompt at start
    pub fn new(
        backend: BackendKind,
        connection_id: impl Into<String>,
        session_id: impl Into<String>,
        database: Option<String>,
    ) -> Self {
        let connection_id = connection_id.into();
        let mut editor = Reedline::create();

        if let Some(path) = history_path() {
            match FileBackedHistory::with_file(HISTORY_CAPACITY, path) {
                Ok(history) => editor = editor.with_history(Box::new(history)),
                Err(e) => warn!("Command history disabled: {}", e),
            }
        }

        Self {
            editor,
            prompt: ShellPrompt::new(connection_id.clone(), database),
            backend,
            connection_id,
            session_id: session_id.into(),
        }
    }

    /// Read one line
    ///
    /// # Returns
    /// * `Result<Option<String>>` - Input line, empty on Ctrl-C, `None` on Ctrl-D
    pub fn read_line(&mut self) -> Result<Option<String>> {
        match self.editor.read_line(&self.prompt) {
            Ok(Signal::Success(line)) => Ok(Some(line)),
            Ok(Signal::CtrlC) => Ok(Some(String::new())),
            Ok(Signal::CtrlD) => Ok(None),
            Err(e) => Err(ShellError::Generic(format!("Read error: {e}"))),
        }
    }

    /// Run until Ctrl-D or an exit command
    pub async fn run(&mut self, executor: &Executor) -> Result<()> {
        while let Some(line) = self.read_line()? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if EXIT_COMMANDS.contains(&line) {
                break;
            }

            let request = CommandRequest::new(
                self.backend,
                self.connection_id.clone(),
                self.session_id.clone(),
                line,
            );
            match executor.execute(&request).await {
                Ok(outcome) => {
                    println!("{}", outcome.rendered_text);
                    if let Some(db) = outcome.changed_database {
                        debug!("Prompt database is now '{}'", db);
                        self.prompt.set_database(db);
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
        Ok(())
    }
}

/// `~/.dbshell/history`
fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".dbshell").join("history"))
}
