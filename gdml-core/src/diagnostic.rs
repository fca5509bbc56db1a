//! Diagnostics and the checkpointed diagnostic log.
//!
//! The log records every message in order. Speculative parsing opens a
//! checkpoint with [`DiagnosticLog::push_log_level`]; if the attempt is
//! abandoned, [`DiagnosticLog::pop_messages`] truncates the log back to the
//! length it had when the checkpoint was opened. Checkpoints nest strictly.

use std::fmt;

use crate::error::CheckError;
use crate::span::{Span, Src};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub hint: Option<String>,
    pub note: Option<String>,
    pub span: Option<Span>,
    pub code: Option<&'static str>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            level,
            message: message.into(),
            hint: None,
            note: None,
            span,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Error, message, Some(span))
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Warning, message, Some(span))
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message, None)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    /// Render as `name:line:col: level[code]: message` followed by any
    /// hint and note lines.
    pub fn render(&self, src: &Src) -> String {
        let mut out = String::new();
        out.push_str(src.name());
        if let Some(span) = self.span {
            out.push(':');
            out.push_str(&src.position(span.start).to_string());
        }
        out.push_str(&format!(": {}", self.level));
        if let Some(code) = self.code {
            out.push_str(&format!("[{code}]"));
        }
        out.push_str(&format!(": {}", self.message));
        if let Some(hint) = &self.hint {
            out.push_str(&format!("\n  hint: {hint}"));
        }
        if let Some(note) = &self.note {
            out.push_str(&format!("\n  note: {note}"));
        }
        out
    }
}

/// Token returned by [`DiagnosticLog::push_log_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogLevel(usize);

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    level: LogLevel,
    len: usize,
}

#[derive(Debug, Default)]
pub struct DiagnosticLog {
    messages: Vec<(LogLevel, Diagnostic)>,
    checkpoints: Vec<Checkpoint>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level new messages are recorded at: the number of open checkpoints.
    pub fn current_level(&self) -> LogLevel {
        LogLevel(self.checkpoints.len())
    }

    pub fn log(&mut self, diagnostic: Diagnostic) {
        let level = self.current_level();
        self.messages.push((level, diagnostic));
    }

    /// Open a checkpoint. Tokens increase with nesting depth.
    pub fn push_log_level(&mut self) -> LogLevel {
        let level = LogLevel(self.checkpoints.len() + 1);
        self.checkpoints.push(Checkpoint {
            level,
            len: self.messages.len(),
        });
        level
    }

    /// Retire the most recent checkpoint, keeping its messages.
    pub fn pop_log_level(&mut self) -> Result<(), CheckError> {
        self.checkpoints
            .pop()
            .map(|_| ())
            .ok_or_else(|| CheckError::Internal("no open diagnostic checkpoint to retire".into()))
    }

    /// Discard every message recorded since `level` was opened.
    ///
    /// `level` must still be open; checkpoints opened after it are
    /// rolled back as well.
    pub fn pop_messages(&mut self, level: LogLevel) -> Result<(), CheckError> {
        let checkpoint = self
            .checkpoints
            .iter()
            .find(|c| c.level == level)
            .copied()
            .ok_or_else(|| {
                CheckError::Internal(format!("diagnostic checkpoint {} is not open", level.0))
            })?;
        self.messages.truncate(checkpoint.len);
        self.checkpoints.retain(|c| c.level <= level);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().map(|(_, msg)| msg)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages().filter(|msg| msg.level == Level::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages().filter(|msg| msg.level == Level::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn open_checkpoints(&self) -> usize {
        self.checkpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(text: &str) -> Diagnostic {
        Diagnostic::error(text, Span::new(0, 1))
    }

    #[test]
    fn rollback_restores_count() {
        let mut log = DiagnosticLog::new();
        log.log(err("before"));
        let level = log.push_log_level();
        log.log(err("a"));
        log.log(err("b"));
        log.log(err("c"));
        assert_eq!(log.len(), 4);
        log.pop_messages(level).unwrap();
        log.pop_log_level().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.open_checkpoints(), 0);
    }

    #[test]
    fn retired_checkpoints_keep_messages() {
        let mut log = DiagnosticLog::new();
        log.push_log_level();
        log.log(err("kept"));
        log.pop_log_level().unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn tokens_increase_with_nesting() {
        let mut log = DiagnosticLog::new();
        let outer = log.push_log_level();
        let inner = log.push_log_level();
        assert!(inner > outer);
        log.log(err("inner"));
        log.pop_messages(inner).unwrap();
        log.pop_log_level().unwrap();
        log.log(err("outer"));
        log.pop_messages(outer).unwrap();
        log.pop_log_level().unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn rolling_back_outer_discards_inner() {
        let mut log = DiagnosticLog::new();
        let outer = log.push_log_level();
        log.log(err("a"));
        log.push_log_level();
        log.log(err("b"));
        log.pop_messages(outer).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.open_checkpoints(), 1);
    }

    #[test]
    fn retiring_without_checkpoint_is_internal_error() {
        let mut log = DiagnosticLog::new();
        assert!(matches!(log.pop_log_level(), Err(CheckError::Internal(_))));
    }

    #[test]
    fn renders_with_position_and_code() {
        let src = Src::new("main.gdml", "let x = y\n");
        let diag = Diagnostic::error("identifier \"y\" is undefined", Span::new(8, 9))
            .with_code("E0201")
            .with_hint("declare `y` before using it");
        assert_eq!(
            diag.render(&src),
            "main.gdml:1:9: error[E0201]: identifier \"y\" is undefined\n  hint: declare `y` before using it"
        );
    }
}
