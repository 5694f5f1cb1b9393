//! File stack and pending token queue.
//!
//! The lexer flattens a stack of open files, topmost being the currently
//! active include, into one queue of leveled tokens. Tokens are classified
//! lazily, at the moment they are pulled, so that a token pushed back by the
//! parser is re-classified in whatever grammar context pulls it next.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::reader::SourceFile;
use crate::session::Session;
use crate::token::Token;

#[derive(Debug, Default)]
pub struct Lexer {
    files: Vec<SourceFile>,
    queue: VecDeque<Token>,
}

impl Lexer {
    pub fn new() -> Lexer {
        Lexer::default()
    }

    /// Push a file onto the open-file stack. Relative paths resolve against
    /// the including file's directory; opening a file that is already open
    /// somewhere on the stack is an inclusion cycle.
    pub fn include_file(
        &mut self,
        path: &str,
        level: i32,
        includer: Option<&Path>,
    ) -> Result<()> {
        let mut resolved = PathBuf::from(path);
        if resolved.is_relative() {
            if let Some(dir) = includer.and_then(|p| p.parent()) {
                resolved = dir.join(resolved);
            }
        }
        if let Ok(canonical) = std::fs::canonicalize(&resolved) {
            resolved = canonical;
        }

        if self.files.iter().any(|f| f.path() == resolved) {
            return Err(Error::Cycle {
                path: resolved,
                includer: includer.map(|p| p.to_path_buf()),
            });
        }

        debug!("reading {} at level {}", resolved.display(), level);
        self.files.push(SourceFile::open(resolved, level)?);
        Ok(())
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Path of the currently active file.
    pub fn active_path(&self) -> Option<PathBuf> {
        self.files.last().map(|f| f.path().to_path_buf())
    }

    /// Next raw token of the currently active file, `None` once exhausted.
    pub fn next_file_token(&mut self) -> Result<Option<Token>> {
        match self.files.last_mut() {
            Some(file) => file.next_token(),
            None => Ok(None),
        }
    }

    /// Drop the exhausted active file; reading resumes with the one beneath.
    pub fn pop_file(&mut self) {
        self.files.pop();
    }

    /// Return one raw token to the active file's read position.
    pub fn pushback_to_file(&mut self, tkn: Token) {
        if let Some(file) = self.files.last_mut() {
            file.pushback(tkn);
        }
    }

    /// Append a token to the pending queue.
    pub fn enqueue(&mut self, tkn: Token) {
        self.queue.push_back(tkn);
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pull the next pending token unconditionally, classified.
    pub fn pull_token(&mut self, session: &Session) -> Option<Token> {
        let mut tkn = self.queue.pop_front()?;
        session.classify(&mut tkn);
        Some(tkn)
    }

    /// Pull up to `limit` tokens belonging to a block at `level`: tokens
    /// whose level is strictly greater than `level`, or negative
    /// (continuation). Each pulled token is classified.
    pub fn pull_tokens(
        &mut self,
        session: &Session,
        level: i32,
        limit: Option<usize>,
    ) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut remaining = limit;
        loop {
            if remaining == Some(0) {
                break;
            }
            let Some(front) = self.queue.front() else { break };
            if !(front.level > level || front.level < 0) {
                break;
            }
            if let Some(n) = &mut remaining {
                *n -= 1;
            }
            let mut tkn = match self.queue.pop_front() {
                Some(tkn) => tkn,
                None => break,
            };
            session.classify(&mut tkn);
            tokens.push(tkn);
        }
        tokens
    }

    /// Put tokens back at the front of the queue, clearing their kinds so
    /// they are re-classified on the next pull.
    pub fn pushback_tokens(&mut self, tokens: Vec<Token>) {
        for mut tkn in tokens.into_iter().rev() {
            tkn.kind = None;
            self.queue.push_front(tkn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::UnitCatalog;
    use crate::token::{Location, CONTINUATION};

    fn session() -> Session {
        let mut session = Session::new("gateway", UnitCatalog::new()).unwrap();
        let root = session.root_def();
        session.push_context(root);
        session
    }

    fn queued(lexer: &mut Lexer, entries: &[(&str, i32)]) {
        for (text, level) in entries {
            lexer.enqueue(Token::new(*text, Location::builtin(), *level));
        }
    }

    #[test]
    fn test_pull_tokens_stops_at_block_boundary() {
        let session = session();
        let mut lexer = Lexer::new();
        queued(
            &mut lexer,
            &[
                ("inner", 2),
                ("rest", CONTINUATION),
                ("sibling", 0),
            ],
        );
        let block = lexer.pull_tokens(&session, 0, None);
        let texts: Vec<&str> = block.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["inner", "rest"]);
        assert_eq!(lexer.pull_token(&session).unwrap().text, "sibling");
    }

    #[test]
    fn test_pull_tokens_takes_continuations_below_boundary() {
        // level < 0 belongs to the block even when the boundary is high
        let session = session();
        let mut lexer = Lexer::new();
        queued(&mut lexer, &[("a", CONTINUATION), ("b", 9), ("c", 3)]);
        let block = lexer.pull_tokens(&session, 5, None);
        let texts: Vec<&str> = block.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_pull_tokens_respects_limit() {
        let session = session();
        let mut lexer = Lexer::new();
        queued(&mut lexer, &[("a", 1), ("b", CONTINUATION), ("c", 1)]);
        let block = lexer.pull_tokens(&session, 0, Some(2));
        assert_eq!(block.len(), 2);
        assert!(!lexer.queue_is_empty());
    }

    #[test]
    fn test_pulled_tokens_are_classified() {
        let session = session();
        let mut lexer = Lexer::new();
        queued(&mut lexer, &[("42", 0)]);
        let tkn = lexer.pull_token(&session).unwrap();
        assert_eq!(tkn.kind, session.kind_id("int"));
    }

    #[test]
    fn test_pushback_clears_classification() {
        let session = session();
        let mut lexer = Lexer::new();
        queued(&mut lexer, &[("42", 0), ("later", CONTINUATION)]);
        let tkn = lexer.pull_token(&session).unwrap();
        assert!(tkn.kind.is_some());
        lexer.pushback_tokens(vec![tkn]);
        // order preserved: pushed-back token comes out before `later`
        let again = lexer.pull_token(&session).unwrap();
        assert_eq!(again.text, "42");
    }

    #[test]
    fn test_pushback_preserves_order() {
        let session = session();
        let mut lexer = Lexer::new();
        let a = Token::new("a", Location::builtin(), 0);
        let b = Token::new("b", Location::builtin(), CONTINUATION);
        lexer.pushback_tokens(vec![a, b]);
        assert_eq!(lexer.pull_token(&session).unwrap().text, "a");
        assert_eq!(lexer.pull_token(&session).unwrap().text, "b");
    }

    #[test]
    fn test_include_cycle_detected() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("gencfg-lexer-cycle-{}.cfg", std::process::id()));
        std::fs::write(&path, "x\n").unwrap();
        let mut lexer = Lexer::new();
        let path_str = path.to_string_lossy().to_string();
        lexer.include_file(&path_str, 0, None).unwrap();
        let err = lexer.include_file(&path_str, 0, Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }
}
