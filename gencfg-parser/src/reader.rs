//! Source reader: one input file to a stream of leveled lexemes.
//!
//! The reader is closer to a tokenizer than to a full lexical analyser. Per
//! physical line it:
//!
//! 1. computes the indentation level (space = 1, tab = 8, on top of the
//!    file's base level),
//! 2. drops the line entirely if it is blank or starts with `#`,
//! 3. splits the remainder on whitespace runs, with `,` always emitted as a
//!    lexeme of its own even when glued to its neighbors.
//!
//! The intra-line split runs a vanilla logos lexer over the stripped line
//! content; level bookkeeping stays out of the token definitions entirely.
//! Only the first lexeme of a line carries the computed level, the rest are
//! continuations.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logos::Logos;

use crate::error::{Error, Result};
use crate::token::{Location, Token, CONTINUATION};

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t]+")]
enum RawLexeme {
    #[token(",")]
    Comma,

    #[regex(r"[^ \t,]+")]
    Word,
}

/// A single open input file, consumed lexeme by lexeme.
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    file_tag: Arc<PathBuf>,
    base_level: i32,
    lineno: u32,
    input: BufReader<File>,
    line_tokens: VecDeque<Token>,
    pushed: VecDeque<Token>,
}

impl SourceFile {
    /// Open `path` for reading. `base_level` is the level the enclosing
    /// `@include` directive was issued at; 0 for the root file.
    pub fn open(path: PathBuf, base_level: i32) -> Result<Self> {
        let input = File::open(&path).map_err(|e| Error::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(SourceFile {
            file_tag: Arc::new(path.clone()),
            path,
            base_level,
            lineno: 0,
            input: BufReader::new(input),
            line_tokens: VecDeque::new(),
            pushed: VecDeque::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next lexeme, or `None` once the file is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(tkn) = self.pushed.pop_front() {
            return Ok(Some(tkn));
        }
        if self.line_tokens.is_empty() {
            self.read_line()?;
        }
        Ok(self.line_tokens.pop_front())
    }

    /// Put one lexeme back; it is returned again before any new input.
    pub fn pushback(&mut self, tkn: Token) {
        self.pushed.push_back(tkn);
    }

    /// Read lines until one produces lexemes, filling `line_tokens`.
    fn read_line(&mut self) -> Result<()> {
        loop {
            let mut raw = String::new();
            let n = self.input.read_line(&mut raw).map_err(|e| Error::Read {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
            if n == 0 {
                return Ok(());
            }
            self.lineno += 1;

            let mut level = self.base_level;
            for c in raw.chars() {
                match c {
                    ' ' => level += 1,
                    '\t' => level += 8,
                    _ => break,
                }
            }

            let content = raw.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
            if content.is_empty() || content.starts_with('#') {
                continue;
            }

            let location = Location::new(self.file_tag.clone(), self.lineno);
            let mut first = true;
            let mut lexer = RawLexeme::lexer(content);
            while let Some(item) = lexer.next() {
                let text = match item {
                    Ok(RawLexeme::Comma) => ",",
                    Ok(RawLexeme::Word) => lexer.slice(),
                    Err(()) => continue,
                };
                let lvl = if first { level } else { CONTINUATION };
                first = false;
                self.line_tokens
                    .push_back(Token::new(text, location.clone(), lvl));
            }
            return Ok(());
        }
    }
}
