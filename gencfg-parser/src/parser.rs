//! Recursive-descent construction of the node tree.
//!
//! The parser drives the lexer across possibly many included files, resolves
//! node-type names by demand-loading grammar units, and dispatches matched
//! rule clauses to the node's command table. A full compile is:
//!
//! 1. `tokenize` every open file into the pending queue, interpreting
//!    `@include` and `@modules` inline,
//! 2. enumerate kind ids and compile every registered rule,
//! 3. `parse_nodes` until the queue is exhausted,
//! 4. finalize the tree pre-order.
//!
//! Any violation aborts the whole compile with a located error; there is no
//! recovery and no partial tree.

use std::io;
use std::path::Path;

use tracing::debug;

use gencfg_fs::CfgFs;

use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::node::{NodeId, Tree};
use crate::session::Session;
use crate::token::{Token, CONTINUATION};

pub struct Parser {
    session: Session,
    lexer: Lexer,
    tree: Tree,
    root: NodeId,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser").field("root", &self.root).finish_non_exhaustive()
    }
}

impl Parser {
    /// A parser over `path`, using the session's grammar and profile.
    pub fn new(session: Session, path: impl AsRef<Path>) -> Result<Parser> {
        let mut lexer = Lexer::new();
        lexer.include_file(&path.as_ref().to_string_lossy(), 0, None)?;

        let mut tree = Tree::new();
        let root_def = session.root_def();
        let root = tree.add_root(root_def, session.root_value());
        Ok(Parser {
            session,
            lexer,
            tree,
            root,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Run the full compile and return the finalized root node.
    pub fn parse(&mut self) -> Result<NodeId> {
        self.session.push_context(self.session.root_def());
        self.tokenize()?;
        self.session.enumerate_ids();
        self.session.compile_rules()?;
        self.parse_nodes()?;
        self.finalize_nodes()?;
        self.session.pop_context();
        Ok(self.root)
    }

    /// Flatten the open-file stack into the pending queue, interpreting
    /// directives inline instead of queuing them.
    fn tokenize(&mut self) -> Result<()> {
        while self.lexer.has_files() {
            match self.lexer.next_file_token()? {
                None => self.lexer.pop_file(),
                Some(tkn) if tkn.is("@include") => {
                    let path = self.lexer.next_file_token()?.ok_or_else(|| {
                        Error::syntax(&tkn.location, "@include without a file path")
                    })?;
                    let includer = self.lexer.active_path();
                    self.lexer
                        .include_file(&path.text, tkn.level, includer.as_deref())?;
                }
                Some(tkn) if tkn.is("@modules") => self.load_modules()?,
                Some(tkn) => {
                    debug!("+ token {}", tkn);
                    self.lexer.enqueue(tkn);
                }
            }
        }
        Ok(())
    }

    /// `@modules a, b, c`: demand-load each unit named on the directive's
    /// own line. The first token at a fresh level ends the name list.
    fn load_modules(&mut self) -> Result<()> {
        loop {
            match self.lexer.next_file_token()? {
                Some(tkn) if tkn.level == CONTINUATION => {
                    if !tkn.is(",") {
                        self.session.load_unit(&tkn.text, Some(&tkn.location))?;
                    }
                }
                Some(tkn) => {
                    self.lexer.pushback_to_file(tkn);
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
    }

    /// Load the unit for an unknown node-type name, then refresh kind ids
    /// and rule matchers for whatever it registered.
    fn demand_load(&mut self, name: &str, header: &Token) -> Result<()> {
        if self.session.def_id(name).is_some() {
            return Ok(());
        }
        self.session.load_unit(name, Some(&header.location))?;
        self.session.enumerate_ids();
        self.session.compile_rules()?;
        Ok(())
    }

    /// Top-level loop: every pending token is a node header under the root.
    fn parse_nodes(&mut self) -> Result<()> {
        while let Some(tkn) = self.lexer.pull_token(&self.session) {
            self.parse_node(tkn, self.root)?;
        }
        Ok(())
    }

    fn finalize_nodes(&mut self) -> Result<()> {
        self.tree.finalize(&self.session, self.root)
    }

    fn parse_node(&mut self, header: Token, parent: NodeId) -> Result<NodeId> {
        let name = header.text.clone();
        debug!("parsing node {}...", name);

        if self.session.def_id(&name).is_none() {
            if let Err(err) = self.demand_load(&name, &header) {
                return Err(match err {
                    Error::UnitNotFound { .. } => Error::syntax(
                        &header.location,
                        format!("unknown node type `{}`", name),
                    ),
                    other => other,
                });
            }
        }
        let def = self.session.def_id(&name).ok_or_else(|| {
            Error::syntax(&header.location, format!("unknown node type `{}`", name))
        })?;

        self.session.push_context(def);

        let extra_count = self.session.def(def).extra_tokens;
        let extra = self
            .lexer
            .pull_tokens(&self.session, header.level, Some(extra_count));
        if extra.len() < extra_count {
            return Err(Error::syntax(
                &header.location,
                format!("`{}` expects {} argument(s)", name, extra_count),
            ));
        }

        let constructor = self.session.def(def).constructor.ok_or_else(|| {
            Error::syntax(
                &header.location,
                format!("node type `{}` cannot appear in input", name),
            )
        })?;
        let value = constructor(&header, &extra)?;
        let node = self.tree.add(def, parent, header.clone(), value);
        self.session.record_node(def, node);

        let mut tokens = self
            .lexer
            .pull_tokens(&self.session, header.level, None);

        while !tokens.is_empty() {
            let ids = self.session.translate(&tokens)?;
            match self.session.best_match(def, &ids) {
                Some((rule, count)) => {
                    debug!("{}: rule #{} consumes {} token(s)", name, rule, count);
                    let args: Vec<Token> = tokens.drain(..count).collect();
                    let callback = self.session.rule_callback(def, rule);
                    (*callback)(self.tree.value_mut(node), &args)?;
                }
                None => {
                    // not a clause of this node type; the leading token must
                    // open a nested node
                    let child_header = tokens.remove(0);
                    let rest = std::mem::take(&mut tokens);
                    self.lexer.pushback_tokens(rest);
                    self.parse_node(child_header, node)?;
                    tokens = self
                        .lexer
                        .pull_tokens(&self.session, header.level, None);
                }
            }
        }

        self.session.pop_context();
        Ok(node)
    }

    /// Run every node type's generation hook against the output sink.
    pub fn generate(&self, fs: &mut CfgFs) -> Result<()> {
        self.session.generate_all(&self.tree, fs)
    }

    /// Human-readable dump of the parsed tree.
    pub fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        self.tree.dump(w)
    }

    /// JSON rendition of the parsed tree.
    pub fn describe(&self) -> serde_json::Value {
        self.tree.describe(&self.session, self.root)
    }
}
