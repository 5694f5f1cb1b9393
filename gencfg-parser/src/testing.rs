//! Shared test fixtures: a minimal grammar with observable behavior.
//!
//! The `leaf` node type records what its callbacks received, which lets
//! engine tests assert on dispatch, tie-breaking and finalize ordering
//! without dragging in any real configuration semantics.

use std::any::Any;

use crate::error::Result;
use crate::grammar::{command, NodeSpec, UnitCatalog};
use crate::node::{FinalizeCx, NodeValue};
use crate::session::{Session, COMMON_NAMESPACE};
use crate::token::Token;

/// A leaf node: `greet <name>` clauses plus `note` lists.
#[derive(Debug, Default)]
pub struct Leaf {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub notes: Vec<String>,
}

impl Leaf {
    fn construct(_: &Token, _: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(Leaf::default()))
    }

    fn set_name(&mut self, args: &[Token]) -> Result<()> {
        self.name = args.get(1).map(|t| t.text.clone());
        Ok(())
    }

    fn set_alias(&mut self, args: &[Token]) -> Result<()> {
        self.alias = args.get(1).map(|t| t.text.clone());
        Ok(())
    }

    fn add_notes(&mut self, args: &[Token]) -> Result<()> {
        for tkn in &args[1..] {
            if !tkn.is(",") {
                self.notes.push(tkn.text.clone());
            }
        }
        Ok(())
    }
}

impl NodeValue for Leaf {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn finalize(&mut self, _cx: &FinalizeCx<'_>) -> Result<()> {
        if self.name.is_none() {
            self.name = Some("anonymous".to_string());
        }
        Ok(())
    }
}

pub fn register_leaf(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "leaf",
        extra_tokens: 0,
        keywords: &["greet", "note"],
        tokens: Vec::new(),
        rules: &[
            ("_greet_ _token_", "set_name"),
            // same shape as the rule above: must never fire (registration
            // order breaks the tie)
            ("_greet_ _token_", "set_alias"),
            ("_note_ _token_(, _token_)*", "add_notes"),
        ],
        commands: vec![
            command("set_name", Leaf::set_name),
            command("set_alias", Leaf::set_alias),
            command("add_notes", Leaf::add_notes),
        ],
        constructor: Some(Leaf::construct),
        generate: None,
    })?;
    Ok(())
}

/// A grouping node whose finalize records its leaf children's names exactly
/// as parsed, i.e. before the children default them.
#[derive(Debug, Default)]
pub struct Branch {
    pub observed: Vec<Option<String>>,
}

impl Branch {
    fn construct(_: &Token, _: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(Branch::default()))
    }
}

impl NodeValue for Branch {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn finalize(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        for &child in cx.children() {
            if let Some(leaf) = cx.tree.get::<Leaf>(child) {
                self.observed.push(leaf.name.clone());
            }
        }
        Ok(())
    }
}

pub fn register_branch(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "branch",
        extra_tokens: 0,
        keywords: &[],
        tokens: Vec::new(),
        rules: &[],
        commands: Vec::new(),
        constructor: Some(Branch::construct),
        generate: None,
    })?;
    Ok(())
}

/// Catalog holding the fixtures under the shared namespace.
pub fn fixture_catalog() -> UnitCatalog {
    let mut catalog = UnitCatalog::new();
    catalog.add(COMMON_NAMESPACE, "leaf", register_leaf);
    catalog.add(COMMON_NAMESPACE, "branch", register_branch);
    catalog
}
