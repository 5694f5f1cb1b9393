//! The parsed configuration tree.
//!
//! Nodes live in an arena addressed by [`NodeId`]; each slot owns its ordered
//! children list and holds a non-owning parent index, the header token that
//! introduced the node, and the node-type-specific value behind
//! [`NodeValue`]. Finalize runs pre-order: a node validates and defaults
//! itself while its children still carry their raw, as-parsed state, then
//! each child is finalized in turn.

use std::any::Any;
use std::io;

use crate::error::Result;
use crate::grammar::DefId;
use crate::session::Session;
use crate::token::{Location, Token};

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Node-type-specific state and behavior.
///
/// Rule callbacks populate the value during parsing; `finalize` validates and
/// applies defaults once the whole tree is built. `dump` and `describe` feed
/// the human-readable and JSON tree dumps.
pub trait NodeValue: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn finalize(&mut self, _cx: &FinalizeCx<'_>) -> Result<()> {
        Ok(())
    }

    fn dump(&self, _w: &mut dyn io::Write) -> io::Result<()> {
        Ok(())
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// The value of the implicit root node.
pub struct RootValue;

impl NodeValue for RootValue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Placeholder occupying a slot while its real value is being finalized.
struct Detached;

impl NodeValue for Detached {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a finalize step gets to see besides its own value.
pub struct FinalizeCx<'a> {
    pub session: &'a Session,
    pub tree: &'a Tree,
    pub node: NodeId,
}

impl<'a> FinalizeCx<'a> {
    /// Location of this node's header token.
    pub fn location(&self) -> Location {
        self.tree
            .location(self.node)
            .unwrap_or_else(Location::builtin)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.tree.parent(self.node)
    }

    /// The parent's node-type name, if any.
    pub fn parent_type(&self) -> Option<&str> {
        let parent = self.tree.parent(self.node)?;
        Some(self.session.def_name(self.tree.def(parent)))
    }

    /// The parent's value, downcast to its concrete type.
    pub fn parent_value<T: 'static>(&self) -> Option<&T> {
        self.tree.get(self.tree.parent(self.node)?)
    }

    pub fn children(&self) -> &[NodeId] {
        self.tree.children(self.node)
    }
}

struct Slot {
    def: DefId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    header: Option<Token>,
    value: Box<dyn NodeValue>,
}

/// Arena of parsed nodes.
pub struct Tree {
    slots: Vec<Slot>,
}

impl Tree {
    pub(crate) fn new() -> Tree {
        Tree { slots: Vec::new() }
    }

    pub(crate) fn add_root(&mut self, def: DefId, value: Box<dyn NodeValue>) -> NodeId {
        self.add_slot(def, None, None, value)
    }

    pub(crate) fn add(
        &mut self,
        def: DefId,
        parent: NodeId,
        header: Token,
        value: Box<dyn NodeValue>,
    ) -> NodeId {
        self.add_slot(def, Some(parent), Some(header), value)
    }

    fn add_slot(
        &mut self,
        def: DefId,
        parent: Option<NodeId>,
        header: Option<Token>,
        value: Box<dyn NodeValue>,
    ) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            def,
            parent,
            children: Vec::new(),
            header,
            value,
        });
        if let Some(parent) = parent {
            self.slots[parent.0].children.push(id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn def(&self, id: NodeId) -> DefId {
        self.slots[id.0].def
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slots[id.0].children
    }

    pub fn header(&self, id: NodeId) -> Option<&Token> {
        self.slots[id.0].header.as_ref()
    }

    pub fn location(&self, id: NodeId) -> Option<Location> {
        self.header(id).map(|t| t.location.clone())
    }

    /// The node's value downcast to `T`, or `None` if the node holds a
    /// different type (or is currently being finalized).
    pub fn get<T: 'static>(&self, id: NodeId) -> Option<&T> {
        self.slots[id.0].value.as_any().downcast_ref()
    }

    pub(crate) fn value_mut(&mut self, id: NodeId) -> &mut dyn NodeValue {
        self.slots[id.0].value.as_mut()
    }

    /// Pre-order finalize: the node itself first, then each child.
    pub(crate) fn finalize(&mut self, session: &Session, id: NodeId) -> Result<()> {
        let mut value = std::mem::replace(&mut self.slots[id.0].value, Box::new(Detached));
        let result = {
            let cx = FinalizeCx {
                session,
                tree: self,
                node: id,
            };
            value.finalize(&cx)
        };
        self.slots[id.0].value = value;
        result?;

        let children = self.slots[id.0].children.clone();
        for child in children {
            self.finalize(session, child)?;
        }
        Ok(())
    }

    /// Depth-first human-readable dump.
    pub fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        self.dump_node(NodeId(0), w)
    }

    fn dump_node(&self, id: NodeId, w: &mut dyn io::Write) -> io::Result<()> {
        self.slots[id.0].value.dump(w)?;
        for child in &self.slots[id.0].children {
            self.dump_node(*child, w)?;
        }
        Ok(())
    }

    /// JSON rendition of the subtree rooted at `id`.
    pub fn describe(&self, session: &Session, id: NodeId) -> serde_json::Value {
        let slot = &self.slots[id.0];
        let children: Vec<serde_json::Value> = slot
            .children
            .iter()
            .map(|c| self.describe(session, *c))
            .collect();
        serde_json::json!({
            "type": session.def_name(slot.def),
            "detail": slot.value.describe(),
            "children": children,
        })
    }
}
