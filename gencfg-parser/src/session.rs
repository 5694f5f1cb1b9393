//! The compile session.
//!
//! One [`Session`] owns every registry a compile needs: the kind id table,
//! the registered node types with their compiled rules, the set of already
//! loaded grammar units and the active grammar-context stack. Nothing is
//! process-wide; two sessions never interfere.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use gencfg_fs::CfgFs;

use crate::error::{Error, Result};
use crate::grammar::{
    Callback, DefId, GenCx, NodeDefData, NodeSpec, RuleData, TokenDef, UnitCatalog,
};
use crate::node::{NodeId, RootValue, Tree};
use crate::rules::compile_pattern;
use crate::token::{KindId, KindRegistry, Location, Token};

/// Namespace searched after the active profile when demand-loading.
pub const COMMON_NAMESPACE: &str = "common";

pub struct Session {
    profile: String,
    catalog: UnitCatalog,
    kinds: KindRegistry,
    defs: Vec<NodeDefData>,
    def_ids: HashMap<String, DefId>,
    loaded: HashSet<String>,
    contexts: Vec<DefId>,
    root_def: DefId,
    comma: KindId,
    dash: KindId,
    plain: KindId,
}

impl Session {
    /// A fresh session for `profile`, with the root grammar registered.
    pub fn new(profile: impl Into<String>, catalog: UnitCatalog) -> Result<Session> {
        let mut kinds = KindRegistry::new();
        let comma = kinds.intern("comma");
        let dash = kinds.intern("dash");
        let plain = kinds.intern("token");

        let mut session = Session {
            profile: profile.into(),
            catalog,
            kinds,
            defs: Vec::new(),
            def_ids: HashMap::new(),
            loaded: HashSet::new(),
            contexts: Vec::new(),
            root_def: DefId(0),
            comma,
            dash,
            plain,
        };
        session.root_def = session.define(root_spec()?)?;
        Ok(session)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn root_def(&self) -> DefId {
        self.root_def
    }

    /// Register one node type. Fails on a duplicate name or on a rule whose
    /// callback the command table does not define.
    pub fn define(&mut self, spec: NodeSpec) -> Result<DefId> {
        if self.def_ids.contains_key(spec.name) {
            return Err(Error::grammar(
                spec.name,
                "node type is already registered",
            ));
        }

        let commands: HashMap<&'static str, Callback> = spec.commands.into_iter().collect();
        let mut rules = Vec::with_capacity(spec.rules.len());
        for &(pattern, callback_name) in spec.rules {
            let callback = commands.get(callback_name).cloned().ok_or_else(|| {
                Error::Callback {
                    node_type: spec.name.to_string(),
                    callback: callback_name.to_string(),
                }
            })?;
            rules.push(RuleData {
                pattern: pattern.to_string(),
                callback_name,
                callback,
                program: None,
            });
        }

        let id = DefId(self.defs.len());
        self.defs.push(NodeDefData {
            name: spec.name.to_string(),
            extra_tokens: spec.extra_tokens,
            keywords: spec.keywords.iter().map(|k| k.to_string()).collect(),
            tokens: spec.tokens,
            rules,
            constructor: spec.constructor,
            generate: spec.generate,
            nodes: Vec::new(),
        });
        self.def_ids.insert(spec.name.to_string(), id);
        self.enumerate_ids();
        Ok(id)
    }

    pub fn def_id(&self, name: &str) -> Option<DefId> {
        self.def_ids.get(name).copied()
    }

    pub fn def_name(&self, id: DefId) -> &str {
        &self.defs[id.0].name
    }

    pub(crate) fn def(&self, id: DefId) -> &NodeDefData {
        &self.defs[id.0]
    }

    pub(crate) fn record_node(&mut self, def: DefId, node: NodeId) {
        self.defs[def.0].nodes.push(node);
    }

    /// Nodes of the named type, in creation order.
    pub fn nodes_of(&self, name: &str) -> &[NodeId] {
        match self.def_ids.get(name) {
            Some(id) => &self.defs[id.0].nodes,
            None => &[],
        }
    }

    /// Assign ids to every kind name contributed by every loaded unit.
    /// Safe to re-run after more units load: existing ids never change.
    pub fn enumerate_ids(&mut self) {
        for def in &self.defs {
            for kw in &def.keywords {
                let id = self.kinds.intern(kw);
                debug!("keyword {} => #{}", kw, id.0);
            }
        }
        for def in &self.defs {
            for td in &def.tokens {
                let id = self.kinds.intern(td.kind());
                debug!("token {} => #{}", td.kind(), id.0);
            }
        }
    }

    /// (Re-)compile every registered rule against the current kind table.
    pub fn compile_rules(&mut self) -> Result<()> {
        let kinds = &self.kinds;
        for def in &mut self.defs {
            for rule in &mut def.rules {
                debug!("compiling rule {} => {}", rule.pattern, rule.callback_name);
                rule.program = Some(compile_pattern(&rule.pattern, kinds)?);
            }
        }
        Ok(())
    }

    pub fn kind_id(&self, name: &str) -> Option<KindId> {
        self.kinds.id(name)
    }

    pub fn kind_name(&self, id: KindId) -> Option<&str> {
        self.kinds.name(id)
    }

    /// Enter the named node type's grammar context.
    pub fn push_context(&mut self, def: DefId) {
        self.contexts.push(def);
    }

    pub fn pop_context(&mut self) {
        self.contexts.pop();
    }

    /// Classify a lexeme in the current context: active keywords, root
    /// keywords, active token patterns, root token patterns, first match
    /// wins. `,` and `-` always map to the comma and dash kinds.
    pub fn classify(&self, tkn: &mut Token) {
        if tkn.kind.is_some() {
            return;
        }
        if tkn.text == "," {
            tkn.kind = Some(self.comma);
            return;
        }
        if tkn.text == "-" {
            tkn.kind = Some(self.dash);
            return;
        }

        let active = self.contexts.last().copied();
        let root = self.contexts.first().copied();
        let mut scopes = Vec::with_capacity(2);
        if let Some(active) = active {
            scopes.push(active);
        }
        if let Some(root) = root {
            if Some(root) != active {
                scopes.push(root);
            }
        }

        for &scope in &scopes {
            for kw in &self.defs[scope.0].keywords {
                if tkn.text == *kw {
                    tkn.kind = Some(self.kinds.id(kw).unwrap_or(self.plain));
                    debug!("token {}: keyword {}", tkn.text, kw);
                    return;
                }
            }
        }
        for &scope in &scopes {
            for td in &self.defs[scope.0].tokens {
                if td.matches(&tkn.text) {
                    tkn.kind = Some(self.kinds.id(td.kind()).unwrap_or(self.plain));
                    debug!("token {}: token {}", tkn.text, td.kind());
                    return;
                }
            }
        }
        tkn.kind = Some(self.plain);
    }

    /// Map a classified token run onto the kind-id sequence rules match on.
    pub(crate) fn translate(&self, tokens: &[Token]) -> Result<Vec<KindId>> {
        let mut ids = Vec::with_capacity(tokens.len());
        for tkn in tokens {
            let id = if tkn.text == "," {
                self.comma
            } else if tkn.text == "-" {
                self.dash
            } else {
                tkn.kind
                    .ok_or_else(|| Error::syntax(&tkn.location, "unclassified token"))?
            };
            ids.push(id);
        }
        Ok(ids)
    }

    /// Best rule of `def` for the buffer: longest consumed prefix, ties to
    /// the rule registered first. Returns `(rule index, token count)`.
    pub(crate) fn best_match(&self, def: DefId, ids: &[KindId]) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (i, rule) in self.defs[def.0].rules.iter().enumerate() {
            let Some(program) = &rule.program else { continue };
            if let Some(len) = program.longest_match(ids) {
                if len > 0 && best.map_or(true, |(_, blen)| len > blen) {
                    best = Some((i, len));
                }
            }
        }
        best
    }

    pub(crate) fn rule_callback(&self, def: DefId, rule: usize) -> Callback {
        self.defs[def.0].rules[rule].callback.clone()
    }

    /// Resolve and register the named unit, searching the active profile's
    /// namespace and then the shared one. Loading an already loaded unit is
    /// a no-op.
    pub fn load_unit(&mut self, name: &str, location: Option<&Location>) -> Result<()> {
        if self.loaded.contains(name) {
            return Ok(());
        }
        let namespaces = vec![self.profile.clone(), COMMON_NAMESPACE.to_string()];
        for ns in &namespaces {
            if let Some(register) = self.catalog.find(ns, name) {
                debug!("loading unit {} from {} profile", name, ns);
                // mark first: a unit referencing itself while registering
                // must not recurse into another load
                self.loaded.insert(name.to_string());
                return register(self);
            }
        }
        Err(Error::UnitNotFound {
            name: name.to_string(),
            namespaces,
            location: location.cloned(),
        })
    }

    /// Run every node type's generation hook, in registration order.
    pub fn generate_all(&self, tree: &Tree, fs: &mut CfgFs) -> Result<()> {
        for (i, def) in self.defs.iter().enumerate() {
            if let Some(generate) = def.generate {
                let cx = GenCx {
                    session: self,
                    tree,
                    def: DefId(i),
                    nodes: &def.nodes,
                };
                generate(&cx, fs)?;
            }
        }
        Ok(())
    }

    pub(crate) fn root_value(&self) -> Box<dyn crate::node::NodeValue> {
        Box::new(RootValue)
    }
}

/// The always-present root grammar: generic token shapes every context can
/// fall back to.
fn root_spec() -> Result<NodeSpec> {
    Ok(NodeSpec {
        name: "root",
        extra_tokens: 0,
        keywords: &[],
        tokens: vec![
            TokenDef::pattern(r"[0-9]+", "int")?,
            TokenDef::pattern(r"0x[0-9a-f]+", "int")?,
            TokenDef::pattern(r"[0-9]+-[0-9]+", "intrange")?,
            TokenDef::literal(",", "comma"),
            TokenDef::literal("-", "dash"),
            TokenDef::pattern(r".*", "token")?,
        ],
        rules: &[],
        commands: Vec::new(),
        constructor: None,
        generate: None,
    })
}
