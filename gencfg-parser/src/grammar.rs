//! Grammar extension units and their registration surface.
//!
//! The grammar is not fixed: every node type contributes its own keywords,
//! token patterns and rules when its unit registers against a [`Session`].
//! Registration is an explicit entry point per unit; the loader only resolves
//! a unit name to its [`RegisterFn`] over the profile search path and calls
//! it. Rule callbacks are declared by name and resolved against the node
//! type's command table at registration time, so a rule naming an undefined
//! callback fails before any input is parsed.

use std::rc::Rc;

use regex::Regex;

use gencfg_fs::CfgFs;

use crate::error::{Error, Result};
use crate::node::{NodeId, NodeValue, Tree};
use crate::rules::RuleProgram;
use crate::session::Session;
use crate::token::Token;

/// Builds a node's value from its header token and extra header arguments.
pub type ConstructorFn = fn(&Token, &[Token]) -> Result<Box<dyn NodeValue>>;

/// A resolved rule callback: mutates the node value with the matched tokens.
pub type Callback = Rc<dyn Fn(&mut dyn NodeValue, &[Token]) -> Result<()>>;

/// Registers one grammar unit against a session.
pub type RegisterFn = fn(&mut Session) -> Result<()>;

/// Tree-wide generation hook of a node type.
pub type GenerateFn = fn(&GenCx<'_>, &mut CfgFs) -> Result<()>;

/// What a generation hook gets to see: the finalized tree, the session's
/// registries, and every node of the hook's own type in creation order.
pub struct GenCx<'a> {
    pub session: &'a Session,
    pub tree: &'a Tree,
    pub def: DefId,
    pub nodes: &'a [NodeId],
}

/// Identifier of a registered node type within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(pub(crate) usize);

#[derive(Debug)]
enum Matcher {
    Literal(String),
    Pattern(Regex),
}

/// Classifies a lexeme's text into a named kind.
#[derive(Debug)]
pub struct TokenDef {
    matcher: Matcher,
    kind: String,
}

impl TokenDef {
    /// Exact string match.
    pub fn literal(text: impl Into<String>, kind: impl Into<String>) -> TokenDef {
        TokenDef {
            matcher: Matcher::Literal(text.into()),
            kind: kind.into(),
        }
    }

    /// Full-lexeme regular expression match.
    pub fn pattern(pattern: &str, kind: impl Into<String>) -> Result<TokenDef> {
        let anchored = format!("^(?:{})$", pattern);
        let regex = Regex::new(&anchored).map_err(|e| Error::grammar(pattern, e.to_string()))?;
        Ok(TokenDef {
            matcher: Matcher::Pattern(regex),
            kind: kind.into(),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Literal(lit) => lit == text,
            Matcher::Pattern(re) => re.is_match(text),
        }
    }
}

/// Everything a grammar unit declares for one node type.
pub struct NodeSpec {
    pub name: &'static str,
    /// Positional tokens pulled right after the header (e.g. an interface
    /// name), handed to the constructor.
    pub extra_tokens: usize,
    pub keywords: &'static [&'static str],
    pub tokens: Vec<TokenDef>,
    /// `(pattern, callback name)` in match-priority order.
    pub rules: &'static [(&'static str, &'static str)],
    pub commands: Vec<(&'static str, Callback)>,
    pub constructor: Option<ConstructorFn>,
    pub generate: Option<GenerateFn>,
}

/// Wrap a typed method as a command-table entry.
///
/// The returned callback downcasts the node value to `T` before delegating;
/// the command table only ever runs against values built by its own node
/// type's constructor.
pub fn command<T, F>(name: &'static str, f: F) -> (&'static str, Callback)
where
    T: NodeValue + 'static,
    F: Fn(&mut T, &[Token]) -> Result<()> + 'static,
{
    let callback: Callback = Rc::new(move |value: &mut dyn NodeValue, args: &[Token]| {
        match value.as_any_mut().downcast_mut::<T>() {
            Some(value) => f(value, args),
            None => Err(Error::Callback {
                node_type: std::any::type_name::<T>().to_string(),
                callback: name.to_string(),
            }),
        }
    });
    (name, callback)
}

pub(crate) struct RuleData {
    pub pattern: String,
    pub callback_name: &'static str,
    pub callback: Callback,
    pub program: Option<RuleProgram>,
}

pub(crate) struct NodeDefData {
    pub name: String,
    pub extra_tokens: usize,
    pub keywords: Vec<String>,
    pub tokens: Vec<TokenDef>,
    pub rules: Vec<RuleData>,
    pub constructor: Option<ConstructorFn>,
    pub generate: Option<GenerateFn>,
    pub nodes: Vec<NodeId>,
}

/// Name index over grammar units: `(namespace, unit name)` to register fn.
///
/// Namespaces are profiles; resolution tries the session's active profile
/// first and the shared `common` namespace second.
#[derive(Default)]
pub struct UnitCatalog {
    units: Vec<(String, String, RegisterFn)>,
}

impl UnitCatalog {
    pub fn new() -> Self {
        UnitCatalog::default()
    }

    pub fn add(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        register: RegisterFn,
    ) {
        self.units.push((namespace.into(), name.into(), register));
    }

    pub fn find(&self, namespace: &str, name: &str) -> Option<RegisterFn> {
        self.units
            .iter()
            .find(|(ns, n, _)| ns == namespace && n == name)
            .map(|(_, _, f)| *f)
    }
}
