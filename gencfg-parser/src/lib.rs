//! # gencfg-parser
//!
//! Front end for the reduced configuration format: a terse,
//! indentation-structured language describing infrastructure (interfaces,
//! DHCP, firewall, services) that gets compiled into a tree of typed nodes
//! for the generation back ends.
//!
//! The grammar is open. Each node type is a grammar extension unit that
//! registers its keywords, token patterns and rules against a [`Session`];
//! units are demand-loaded by name the first time input references them,
//! searching the active profile's namespace and then the shared one. The
//! parser classifies lexemes contextually (innermost node type first, root
//! grammar as fallback), matches clause rules greedily over the classified
//! kind sequence, and recurses into nested node headers it could not match.
//!
//! Pipeline: files → leveled lexemes → contextual classification → rule
//! matching → node construction → pre-order finalize → generation hooks.

pub mod error;
pub mod grammar;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod reader;
pub mod rules;
pub mod session;
pub mod testing;
pub mod token;

pub use error::{Error, Result};
pub use grammar::{command, DefId, GenCx, NodeSpec, TokenDef, UnitCatalog};
pub use node::{FinalizeCx, NodeId, NodeValue, Tree};
pub use parser::Parser;
pub use session::{Session, COMMON_NAMESPACE};
pub use token::{KindId, Location, Token, CONTINUATION};
