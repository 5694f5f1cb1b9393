//! # gencfg-modules
//!
//! The grammar extension units shipped with gencfg: one module per node
//! type, each exposing a `register` entry point that declares its keywords,
//! token patterns, rules and generation hook against a parser [`Session`].
//! [`catalog`] indexes them all under the shared `common` namespace; profiles
//! layer their own namespaces on top of it.

use gencfg_parser::{Token, UnitCatalog, COMMON_NAMESPACE};

pub mod dhcp_server;
pub mod firewall;
pub mod hardware;
pub mod interface;
pub mod nameserver;
pub mod net;
pub mod service;

/// Iterate the items of a matched list clause, skipping comma lexemes.
pub(crate) fn list_items(tokens: &[Token]) -> impl Iterator<Item = &Token> {
    tokens.iter().filter(|t| !t.is(","))
}

/// All built-in units, under the shared namespace.
pub fn catalog() -> UnitCatalog {
    let mut catalog = UnitCatalog::new();
    catalog.add(COMMON_NAMESPACE, "interface", interface::register);
    catalog.add(COMMON_NAMESPACE, "dhcp-server", dhcp_server::register);
    catalog.add(COMMON_NAMESPACE, "firewall", firewall::register);
    catalog.add(COMMON_NAMESPACE, "nameserver", nameserver::register);
    catalog.add(COMMON_NAMESPACE, "service", service::register);
    catalog.add(COMMON_NAMESPACE, "hardware", hardware::register);
    catalog
}
