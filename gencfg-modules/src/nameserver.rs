//! Nameserver unit.
//!
//! `nameserver <backend>` selects which resolver back end to configure. At
//! most one definition is allowed; the backend name dispatches through a
//! fixed table.

use std::any::Any;
use std::io;

use tracing::info;

use gencfg_fs::CfgFs;
use gencfg_parser::{
    Error, GenCx, Location, NodeSpec, NodeValue, Result, Session, Token,
};

#[derive(Debug)]
pub struct Nameserver {
    pub backend: String,
}

impl Nameserver {
    fn construct(_: &Token, extra: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(Nameserver {
            backend: extra[0].text.clone(),
        }))
    }
}

impl NodeValue for Nameserver {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        writeln!(w, "nameserver: {}", self.backend)
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "backend": self.backend })
    }
}

type BackendFn = fn(&Nameserver, &Location, &mut CfgFs) -> Result<()>;

const BACKENDS: &[(&str, BackendFn)] = &[
    ("dnsmasq", generate_dnsmasq),
    ("bind", generate_bind),
];

fn generate_dnsmasq(_ns: &Nameserver, _at: &Location, _fs: &mut CfgFs) -> Result<()> {
    info!("nameserver: dnsmasq selected, no back end yet");
    Ok(())
}

fn generate_bind(_ns: &Nameserver, at: &Location, _fs: &mut CfgFs) -> Result<()> {
    Err(Error::semantic(at, "support for bind is not implemented"))
}

fn generate_nameserver(cx: &GenCx<'_>, fs: &mut CfgFs) -> Result<()> {
    let Some((&first, extra)) = cx.nodes.split_first() else {
        return Ok(());
    };
    if let Some(&surplus) = extra.first() {
        let at = cx.tree.location(surplus).unwrap_or_else(Location::builtin);
        return Err(Error::semantic(&at, "more than one nameserver definition"));
    }
    let Some(ns) = cx.tree.get::<Nameserver>(first) else {
        return Ok(());
    };
    let at = cx.tree.location(first).unwrap_or_else(Location::builtin);
    match BACKENDS.iter().find(|(name, _)| *name == ns.backend) {
        Some((_, generate)) => generate(ns, &at, fs),
        None => Err(Error::semantic(
            &at,
            format!("unknown nameserver `{}` selected", ns.backend),
        )),
    }
}

pub fn register(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "nameserver",
        extra_tokens: 1,
        keywords: &[],
        tokens: Vec::new(),
        rules: &[],
        commands: Vec::new(),
        constructor: Some(Nameserver::construct),
        generate: Some(generate_nameserver),
    })?;
    Ok(())
}
