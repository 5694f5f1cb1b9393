//! Firewall unit.
//!
//! Collects accept, source-NAT and isolation clauses. Rule synthesis into a
//! packet filter configuration is left to a dedicated back end; the hook
//! only reports what was gathered.

use std::any::Any;
use std::io;

use tracing::info;

use gencfg_fs::CfgFs;
use gencfg_parser::{command, GenCx, NodeSpec, NodeValue, Result, Session, Token};

use crate::list_items;

#[derive(Debug, Default)]
pub struct Firewall {
    /// Accepted service names, one list per `accept` clause.
    pub accepts: Vec<Vec<String>>,
    /// Links to source-NAT on, one list per `snat on` clause.
    pub snats: Vec<Vec<String>>,
    /// Link groups to isolate from each other.
    pub isolations: Vec<Vec<String>>,
}

impl Firewall {
    fn construct(_: &Token, _: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(Firewall::default()))
    }

    fn parse_accept(&mut self, args: &[Token]) -> Result<()> {
        self.accepts
            .push(list_items(&args[1..]).map(|t| t.text.clone()).collect());
        Ok(())
    }

    fn parse_snat(&mut self, args: &[Token]) -> Result<()> {
        // args: snat on <link>...
        self.snats
            .push(list_items(&args[2..]).map(|t| t.text.clone()).collect());
        Ok(())
    }

    fn parse_isolate(&mut self, args: &[Token]) -> Result<()> {
        self.isolations
            .push(list_items(&args[1..]).map(|t| t.text.clone()).collect());
        Ok(())
    }
}

impl NodeValue for Firewall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        writeln!(w, "firewall:")?;
        for accept in &self.accepts {
            writeln!(w, "    accept: {}", accept.join(" "))?;
        }
        for snat in &self.snats {
            writeln!(w, "    snat on: {}", snat.join(" "))?;
        }
        for isolation in &self.isolations {
            writeln!(w, "    isolate: {}", isolation.join(","))?;
        }
        Ok(())
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "accepts": self.accepts,
            "snats": self.snats,
            "isolations": self.isolations,
        })
    }
}

fn generate_firewall(cx: &GenCx<'_>, _fs: &mut CfgFs) -> Result<()> {
    // TODO: synthesize nftables rules from the collected clauses
    info!("firewall: {} definition(s) parsed, no back end yet", cx.nodes.len());
    Ok(())
}

pub fn register(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "firewall",
        extra_tokens: 0,
        keywords: &[
            "accept", "drop", "reject", "snat", "dnat", "on", "input", "output", "forward",
            "isolate",
        ],
        tokens: Vec::new(),
        rules: &[
            ("_accept_ _token_( _token_)*", "parse_accept"),
            ("_snat_ _on_ _token_( _token_)*", "parse_snat"),
            ("_isolate_ _token_(, _token_)*", "parse_isolate"),
        ],
        commands: vec![
            command("parse_accept", Firewall::parse_accept),
            command("parse_snat", Firewall::parse_snat),
            command("parse_isolate", Firewall::parse_isolate),
        ],
        constructor: Some(Firewall::construct),
        generate: Some(generate_firewall),
    })?;
    Ok(())
}
