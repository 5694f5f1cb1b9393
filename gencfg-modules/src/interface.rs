//! Network interface unit.
//!
//! ```text
//! interface eth0
//!     config ipv4 192.168.1.1/24
//!     vlans 10, 20-24
//! interface eth0.10
//!     config dhcp
//! ```
//!
//! Generates systemd-networkd `.network` units, plus one `.netdev` per
//! declared VLAN.

use std::any::Any;
use std::io;

use tracing::info;

use gencfg_fs::CfgFs;
use gencfg_parser::{
    command, Error, FinalizeCx, GenCx, NodeSpec, NodeValue, Result, Session, Token, TokenDef,
};

use crate::list_items;
use crate::net::Ipv4Net;

#[derive(Debug, Clone, PartialEq)]
pub enum AddressConfig {
    Unset,
    Down,
    Dhcp,
    Static(Vec<Ipv4Net>),
}

#[derive(Debug)]
pub struct Interface {
    pub name: String,
    pub vlans: Vec<u32>,
    pub addresses: AddressConfig,
}

impl Interface {
    fn construct(_: &Token, extra: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(Interface {
            name: extra[0].text.clone(),
            vlans: Vec::new(),
            addresses: AddressConfig::Unset,
        }))
    }

    fn parse_config(&mut self, args: &[Token]) -> Result<()> {
        let state = &args[1];
        match state.text.as_str() {
            "down" => self.addresses = AddressConfig::Down,
            "dhcp" => self.addresses = AddressConfig::Dhcp,
            "ipv4" => {
                for tkn in list_items(&args[2..]) {
                    self.add_address(tkn)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn add_address(&mut self, tkn: &Token) -> Result<()> {
        let net: Ipv4Net = tkn
            .text
            .parse()
            .map_err(|e: crate::net::NetParseError| Error::semantic(&tkn.location, e.to_string()))?;
        match &mut self.addresses {
            AddressConfig::Static(list) => list.push(net),
            other => *other = AddressConfig::Static(vec![net]),
        }
        Ok(())
    }

    fn parse_vlans(&mut self, args: &[Token]) -> Result<()> {
        for tkn in list_items(&args[1..]) {
            self.add_vlan(tkn)?;
        }
        self.vlans.sort_unstable();
        self.vlans.dedup();
        Ok(())
    }

    fn add_vlan(&mut self, tkn: &Token) -> Result<()> {
        let invalid = || Error::semantic(&tkn.location, format!("invalid VLAN `{}`", tkn.text));
        match tkn.text.split_once('-') {
            Some((beg, end)) => {
                let beg: u32 = beg.parse().map_err(|_| invalid())?;
                let end: u32 = end.parse().map_err(|_| invalid())?;
                let (lo, hi) = if beg <= end { (beg, end) } else { (end, beg) };
                self.vlans.extend(lo..=hi);
            }
            None => self.vlans.push(tkn.text.parse().map_err(|_| invalid())?),
        }
        Ok(())
    }

    fn check_config(&self, cx: &FinalizeCx<'_>) -> Result<()> {
        if self.addresses == AddressConfig::Unset {
            return Err(Error::semantic(
                &cx.location(),
                format!("interface {} has no configuration", self.name),
            ));
        }
        Ok(())
    }

    fn check_vlans(&self, cx: &FinalizeCx<'_>) -> Result<()> {
        if self.name.contains('.') && !self.vlans.is_empty() {
            return Err(Error::semantic(
                &cx.location(),
                format!("interface {} has nested VLANs", self.name),
            ));
        }
        Ok(())
    }

    fn generate(&self, fs: &mut CfgFs) -> Result<()> {
        info!("generating network interface {}...", self.name);
        // VLAN sub-interfaces sort after their carrier
        let prio = if self.name.contains('.') { 20 } else { 10 };
        let path = format!("/etc/systemd/network/{}-{}.network", prio, self.name);
        let f = fs.open_ini(&path)?;
        f.write_section("Match", &format!("Name={}", self.name))?;
        match &self.addresses {
            AddressConfig::Dhcp => f.write_section("Network", "DHCP=ipv4")?,
            AddressConfig::Static(addrs) => {
                for addr in addrs {
                    f.write_section("Network", &format!("Address={}", addr))?;
                }
            }
            AddressConfig::Down | AddressConfig::Unset => {}
        }
        f.write_section("Network", "LinkLocalAddressing=no")?;
        for id in &self.vlans {
            f.write_section("Network", &format!("VLAN={}.{}", self.name, id))?;
        }
        f.close();

        for id in &self.vlans {
            info!("generating device for VLAN #{}...", id);
            let path = format!("/etc/systemd/network/00-{}-vlan{}.netdev", self.name, id);
            let f = fs.open_ini(&path)?;
            f.write_section("NetDev", &format!("Name={}.{}", self.name, id))?;
            f.write("Kind=vlan")?;
            f.write_section("VLAN", &format!("Id={}", id))?;
            f.close();
        }
        Ok(())
    }
}

impl NodeValue for Interface {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn finalize(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        self.check_config(cx)?;
        self.check_vlans(cx)?;
        Ok(())
    }

    fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        writeln!(w, "interface {}:", self.name)?;
        match &self.addresses {
            AddressConfig::Unset => writeln!(w, "    address: unset")?,
            AddressConfig::Down => writeln!(w, "    address: down")?,
            AddressConfig::Dhcp => writeln!(w, "    address: dhcp")?,
            AddressConfig::Static(addrs) => {
                let joined: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
                writeln!(w, "    addresses: {}", joined.join(","))?;
            }
        }
        let vlans: Vec<String> = self.vlans.iter().map(|v| v.to_string()).collect();
        writeln!(w, "    vlans: {}", vlans.join(","))
    }

    fn describe(&self) -> serde_json::Value {
        let addresses = match &self.addresses {
            AddressConfig::Unset => serde_json::json!(null),
            AddressConfig::Down => serde_json::json!("down"),
            AddressConfig::Dhcp => serde_json::json!("dhcp"),
            AddressConfig::Static(addrs) => {
                serde_json::json!(addrs.iter().map(|a| a.to_string()).collect::<Vec<_>>())
            }
        };
        serde_json::json!({
            "name": self.name,
            "addresses": addresses,
            "vlans": self.vlans,
        })
    }
}

fn generate_interfaces(cx: &GenCx<'_>, fs: &mut CfgFs) -> Result<()> {
    for &id in cx.nodes {
        if let Some(interface) = cx.tree.get::<Interface>(id) {
            interface.generate(fs)?;
        }
    }
    Ok(())
}

pub fn register(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "interface",
        extra_tokens: 1,
        keywords: &["vlans", "config", "ipv4", "down", "dhcp"],
        tokens: vec![TokenDef::pattern(
            r"([0-9]{1,3}\.){3}[0-9]{1,3}(/[0-9]{1,2})?",
            "address",
        )?],
        rules: &[
            ("_vlans_ (_int_|_intrange_)(, (_int_|_intrange_))*", "parse_vlans"),
            ("_config_ _down_", "parse_config"),
            ("_config_ _dhcp_", "parse_config"),
            ("_config_ _ipv4_ _address_(, _address_)*", "parse_config"),
        ],
        commands: vec![
            command("parse_vlans", Interface::parse_vlans),
            command("parse_config", Interface::parse_config),
        ],
        constructor: Some(Interface::construct),
        generate: Some(generate_interfaces),
    })?;
    Ok(())
}
