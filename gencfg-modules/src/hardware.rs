//! Hardware setup unit.
//!
//! ```text
//! hardware
//!     ethernet sort-mac lan0=00:11:22:33:44:55, wan0
//! ```
//!
//! Declares how ethernet device names are assigned at boot; devices are
//! either pinned to a MAC (`name=MAC`) or listed bare.

use std::any::Any;
use std::io;

use tracing::info;

use gencfg_fs::CfgFs;
use gencfg_parser::{
    command, GenCx, NodeSpec, NodeValue, Result, Session, Token, TokenDef,
};

use crate::list_items;

#[derive(Debug, Clone, PartialEq)]
pub struct EthernetDevice {
    pub name: String,
    pub mac: Option<String>,
}

#[derive(Debug, Default)]
pub struct Hardware {
    pub setup: Option<String>,
    pub devices: Vec<EthernetDevice>,
}

impl Hardware {
    fn construct(_: &Token, _: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(Hardware::default()))
    }

    fn parse_ethernet(&mut self, args: &[Token]) -> Result<()> {
        // args: ethernet <setup-method> <device>...
        self.setup = Some(args[1].text.clone());
        for tkn in list_items(&args[2..]) {
            let device = match tkn.text.split_once('=') {
                Some((name, mac)) => EthernetDevice {
                    name: name.to_string(),
                    mac: Some(mac.to_string()),
                },
                None => EthernetDevice {
                    name: tkn.text.clone(),
                    mac: None,
                },
            };
            self.devices.push(device);
        }
        Ok(())
    }

    fn generate(&self, fs: &mut CfgFs) -> Result<()> {
        info!("generating ethernet hardware configuration...");
        let rendered: Vec<String> = self
            .devices
            .iter()
            .map(|d| match &d.mac {
                Some(mac) => format!("{}={}", d.name, mac),
                None => d.name.clone(),
            })
            .collect();
        let f = fs.open("/etc/sysconfig/ethernet")?;
        f.write(&format!("INTERFACES=\"{}\"", rendered.join(",")))?;
        f.write(&format!(
            "SETUP_METHOD=\"{}\"",
            self.setup.as_deref().unwrap_or("")
        ))?;
        Ok(())
    }
}

impl NodeValue for Hardware {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        writeln!(w, "ethernet devices:")?;
        for device in &self.devices {
            match &device.mac {
                Some(mac) => writeln!(w, "    {} = {}", device.name, mac)?,
                None => writeln!(w, "    {}", device.name)?,
            }
        }
        Ok(())
    }

    fn describe(&self) -> serde_json::Value {
        let devices: Vec<serde_json::Value> = self
            .devices
            .iter()
            .map(|d| serde_json::json!({ "name": d.name, "mac": d.mac }))
            .collect();
        serde_json::json!({ "setup": self.setup, "devices": devices })
    }
}

fn generate_hardware(cx: &GenCx<'_>, fs: &mut CfgFs) -> Result<()> {
    for &id in cx.nodes {
        if let Some(hardware) = cx.tree.get::<Hardware>(id) {
            hardware.generate(fs)?;
        }
    }
    Ok(())
}

pub fn register(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "hardware",
        extra_tokens: 0,
        keywords: &["ethernet", "sort-mac"],
        tokens: vec![TokenDef::pattern(
            r"[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}",
            "mac",
        )?],
        rules: &[("_ethernet_ _sort-mac_ _token_(, _token_)*", "parse_ethernet")],
        commands: vec![command("parse_ethernet", Hardware::parse_ethernet)],
        constructor: Some(Hardware::construct),
        generate: Some(generate_hardware),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gencfg_parser::Location;

    fn args(texts: &[&str]) -> Vec<Token> {
        texts
            .iter()
            .map(|t| Token::new(*t, Location::builtin(), -1))
            .collect()
    }

    #[test]
    fn test_devices_with_and_without_mac() {
        let mut hw = Hardware::default();
        hw.parse_ethernet(&args(&[
            "ethernet",
            "sort-mac",
            "lan0=00:11:22:33:44:55",
            ",",
            "wan0",
        ]))
        .unwrap();
        assert_eq!(hw.setup.as_deref(), Some("sort-mac"));
        assert_eq!(
            hw.devices,
            vec![
                EthernetDevice {
                    name: "lan0".into(),
                    mac: Some("00:11:22:33:44:55".into()),
                },
                EthernetDevice {
                    name: "wan0".into(),
                    mac: None,
                },
            ]
        );
    }

    #[test]
    fn test_generated_sysconfig() {
        let mut hw = Hardware::default();
        hw.parse_ethernet(&args(&["ethernet", "sort-mac", "lan0", ",", "wan0"]))
            .unwrap();
        let mut fs = CfgFs::new();
        hw.generate(&mut fs).unwrap();
        assert_eq!(
            fs.open("/etc/sysconfig/ethernet").unwrap().content(),
            "INTERFACES=\"lan0,wan0\"\nSETUP_METHOD=\"sort-mac\"\n"
        );
    }
}
