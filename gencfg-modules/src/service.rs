//! Service enablement unit.
//!
//! ```text
//! service
//!     enable ssh
//!     enable dns udp
//!     disable telnet
//! ```
//!
//! Service names resolve against the system services database
//! (`/etc/services` format) with a few friendly aliases. Enabled services
//! get systemd enablement symlinks.

use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::io::BufRead;

use once_cell::sync::Lazy;
use tracing::{debug, info};

use gencfg_fs::CfgFs;
use gencfg_parser::{command, GenCx, NodeSpec, NodeValue, Result, Session, Token};

const ALIASES: &[(&str, &str)] = &[
    ("dhcp", "bootps"),
    ("dhcp-server", "bootps"),
    ("dhcp-client", "bootpc"),
    ("secure-shell", "ssh"),
    ("openssh", "ssh"),
];

/// Port lookup over an `/etc/services`-format database.
#[derive(Debug, Default)]
pub struct ServiceTable {
    // protocol -> service/alias -> port
    services: HashMap<String, HashMap<String, u16>>,
}

impl ServiceTable {
    pub fn from_path(path: &str) -> io::Result<ServiceTable> {
        let file = std::fs::File::open(path)?;
        Ok(Self::from_reader(io::BufReader::new(file)))
    }

    pub fn from_reader(reader: impl BufRead) -> ServiceTable {
        let mut table = ServiceTable::default();
        for line in reader.lines() {
            let Ok(line) = line else { break };
            let line = match line.split_once('#') {
                Some((head, _)) => head,
                None => &line,
            };
            let mut fields = line.split_whitespace();
            let (Some(service), Some(port_proto)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some((port, proto)) = port_proto.split_once('/') else {
                continue;
            };
            let Ok(port) = port.parse::<u16>() else { continue };
            let by_name = table.services.entry(proto.to_string()).or_default();
            by_name.insert(service.to_string(), port);
            for alias in fields {
                by_name.insert(alias.to_string(), port);
            }
        }
        table
    }

    pub fn port(&self, name: &str, proto: &str) -> Option<u16> {
        if let Some(port) = self.services.get(proto).and_then(|m| m.get(name)) {
            return Some(*port);
        }
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .and_then(|(_, canonical)| self.port(canonical, proto))
    }

    /// Protocol assumed when a clause names none.
    pub fn protocol(&self, _name: &str) -> &'static str {
        "tcp"
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

static SERVICES: Lazy<ServiceTable> = Lazy::new(|| match ServiceTable::from_path("/etc/services") {
    Ok(table) => table,
    Err(err) => {
        debug!("no services database: {}", err);
        ServiceTable::default()
    }
});

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub name: String,
    pub proto: String,
    pub port: Option<u16>,
}

#[derive(Debug, Default)]
pub struct Service {
    pub enable: Vec<ServiceEntry>,
    pub disable: Vec<ServiceEntry>,
}

impl Service {
    fn construct(_: &Token, _: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(Service::default()))
    }

    fn parse_service(&mut self, args: &[Token]) -> Result<()> {
        let state = &args[0];
        let name = args[1].text.clone();
        let proto = match args.get(2) {
            Some(tkn) => tkn.text.clone(),
            None => SERVICES.protocol(&name).to_string(),
        };
        let entry = ServiceEntry {
            port: SERVICES.port(&name, &proto),
            name,
            proto,
        };
        if state.is("enable") {
            self.enable.push(entry);
        } else {
            self.disable.push(entry);
        }
        Ok(())
    }
}

impl NodeValue for Service {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        writeln!(w, "services:")?;
        for entry in &self.enable {
            writeln!(w, "    enable {} ({})", entry.name, entry.proto)?;
        }
        for entry in &self.disable {
            writeln!(w, "    disable {} ({})", entry.name, entry.proto)?;
        }
        Ok(())
    }

    fn describe(&self) -> serde_json::Value {
        let entry = |e: &ServiceEntry| {
            serde_json::json!({ "name": e.name, "proto": e.proto, "port": e.port })
        };
        serde_json::json!({
            "enable": self.enable.iter().map(entry).collect::<Vec<_>>(),
            "disable": self.disable.iter().map(entry).collect::<Vec<_>>(),
        })
    }
}

fn generate_services(cx: &GenCx<'_>, fs: &mut CfgFs) -> Result<()> {
    for &id in cx.nodes {
        let Some(service) = cx.tree.get::<Service>(id) else {
            continue;
        };
        for entry in &service.enable {
            info!("enabling service {}...", entry.name);
            fs.symlink(
                format!("/usr/lib/systemd/system/{}.service", entry.name),
                format!(
                    "/etc/systemd/system/multi-user.target.wants/{}.service",
                    entry.name
                ),
            )?;
        }
        for entry in &service.disable {
            debug!("service {} disabled, nothing staged", entry.name);
        }
    }
    Ok(())
}

pub fn register(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "service",
        extra_tokens: 0,
        keywords: &["enable", "disable", "tcp", "udp"],
        tokens: Vec::new(),
        rules: &[("(_enable_|_disable_) _token_( _tcp_|_udp_)?", "parse_service")],
        commands: vec![command("parse_service", Service::parse_service)],
        constructor: Some(Service::construct),
        generate: Some(generate_services),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# service-name  port/protocol  [aliases ...]
ssh             22/tcp
domain          53/tcp         dns
domain          53/udp         dns
bootps          67/udp         dhcps
";

    fn table() -> ServiceTable {
        ServiceTable::from_reader(SAMPLE.as_bytes())
    }

    #[test]
    fn test_lookup_by_name_and_alias() {
        let t = table();
        assert_eq!(t.port("ssh", "tcp"), Some(22));
        assert_eq!(t.port("dns", "udp"), Some(53));
        assert_eq!(t.port("dns", "tcp"), Some(53));
        assert_eq!(t.port("ssh", "udp"), None);
    }

    #[test]
    fn test_friendly_aliases_resolve() {
        let t = table();
        assert_eq!(t.port("dhcp", "udp"), Some(67));
        assert_eq!(t.port("dhcp-server", "udp"), Some(67));
        assert_eq!(t.port("openssh", "tcp"), Some(22));
    }

    #[test]
    fn test_unknown_service() {
        assert_eq!(table().port("no-such", "tcp"), None);
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let t = ServiceTable::from_reader("# only a comment\n\n".as_bytes());
        assert!(t.is_empty());
    }

    #[test]
    fn test_parse_service_clauses() {
        use gencfg_parser::Location;
        let args = |texts: &[&str]| -> Vec<Token> {
            texts
                .iter()
                .map(|t| Token::new(*t, Location::builtin(), -1))
                .collect()
        };
        let mut service = Service::default();
        service.parse_service(&args(&["enable", "sshd"])).unwrap();
        service
            .parse_service(&args(&["disable", "telnet", "udp"]))
            .unwrap();

        assert_eq!(service.enable.len(), 1);
        assert_eq!(service.enable[0].name, "sshd");
        // no protocol named: the table's default applies
        assert_eq!(service.enable[0].proto, "tcp");
        assert_eq!(service.disable[0].proto, "udp");
    }
}
