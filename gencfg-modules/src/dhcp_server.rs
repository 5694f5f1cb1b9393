//! DHCP server unit.
//!
//! ```text
//! interface lan0
//!     config ipv4 192.168.1.1/24
//!     dhcp-server
//!         range 50-199
//!         router first
//! ```
//!
//! Most settings default from context during finalize: the subnet from the
//! parent interface's addresses, the served link from the enclosing or a
//! matching interface, the pool from the subnet size, nameservers from the
//! router. Generates the dhcpd subnet declaration and the sysconfig
//! interface list.

use std::any::Any;
use std::io;
use std::net::Ipv4Addr;

use tracing::info;

use gencfg_fs::CfgFs;
use gencfg_parser::{
    command, Error, FinalizeCx, GenCx, NodeSpec, NodeValue, Result, Session, Token, TokenDef,
};

use crate::interface::{AddressConfig, Interface};
use crate::list_items;
use crate::net::Ipv4Net;

const DEFAULT_LEASE_SECS: u64 = 4 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq)]
enum RangeSpec {
    Unset,
    Offsets(u64, u64),
    Addrs(Ipv4Addr, Ipv4Addr),
}

#[derive(Debug)]
pub struct DhcpServer {
    pub net: Option<Ipv4Net>,
    pub domain: Option<String>,
    pub link: Option<String>,
    range_spec: RangeSpec,
    pub range: Option<(Ipv4Addr, Ipv4Addr)>,
    router_spec: Option<String>,
    pub router: Option<Ipv4Addr>,
    ns_spec: Vec<String>,
    pub nameservers: Vec<Ipv4Addr>,
    pub default_lease: u64,
    pub max_lease: u64,
}

impl DhcpServer {
    fn construct(_: &Token, _: &[Token]) -> Result<Box<dyn NodeValue>> {
        Ok(Box::new(DhcpServer {
            net: None,
            domain: None,
            link: None,
            range_spec: RangeSpec::Unset,
            range: None,
            router_spec: None,
            router: None,
            ns_spec: Vec::new(),
            nameservers: Vec::new(),
            default_lease: 0,
            max_lease: 0,
        }))
    }

    fn parse_net(&mut self, args: &[Token]) -> Result<()> {
        let tkn = &args[1];
        let net: Ipv4Net = tkn
            .text
            .parse()
            .map_err(|e: crate::net::NetParseError| Error::semantic(&tkn.location, e.to_string()))?;
        self.net = Some(net.network());
        Ok(())
    }

    fn parse_domain(&mut self, args: &[Token]) -> Result<()> {
        self.domain = Some(args[1].text.clone());
        Ok(())
    }

    fn parse_range(&mut self, args: &[Token]) -> Result<()> {
        if args.len() == 2 {
            // range 50-199
            let tkn = &args[1];
            let invalid =
                || Error::semantic(&tkn.location, format!("invalid range `{}`", tkn.text));
            let (beg, end) = tkn.text.split_once('-').ok_or_else(invalid)?;
            let beg: u64 = beg.parse().map_err(|_| invalid())?;
            let end: u64 = end.parse().map_err(|_| invalid())?;
            self.range_spec = RangeSpec::Offsets(beg, end);
        } else {
            // range 10.0.0.50 - 10.0.0.199
            let beg = parse_addr(&args[1])?;
            let end = parse_addr(&args[3])?;
            self.range_spec = RangeSpec::Addrs(beg, end);
        }
        Ok(())
    }

    fn parse_router(&mut self, args: &[Token]) -> Result<()> {
        self.router_spec = Some(args[1].text.clone());
        Ok(())
    }

    fn parse_dns(&mut self, args: &[Token]) -> Result<()> {
        for tkn in list_items(&args[1..]) {
            self.ns_spec.push(tkn.text.clone());
        }
        Ok(())
    }

    fn parse_lease(&mut self, args: &[Token]) -> Result<()> {
        let tkn = &args[1];
        let secs: u64 = tkn.text.parse().map_err(|_| {
            Error::semantic(&tkn.location, format!("invalid lease time `{}`", tkn.text))
        })?;
        if args[0].is("max-lease") {
            self.max_lease = secs;
        } else {
            self.default_lease = secs;
        }
        Ok(())
    }

    /// Addresses configured on the parent interface, as parsed.
    fn parent_nets(cx: &FinalizeCx<'_>) -> Vec<Ipv4Net> {
        if cx.parent_type() != Some("interface") {
            return Vec::new();
        }
        match cx.parent_value::<Interface>() {
            Some(interface) => match &interface.addresses {
                AddressConfig::Static(addrs) => addrs.iter().map(|a| a.network()).collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    fn check_net(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        let nets = Self::parent_nets(cx);
        if let Some(net) = self.net {
            if cx.parent_type() == Some("interface") && !nets.contains(&net) {
                return Err(Error::semantic(
                    &cx.location(),
                    "DHCP server net not configured for parent interface",
                ));
            }
        } else {
            match nets.first() {
                Some(net) => self.net = Some(*net),
                None => {
                    return Err(Error::semantic(
                        &cx.location(),
                        "DHCP server without a net should be nested under an interface",
                    ))
                }
            }
        }
        Ok(())
    }

    fn check_link(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        let Some(net) = self.net else { return Ok(()) };
        if cx.parent_type() == Some("interface") {
            if let Some(interface) = cx.parent_value::<Interface>() {
                self.link = Some(interface.name.clone());
                return Ok(());
            }
        }
        for &id in cx.session.nodes_of("interface") {
            let Some(interface) = cx.tree.get::<Interface>(id) else {
                continue;
            };
            let AddressConfig::Static(addrs) = &interface.addresses else {
                continue;
            };
            if addrs.iter().any(|a| net.contains(a.addr())) {
                self.link = Some(interface.name.clone());
                break;
            }
        }
        if self.link.is_none() {
            return Err(Error::semantic(
                &cx.location(),
                format!("no link for DHCP server {}", net),
            ));
        }
        Ok(())
    }

    fn check_range(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        let Some(net) = self.net else { return Ok(()) };
        let out_of_net =
            || Error::semantic(&cx.location(), format!("range not within net {}", net));
        self.range = Some(match self.range_spec {
            RangeSpec::Unset => {
                let hosts = net.num_addresses();
                let lo = net.host(hosts / 8 + 1).ok_or_else(out_of_net)?;
                let hi = net.host(hosts / 2 - 2).ok_or_else(out_of_net)?;
                (lo, hi)
            }
            RangeSpec::Offsets(beg, end) => {
                let lo = net.host(beg).ok_or_else(out_of_net)?;
                let hi = net.host(end).ok_or_else(out_of_net)?;
                (lo, hi)
            }
            RangeSpec::Addrs(beg, end) => (beg, end),
        });
        Ok(())
    }

    fn check_router(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        let Some(net) = self.net else { return Ok(()) };
        match self.router_spec.as_deref() {
            None => {
                // default to the parent interface address inside the net
                if let Some(interface) = cx.parent_value::<Interface>() {
                    if let AddressConfig::Static(addrs) = &interface.addresses {
                        self.router = addrs
                            .iter()
                            .map(|a| a.addr())
                            .find(|a| net.contains(*a));
                    }
                }
            }
            Some(spec) if spec.chars().all(|c| c.is_ascii_digit()) => {
                let offset: u64 = spec.parse().map_err(|_| {
                    Error::semantic(&cx.location(), format!("invalid router `{}`", spec))
                })?;
                self.router = Some(net.host(offset).ok_or_else(|| {
                    Error::semantic(&cx.location(), "router not part of net")
                })?);
            }
            Some("first") => self.router = net.host(1),
            Some("last") => self.router = net.host(net.num_addresses() - 2),
            Some(spec) => match spec.parse::<Ipv4Net>() {
                Ok(addr) if net.contains(addr.addr()) => self.router = Some(addr.addr()),
                Ok(_) => {
                    return Err(Error::semantic(&cx.location(), "router not part of net"));
                }
                Err(_) => {
                    return Err(Error::semantic(
                        &cx.location(),
                        format!("invalid router `{}`", spec),
                    ));
                }
            },
        }
        Ok(())
    }

    fn check_dns(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        let Some(net) = self.net else { return Ok(()) };
        if self.ns_spec.is_empty() {
            self.nameservers = self.router.into_iter().collect();
            return Ok(());
        }
        let mut resolved = Vec::with_capacity(self.ns_spec.len());
        for spec in &self.ns_spec {
            let invalid =
                || Error::semantic(&cx.location(), format!("invalid nameserver `{}`", spec));
            if spec == "router" {
                resolved.push(self.router.ok_or_else(invalid)?);
            } else if spec.chars().all(|c| c.is_ascii_digit()) {
                let offset: u64 = spec.parse().map_err(|_| invalid())?;
                resolved.push(net.host(offset).ok_or_else(invalid)?);
            } else {
                let addr: Ipv4Addr = spec.parse().map_err(|_| invalid())?;
                resolved.push(addr);
            }
        }
        self.nameservers = resolved;
        Ok(())
    }

    fn check_lease(&mut self) {
        if self.max_lease == 0 && self.default_lease == 0 {
            self.default_lease = DEFAULT_LEASE_SECS;
        }
        if self.max_lease == 0 {
            self.max_lease = self.default_lease;
        } else if self.default_lease == 0 {
            self.default_lease = self.max_lease;
        }
        if self.max_lease < self.default_lease {
            self.max_lease = self.default_lease;
        }
    }

    fn generate(&self, fs: &mut CfgFs) -> Result<()> {
        let (Some(net), Some((lo, hi))) = (self.net, self.range) else {
            return Ok(());
        };
        info!("generating DHCP server for link {:?}...", self.link);
        let f = fs.open("/etc/dhcpd.conf")?;
        f.write(&format!(
            "subnet {} netmask {} {{",
            net.network().addr(),
            net.netmask()
        ))?;
        if let Some(domain) = &self.domain {
            f.write(&format!("  option domain-name \"{}\";", domain))?;
        }
        let servers: Vec<String> = self.nameservers.iter().map(|a| a.to_string()).collect();
        f.write(&format!(
            "  option domain-name-servers {};",
            servers.join(",")
        ))?;
        if let Some(router) = self.router {
            f.write(&format!("  option routers {};", router))?;
        }
        f.write(&format!("  range {} {};", lo, hi))?;
        f.write(&format!("  default-lease-time {};", self.default_lease))?;
        f.write(&format!("  max-lease-time {};", self.max_lease))?;
        f.write("}")?;
        Ok(())
    }
}

fn parse_addr(tkn: &Token) -> Result<Ipv4Addr> {
    let net: Ipv4Net = tkn
        .text
        .parse()
        .map_err(|e: crate::net::NetParseError| Error::semantic(&tkn.location, e.to_string()))?;
    Ok(net.addr())
}

impl NodeValue for DhcpServer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn finalize(&mut self, cx: &FinalizeCx<'_>) -> Result<()> {
        self.check_net(cx)?;
        self.check_link(cx)?;
        self.check_range(cx)?;
        self.check_router(cx)?;
        self.check_dns(cx)?;
        self.check_lease();
        Ok(())
    }

    fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        writeln!(w, "DHCP server:")?;
        if let Some(net) = &self.net {
            writeln!(w, "    network: {}", net)?;
        }
        if let Some(link) = &self.link {
            writeln!(w, "    link: {}", link)?;
        }
        if let Some((lo, hi)) = &self.range {
            writeln!(w, "    range: {} - {}", lo, hi)?;
        }
        if let Some(router) = &self.router {
            writeln!(w, "    router: {}", router)?;
        }
        let servers: Vec<String> = self.nameservers.iter().map(|a| a.to_string()).collect();
        writeln!(w, "    nameservers: {}", servers.join(","))?;
        writeln!(
            w,
            "    lease: default {}, max {}",
            self.default_lease, self.max_lease
        )
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "net": self.net.map(|n| n.to_string()),
            "link": self.link,
            "domain": self.domain,
            "range": self.range.map(|(lo, hi)| [lo.to_string(), hi.to_string()]),
            "router": self.router.map(|r| r.to_string()),
            "nameservers": self.nameservers.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
            "default_lease": self.default_lease,
            "max_lease": self.max_lease,
        })
    }
}

fn generate_dhcp_servers(cx: &GenCx<'_>, fs: &mut CfgFs) -> Result<()> {
    let mut links = Vec::new();
    for &id in cx.nodes {
        if let Some(server) = cx.tree.get::<DhcpServer>(id) {
            server.generate(fs)?;
            if let Some(link) = &server.link {
                links.push(link.clone());
            }
        }
    }
    let f = fs.open("/etc/sysconfig/dhcpd")?;
    f.write(&format!("INTERFACES=\"{}\"", links.join(" ")))?;
    Ok(())
}

pub fn register(session: &mut Session) -> Result<()> {
    session.define(NodeSpec {
        name: "dhcp-server",
        extra_tokens: 0,
        keywords: &[
            "net",
            "domain",
            "range",
            "router",
            "nameservers",
            "max-lease",
            "default-lease",
        ],
        tokens: vec![TokenDef::pattern(
            r"([0-9]{1,3}\.){3}[0-9]{1,3}(/[0-9]{1,2})?",
            "address",
        )?],
        rules: &[
            ("_net_ _address_", "parse_net"),
            ("_domain_ _token_", "parse_domain"),
            ("_range_ _intrange_", "parse_range"),
            ("_range_ _address_ - _address_", "parse_range"),
            ("_router_ _int_", "parse_router"),
            ("_router_ _address_", "parse_router"),
            ("_router_ _token_", "parse_router"),
            (
                "_nameservers_ (_int_|_address_|_router_)(, (_int_|_address_|_router_))*",
                "parse_dns",
            ),
            ("(_max-lease_|_default-lease_) _int_", "parse_lease"),
        ],
        commands: vec![
            command("parse_net", DhcpServer::parse_net),
            command("parse_domain", DhcpServer::parse_domain),
            command("parse_range", DhcpServer::parse_range),
            command("parse_router", DhcpServer::parse_router),
            command("parse_dns", DhcpServer::parse_dns),
            command("parse_lease", DhcpServer::parse_lease),
        ],
        constructor: Some(DhcpServer::construct),
        generate: Some(generate_dhcp_servers),
    })?;
    Ok(())
}
