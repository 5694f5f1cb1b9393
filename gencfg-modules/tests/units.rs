//! End-to-end tests: reduced configuration in, staged artifacts out.

use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;
use tempfile::TempDir;

use gencfg_fs::CfgFs;
use gencfg_modules::catalog;
use gencfg_modules::dhcp_server::DhcpServer;
use gencfg_modules::interface::{AddressConfig, Interface};
use gencfg_parser::{Error, Parser, Session};

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn parse(content: &str) -> Result<Parser, Error> {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "net.cfg", content);
    let session = Session::new("gateway", catalog())?;
    let mut parser = Parser::new(session, &path)?;
    parser.parse()?;
    Ok(parser)
}

fn generated(content: &str) -> CfgFs {
    let parser = parse(content).unwrap();
    let mut fs = CfgFs::new();
    parser.generate(&mut fs).unwrap();
    fs
}

#[test]
fn test_interface_with_static_addresses_and_vlans() {
    let parser = parse(
        "interface lan0\n\
         \x20   config ipv4 192.168.1.1/24, 10.0.0.1/16\n\
         \x20   vlans 10, 20-22\n",
    )
    .unwrap();
    let nodes = parser.session().nodes_of("interface");
    assert_eq!(nodes.len(), 1);
    let interface = parser.tree().get::<Interface>(nodes[0]).unwrap();
    assert_eq!(interface.name, "lan0");
    assert_eq!(interface.vlans, vec![10, 20, 21, 22]);
    let AddressConfig::Static(addrs) = &interface.addresses else {
        panic!("expected static addresses");
    };
    assert_eq!(addrs.len(), 2);
}

#[rstest]
#[case::single("10", vec![10])]
#[case::range("10-12", vec![10, 11, 12])]
#[case::descending_range("12-10", vec![10, 11, 12])]
#[case::mixed("30, 10-11", vec![10, 11, 30])]
fn test_vlan_clause_shapes(#[case] spec: &str, #[case] expected: Vec<u32>) {
    let parser = parse(&format!(
        "interface lan0\n    config dhcp\n    vlans {}\n",
        spec
    ))
    .unwrap();
    let nodes = parser.session().nodes_of("interface");
    let interface = parser.tree().get::<Interface>(nodes[0]).unwrap();
    assert_eq!(interface.vlans, expected);
}

#[test]
fn test_interface_without_config_fails_finalize() {
    let err = parse("interface lan0\n    vlans 10\n").unwrap_err();
    let Error::Semantic { message, .. } = &err else {
        panic!("expected semantic error, got {err}");
    };
    assert!(message.contains("no configuration"));
}

#[test]
fn test_vlan_subinterface_must_not_nest_vlans() {
    let err = parse("interface lan0.10\n    config dhcp\n    vlans 20\n").unwrap_err();
    let Error::Semantic { message, .. } = &err else {
        panic!("expected semantic error, got {err}");
    };
    assert!(message.contains("nested VLANs"));
}

#[test]
fn test_dhcp_server_defaults_from_parent_interface() {
    let parser = parse(
        "interface lan0\n\
         \x20   config ipv4 192.168.1.1/24\n\
         \x20   dhcp-server\n",
    )
    .unwrap();
    let nodes = parser.session().nodes_of("dhcp-server");
    assert_eq!(nodes.len(), 1);
    let server = parser.tree().get::<DhcpServer>(nodes[0]).unwrap();

    assert_eq!(server.net.unwrap().to_string(), "192.168.1.0/24");
    assert_eq!(server.link.as_deref(), Some("lan0"));
    // pool defaults to [hosts/8 + 1, hosts/2 - 2]
    let (lo, hi) = server.range.unwrap();
    assert_eq!(lo.to_string(), "192.168.1.33");
    assert_eq!(hi.to_string(), "192.168.1.126");
    // router defaults to the parent address inside the net
    assert_eq!(server.router.unwrap().to_string(), "192.168.1.1");
    // nameservers default to the router
    assert_eq!(server.nameservers.len(), 1);
    assert_eq!(server.nameservers[0].to_string(), "192.168.1.1");
    assert_eq!(server.default_lease, 4 * 60 * 60);
    assert_eq!(server.max_lease, 4 * 60 * 60);
}

#[test]
fn test_dhcp_server_explicit_settings() {
    let parser = parse(
        "interface lan0\n\
         \x20   config ipv4 192.168.1.1/24\n\
         \x20   dhcp-server\n\
         \x20       domain example.test\n\
         \x20       range 50-199\n\
         \x20       router first\n\
         \x20       nameservers router, 9.9.9.9\n\
         \x20       default-lease 600\n\
         \x20       max-lease 7200\n",
    )
    .unwrap();
    let nodes = parser.session().nodes_of("dhcp-server");
    let server = parser.tree().get::<DhcpServer>(nodes[0]).unwrap();

    assert_eq!(server.domain.as_deref(), Some("example.test"));
    let (lo, hi) = server.range.unwrap();
    assert_eq!(lo.to_string(), "192.168.1.50");
    assert_eq!(hi.to_string(), "192.168.1.199");
    assert_eq!(server.router.unwrap().to_string(), "192.168.1.1");
    let servers: Vec<String> = server.nameservers.iter().map(|a| a.to_string()).collect();
    assert_eq!(servers, vec!["192.168.1.1", "9.9.9.9"]);
    assert_eq!(server.default_lease, 600);
    assert_eq!(server.max_lease, 7200);
}

#[test]
fn test_dhcp_server_address_range() {
    let parser = parse(
        "interface lan0\n\
         \x20   config ipv4 192.168.1.1/24\n\
         \x20   dhcp-server\n\
         \x20       range 192.168.1.100 - 192.168.1.150\n",
    )
    .unwrap();
    let nodes = parser.session().nodes_of("dhcp-server");
    let server = parser.tree().get::<DhcpServer>(nodes[0]).unwrap();
    let (lo, hi) = server.range.unwrap();
    assert_eq!(lo.to_string(), "192.168.1.100");
    assert_eq!(hi.to_string(), "192.168.1.150");
}

#[test]
fn test_dhcp_server_net_must_match_parent() {
    let err = parse(
        "interface lan0\n\
         \x20   config ipv4 192.168.1.1/24\n\
         \x20   dhcp-server\n\
         \x20       net 10.9.0.0/24\n",
    )
    .unwrap_err();
    let Error::Semantic { message, .. } = &err else {
        panic!("expected semantic error, got {err}");
    };
    assert!(message.contains("not configured for parent"));
}

#[test]
fn test_top_level_dhcp_server_finds_link_by_net() {
    let parser = parse(
        "interface lan0\n\
         \x20   config ipv4 10.1.0.1/16\n\
         dhcp-server\n\
         \x20   net 10.1.0.0/16\n",
    )
    .unwrap();
    let nodes = parser.session().nodes_of("dhcp-server");
    let server = parser.tree().get::<DhcpServer>(nodes[0]).unwrap();
    assert_eq!(server.link.as_deref(), Some("lan0"));
}

#[test]
fn test_top_level_dhcp_server_without_net_fails() {
    let err = parse("dhcp-server\n    range 10-20\n").unwrap_err();
    let Error::Semantic { message, .. } = &err else {
        panic!("expected semantic error, got {err}");
    };
    assert!(message.contains("nested under an interface"));
}

#[test]
fn test_generated_network_and_dhcp_artifacts() {
    let fs = generated(
        "interface lan0\n\
         \x20   config ipv4 192.168.1.1/24\n\
         \x20   dhcp-server\n\
         \x20       range 50-199\n",
    );
    let paths: Vec<String> = fs.paths().map(|p| p.to_string_lossy().into_owned()).collect();
    assert!(paths.contains(&"/etc/systemd/network/10-lan0.network".to_string()));
    assert!(paths.contains(&"/etc/dhcpd.conf".to_string()));
    assert!(paths.contains(&"/etc/sysconfig/dhcpd".to_string()));

    let mut fs = fs;
    let dhcpd = fs.open("/etc/dhcpd.conf").unwrap().content();
    assert!(dhcpd.contains("subnet 192.168.1.0 netmask 255.255.255.0 {"));
    assert!(dhcpd.contains("range 192.168.1.50 192.168.1.199;"));
    let sysconfig = fs.open("/etc/sysconfig/dhcpd").unwrap().content();
    assert_eq!(sysconfig, "INTERFACES=\"lan0\"\n");
}

#[test]
fn test_firewall_clauses_are_collected() {
    let parser = parse(
        "firewall\n\
         \x20   accept ssh dns\n\
         \x20   snat on wan0\n\
         \x20   isolate lan0, guest0\n",
    )
    .unwrap();
    let nodes = parser.session().nodes_of("firewall");
    let fw = parser
        .tree()
        .get::<gencfg_modules::firewall::Firewall>(nodes[0])
        .unwrap();
    assert_eq!(fw.accepts, vec![vec!["ssh", "dns"]]);
    assert_eq!(fw.snats, vec![vec!["wan0"]]);
    assert_eq!(fw.isolations, vec![vec!["lan0", "guest0"]]);
}

#[test]
fn test_service_enablement_generates_symlinks() {
    let fs = generated("service\n    enable sshd\n    disable telnet\n");
    assert!(fs.paths().any(|p| {
        p.to_string_lossy() == "/etc/systemd/system/multi-user.target.wants/sshd.service"
    }));
}

#[test]
fn test_hardware_sysconfig() {
    let mut fs = generated(
        "hardware\n    ethernet sort-mac lan0=00:11:22:33:44:55, wan0\n",
    );
    assert_eq!(
        fs.open("/etc/sysconfig/ethernet").unwrap().content(),
        "INTERFACES=\"lan0=00:11:22:33:44:55,wan0\"\nSETUP_METHOD=\"sort-mac\"\n"
    );
}

#[test]
fn test_single_dnsmasq_nameserver_is_accepted() {
    let parser = parse("nameserver dnsmasq\n").unwrap();
    let mut fs = CfgFs::new();
    parser.generate(&mut fs).unwrap();
}

#[test]
fn test_bind_nameserver_is_rejected_at_generation() {
    let parser = parse("nameserver bind\n").unwrap();
    let mut fs = CfgFs::new();
    let err = parser.generate(&mut fs).unwrap_err();
    assert!(err.to_string().contains("bind"));
}

#[test]
fn test_duplicate_nameserver_definitions_are_rejected() {
    let parser = parse("nameserver dnsmasq\nnameserver dnsmasq\n").unwrap();
    let mut fs = CfgFs::new();
    let err = parser.generate(&mut fs).unwrap_err();
    assert!(err.to_string().contains("more than one"));
}

#[test]
fn test_modules_directive_with_real_units() {
    let parser = parse(
        "@modules interface, firewall\n\
         interface wan0\n\
         \x20   config dhcp\n",
    )
    .unwrap();
    assert_eq!(parser.session().nodes_of("interface").len(), 1);
}

#[test]
fn test_tree_dump_covers_all_nodes() {
    let parser = parse(
        "interface lan0\n\
         \x20   config ipv4 192.168.1.1/24\n\
         hardware\n\
         \x20   ethernet sort-mac lan0\n",
    )
    .unwrap();
    let mut out = Vec::new();
    parser.dump(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("interface lan0:"));
    assert!(text.contains("ethernet devices:"));
}

#[test]
fn test_describe_renders_interface_detail() {
    let parser = parse("interface lan0\n    config dhcp\n").unwrap();
    let json = parser.describe();
    assert_eq!(json["children"][0]["type"], "interface");
    assert_eq!(json["children"][0]["detail"]["name"], "lan0");
    assert_eq!(json["children"][0]["detail"]["addresses"], "dhcp");
}
