//! Command-line interface for gencfg.
//!
//! Reads a configuration file in reduced configuration syntax and generates
//! the corresponding set of standard component-specific full configuration
//! files.
//!
//! Usage:
//!   gencfg `<config-file>` [-P `<profile>`] [-D `<destdir>`]      - Generate
//!   gencfg `<config-file>` --dump `<text|json>`                 - Inspect the parsed tree
//!   gencfg `<config-file>` --check                            - Verify the destination

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

use gencfg_fs::CfgFs;
use gencfg_modules::catalog;
use gencfg_parser::{Parser, Session};

const DEFAULT_PROFILE: &str = "gateway";

fn main() {
    let matches = Command::new("gencfg")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate component configuration files from a reduced configuration")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config-file")
                .help("Reduced configuration file to process")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("profile")
                .long("profile")
                .short('P')
                .help("Configuration profile to use")
                .default_value(DEFAULT_PROFILE),
        )
        .arg(
            Arg::new("destdir")
                .long("destdir")
                .short('D')
                .help("Directory to generate configuration in (default: out/<config>/<profile>)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Increase logging verbosity")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .short('d')
                .help("Enable debug logging for the given site, e.g. gencfg_parser::lexer")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .help("Print the parsed tree instead of generating")
                .value_parser(["text", "json"])
                .num_args(0..=1)
                .default_missing_value("text"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Verify the destination is up to date, writing nothing")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config-file")
        .expect("config-file is required");
    let profile = matches
        .get_one::<String>("profile")
        .expect("profile has a default");
    let verbose = matches.get_count("verbose");
    let debug_sites: Vec<&String> = matches
        .get_many::<String>("debug")
        .map(|v| v.collect())
        .unwrap_or_default();

    init_logging(verbose, &debug_sites);

    let destdir = match matches.get_one::<String>("destdir") {
        Some(dir) => PathBuf::from(dir),
        None => default_destdir(config_file, profile),
    };

    let session = Session::new(profile.clone(), catalog()).unwrap_or_else(|e| {
        eprintln!("gencfg: {}", e);
        std::process::exit(1);
    });
    let mut parser = Parser::new(session, config_file).unwrap_or_else(|e| {
        eprintln!("gencfg: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = parser.parse() {
        eprintln!("gencfg: {}", e);
        std::process::exit(1);
    }

    if let Some(format) = matches.get_one::<String>("dump") {
        dump_tree(&parser, format);
        return;
    }

    let mut fs = CfgFs::new();
    if let Err(e) = parser.generate(&mut fs) {
        eprintln!("gencfg: {}", e);
        std::process::exit(1);
    }

    if matches.get_flag("check") {
        match fs.checkfs(&absolute(&destdir)) {
            Ok(true) => println!("{} is up to date", destdir.display()),
            Ok(false) => {
                println!("{} is out of date", destdir.display());
                std::process::exit(2);
            }
            Err(e) => {
                eprintln!("gencfg: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    match fs.commit(&absolute(&destdir)) {
        Ok(true) => println!("configuration written to {}", destdir.display()),
        Ok(false) => println!("{} already up to date", destdir.display()),
        Err(e) => {
            eprintln!("gencfg: {}", e);
            std::process::exit(1);
        }
    }
}

/// Map `-v` counts and `-d` sites onto a tracing filter. `-d` without a
/// match-all site restricts debug output to the named targets.
fn init_logging(verbose: u8, debug_sites: &[&String]) {
    let base = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let mut filter = EnvFilter::new(base);
    for site in debug_sites {
        let directive = if *site == "*" || *site == "all" {
            "debug".to_string()
        } else {
            format!("{}=debug", site)
        };
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// `out/<config basename>/<profile>`, absolute.
fn default_destdir(config_file: &str, profile: &str) -> PathBuf {
    let base = Path::new(config_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    absolute(&PathBuf::from("out").join(base).join(profile))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    }
}

fn dump_tree(parser: &Parser, format: &str) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = match format {
        "json" => writeln!(
            out,
            "{}",
            serde_json::to_string_pretty(&parser.describe()).unwrap_or_default()
        ),
        _ => parser.dump(&mut out),
    };
    if let Err(e) = result {
        eprintln!("gencfg: {}", e);
        std::process::exit(1);
    }
}
