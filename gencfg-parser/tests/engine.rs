//! End-to-end tests of the parse engine over real input files.

use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;
use tempfile::TempDir;

use gencfg_parser::testing::{fixture_catalog, Branch, Leaf};
use gencfg_parser::{Error, Parser, Session};

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn parse(content: &str) -> Parser {
    try_parse(content).unwrap()
}

fn try_parse(content: &str) -> Result<Parser, Error> {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "main.cfg", content);
    let session = Session::new("gateway", fixture_catalog())?;
    let mut parser = Parser::new(session, &path)?;
    parser.parse()?;
    Ok(parser)
}

fn leaf<'a>(parser: &'a Parser, index: usize) -> &'a Leaf {
    let nodes = parser.session().nodes_of("leaf");
    parser.tree().get::<Leaf>(nodes[index]).unwrap()
}

#[test]
fn test_single_clause_dispatch() {
    let parser = parse("leaf\n  greet world\n");
    assert_eq!(parser.session().nodes_of("leaf").len(), 1);
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("world"));
}

#[test]
fn test_unmatched_clause_is_a_syntax_error_at_its_line() {
    let err = try_parse("leaf\n  bogus world\n").unwrap_err();
    let Error::Syntax { location, message } = &err else {
        panic!("expected syntax error, got {err}");
    };
    assert_eq!(location.line, 2);
    assert!(message.contains("bogus"));
}

#[test]
fn test_tie_break_prefers_first_registered_rule() {
    // `set_alias` is bound to an identical, later-registered rule
    let parser = parse("leaf\n  greet world\n");
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("world"));
    assert_eq!(leaf(&parser, 0).alias, None);
}

#[test]
fn test_comma_list_clause() {
    let parser = parse("leaf\n  note alpha, beta, gamma\n");
    assert_eq!(leaf(&parser, 0).notes, vec!["alpha", "beta", "gamma"]);
}

#[test]
fn test_sibling_nodes_split_at_level_boundary() {
    let parser = parse("leaf\n  greet one\nleaf\n  greet two\n");
    assert_eq!(parser.session().nodes_of("leaf").len(), 2);
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("one"));
    assert_eq!(leaf(&parser, 1).name.as_deref(), Some("two"));
}

#[test]
fn test_nested_nodes_attach_to_the_enclosing_block() {
    let parser = parse("branch\n  leaf\n    greet deep\n  leaf\n    greet peer\n");
    let branches = parser.session().nodes_of("branch");
    assert_eq!(branches.len(), 1);
    let children = parser.tree().children(branches[0]);
    assert_eq!(children.len(), 2);
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("deep"));
}

#[test]
fn test_finalize_is_preorder() {
    // branch observes its child's name before the child defaults it
    let parser = parse("branch\n  leaf\n");
    let branches = parser.session().nodes_of("branch");
    let branch = parser.tree().get::<Branch>(branches[0]).unwrap();
    assert_eq!(branch.observed, vec![None]);
    // ...while the child did default it during its own finalize
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("anonymous"));
}

#[test]
fn test_unknown_top_level_node_type() {
    let err = try_parse("widget\n").unwrap_err();
    let Error::Syntax { location, message } = &err else {
        panic!("expected syntax error, got {err}");
    };
    assert_eq!(location.line, 1);
    assert!(message.contains("widget"));
}

#[test]
fn test_include_splices_tokens() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sub.cfg", "leaf\n  greet included\n");
    let main = write(dir.path(), "main.cfg", "leaf\n  greet first\n@include sub.cfg\n");

    let session = Session::new("gateway", fixture_catalog()).unwrap();
    let mut parser = Parser::new(session, &main).unwrap();
    parser.parse().unwrap();

    assert_eq!(parser.session().nodes_of("leaf").len(), 2);
    assert_eq!(leaf(&parser, 1).name.as_deref(), Some("included"));
}

#[test]
fn test_include_base_level_follows_the_directive() {
    // included at level 2, so the included `leaf` header lands inside the
    // enclosing branch block
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sub.cfg", "leaf\n  greet nested\n");
    let main = write(dir.path(), "main.cfg", "branch\n  @include sub.cfg\n");

    let session = Session::new("gateway", fixture_catalog()).unwrap();
    let mut parser = Parser::new(session, &main).unwrap();
    parser.parse().unwrap();

    let branches = parser.session().nodes_of("branch");
    assert_eq!(parser.tree().children(branches[0]).len(), 1);
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("nested"));
}

#[test]
fn test_inclusion_cycle_is_detected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.cfg", "@include b.cfg\n");
    let a = dir.path().join("a.cfg");
    write(dir.path(), "b.cfg", "@include a.cfg\n");

    let session = Session::new("gateway", fixture_catalog()).unwrap();
    let mut parser = Parser::new(session, &a).unwrap();
    let err = parser.parse().unwrap_err();
    assert!(matches!(err, Error::Cycle { .. }));
}

#[test]
fn test_missing_include_is_a_read_error() {
    let err = try_parse("@include nowhere.cfg\n").unwrap_err();
    assert!(matches!(err, Error::Read { .. }));
}

#[test]
fn test_modules_directive_preloads_units() {
    let parser = parse("@modules leaf, branch\nleaf\n  greet early\n");
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("early"));
}

#[test]
fn test_modules_directive_unknown_unit() {
    let err = try_parse("@modules nonexistent\n").unwrap_err();
    let Error::UnitNotFound {
        name, namespaces, ..
    } = &err
    else {
        panic!("expected unit-not-found, got {err}");
    };
    assert_eq!(name, "nonexistent");
    assert_eq!(namespaces, &["gateway", "common"]);
}

#[rstest]
#[case::spaces("leaf\n  greet a\n")]
#[case::tab("leaf\n\tgreet a\n")]
#[case::mixed("leaf\n \t greet a\n")]
fn test_any_deeper_indentation_opens_the_block(#[case] input: &str) {
    let parser = parse(input);
    assert_eq!(leaf(&parser, 0).name.as_deref(), Some("a"));
}

#[test]
fn test_empty_input_yields_only_the_root() {
    let parser = parse("# nothing but comments\n\n");
    assert_eq!(parser.tree().children(parser.root()).len(), 0);
}

#[test]
fn test_describe_reports_node_types() {
    let parser = parse("branch\n  leaf\n    greet deep\n");
    let json = parser.describe();
    assert_eq!(json["type"], "root");
    assert_eq!(json["children"][0]["type"], "branch");
    assert_eq!(json["children"][0]["children"][0]["type"], "leaf");
}
