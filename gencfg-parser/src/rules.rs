//! Rule patterns and their compiled matchers.
//!
//! A rule pattern describes one clause of a node block as a sequence of kind
//! placeholders and literal connectives:
//!
//! ```text
//! _vlans_ (_int_|_intrange_)(, (_int_|_intrange_))*
//! _range_ _address_ - _address_
//! (_max-lease_|_default-lease_) _int_
//! ```
//!
//! Placeholders are kind names between `_` sentinels; `,` and `-` stand for
//! the comma and dash kinds; `()`, `|`, `*`, `+` and `?` carry their usual
//! meaning; whitespace only separates. Compilation resolves every placeholder
//! against the session's kind registry and produces a small nondeterministic
//! automaton over kind ids. Matching finds the longest prefix of a classified
//! token buffer a rule accepts; the engine picks the rule with the longest
//! prefix overall and breaks ties in favor of the rule registered first.

use crate::error::{Error, Result};
use crate::token::{KindId, KindRegistry};

#[derive(Debug, Clone, PartialEq)]
enum PatTok {
    Kind(String),
    Comma,
    Dash,
    LParen,
    RParen,
    Pipe,
    Star,
    Plus,
    Quest,
}

#[derive(Debug)]
enum Ast {
    Kind(KindId),
    Seq(Vec<Ast>),
    Alt(Vec<Ast>),
    Star(Box<Ast>),
    Plus(Box<Ast>),
    Opt(Box<Ast>),
}

#[derive(Debug, Clone)]
enum Inst {
    Atom(KindId),
    Split(usize, usize),
    Jmp(usize),
    Accept,
}

/// A compiled rule matcher.
#[derive(Debug)]
pub struct RuleProgram {
    insts: Vec<Inst>,
}

/// Split a pattern string into placeholder and connective tokens.
fn scan(pattern: &str) -> Result<Vec<PatTok>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' => i += 1,
            ',' => {
                out.push(PatTok::Comma);
                i += 1;
            }
            '-' => {
                out.push(PatTok::Dash);
                i += 1;
            }
            '(' => {
                out.push(PatTok::LParen);
                i += 1;
            }
            ')' => {
                out.push(PatTok::RParen);
                i += 1;
            }
            '|' => {
                out.push(PatTok::Pipe);
                i += 1;
            }
            '*' => {
                out.push(PatTok::Star);
                i += 1;
            }
            '+' => {
                out.push(PatTok::Plus);
                i += 1;
            }
            '?' => {
                out.push(PatTok::Quest);
                i += 1;
            }
            '_' => {
                let mut end = None;
                for (j, &c) in chars.iter().enumerate().skip(i + 1) {
                    if c == '_' {
                        end = Some(j);
                        break;
                    }
                    if c == ' ' {
                        break;
                    }
                }
                let end = end.ok_or_else(|| {
                    Error::grammar(pattern, "unterminated kind placeholder")
                })?;
                out.push(PatTok::Kind(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            other => {
                return Err(Error::grammar(
                    pattern,
                    format!("unexpected character `{}`", other),
                ));
            }
        }
    }
    Ok(out)
}

struct PatParser<'a> {
    pattern: &'a str,
    toks: Vec<PatTok>,
    pos: usize,
    kinds: &'a KindRegistry,
}

impl<'a> PatParser<'a> {
    fn peek(&self) -> Option<&PatTok> {
        self.toks.get(self.pos)
    }

    fn alt(&mut self) -> Result<Ast> {
        let mut branches = vec![self.seq()?];
        while self.peek() == Some(&PatTok::Pipe) {
            self.pos += 1;
            branches.push(self.seq()?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().unwrap_or(Ast::Seq(Vec::new())))
        } else {
            Ok(Ast::Alt(branches))
        }
    }

    fn seq(&mut self) -> Result<Ast> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None | Some(PatTok::Pipe) | Some(PatTok::RParen) => break,
                _ => items.push(self.repeat()?),
            }
        }
        Ok(Ast::Seq(items))
    }

    fn repeat(&mut self) -> Result<Ast> {
        let atom = self.atom()?;
        match self.peek() {
            Some(PatTok::Star) => {
                self.pos += 1;
                Ok(Ast::Star(Box::new(atom)))
            }
            Some(PatTok::Plus) => {
                self.pos += 1;
                Ok(Ast::Plus(Box::new(atom)))
            }
            Some(PatTok::Quest) => {
                self.pos += 1;
                Ok(Ast::Opt(Box::new(atom)))
            }
            _ => Ok(atom),
        }
    }

    fn atom(&mut self) -> Result<Ast> {
        let tok = self.peek().cloned();
        match tok {
            Some(PatTok::Kind(name)) => {
                self.pos += 1;
                let id = self.kinds.id(&name).ok_or_else(|| {
                    Error::grammar(self.pattern, format!("unknown token kind `_{}_`", name))
                })?;
                Ok(Ast::Kind(id))
            }
            Some(PatTok::Comma) => {
                self.pos += 1;
                self.literal("comma")
            }
            Some(PatTok::Dash) => {
                self.pos += 1;
                self.literal("dash")
            }
            Some(PatTok::LParen) => {
                self.pos += 1;
                let inner = self.alt()?;
                if self.peek() != Some(&PatTok::RParen) {
                    return Err(Error::grammar(self.pattern, "unbalanced `(`"));
                }
                self.pos += 1;
                Ok(inner)
            }
            _ => Err(Error::grammar(self.pattern, "malformed pattern")),
        }
    }

    fn literal(&self, kind: &str) -> Result<Ast> {
        let id = self
            .kinds
            .id(kind)
            .ok_or_else(|| Error::grammar(self.pattern, format!("unknown token kind `{}`", kind)))?;
        Ok(Ast::Kind(id))
    }
}

fn emit(ast: &Ast, insts: &mut Vec<Inst>) {
    match ast {
        Ast::Kind(id) => insts.push(Inst::Atom(*id)),
        Ast::Seq(items) => {
            for item in items {
                emit(item, insts);
            }
        }
        Ast::Alt(branches) => {
            // chain of splits, one jump past the end per branch
            let mut jumps = Vec::new();
            for (i, branch) in branches.iter().enumerate() {
                let last = i + 1 == branches.len();
                if last {
                    emit(branch, insts);
                } else {
                    let split = insts.len();
                    insts.push(Inst::Split(0, 0));
                    emit(branch, insts);
                    jumps.push(insts.len());
                    insts.push(Inst::Jmp(0));
                    let next = insts.len();
                    insts[split] = Inst::Split(split + 1, next);
                }
            }
            let end = insts.len();
            for j in jumps {
                insts[j] = Inst::Jmp(end);
            }
        }
        Ast::Star(inner) => {
            let split = insts.len();
            insts.push(Inst::Split(0, 0));
            emit(inner, insts);
            insts.push(Inst::Jmp(split));
            let end = insts.len();
            insts[split] = Inst::Split(split + 1, end);
        }
        Ast::Plus(inner) => {
            let start = insts.len();
            emit(inner, insts);
            let split = insts.len();
            insts.push(Inst::Split(start, split + 1));
        }
        Ast::Opt(inner) => {
            let split = insts.len();
            insts.push(Inst::Split(0, 0));
            emit(inner, insts);
            let end = insts.len();
            insts[split] = Inst::Split(split + 1, end);
        }
    }
}

/// Compile `pattern` against the kinds currently registered.
pub fn compile_pattern(pattern: &str, kinds: &KindRegistry) -> Result<RuleProgram> {
    let toks = scan(pattern)?;
    let mut parser = PatParser {
        pattern,
        toks,
        pos: 0,
        kinds,
    };
    let ast = parser.alt()?;
    if parser.pos != parser.toks.len() {
        return Err(Error::grammar(pattern, "unbalanced `)`"));
    }
    let mut insts = Vec::new();
    emit(&ast, &mut insts);
    insts.push(Inst::Accept);
    Ok(RuleProgram { insts })
}

impl RuleProgram {
    /// Length of the longest input prefix this rule accepts, if any.
    pub fn longest_match(&self, input: &[KindId]) -> Option<usize> {
        let mut current = vec![false; self.insts.len()];
        self.closure(0, &mut current);
        let mut best = if self.accepts(&current) { Some(0) } else { None };

        for (i, id) in input.iter().enumerate() {
            let mut next = vec![false; self.insts.len()];
            let mut any = false;
            for (pc, active) in current.iter().enumerate() {
                if !active {
                    continue;
                }
                if let Inst::Atom(want) = &self.insts[pc] {
                    if want == id {
                        self.closure(pc + 1, &mut next);
                        any = true;
                    }
                }
            }
            if !any {
                break;
            }
            if self.accepts(&next) {
                best = Some(i + 1);
            }
            current = next;
        }
        best
    }

    fn closure(&self, pc: usize, set: &mut [bool]) {
        let mut stack = vec![pc];
        while let Some(pc) = stack.pop() {
            if set[pc] {
                continue;
            }
            set[pc] = true;
            match &self.insts[pc] {
                Inst::Split(a, b) => {
                    stack.push(*a);
                    stack.push(*b);
                }
                Inst::Jmp(t) => stack.push(*t),
                Inst::Atom(_) | Inst::Accept => {}
            }
        }
    }

    fn accepts(&self, set: &[bool]) -> bool {
        set.iter()
            .enumerate()
            .any(|(pc, active)| *active && matches!(self.insts[pc], Inst::Accept))
    }
}
