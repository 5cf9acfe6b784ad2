//! Term model and KIF parser/serializer.
//!
//! [`Term`] is the sum type every assertion, rule, and query pattern is built
//! from: atoms (predicates, constants, operators), variables, and ordered
//! lists. Terms are immutable and structurally hashed so two terms built from
//! equal text always compare equal, regardless of where they were parsed.
//!
//! `toKif ∘ parseKif ∘ toKif = toKif` is the round-trip property checked in
//! this module's tests (§8 property 1).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Reserved operators with special meaning to the reasoners (§3.1).
pub const OP_IMPLIES: &str = "=>";
pub const OP_IFF: &str = "<=>";
pub const OP_AND: &str = "and";
pub const OP_OR: &str = "or";
pub const OP_NOT: &str = "not";
pub const OP_FORALL: &str = "forall";
pub const OP_EXISTS: &str = "exists";
pub const OP_EQ: &str = "=";
pub const OP_ASK_USER: &str = "ask-user";

/// A symbolic term: an atom, a logical variable, or an ordered list.
///
/// Terms are immutable. Equality and hashing are structural, so two terms
/// built independently from the same text always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Term {
    /// A predicate, constant, or operator symbol. Never starts with `?`.
    Atom(String),
    /// A logical variable. Always starts with `?` in its printed form; the
    /// stored name omits the sigil.
    Var(String),
    /// An ordered application/list. The empty list never matches a rule
    /// antecedent (§3.1).
    Lst(Vec<Term>),
}

impl Term {
    /// Build an atom, validating it does not look like a variable.
    pub fn atom(name: impl Into<String>) -> Self {
        let name = name.into();
        debug_assert!(!name.starts_with('?'), "atom name must not start with '?': {name}");
        Term::Atom(name)
    }

    /// Build a variable from a bare name (without the leading `?`).
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    /// Build a list term.
    pub fn list(children: impl IntoIterator<Item = Term>) -> Self {
        Term::Lst(children.into_iter().collect())
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Atom(_) => true,
            Term::Var(_) => false,
            Term::Lst(children) => children.iter().all(Term::is_ground),
        }
    }

    /// The operator head of a list term (its first child, if an Atom).
    pub fn head_op(&self) -> Option<&str> {
        match self {
            Term::Lst(children) => match children.first() {
                Some(Term::Atom(op)) => Some(op.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Children of a list term, or an empty slice for atoms/vars.
    pub fn children(&self) -> &[Term] {
        match self {
            Term::Lst(c) => c,
            _ => &[],
        }
    }

    /// Collect every distinct variable name occurring anywhere in this term,
    /// in first-occurrence order.
    pub fn free_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            Term::Var(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Term::Atom(_) => {}
            Term::Lst(children) => {
                for c in children {
                    c.collect_vars(out);
                }
            }
        }
    }

    /// `(not self)`.
    pub fn negate(&self) -> Term {
        Term::list([Term::atom(OP_NOT), self.clone()])
    }

    /// If this term is `(not x)`, return `x`.
    pub fn negation_of(&self) -> Option<&Term> {
        match self {
            Term::Lst(children) if children.len() == 2 => match &children[0] {
                Term::Atom(op) if op == OP_NOT => Some(&children[1]),
                _ => None,
            },
            _ => None,
        }
    }

    /// Render to canonical KIF text.
    pub fn to_kif(&self) -> String {
        let mut buf = String::new();
        self.write_kif(&mut buf);
        buf
    }

    fn write_kif(&self, buf: &mut String) {
        match self {
            Term::Atom(name) => {
                if needs_quoting(name) {
                    write_quoted(buf, name);
                } else {
                    buf.push_str(name);
                }
            }
            Term::Var(name) => {
                buf.push('?');
                buf.push_str(name);
            }
            Term::Lst(children) => {
                buf.push('(');
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        buf.push(' ');
                    }
                    c.write_kif(buf);
                }
                buf.push(')');
            }
        }
    }

    /// Parse a single term from KIF text. Errors if there is trailing
    /// non-whitespace/non-comment content after the first term.
    pub fn parse_kif(text: &str) -> Result<Term, ParseError> {
        let mut parser = Parser::new(text);
        let term = parser.parse_term()?;
        parser.skip_trivia();
        if let Some((line, col, _)) = parser.peek_non_trivia() {
            return Err(ParseError::new(line, col, "trailing content after term"));
        }
        Ok(term)
    }

    /// Parse every top-level term in a KIF text blob (one document with many
    /// independent forms, e.g. a batch of assertions).
    pub fn parse_kif_many(text: &str) -> Result<Vec<Term>, ParseError> {
        let mut parser = Parser::new(text);
        let mut out = Vec::new();
        loop {
            parser.skip_trivia();
            if parser.at_eof() {
                break;
            }
            out.push(parser.parse_term()?);
        }
        Ok(out)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_kif())
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.starts_with('?')
        || s.chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';')
}

fn write_quoted(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\t' => buf.push_str("\\t"),
            _ => buf.push(c),
        }
    }
    buf.push('"');
}

// ---------------------------------------------------------------------------
// Parser: recursive-descent over whitespace-delimited tokens (§4.1).
// ---------------------------------------------------------------------------

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    _src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            _src: src,
        }
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn pos_tag(&self) -> (usize, usize) {
        (self.line, self.col)
    }

    /// Skip whitespace and `;`-to-end-of-line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some(';') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Peek the next non-trivia character without consuming, returning its position.
    fn peek_non_trivia(&mut self) -> Option<(usize, usize, char)> {
        self.skip_trivia();
        self.peek().map(|c| (self.line, self.col, c))
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        self.skip_trivia();
        let (line, col) = self.pos_tag();
        match self.peek() {
            None => Err(ParseError::new(line, col, "unexpected EOF, expected a term")),
            Some('(') => self.parse_list(),
            Some(')') => Err(ParseError::new(line, col, "unexpected ')'")),
            Some('"') => self.parse_string(),
            Some('?') => self.parse_var(),
            Some(_) => self.parse_bare_atom(),
        }
    }

    fn parse_list(&mut self) -> Result<Term, ParseError> {
        let (open_line, open_col) = self.pos_tag();
        self.advance(); // consume '('
        let mut children = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        open_line,
                        open_col,
                        "unterminated list: EOF before matching ')'",
                    ))
                }
                Some(')') => {
                    self.advance();
                    return Ok(Term::Lst(children));
                }
                _ => children.push(self.parse_term()?),
            }
        }
    }

    fn parse_string(&mut self) -> Result<Term, ParseError> {
        let (line, col) = self.pos_tag();
        self.advance(); // consume opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::new(line, col, "unterminated string literal")),
                Some('"') => return Ok(Term::Atom(s)),
                Some('\\') => match self.advance() {
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(other) => {
                        s.push('\\');
                        s.push(other);
                    }
                    None => return Err(ParseError::new(line, col, "unterminated string literal")),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn parse_var(&mut self) -> Result<Term, ParseError> {
        let (line, col) = self.pos_tag();
        self.advance(); // consume '?'
        let name = self.read_run();
        if name.is_empty() {
            return Err(ParseError::new(line, col, "'?' not followed by a variable name"));
        }
        Ok(Term::Var(name))
    }

    fn parse_bare_atom(&mut self) -> Result<Term, ParseError> {
        let (line, col) = self.pos_tag();
        let name = self.read_run();
        if name.is_empty() {
            return Err(ParseError::new(line, col, "expected an atom"));
        }
        Ok(Term::Atom(name))
    }

    /// Read a run of non-whitespace, non-paren, non-quote, non-comment characters.
    fn read_run(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';' {
                break;
            }
            s.push(c);
            self.advance();
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(name: &str) -> Term {
        Term::atom(name)
    }
    fn v(name: &str) -> Term {
        Term::var(name)
    }

    #[test]
    fn parses_flat_list() {
        let t = Term::parse_kif("(instance rex Dog)").unwrap();
        assert_eq!(t, Term::list([a("instance"), a("rex"), a("Dog")]));
    }

    #[test]
    fn parses_nested_list() {
        let t = Term::parse_kif("(=> (instance ?x Dog) (attribute ?x Canine))").unwrap();
        assert_eq!(
            t,
            Term::list([
                a("=>"),
                Term::list([a("instance"), v("x"), a("Dog")]),
                Term::list([a("attribute"), v("x"), a("Canine")]),
            ])
        );
    }

    #[test]
    fn parses_quoted_string_with_escapes() {
        let t = Term::parse_kif(r#"(ask-user "color?\nplease")"#).unwrap();
        assert_eq!(
            t,
            Term::list([a("ask-user"), a("color?\nplease")])
        );
    }

    #[test]
    fn parses_variable() {
        let t = Term::parse_kif("?x").unwrap();
        assert_eq!(t, v("x"));
    }

    #[test]
    fn line_comment_is_skipped() {
        let t = Term::parse_kif("(foo bar) ; trailing comment\n").unwrap();
        assert_eq!(t, Term::list([a("foo"), a("bar")]));
    }

    #[test]
    fn unbalanced_parens_error() {
        let err = Term::parse_kif("(foo (bar)").unwrap_err();
        assert!(err.reason.contains("unterminated") || err.reason.contains("EOF"));
    }

    #[test]
    fn unterminated_string_error() {
        let err = Term::parse_kif("(foo \"bar)").unwrap_err();
        assert!(err.reason.contains("string"));
    }

    #[test]
    fn trailing_content_error() {
        let err = Term::parse_kif("(foo) (bar)").unwrap_err();
        assert!(err.reason.contains("trailing"));
    }

    #[test]
    fn parses_many_top_level_forms() {
        let terms = Term::parse_kif_many("(a 1) (b 2)\n; comment\n(c 3)").unwrap();
        assert_eq!(terms.len(), 3);
    }

    #[test]
    fn round_trip_property() {
        let samples = [
            "(instance rex Dog)",
            "(=> (instance ?x Dog) (attribute ?x Canine))",
            "(forall (?v1 ?v2) (likes ?v1 ?v2))",
            r#"(says Alice "hello, \"world\"")"#,
            "()",
            "(not (raining))",
        ];
        for s in samples {
            let t1 = Term::parse_kif(s).unwrap();
            let kif1 = t1.to_kif();
            let t2 = Term::parse_kif(&kif1).unwrap();
            let kif2 = t2.to_kif();
            assert_eq!(t1, t2, "parse(toKif(parse({s}))) != parse({s})");
            assert_eq!(kif1, kif2, "toKif not idempotent for {s}");
        }
    }

    #[test]
    fn empty_list_parses() {
        let t = Term::parse_kif("()").unwrap();
        assert_eq!(t, Term::Lst(vec![]));
    }

    #[test]
    fn head_op_and_children() {
        let t = Term::parse_kif("(likes Alice Bob)").unwrap();
        assert_eq!(t.head_op(), Some("likes"));
        assert_eq!(t.children().len(), 3);
    }

    #[test]
    fn free_vars_dedup_and_order() {
        let t = Term::parse_kif("(likes ?x ?y ?x)").unwrap();
        assert_eq!(t.free_vars(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn is_ground_detects_variables() {
        assert!(Term::parse_kif("(instance rex Dog)").unwrap().is_ground());
        assert!(!Term::parse_kif("(instance ?x Dog)").unwrap().is_ground());
    }

    #[test]
    fn negation_helpers_round_trip() {
        let raining = a("raining");
        let not_raining = raining.negate();
        assert_eq!(not_raining.to_kif(), "(not raining)");
        assert_eq!(not_raining.negation_of(), Some(&raining));
        assert_eq!(raining.negation_of(), None);
    }

    #[test]
    fn quoting_round_trips_special_characters() {
        let t = Term::Atom("has space".into());
        let kif = t.to_kif();
        assert_eq!(kif, "\"has space\"");
        assert_eq!(Term::parse_kif(&kif).unwrap(), t);
    }

    #[test]
    fn atom_starting_with_question_mark_is_quoted_so_it_does_not_round_trip_as_a_var() {
        let t = Term::Atom("?x".into());
        let kif = t.to_kif();
        assert_eq!(kif, "\"?x\"");
        assert_eq!(Term::parse_kif(&kif).unwrap(), t);
    }
}
