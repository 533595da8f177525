//! Query language.
//!
//! ```text
//! query  := or
//! or     := and ("OR" and)*
//! and    := unary (["AND"] unary)*
//! unary  := "NOT" unary | "-" atom | atom
//! atom   := word | "\"" phrase "\"" | "(" or ")"
//! ```
//!
//! Adjacent terms are ANDed. Words go through the same tokenizer as indexed
//! text; a word that splits into several tokens (`e-mail`) is a phrase, and a
//! stop word matches nothing and is dropped.

use crate::error::{SearchError, SearchResult};
use crate::text;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    /// Nothing searchable.
    Empty,
    Term(String),
    /// Terms with their offsets relative to the first one.
    Phrase(Vec<(String, u32)>),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn parse(input: &str) -> SearchResult<Self> {
        let lexemes = lex(input)?;
        let mut parser = Parser { lexemes, pos: 0 };
        let query = parser.or()?;
        if let Some(extra) = parser.peek() {
            return Err(SearchError::InvalidQuery(format!("unexpected {extra:?}")));
        }
        Ok(query)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Terms that contribute to ranking: every term not under a `NOT`.
    pub fn positive_terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_positive(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The negated clauses at the top level of the query.
    pub fn negations(&self) -> Vec<&Query> {
        match self {
            Self::Not(inner) => vec![inner.as_ref()],
            Self::And(items) => items
                .iter()
                .filter_map(|q| match q {
                    Self::Not(inner) => Some(inner.as_ref()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn collect_positive<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Empty | Self::Not(_) => {}
            Self::Term(t) => out.push(t),
            Self::Phrase(terms) => out.extend(terms.iter().map(|(t, _)| t.as_str())),
            Self::And(qs) | Self::Or(qs) => qs.iter().for_each(|q| q.collect_positive(out)),
        }
    }

    fn from_text(text: &str) -> Self {
        let tokens = text::tokenize(text);
        match tokens.len() {
            0 => Self::Empty,
            1 => Self::Term(tokens[0].term.clone()),
            _ => {
                let base = tokens[0].position;
                Self::Phrase(
                    tokens
                        .into_iter()
                        .map(|t| (t.term, t.position - base))
                        .collect(),
                )
            }
        }
    }

    fn combine(items: Vec<Query>, make: fn(Vec<Query>) -> Query) -> Query {
        let mut items: Vec<Query> = items.into_iter().filter(|q| !q.is_empty()).collect();
        match items.len() {
            0 => Self::Empty,
            1 => items.remove(0),
            _ => make(items),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Lexeme {
    Word(String),
    Quoted(String),
    Minus,
    Open,
    Close,
    And,
    Or,
    Not,
}

fn lex(input: &str) -> SearchResult<Vec<Lexeme>> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                out.push(Lexeme::Open);
            }
            ')' => {
                chars.next();
                out.push(Lexeme::Close);
            }
            '"' => {
                chars.next();
                let mut phrase = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => phrase.push(c),
                        None => return Err(SearchError::InvalidQuery("unterminated phrase".into())),
                    }
                }
                out.push(Lexeme::Quoted(phrase));
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(&n) if !n.is_whitespace() => out.push(Lexeme::Minus),
                    _ => {}
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '"' | '(' | ')') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                out.push(match word.as_str() {
                    "AND" => Lexeme::And,
                    "OR" => Lexeme::Or,
                    "NOT" => Lexeme::Not,
                    _ => Lexeme::Word(word),
                });
            }
        }
    }
    Ok(out)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn next(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        self.pos += 1;
        lexeme
    }

    fn or(&mut self) -> SearchResult<Query> {
        let mut items = vec![self.and()?];
        while self.peek() == Some(&Lexeme::Or) {
            self.next();
            items.push(self.and()?);
        }
        Ok(Query::combine(items, Query::Or))
    }

    fn and(&mut self) -> SearchResult<Query> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None | Some(Lexeme::Close) | Some(Lexeme::Or) => break,
                Some(Lexeme::And) => {
                    self.next();
                    if matches!(self.peek(), None | Some(Lexeme::Close) | Some(Lexeme::Or)) {
                        return Err(SearchError::InvalidQuery("AND without right operand".into()));
                    }
                }
                Some(_) => items.push(self.unary()?),
            }
        }
        if items.is_empty() {
            return Err(SearchError::InvalidQuery("missing operand".into()));
        }
        Ok(Query::combine(items, Query::And))
    }

    fn unary(&mut self) -> SearchResult<Query> {
        match self.peek() {
            Some(Lexeme::Not) => {
                self.next();
                let inner = self.unary()?;
                Ok(negate(inner))
            }
            Some(Lexeme::Minus) => {
                self.next();
                let inner = self.atom()?;
                Ok(negate(inner))
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> SearchResult<Query> {
        match self.next() {
            Some(Lexeme::Word(w)) | Some(Lexeme::Quoted(w)) => Ok(Query::from_text(&w)),
            Some(Lexeme::Open) => {
                let inner = self.or()?;
                match self.next() {
                    Some(Lexeme::Close) => Ok(inner),
                    _ => Err(SearchError::InvalidQuery("unbalanced parenthesis".into())),
                }
            }
            Some(other) => Err(SearchError::InvalidQuery(format!("unexpected {other:?}"))),
            None => Err(SearchError::InvalidQuery("unexpected end of query".into())),
        }
    }
}

fn negate(query: Query) -> Query {
    if query.is_empty() {
        Query::Empty
    } else {
        Query::Not(Box::new(query))
    }
}
