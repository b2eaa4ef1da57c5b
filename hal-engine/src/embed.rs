//! Parser for the `embed` query parameter.
//!
//! The grammar is
//!
//! ```text
//! query         = [ relation-list ]
//! relation-list = relation ( "," relation )*
//! relation      = identifier [ "(" relation-list ")" ]
//! identifier    = (letter | "_") (letter | digit | "_")*
//! ```
//!
//! Only the outermost level is turned into a map. Nested levels are kept as
//! raw sub-queries, to be parsed by the embedded resource itself when (and if)
//! it gets rendered.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::EmbedError;

/// Default bound on the nesting depth of an embed query.
pub const DEFAULT_MAX_QUERY_DEPTH: usize = 3;

/// Link relations that can never be embedded.
pub const RESERVED_RELATIONS: &[&str] = &["self"];

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|[(),]").expect("valid regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Identifier(&'a str),
    Open,
    Close,
    Comma,
}

/// Splits `s` into tokens, failing at the first byte that isn't part of one.
fn tokenize(s: &str) -> Result<Vec<(Token<'_>, usize)>, EmbedError> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    for m in token_pattern().find_iter(s) {
        if m.start() != pos {
            return Err(EmbedError::Syntax { position: pos });
        }
        let token = match m.as_str() {
            "(" => Token::Open,
            ")" => Token::Close,
            "," => Token::Comma,
            identifier => Token::Identifier(identifier),
        };
        tokens.push((token, pos));
        pos = m.end();
    }
    if pos != s.len() {
        return Err(EmbedError::Syntax { position: pos });
    }
    Ok(tokens)
}

/// The parsed top level of an embed query.
///
/// Maps each requested link relation onto its unparsed sub-query, or `None`
/// if the relation has no nested selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedSpec {
    relations: Vec<(String, Option<String>)>,
}

impl EmbedSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Whether the client asked for `relation` to be embedded.
    pub fn contains(&self, relation: &str) -> bool {
        self.relations.iter().any(|(name, _)| name == relation)
    }

    /// The nested query for `relation`.
    ///
    /// Returns `None` both if the relation isn't embedded at all and if it
    /// is embedded without a nested selection.
    pub fn sub_query(&self, relation: &str) -> Option<&str> {
        self.relations
            .iter()
            .find(|(name, _)| name == relation)
            .and_then(|(_, sub)| sub.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.relations
            .iter()
            .map(|(name, sub)| (name.as_str(), sub.as_deref()))
    }

    fn set(&mut self, relation: &str, sub_query: Option<String>) {
        match self.relations.iter_mut().find(|(name, _)| name == relation) {
            Some((_, sub)) => *sub = sub_query,
            None => self.relations.push((relation.to_string(), sub_query)),
        }
    }
}

/// Embed query parser with a configurable depth bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedParser {
    max_depth: usize,
}

impl Default for EmbedParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUERY_DEPTH)
    }
}

impl EmbedParser {
    /// A `max_depth` of zero is treated as one: the top level is always allowed.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Parses `embed`, e.g. `"foo(bar,baz),qux"` into
    /// `{foo: Some("bar,baz"), qux: None}`.
    pub fn parse(&self, embed: &str) -> Result<EmbedSpec, EmbedError> {
        let mut result = EmbedSpec::new();
        if embed.is_empty() {
            return Ok(result);
        }
        // One set of seen relation names per open nesting level.
        let mut seen: Vec<HashSet<&str>> = vec![HashSet::new()];
        let mut previous: Option<Token<'_>> = None;
        // Relation at the top level whose sub-query is being scanned, and the
        // offset right after its opening parenthesis.
        let mut sub_query: Option<(&str, usize)> = None;

        for (token, pos) in tokenize(embed)? {
            match token {
                Token::Identifier(relation) => {
                    if !matches!(previous, None | Some(Token::Open) | Some(Token::Comma)) {
                        return Err(EmbedError::Syntax { position: pos });
                    }
                    if seen.len() > self.max_depth {
                        return Err(EmbedError::MaxDepthExceeded {
                            max_depth: self.max_depth,
                            position: pos,
                        });
                    }
                    if RESERVED_RELATIONS.contains(&relation) {
                        return Err(EmbedError::ReservedRelation {
                            relation: relation.to_string(),
                            position: pos,
                        });
                    }
                    let level = seen.last_mut().ok_or(EmbedError::Syntax { position: pos })?;
                    if !level.insert(relation) {
                        return Err(EmbedError::DuplicateRelation {
                            relation: relation.to_string(),
                            position: pos,
                        });
                    }
                    if seen.len() == 1 {
                        result.set(relation, None);
                    }
                }
                Token::Open => {
                    let Some(Token::Identifier(relation)) = previous else {
                        return Err(EmbedError::UnexpectedOpening { position: pos });
                    };
                    if seen.len() == 1 {
                        sub_query = Some((relation, pos + 1));
                    }
                    seen.push(HashSet::new());
                }
                Token::Close => {
                    if !matches!(previous, Some(Token::Identifier(_)) | Some(Token::Close)) {
                        return Err(EmbedError::Syntax { position: pos });
                    }
                    seen.pop();
                    if seen.is_empty() {
                        return Err(EmbedError::UnmatchedClosing { position: pos });
                    }
                    if seen.len() == 1 {
                        if let Some((relation, start)) = sub_query.take() {
                            result.set(relation, Some(embed[start..pos].to_string()));
                        }
                    }
                }
                Token::Comma => {
                    if !matches!(previous, Some(Token::Identifier(_)) | Some(Token::Close)) {
                        return Err(EmbedError::Syntax { position: pos });
                    }
                }
            }
            previous = Some(token);
        }

        if seen.len() > 1 {
            let position = sub_query.map(|(_, start)| start - 1).unwrap_or(0);
            return Err(EmbedError::UnmatchedOpening { position });
        }
        if matches!(previous, Some(Token::Comma)) {
            return Err(EmbedError::Syntax {
                position: embed.len(),
            });
        }
        Ok(result)
    }
}

/// Parses `embed` with the default depth bound.
pub fn parse_embed(embed: &str) -> Result<EmbedSpec, EmbedError> {
    EmbedParser::default().parse(embed)
}
