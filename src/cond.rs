use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::error::HeaderError;
use crate::token::{scan, Token};

/// 10.4.  If Header
///
/// If = "If" ":" ( 1*No-tag-list | 1*Tagged-list )
/// No-tag-list = List
/// Tagged-list = Resource-Tag 1*List
/// List = "(" 1*Condition ")"
/// Condition = ["Not"] (State-token | "[" entity-tag "]")
///
/// A Precondition represents some condition or collection of conditions
/// on the state of a resource. If none of the conditions hold, the
/// guarded method must fail. Conditions in a Precondition are OR'd
/// together, while the factors inside a term are AND'ed.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Precondition {
    conditions: Vec<Condition>,
}

/// One state configuration of one resource. The terms are OR'd: at least
/// one must match the states presented for the resource. A condition may
/// be scoped to a resource URI; an unscoped condition applies to the
/// resource executing the request.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Condition {
    resource_uri: Option<String>,
    terms: Vec<ConditionTerm>,
}

/// An AND-group of condition factors, the parenthesized list of the wire
/// syntax.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ConditionTerm {
    factors: Vec<ConditionFactor>,
}

/// One opaque piece of resource state, possibly negated.
#[derive(Debug, Clone)]
pub struct ConditionFactor {
    negated: bool,
    kind: FactorKind,
}

#[derive(Debug, Clone)]
pub enum FactorKind {
    /// An opaque URI naming server state, typically a lock token.
    StateToken(String),
    /// An opaque quoted string representing a content version, see
    /// section 3.11 of the HTTP/1.1 spec.
    EntityTag { tag: String, weak: bool },
}

/// Factors compare by their opaque identity only. Neither the negation
/// flag nor the weakness of an entity tag takes part: `Not <t>` is a
/// constraint *about* `<t>`, and a weak tag names the same state as its
/// strong form.
impl PartialEq for ConditionFactor {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (FactorKind::StateToken(a), FactorKind::StateToken(b)) => a == b,
            (FactorKind::EntityTag { tag: a, .. }, FactorKind::EntityTag { tag: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl ConditionFactor {
    pub fn state_token(uri: impl Into<String>) -> Self {
        Self {
            negated: false,
            kind: FactorKind::StateToken(uri.into()),
        }
    }

    pub fn entity_tag(tag: impl Into<String>) -> Self {
        Self {
            negated: false,
            kind: FactorKind::EntityTag {
                tag: tag.into(),
                weak: false,
            },
        }
    }

    pub fn weak_entity_tag(tag: impl Into<String>) -> Self {
        Self {
            negated: false,
            kind: FactorKind::EntityTag {
                tag: tag.into(),
                weak: true,
            },
        }
    }

    /// A process-unique entity tag servers may use for any purpose.
    pub fn generated_entity_tag() -> Self {
        static BASE: OnceLock<String> = OnceLock::new();
        static COUNT: AtomicU64 = AtomicU64::new(0);
        let base = BASE.get_or_init(|| format!("{:x}", chrono::Utc::now().timestamp_millis()));
        let n = COUNT.fetch_add(1, Ordering::Relaxed);
        Self::entity_tag(format!("{}:{:x}", base, n))
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn kind(&self) -> &FactorKind {
        &self.kind
    }
}

impl std::fmt::Display for ConditionFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "Not ")?;
        }
        match &self.kind {
            FactorKind::StateToken(uri) => write!(f, "<{}>", uri),
            FactorKind::EntityTag { tag, weak } => {
                if *weak {
                    write!(f, "W/")?;
                }
                write!(f, "[\"{}\"]", tag)
            }
        }
    }
}

impl ConditionTerm {
    pub fn new() -> Self {
        Self::default()
    }

    /// A term holding a single factor.
    pub fn of(factor: ConditionFactor) -> Self {
        Self {
            factors: vec![factor],
        }
    }

    /// Add a factor to the AND-group. A factor may only appear once per
    /// term.
    pub fn add_factor(&mut self, factor: ConditionFactor) -> Result<(), HeaderError> {
        if self.contains(&factor) {
            return Err(HeaderError::DuplicateFactor(factor.to_string()));
        }
        self.factors.push(factor);
        Ok(())
    }

    pub fn contains(&self, factor: &ConditionFactor) -> bool {
        self.factors.iter().any(|f| f == factor)
    }

    pub fn factor_count(&self) -> usize {
        self.factors.len()
    }

    pub fn factors(&self) -> impl Iterator<Item = &ConditionFactor> {
        self.factors.iter()
    }

    /// Check this term, taken as a pattern, against the states listed in
    /// `other`. Every positive factor must be present in `other`, every
    /// negated factor must be absent, and the positive factors must
    /// account for every state `other` presents. The rule is asymmetric
    /// on purpose: negated factors add "must be absent" constraints
    /// without entering the count.
    pub fn matches(&self, other: &ConditionTerm) -> bool {
        let mut matched = 0;
        for factor in &self.factors {
            if factor.negated {
                if other.contains(factor) {
                    return false;
                }
            } else {
                if !other.contains(factor) {
                    return false;
                }
                matched += 1;
            }
        }
        matched == other.factor_count()
    }
}

impl std::fmt::Display for ConditionTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, factor) in self.factors.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", factor)?;
        }
        write!(f, ")")
    }
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scoped(resource_uri: impl Into<String>) -> Self {
        Self {
            resource_uri: Some(resource_uri.into()),
            terms: Vec::new(),
        }
    }

    pub fn resource_uri(&self) -> Option<&str> {
        self.resource_uri.as_deref()
    }

    pub fn set_resource_uri(&mut self, uri: Option<String>) {
        self.resource_uri = uri;
    }

    /// Add a term to the OR-group. Empty terms are meaningless and
    /// rejected here so that they cannot be built programmatically
    /// either.
    pub fn add_term(&mut self, term: ConditionTerm) -> Result<(), HeaderError> {
        if term.factor_count() == 0 {
            return Err(HeaderError::EmptyTerm);
        }
        self.terms.push(term);
        Ok(())
    }

    pub fn terms(&self) -> impl Iterator<Item = &ConditionTerm> {
        self.terms.iter()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Does any of the candidate's own terms satisfy `term` as a
    /// pattern?
    pub fn contains(&self, term: &ConditionTerm) -> bool {
        self.terms.iter().any(|t| term.matches(t))
    }

    /// Check this condition against a candidate state. A scoped
    /// condition only ever matches a candidate carrying the identical
    /// resource URI; the URIs are opaque strings, not parsed URLs.
    pub fn matches(&self, candidate: &Condition) -> bool {
        if let Some(uri) = &self.resource_uri {
            if candidate.resource_uri.as_deref() != Some(uri.as_str()) {
                return false;
            }
        }
        self.terms.iter().any(|term| candidate.contains(term))
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(uri) = &self.resource_uri {
            write!(f, "<{}> ", uri)?;
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", term)?;
        }
        Ok(())
    }
}

impl Precondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition to the OR-group. A resource URI can only be
    /// scoped once per precondition; unscoped conditions may repeat.
    pub fn add_condition(&mut self, condition: Condition) -> Result<(), HeaderError> {
        if condition.term_count() == 0 {
            return Err(HeaderError::EmptyCondition);
        }
        if let Some(uri) = condition.resource_uri() {
            if self
                .conditions
                .iter()
                .any(|c| c.resource_uri() == Some(uri))
            {
                return Err(HeaderError::DuplicateResource(uri.to_string()));
            }
        }
        self.conditions.push(condition);
        Ok(())
    }

    /// Add a condition built from a single state token, the usual way a
    /// client presents the lock token guarding an update.
    pub fn add_state_token(
        &mut self,
        resource_uri: Option<&str>,
        state_token: &str,
    ) -> Result<(), HeaderError> {
        let mut condition = match resource_uri {
            Some(uri) => Condition::scoped(uri),
            None => Condition::new(),
        };
        condition.add_term(ConditionTerm::of(ConditionFactor::state_token(state_token)))?;
        self.add_condition(condition)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// True iff any contained condition matches the candidate.
    pub fn matches(&self, candidate: &Condition) -> bool {
        self.conditions.iter().any(|c| c.matches(candidate))
    }
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", condition)?;
        }
        Ok(())
    }
}

// ---- recursive descent over the token stream ----

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn saw(&self) -> String {
        match self.peek() {
            Some(tok) => tok.to_string(),
            None => "end of header".into(),
        }
    }

    fn expect_delim(&mut self, delim: char, expected: &'static str) -> Result<(), HeaderError> {
        match self.peek() {
            Some(Token::Delim(c)) if *c == delim => {
                self.next();
                Ok(())
            }
            _ => Err(HeaderError::Unexpected {
                saw: self.saw(),
                expected,
            }),
        }
    }
}

fn parse_factor(cur: &mut Cursor) -> Result<ConditionFactor, HeaderError> {
    let negated = matches!(cur.peek(), Some(Token::Word(w)) if w == "Not");
    if negated {
        cur.next();
    }

    let factor = match cur.peek() {
        Some(Token::Delim('<')) => {
            cur.next();
            let uri = match cur.next() {
                Some(Token::Word(uri)) => uri,
                _ => return Err(HeaderError::MissingResourceUri),
            };
            cur.expect_delim('>', ">")?;
            ConditionFactor::state_token(uri)
        }
        Some(Token::Delim('[')) => {
            cur.next();
            let tag = match cur.peek() {
                Some(Token::Quoted(tag)) => tag.clone(),
                _ => {
                    return Err(HeaderError::Unexpected {
                        saw: cur.saw(),
                        expected: "a quoted string",
                    })
                }
            };
            cur.next();
            cur.expect_delim(']', "]")?;
            ConditionFactor::entity_tag(tag)
        }
        _ => {
            return Err(HeaderError::Unexpected {
                saw: cur.saw(),
                expected: "Not, < or [",
            })
        }
    };

    Ok(if negated { factor.negated() } else { factor })
}

fn parse_term(cur: &mut Cursor) -> Result<ConditionTerm, HeaderError> {
    cur.expect_delim('(', "(")?;
    let mut term = ConditionTerm::new();
    while matches!(
        cur.peek(),
        Some(Token::Word(_)) | Some(Token::Delim('<')) | Some(Token::Delim('['))
    ) {
        term.add_factor(parse_factor(cur)?)?;
    }
    cur.expect_delim(')', ")")?;
    if term.factor_count() == 0 {
        return Err(HeaderError::EmptyTerm);
    }
    Ok(term)
}

fn parse_condition(cur: &mut Cursor) -> Result<Condition, HeaderError> {
    let mut condition = Condition::new();
    if let Some(Token::Delim('<')) = cur.peek() {
        cur.next();
        match cur.next() {
            Some(Token::Word(uri)) => condition.set_resource_uri(Some(uri)),
            _ => return Err(HeaderError::MissingResourceUri),
        }
        cur.expect_delim('>', ">")?;
    }
    if !matches!(cur.peek(), Some(Token::Delim('('))) {
        return Err(HeaderError::Unexpected {
            saw: cur.saw(),
            expected: "( or <",
        });
    }
    while let Some(Token::Delim('(')) = cur.peek() {
        condition.add_term(parse_term(cur)?)?;
    }
    Ok(condition)
}

impl FromStr for Precondition {
    type Err = HeaderError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let mut cur = Cursor {
            tokens: scan(header, true)?,
            pos: 0,
        };
        let mut precondition = Precondition::new();
        while matches!(cur.peek(), Some(Token::Delim('<')) | Some(Token::Delim('('))) {
            precondition.add_condition(parse_condition(&mut cur)?)?;
        }
        if cur.peek().is_some() {
            return Err(HeaderError::Unexpected {
                saw: cur.saw(),
                expected: "end of header",
            });
        }
        if precondition.condition_count() == 0 {
            return Err(HeaderError::EmptyHeader);
        }
        Ok(precondition)
    }
}

impl FromStr for Condition {
    type Err = HeaderError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let mut cur = Cursor {
            tokens: scan(header, false)?,
            pos: 0,
        };
        let condition = parse_condition(&mut cur)?;
        if cur.peek().is_some() {
            return Err(HeaderError::Unexpected {
                saw: cur.saw(),
                expected: "end of header",
            });
        }
        Ok(condition)
    }
}
