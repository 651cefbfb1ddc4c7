//! Search query model shared by the document stores and their callers.
//!
//! A raw query string is parsed into one of three modes:
//!
//! - `*` or an empty string: match every document
//! - anything containing `:`: a filter expression such as
//!   `isCompleted:false AND priority:2 OR title:"buy milk"`
//! - anything else: fuzzy free text over the document's text fields
//!
//! Results are always ordered by relevance, then creation time (newest first),
//! then identifier, so equal-relevance pages are stable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 1000;

/// Errors produced while parsing or validating a query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryParseError {
    #[error("filter term '{0}' is not of the form field:value")]
    InvalidTerm(String),

    #[error("filter term '{0}' has an empty field name")]
    MissingField(String),

    #[error("filter term '{0}' has an empty value")]
    MissingValue(String),

    #[error("operator '{0}' is not between two terms")]
    DanglingOperator(String),

    #[error("unterminated quote in filter expression")]
    UnterminatedQuote,

    #[error("page must be at least 1, got {0}")]
    InvalidPage(usize),

    #[error("page size must be between 1 and {max}, got {got}", max = MAX_PAGE_SIZE)]
    InvalidPageSize { got: usize },
}

/// A single `field:value` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTerm {
    /// Field path; nested fields use dots (`manufacturer.country`).
    pub field: String,
    pub value: String,
}

impl FilterTerm {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A filter in disjunctive normal form: the outer list is OR-ed, each inner
/// list is AND-ed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpr {
    pub any_of: Vec<Vec<FilterTerm>>,
}

impl FilterExpr {
    /// A filter that requires every term.
    pub fn all(terms: Vec<FilterTerm>) -> Self {
        Self { any_of: vec![terms] }
    }

    /// Parse `field:value` terms joined by `AND` / `OR`. Adjacent terms with no
    /// operator between them are AND-ed. AND binds tighter than OR.
    pub fn parse(raw: &str) -> Result<Self, QueryParseError> {
        let tokens = tokenize(raw)?;

        let mut any_of = Vec::new();
        let mut current = Vec::new();
        let mut expect_term = true;

        for token in tokens {
            match token {
                Token::And | Token::Or if expect_term => {
                    return Err(QueryParseError::DanglingOperator(token.to_string()));
                }
                Token::And => expect_term = true,
                Token::Or => {
                    any_of.push(std::mem::take(&mut current));
                    expect_term = true;
                }
                Token::Term(term) => {
                    current.push(term);
                    expect_term = false;
                }
            }
        }

        if expect_term {
            // trailing operator, or nothing at all
            return Err(QueryParseError::DanglingOperator(raw.trim().to_string()));
        }
        any_of.push(current);

        Ok(Self { any_of })
    }
}

#[derive(Debug)]
enum Token {
    And,
    Or,
    Term(FilterTerm),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::And => f.write_str("AND"),
            Token::Or => f.write_str("OR"),
            Token::Term(term) => write!(f, "{}:{}", term.field, term.value),
        }
    }
}

fn tokenize(raw: &str) -> Result<Vec<Token>, QueryParseError> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_quotes = false;

    for c in raw.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            }
            c => word.push(c),
        }
    }
    if in_quotes {
        return Err(QueryParseError::UnterminatedQuote);
    }
    if !word.is_empty() {
        words.push(word);
    }

    words
        .into_iter()
        .map(|word| {
            if word.eq_ignore_ascii_case("and") {
                return Ok(Token::And);
            }
            if word.eq_ignore_ascii_case("or") {
                return Ok(Token::Or);
            }
            let (field, value) = word
                .split_once(':')
                .ok_or_else(|| QueryParseError::InvalidTerm(word.clone()))?;
            if field.trim().is_empty() {
                return Err(QueryParseError::MissingField(word.clone()));
            }
            if value.trim().is_empty() {
                return Err(QueryParseError::MissingValue(word.clone()));
            }
            Ok(Token::Term(FilterTerm::new(field.trim(), value.trim())))
        })
        .collect()
}

/// How a query selects documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    MatchAll,
    Filter(FilterExpr),
    FreeText(String),
}

/// A paginated query against one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub mode: QueryMode,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl SearchQuery {
    pub fn match_all() -> Self {
        Self::with_mode(QueryMode::MatchAll)
    }

    pub fn filter(expr: FilterExpr) -> Self {
        Self::with_mode(QueryMode::Filter(expr))
    }

    pub fn free_text(text: impl Into<String>) -> Self {
        Self::with_mode(QueryMode::FreeText(text.into()))
    }

    fn with_mode(mode: QueryMode) -> Self {
        Self {
            mode,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Parse a raw query string, on the first page with the default page size.
    pub fn parse(raw: &str) -> Result<Self, QueryParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::match_all());
        }
        if trimmed.contains(':') {
            return Ok(Self::filter(FilterExpr::parse(trimmed)?));
        }
        Ok(Self::free_text(trimmed))
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Number of documents skipped before this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Check the pagination bounds.
    pub fn validate(&self) -> Result<(), QueryParseError> {
        if self.page < 1 {
            return Err(QueryParseError::InvalidPage(self.page));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(QueryParseError::InvalidPageSize {
                got: self.page_size,
            });
        }
        Ok(())
    }
}

/// One page of search results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
}

impl<T> SearchPage<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> SearchPage<U> {
        SearchPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<SearchPage<U>, E> {
        Ok(SearchPage {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        })
    }
}
