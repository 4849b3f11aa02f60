//! Derived queries from repository method names.
//!
//! # Responsibility
//! - Parse `findBy`/`getBy`/`readBy`/`countBy`/`existsBy` method names into
//!   a [`DerivedQuery`] validated against an entity schema.
//! - Bind positional arguments into a [`Predicate`].
//! - Cache parsed queries per `(entity, method)` for the process lifetime.
//!
//! # Invariants
//! - `And` binds tighter than `Or`.
//! - A directly declared attribute wins over a relation traversal with the
//!   same spelling; `Relation_Attribute` forces the traversal.
//! - Arguments bind left to right; `In` takes one list, `Between` two
//!   scalars, null checks none.

use crate::model::schema::EntitySchema;
use crate::query::path::{unresolved, ResolvedPath};
use crate::query::predicate::{escape_like, Comparison, Predicate};
use crate::query::value::QueryValue;
use crate::query::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|get|read|count|exists)By([A-Za-z0-9_]+)$").expect("valid method regex")
});
static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_|[A-Z][a-z0-9]*").expect("valid word regex"));

type CacheKey = (&'static str, String);
static QUERY_CACHE: Lazy<Mutex<HashMap<CacheKey, Arc<DerivedQuery>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// What a derived query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Find,
    Count,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// Clause operator, selected by the clause's trailing keyword(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Not,
    StartingWith,
    EndingWith,
    Containing,
    Like,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    In,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Number of positional arguments the clause consumes.
    pub fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull => 0,
            Self::Between => 2,
            _ => 1,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Equals => "Equals",
            Self::Not => "Not",
            Self::StartingWith => "StartingWith",
            Self::EndingWith => "EndingWith",
            Self::Containing => "Containing",
            Self::Like => "Like",
            Self::LessThan => "LessThan",
            Self::LessThanEqual => "LessThanEqual",
            Self::GreaterThan => "GreaterThan",
            Self::GreaterThanEqual => "GreaterThanEqual",
            Self::In => "In",
            Self::Between => "Between",
            Self::IsNull => "IsNull",
            Self::IsNotNull => "IsNotNull",
        }
    }
}

/// Keyword suffixes, longest first so `LessThanEqual` wins over `LessThan`.
const OPERATOR_SUFFIXES: &[(&[&str], Operator)] = &[
    (&["Is", "Not", "Null"], Operator::IsNotNull),
    (&["Less", "Than", "Equal"], Operator::LessThanEqual),
    (&["Greater", "Than", "Equal"], Operator::GreaterThanEqual),
    (&["Not", "Null"], Operator::IsNotNull),
    (&["Is", "Null"], Operator::IsNull),
    (&["Less", "Than"], Operator::LessThan),
    (&["Greater", "Than"], Operator::GreaterThan),
    (&["Starting", "With"], Operator::StartingWith),
    (&["Ending", "With"], Operator::EndingWith),
    (&["Containing"], Operator::Containing),
    (&["Between"], Operator::Between),
    (&["Like"], Operator::Like),
    (&["Null"], Operator::IsNull),
    (&["Not"], Operator::Not),
    (&["In"], Operator::In),
    (&["Is"], Operator::Equals),
    (&["Equals"], Operator::Equals),
];

/// One parsed clause: `connector? attribute operator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Connector joining this clause to the previous one; `None` for the
    /// first clause.
    pub connector: Option<Connector>,
    pub path: ResolvedPath,
    pub operator: Operator,
}

/// Query descriptor parsed from a method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedQuery {
    pub method: String,
    pub subject: Subject,
    pub entity: &'static EntitySchema,
    pub clauses: Vec<Clause>,
}

impl DerivedQuery {
    /// Parses `method` against `schema`.
    ///
    /// # Errors
    /// - `InvalidMethodName` for unknown prefixes, non-PascalCase bodies or
    ///   empty clauses.
    /// - `UnresolvedAttribute` when a clause attribute cannot be resolved.
    pub fn parse(method: &str, schema: &'static EntitySchema) -> QueryResult<Self> {
        let invalid = |reason: &str| QueryError::InvalidMethodName {
            method: method.to_string(),
            reason: reason.to_string(),
        };

        let captures = METHOD_RE
            .captures(method)
            .ok_or_else(|| invalid("expected findBy|getBy|readBy|countBy|existsBy prefix"))?;
        let subject = match &captures[1] {
            "count" => Subject::Count,
            "exists" => Subject::Exists,
            _ => Subject::Find,
        };
        let body = &captures[2];

        let words: Vec<&str> = WORD_RE.find_iter(body).map(|m| m.as_str()).collect();
        if words.concat().len() != body.len() {
            return Err(invalid("clause expression must be PascalCase"));
        }

        let mut clauses = Vec::new();
        let mut connector = None;
        let mut current: Vec<&str> = Vec::new();
        for word in words {
            let next = match word {
                "And" => Some(Connector::And),
                "Or" => Some(Connector::Or),
                _ => None,
            };
            match next {
                Some(next) => {
                    if current.is_empty() {
                        return Err(invalid("empty clause before connector"));
                    }
                    clauses.push(parse_clause(schema, connector, &current)?);
                    connector = Some(next);
                    current.clear();
                }
                None => current.push(word),
            }
        }
        if current.is_empty() {
            return Err(invalid("empty trailing clause"));
        }
        clauses.push(parse_clause(schema, connector, &current)?);

        Ok(Self {
            method: method.to_string(),
            subject,
            entity: schema,
            clauses,
        })
    }

    /// Total number of positional arguments this query consumes.
    pub fn arity(&self) -> usize {
        self.clauses
            .iter()
            .map(|clause| clause.operator.arity())
            .sum()
    }

    /// Binds positional `args` and returns the filter predicate.
    ///
    /// # Errors
    /// - `ArityMismatch` when `args.len() != self.arity()`.
    /// - `InvalidArgument` when a list meets a scalar slot or vice versa.
    pub fn bind(&self, args: Vec<QueryValue>) -> QueryResult<Predicate> {
        if args.len() != self.arity() {
            return Err(QueryError::ArityMismatch {
                query: self.method.clone(),
                expected: self.arity(),
                actual: args.len(),
            });
        }

        let mut args = args.into_iter();
        let mut groups: Vec<Vec<Predicate>> = vec![Vec::new()];
        for clause in &self.clauses {
            if clause.connector == Some(Connector::Or) {
                groups.push(Vec::new());
            }
            let taken: Vec<QueryValue> = args.by_ref().take(clause.operator.arity()).collect();
            let predicate = bind_clause(clause, taken)?;
            if let Some(group) = groups.last_mut() {
                group.push(predicate);
            }
        }

        Ok(Predicate::any(groups.into_iter().map(Predicate::all)))
    }
}

impl Display for DerivedQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.entity.name)?;
        for clause in &self.clauses {
            match clause.connector {
                Some(Connector::And) => write!(f, " AND")?,
                Some(Connector::Or) => write!(f, " OR")?,
                None => {}
            }
            write!(f, " {} {}", clause.path, clause.operator.keyword())?;
        }
        Ok(())
    }
}

/// Returns the cached parse of `method` for `schema`, parsing on first use.
pub fn resolve_cached(method: &str, schema: &'static EntitySchema) -> QueryResult<Arc<DerivedQuery>> {
    let key = (schema.name, method.to_string());
    {
        let cache = QUERY_CACHE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(query) = cache.get(&key) {
            return Ok(Arc::clone(query));
        }
    }

    let parsed = Arc::new(DerivedQuery::parse(method, schema)?);
    log::debug!(
        "event=derived_query_resolved module=query status=ok method={} clauses={}",
        method,
        parsed.clauses.len()
    );
    let mut cache = QUERY_CACHE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(Arc::clone(cache.entry(key).or_insert(parsed)))
}

fn parse_clause(
    schema: &'static EntitySchema,
    connector: Option<Connector>,
    words: &[&str],
) -> QueryResult<Clause> {
    let mut first_error = None;
    for (suffix, operator) in OPERATOR_SUFFIXES {
        if words.len() <= suffix.len() || !words.ends_with(suffix) {
            continue;
        }
        match resolve_words(schema, &words[..words.len() - suffix.len()]) {
            Ok(path) => {
                return Ok(Clause {
                    connector,
                    path,
                    operator: *operator,
                })
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    // An attribute whose last word looks like a keyword (`LoggedIn`) still
    // resolves as a plain equality clause.
    match resolve_words(schema, words) {
        Ok(path) => Ok(Clause {
            connector,
            path,
            operator: Operator::Equals,
        }),
        Err(err) => Err(first_error.unwrap_or(err)),
    }
}

fn resolve_words(schema: &'static EntitySchema, words: &[&str]) -> QueryResult<ResolvedPath> {
    if words.contains(&"_") {
        let segments: Vec<&[&str]> = words.split(|word| *word == "_").collect();
        return match segments.as_slice() {
            [relation, attribute] if !relation.is_empty() && !attribute.is_empty() => {
                ResolvedPath::traverse(schema, &camel_case(relation), &camel_case(attribute))
            }
            _ => Err(unresolved(schema, &words.concat())),
        };
    }

    let attribute = camel_case(words);
    if let Ok(path) = ResolvedPath::direct(schema, &attribute) {
        return Ok(path);
    }

    for split in 1..words.len() {
        let relation = camel_case(&words[..split]);
        if schema.relation(&relation).is_none() {
            continue;
        }
        if let Ok(path) = ResolvedPath::traverse(schema, &relation, &camel_case(&words[split..])) {
            return Ok(path);
        }
    }

    Err(unresolved(schema, &attribute))
}

fn camel_case(words: &[&str]) -> String {
    let joined = words.concat();
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn bind_clause(clause: &Clause, mut values: Vec<QueryValue>) -> QueryResult<Predicate> {
    let path = clause.path;
    let invalid = |message: &str| QueryError::InvalidArgument {
        clause: format!("{} {}", path, clause.operator.keyword()),
        message: message.to_string(),
    };

    if clause.operator != Operator::In && values.iter().any(QueryValue::is_list) {
        return Err(invalid("expected a scalar value, got a list"));
    }

    let mut next = || values.pop().unwrap_or(QueryValue::Null);
    let predicate = match clause.operator {
        Operator::IsNull => Predicate::IsNull(path),
        Operator::IsNotNull => Predicate::IsNotNull(path),
        Operator::Between => {
            let high = next();
            let low = next();
            Predicate::Between { path, low, high }
        }
        Operator::In => match next() {
            QueryValue::List(values) => Predicate::In { path, values },
            _ => return Err(invalid("expected a list value")),
        },
        Operator::Equals => match next() {
            QueryValue::Null => Predicate::IsNull(path),
            value => compare(path, Comparison::Eq, value),
        },
        Operator::Not => match next() {
            QueryValue::Null => Predicate::IsNotNull(path),
            value => compare(path, Comparison::Ne, value),
        },
        Operator::LessThan => compare(path, Comparison::Lt, next()),
        Operator::LessThanEqual => compare(path, Comparison::Le, next()),
        Operator::GreaterThan => compare(path, Comparison::Gt, next()),
        Operator::GreaterThanEqual => compare(path, Comparison::Ge, next()),
        Operator::Like => Predicate::Like {
            path,
            pattern: like_text(&next()).ok_or_else(|| invalid("expected a pattern"))?,
        },
        operator @ (Operator::StartingWith | Operator::EndingWith | Operator::Containing) => {
            let text = like_text(&next()).ok_or_else(|| invalid("expected text"))?;
            let escaped = escape_like(&text);
            let pattern = match operator {
                Operator::StartingWith => format!("{escaped}%"),
                Operator::EndingWith => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            Predicate::Like { path, pattern }
        }
    };
    Ok(predicate)
}

fn compare(path: ResolvedPath, op: Comparison, value: QueryValue) -> Predicate {
    Predicate::Compare { path, op, value }
}

fn like_text(value: &QueryValue) -> Option<String> {
    match value {
        QueryValue::Text(text) => Some(text.clone()),
        QueryValue::Integer(number) | QueryValue::Timestamp(number) => Some(number.to_string()),
        QueryValue::Real(number) => Some(number.to_string()),
        QueryValue::Null | QueryValue::List(_) | QueryValue::Blob(_) => None,
    }
}
