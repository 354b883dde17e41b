//! Search expression composer.
//!
//! Folds blocklist fragments into one search string, one criterion per
//! fragment, each preceded by its operator and field token:
//!
//! ```text
//! compose("grandma", "from", "or", "")            => "OR FROM grandma"
//! compose("grandpa@x.com", "from", "or", <above>) => "OR FROM grandma OR FROM grandpa@x.com"
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// Boolean operator joining search criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOperator {
    And,
    Or,
}

impl FromStr for LogicOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(LogicOperator::And),
            "OR" => Ok(LogicOperator::Or),
            _ => Err(QueryError::InvalidOperator(s.to_string())),
        }
    }
}

impl fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicOperator::And => "AND",
            LogicOperator::Or => "OR",
        })
    }
}

/// Append one criterion to `previous`.
///
/// `field` and `operator` are uppercased; `fragment` is inserted verbatim.
pub fn compose(
    fragment: &str,
    field: &str,
    operator: &str,
    previous: &str,
) -> Result<String, QueryError> {
    let operator: LogicOperator = operator.parse()?;
    let criterion = format!("{operator} {} {fragment}", field.to_uppercase());
    if previous.is_empty() {
        Ok(criterion)
    } else {
        Ok(format!("{previous} {criterion}"))
    }
}

/// Fold every fragment left to right with the same field and operator.
pub fn compose_all<S: AsRef<str>>(
    fragments: &[S],
    field: &str,
    operator: &str,
) -> Result<String, QueryError> {
    fragments.iter().try_fold(String::new(), |previous, fragment| {
        compose(fragment.as_ref(), field, operator, &previous)
    })
}

/// The query a poll cycle submits: `OR FROM` over the blocklist.
pub fn sender_query<S: AsRef<str>>(blocklist: &[S]) -> Result<String, QueryError> {
    compose_all(blocklist, "from", "or")
}
