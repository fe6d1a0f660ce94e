//! Parameter Store data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parameter as returned by GetParametersByPath
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Fully-qualified name, e.g. `/app/DATABASE_URL`
    pub name: String,
    pub value: String,
    /// `String`, `StringList` or `SecureString`
    pub kind: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub version: i64,
    pub arn: Option<String>,
}

impl Parameter {
    /// Last path segment of the name
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Case-insensitive substring match on name or value
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term) || self.value.to_lowercase().contains(&term)
    }
}

/// One page of parameters plus the token for the next page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterPage {
    pub parameters: Vec<Parameter>,
    pub next_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, value: &str) -> Parameter {
        Parameter {
            name: name.to_string(),
            value: value.to_string(),
            kind: "String".to_string(),
            last_modified: None,
            version: 1,
            arn: None,
        }
    }

    #[test]
    fn test_short_name() {
        assert_eq!(param("/app/prod/DB_HOST", "x").short_name(), "DB_HOST");
        assert_eq!(param("PLAIN", "x").short_name(), "PLAIN");
    }

    #[test]
    fn test_matches_name_or_value_ignoring_case() {
        let p = param("/app/DATABASE_URL", "postgres://Primary:5432");
        assert!(p.matches("database"));
        assert!(p.matches("PRIMARY"));
        assert!(!p.matches("redis"));
    }
}
