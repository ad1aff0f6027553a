//! Schema name validation and table naming

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"));

/// A schema name that is safe to splice into SQL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn parse(name: &str) -> AppResult<Self> {
        if IDENTIFIER.is_match(name) {
            Ok(Self(name.to_ascii_lowercase()))
        } else {
            Err(AppError::Validation(format!("invalid schema name '{}'", name)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tables(&self) -> Tables {
        Tables {
            books: format!("{}.lms_books", self.0),
            copies: format!("{}.lms_book_copies", self.0),
            loans: format!("{}.lms_loans", self.0),
            members: format!("{}.lms_members", self.0),
        }
    }
}

/// Fully qualified table names
#[derive(Debug, Clone)]
pub struct Tables {
    pub books: String,
    pub copies: String,
    pub loans: String,
    pub members: String,
}
