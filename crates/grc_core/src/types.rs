//! Shared value types and the string-enum helper used by every domain.

use serde::{Deserialize, Serialize};

/// Opaque structured payload (finding metadata, audit milestones, report
/// metadata). Stored and returned verbatim; the core never interprets it.
pub type Metadata = serde_json::Value;

// ── Macro to reduce boilerplate for wire-format enums ─────────

/// Declares a closed enum whose wire form is a fixed string, with
/// `as_str`, `FromStr` (unknown values are a validation failure), `Display`
/// and an `ALL` slice in declaration order.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::GrcError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err($crate::error::GrcError::Validation(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Sort direction for list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Unknown values fall back to the default rather than failing.
    pub fn parse_or_default(s: Option<&str>) -> Self {
        match s.map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "asc" => Self::Asc,
            _ => Self::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Result of a best-effort bulk operation. Each input item is attempted
/// independently and reported by its position in the request.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome<T> {
    pub created: Vec<T>,
    pub skipped: Vec<BulkItemIssue>,
    pub errors: Vec<BulkItemIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemIssue {
    pub index: usize,
    pub code: String,
    pub message: String,
}

impl<T> Default for BulkOutcome<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> BulkOutcome<T> {
    pub fn skip(&mut self, index: usize, err: &crate::error::GrcError) {
        self.skipped.push(BulkItemIssue {
            index,
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }

    pub fn fail(&mut self, index: usize, err: &crate::error::GrcError) {
        self.errors.push(BulkItemIssue {
            index,
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }

    /// Routes an item failure: conflicts are skips, everything else an error.
    pub fn record_failure(&mut self, index: usize, err: &crate::error::GrcError) {
        if err.http_status() == 409 {
            self.skip(index, err);
        } else {
            self.fail(index, err);
        }
    }
}
