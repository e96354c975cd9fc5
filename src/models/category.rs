//! Category labels and the narrow specialization relation used for
//! eligibility.
//!
//! Labels are free text ("C-Jugend weiblich", "E-Jugend gemischt", "Minis").
//! Most are compared verbatim. A configured set of age-group tokens marks
//! categories that are registered with variant suffixes while field
//! restrictions are configured at the coarser group level; for those, any
//! allow-list entry carrying the same token admits the category.

use serde::{Deserialize, Serialize};

/// Youngest mixed bracket and the beginners bracket.
pub const DEFAULT_SPECIALIZATION_TOKENS: [&str; 2] = ["E-Jugend", "Mini"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Category {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of specialization tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRules {
    tokens: Vec<String>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::new(DEFAULT_SPECIALIZATION_TOKENS.iter().map(|t| t.to_string()))
    }
}

impl CategoryRules {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The token `category` specializes, if any. First configured token wins.
    pub fn specialization(&self, category: &Category) -> Option<&str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .find(|token| category.as_str().contains(token))
    }

    /// Whether a single allow-list entry admits `category`.
    pub fn admits(&self, entry: &str, category: &Category) -> bool {
        match self.specialization(category) {
            Some(token) => entry.contains(token),
            None => entry == category.as_str(),
        }
    }

    /// Whether any entry of `allow_list` admits `category`. An empty list
    /// is *not* handled here; callers decide what "unrestricted" means.
    pub fn any_admits<S: AsRef<str>>(&self, allow_list: &[S], category: &Category) -> bool {
        allow_list
            .iter()
            .any(|entry| self.admits(entry.as_ref(), category))
    }
}
