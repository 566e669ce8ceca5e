use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Class of requested data. Each category has its own provider chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Quote,
    Fundamentals,
    /// News and sentiment
    News,
    /// Web search results about the symbol
    Search,
}

impl DataCategory {
    pub const ALL: [DataCategory; 4] = [
        DataCategory::Quote,
        DataCategory::Fundamentals,
        DataCategory::News,
        DataCategory::Search,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Fundamentals => "fundamentals",
            Self::News => "news",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quote" | "quotes" => Ok(Self::Quote),
            "fundamentals" | "profile" => Ok(Self::Fundamentals),
            "news" | "sentiment" => Ok(Self::News),
            "search" => Ok(Self::Search),
            other => Err(other.to_string()),
        }
    }
}
