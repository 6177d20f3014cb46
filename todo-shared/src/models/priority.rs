/// Task priority levels
///
/// Stored as lowercase text (`none`, `low`, `medium`, `high`). Parsing from
/// text is case-insensitive; JSON accepts only the lowercase names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::None, Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::None => "none",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Position when sorting by urgency: high first, none last
    pub fn sort_rank(&self) -> i32 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
            Priority::None => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown priority: {0}")]
pub struct UnknownPriority(pub String);

impl FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Priority::None),
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(UnknownPriority(s.to_string())),
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = UnknownPriority;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// SQL `CASE` expression ranking `column` by [`Priority::sort_rank`]
pub(crate) fn sort_rank_sql(column: &str) -> String {
    let arms: String = Priority::ALL
        .iter()
        .map(|p| format!(" WHEN '{}' THEN {}", p.as_str(), p.sort_rank()))
        .collect();
    format!("CASE {}{} ELSE 4 END", column, arms)
}
