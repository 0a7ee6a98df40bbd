//! The record snapshot conditions are evaluated against.

use serde::{Deserialize, Serialize};

/// Lead temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Temperature {
    Hot,
    Warm,
    Cold,
}

impl Temperature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "HOT",
            Self::Warm => "WARM",
            Self::Cold => "COLD",
        }
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Temperature {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOT"  => Ok(Self::Hot),
            "WARM" => Ok(Self::Warm),
            "COLD" => Ok(Self::Cold),
            other  => Err(format!("unknown temperature: {other}")),
        }
    }
}

/// The slice of a CRM record the engine reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    pub id: String,
    pub status_id: Option<String>,
    pub temperature: Option<Temperature>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub motivation_ids: Vec<String>,
    pub assigned_user_id: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    pub board_id: Option<String>,
    pub column_id: Option<String>,
}

impl RecordSnapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tag_ids.iter().any(|t| t == tag_id)
    }

    pub fn has_motivation(&self, motivation_id: &str) -> bool {
        self.motivation_ids.iter().any(|m| m == motivation_id)
    }
}
