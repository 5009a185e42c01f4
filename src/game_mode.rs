// Game types and match modes accepted by the HTTP routes.

use serde::{Deserialize, Serialize};

/// The game being played. Each type fixes how many players sit on a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Pvp,
    Bedwars,
    Ctf,
}

impl GameType {
    pub const ALL: [GameType; 3] = [GameType::Pvp, GameType::Bedwars, GameType::Ctf];

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "pvp" => Some(Self::Pvp),
            "bedwars" => Some(Self::Bedwars),
            "ctf" => Some(Self::Ctf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pvp => "pvp",
            Self::Bedwars => "bedwars",
            Self::Ctf => "ctf",
        }
    }

    pub fn tokens_per_team(&self) -> u32 {
        match self {
            Self::Pvp => 1,
            Self::Bedwars => 4,
            Self::Ctf => 5,
        }
    }

    /// "pvp, bedwars, ctf" for error messages.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Competitive context of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Practice,
    Ranked,
}

impl MatchMode {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "practice" => Some(Self::Practice),
            "ranked" => Some(Self::Ranked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Practice => "practice",
            Self::Ranked => "ranked",
        }
    }
}
