//! Mood labels and their valence weights

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Valence used for entries with no mood or an unrecognized one.
pub const NEUTRAL_VALENCE: f64 = 3.0;

/// A mood selected when writing an entry.
///
/// Declaration order is also the `Ord` order, which keeps map output stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mood {
    Happy,
    Calm,
    Anxious,
    Sad,
    Angry,
}

impl Mood {
    /// Every mood, in display order
    pub const ALL: [Self; 5] = [Self::Happy, Self::Calm, Self::Anxious, Self::Sad, Self::Angry];

    /// Canonical label stored locally and remotely
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Happy => "Happy",
            Self::Calm => "Calm",
            Self::Anxious => "Anxious",
            Self::Sad => "Sad",
            Self::Angry => "Angry",
        }
    }

    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Happy => "😊",
            Self::Calm => "😌",
            Self::Anxious => "😰",
            Self::Sad => "😢",
            Self::Angry => "😠",
        }
    }

    /// Numeric weight used when averaging moods into a trend
    #[must_use]
    pub const fn valence(self) -> f64 {
        match self {
            Self::Happy => 5.0,
            Self::Calm => 4.0,
            Self::Anxious => 2.0,
            Self::Sad | Self::Angry => 1.0,
        }
    }

    /// Parse a stored label.
    ///
    /// Matching is case-insensitive and tolerates the emoji-prefixed form
    /// (`"😊 Happy"`) written by older clients.
    #[must_use]
    pub fn from_label(raw: &str) -> Option<Self> {
        let word = raw.split_whitespace().last()?;
        Self::ALL
            .into_iter()
            .find(|mood| mood.label().eq_ignore_ascii_case(word))
    }
}

/// Valence of an optional mood, falling back to [`NEUTRAL_VALENCE`].
#[must_use]
pub fn valence_of(mood: Option<Mood>) -> f64 {
    mood.map_or(NEUTRAL_VALENCE, Mood::valence)
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a mood label is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown mood label: {0}")]
pub struct UnknownMood(pub String);

impl FromStr for Mood {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownMood(s.to_string()))
    }
}

impl TryFrom<String> for Mood {
    type Error = UnknownMood;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mood> for String {
    fn from(mood: Mood) -> Self {
        mood.label().to_string()
    }
}
