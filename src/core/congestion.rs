use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic condition reported for a stage. Declaration order is the rank:
/// `Unknown < Low < Medium < High < Severe`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Congestion {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Severe,
}

impl Congestion {
    /// Total: unrecognized labels, including the empty string, are `Unknown`.
    /// Case and surrounding whitespace are ignored.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Congestion::Low,
            "medium" => Congestion::Medium,
            "high" => Congestion::High,
            "severe" => Congestion::Severe,
            _ => Congestion::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Congestion::Unknown => "unknown",
            Congestion::Low => "low",
            Congestion::Medium => "medium",
            Congestion::High => "high",
            Congestion::Severe => "severe",
        }
    }
}

impl fmt::Display for Congestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Congestion {
    fn from(label: &str) -> Self {
        Congestion::parse(label)
    }
}

/// Worst level among `levels`; `Unknown` when there are none.
pub fn worst<I>(levels: I) -> Congestion
where
    I: IntoIterator<Item = Congestion>,
{
    levels.into_iter().max().unwrap_or_default()
}

/// Same as [`worst`] over raw labels.
pub fn worst_of_labels<S: AsRef<str>>(labels: &[S]) -> Congestion {
    worst(labels.iter().map(|label| Congestion::parse(label.as_ref())))
}
