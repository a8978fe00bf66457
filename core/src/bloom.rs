//! Bloom Taxonomy Module
//!
//! Six-level cognitive taxonomy used throughout the pipeline: slot planning,
//! hint budgeting, gatekeeper verb checks, and post-run drift measurement.

use serde::{Deserialize, Serialize};

/// The six Bloom levels, ordered from lowest to highest cognitive demand.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomLevel {
    /// All levels in ascending order.
    pub const ALL: [BloomLevel; 6] = [
        BloomLevel::Remember,
        BloomLevel::Understand,
        BloomLevel::Apply,
        BloomLevel::Analyze,
        BloomLevel::Evaluate,
        BloomLevel::Create,
    ];

    /// Zero-based position in the taxonomy order.
    pub fn rank(self) -> usize {
        match self {
            BloomLevel::Remember => 0,
            BloomLevel::Understand => 1,
            BloomLevel::Apply => 2,
            BloomLevel::Analyze => 3,
            BloomLevel::Evaluate => 4,
            BloomLevel::Create => 5,
        }
    }

    /// Short classroom-facing label.
    pub fn label(self) -> &'static str {
        match self {
            BloomLevel::Remember => "remember",
            BloomLevel::Understand => "understand",
            BloomLevel::Apply => "apply",
            BloomLevel::Analyze => "analyze",
            BloomLevel::Evaluate => "evaluate",
            BloomLevel::Create => "create",
        }
    }

    /// One-line definition used in writer prompts.
    pub fn definition(self) -> &'static str {
        match self {
            BloomLevel::Remember => "retrieve facts, terms, and basic concepts",
            BloomLevel::Understand => "explain ideas or concepts in one's own words",
            BloomLevel::Apply => "use learned procedures in familiar situations",
            BloomLevel::Analyze => "break material into parts and find relationships",
            BloomLevel::Evaluate => "justify a position or judge against criteria",
            BloomLevel::Create => "combine elements into a new coherent product",
        }
    }
}

impl std::fmt::Display for BloomLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Demand tier used by the hint-budget verbosity table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DemandTier {
    Low,
    Apply,
    High,
}

impl DemandTier {
    /// Tier for a Bloom level: low = {remember, understand}, apply = {apply},
    /// high = {analyze, evaluate, create}.
    pub fn for_level(level: BloomLevel) -> Self {
        match level {
            BloomLevel::Remember | BloomLevel::Understand => DemandTier::Low,
            BloomLevel::Apply => DemandTier::Apply,
            BloomLevel::Analyze | BloomLevel::Evaluate | BloomLevel::Create => DemandTier::High,
        }
    }
}

/// Action verbs that signal each Bloom level in a question stem.
pub fn action_verbs(level: BloomLevel) -> &'static [&'static str] {
    match level {
        BloomLevel::Remember => &["define", "list", "recall", "identify", "name", "state"],
        BloomLevel::Understand => &[
            "explain",
            "describe",
            "summarize",
            "classify",
            "interpret",
            "compare",
        ],
        BloomLevel::Apply => &["solve", "use", "calculate", "demonstrate", "apply", "compute"],
        BloomLevel::Analyze => &[
            "analyze",
            "differentiate",
            "organize",
            "contrast",
            "examine",
            "break down",
        ],
        BloomLevel::Evaluate => &["evaluate", "justify", "critique", "judge", "defend", "assess"],
        BloomLevel::Create => &[
            "create",
            "design",
            "construct",
            "develop",
            "formulate",
            "compose",
        ],
    }
}

/// Verbs acceptable for a slot: the slot's level plus every level below it.
pub fn verbs_at_or_below(level: BloomLevel) -> Vec<&'static str> {
    BloomLevel::ALL
        .iter()
        .filter(|l| l.rank() <= level.rank())
        .flat_map(|l| action_verbs(*l).iter().copied())
        .collect()
}

/// Explanation verbs that disqualify the remember-MCQ exemption.
pub const EXPLANATION_VERBS: [&str; 8] = [
    "why",
    "explain",
    "how",
    "describe",
    "interpret",
    "justify",
    "analyse",
    "analyze",
];

/// True when `word` occurs in `text` bounded by non-alphanumeric characters.
pub fn contains_word(text: &str, word: &str) -> bool {
    let text = text.to_lowercase();
    let word = word.to_lowercase();
    let mut start = 0;
    while let Some(pos) = text[start..].find(&word) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !text[..abs]
                .chars()
                .next_back()
                .map(|c| c.is_alphanumeric())
                .unwrap_or(false);
        let after = abs + word.len();
        let after_ok = after >= text.len()
            || !text[after..]
                .chars()
                .next()
                .map(|c| c.is_alphanumeric())
                .unwrap_or(false);
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
        if start >= text.len() {
            break;
        }
    }
    false
}

/// Detect the verb-implied Bloom level of a question stem.
///
/// Scans from the highest level down so a stem mixing "design" with "list"
/// classifies as create. Returns `None` when no action verb is present.
pub fn classify_stem(prompt: &str) -> Option<BloomLevel> {
    for level in BloomLevel::ALL.iter().rev() {
        if action_verbs(*level)
            .iter()
            .any(|verb| contains_word(prompt, verb))
        {
            return Some(*level);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(BloomLevel::Remember < BloomLevel::Understand);
        assert!(BloomLevel::Apply < BloomLevel::Analyze);
        assert!(BloomLevel::Evaluate < BloomLevel::Create);
    }

    #[test]
    fn test_verbs_at_or_below_accumulates() {
        let remember = verbs_at_or_below(BloomLevel::Remember);
        let apply = verbs_at_or_below(BloomLevel::Apply);
        assert!(apply.len() > remember.len());
        assert!(apply.contains(&"define"));
        assert!(apply.contains(&"solve"));
        assert!(!remember.contains(&"solve"));
    }

    #[test]
    fn test_classify_stem_picks_highest() {
        let stem = "List the steps, then design an experiment to test them.";
        assert_eq!(classify_stem(stem), Some(BloomLevel::Create));
    }

    #[test]
    fn test_classify_stem_word_boundaries() {
        // "listen" must not match "list"
        assert_eq!(classify_stem("Listen carefully to the recording."), None);
        assert_eq!(
            classify_stem("List the prime numbers below 20."),
            Some(BloomLevel::Remember)
        );
    }

    #[test]
    fn test_demand_tiers() {
        assert_eq!(DemandTier::for_level(BloomLevel::Remember), DemandTier::Low);
        assert_eq!(DemandTier::for_level(BloomLevel::Apply), DemandTier::Apply);
        assert_eq!(DemandTier::for_level(BloomLevel::Create), DemandTier::High);
    }
}
