//! Quality gate over generated artifacts.
//!
//! The gate extracts a self-reported confidence score from the artifact text
//! and decides whether the run passes, regenerates, or terminates. Scoring is
//! fail-closed: an artifact with no parseable score scores zero and can never
//! pass. Regeneration always re-runs the full assembly; there is no partial
//! regeneration path.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Score threshold applied when the caller does not override it.
pub const DEFAULT_QUALITY_THRESHOLD: u8 = 8;

/// Regeneration budget applied when the caller does not override it.
pub const DEFAULT_MAX_REGENERATIONS: u32 = 3;

/// How close a best score must be to the threshold for a forced
/// accept-with-warning instead of an abort.
const ACCEPT_MARGIN: u8 = 2;

fn score_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Score:\s*(\d+)/10").expect("score pattern is valid"))
}

/// What the gate decided for one artifact evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Score met the threshold.
    Pass { score: u8 },
    /// Score fell short and regeneration budget remains.
    Regenerate { score: u8 },
    /// Budget exhausted, best score close enough to accept with a warning.
    AcceptWithWarning { best_score: u8 },
    /// Budget exhausted and no score came close.
    Abort { best_score: u8 },
}

impl Decision {
    /// Whether this decision ends the gate loop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Regenerate { .. })
    }

    /// Whether the run may proceed to completion under this decision.
    pub fn is_acceptable(&self) -> bool {
        matches!(
            self,
            Decision::Pass { .. } | Decision::AcceptWithWarning { .. }
        )
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Pass { score } => write!(f, "pass (score {}/10)", score),
            Decision::Regenerate { score } => write!(f, "regenerate (score {}/10)", score),
            Decision::AcceptWithWarning { best_score } => {
                write!(f, "accept with warning (best score {}/10)", best_score)
            }
            Decision::Abort { best_score } => {
                write!(f, "abort (best score {}/10)", best_score)
            }
        }
    }
}

/// Evaluates artifact quality with a bounded regeneration budget.
#[derive(Debug, Clone)]
pub struct QualityGate {
    threshold: u8,
    max_regenerations: u32,
}

impl QualityGate {
    /// Create a gate; thresholds above 10 are clamped to 10.
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(10),
            max_regenerations: DEFAULT_MAX_REGENERATIONS,
        }
    }

    /// Override the regeneration budget.
    pub fn with_max_regenerations(mut self, max: u32) -> Self {
        self.max_regenerations = max;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn max_regenerations(&self) -> u32 {
        self.max_regenerations
    }

    /// Extract the artifact's score, fail-closed.
    ///
    /// The last `Score: N/10` occurrence wins, since artifacts summarize at
    /// the end; values above 10 clamp to 10; no match or an unparseable
    /// number scores 0.
    pub fn extract_score(&self, artifact: &str) -> u8 {
        score_pattern()
            .captures_iter(artifact)
            .last()
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .map(|n| n.min(10) as u8)
            .unwrap_or(0)
    }

    /// Evaluate one artifact given the regeneration history.
    ///
    /// `regenerations_used` counts completed regenerations before this
    /// evaluation; `best_so_far` is the best score any earlier evaluation
    /// produced. Once the budget is spent, the decision is forced terminal:
    /// accept with a warning when the best score came within two points of
    /// the threshold, abort otherwise.
    pub fn evaluate(
        &self,
        artifact: &str,
        regenerations_used: u32,
        best_so_far: u8,
    ) -> Decision {
        let score = self.extract_score(artifact);
        if score >= self.threshold {
            return Decision::Pass { score };
        }
        if regenerations_used < self.max_regenerations {
            return Decision::Regenerate { score };
        }

        let best_score = score.max(best_so_far);
        if self.threshold.saturating_sub(best_score) <= ACCEPT_MARGIN {
            Decision::AcceptWithWarning { best_score }
        } else {
            Decision::Abort { best_score }
        }
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_THRESHOLD)
    }
}
