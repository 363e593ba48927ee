// ⚖️ Impact Classifier - does an alteration help or hurt the client?
// Rules: client losses / rival gains are prejudice, the opposite is benefit.
// Prejudice dominates benefit, benefit dominates neutral.

use crate::config::{ClientConfig, PartyRole};
use crate::forensics::AlterationEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const PREJUDICE_GROUNDING: &str =
    "Alteration of electoral results (Art. 192 Electoral Code). Induced arithmetic discrepancy.";
pub const BENEFIT_GROUNDING: &str = "Favorable inconsistency detected.";

// ============================================================================
// INTENT + RECOMMENDATION
// ============================================================================

/// Intent attributed to a set of alterations.
///
/// Variants are declared in ascending priority so `Ord` encodes dominance:
/// `Neutral < Benefit < Prejudice`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    #[default]
    #[serde(alias = "NEUTRO")]
    Neutral,
    #[serde(alias = "BENEFICIO")]
    Benefit,
    #[serde(alias = "PERJUICIO")]
    Prejudice,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Neutral => "NEUTRAL",
            Intent::Benefit => "BENEFIT",
            Intent::Prejudice => "PREJUDICE",
        }
    }

    /// Combine two intents, keeping the dominant one
    pub fn merge(self, other: Intent) -> Intent {
        self.max(other)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    #[serde(alias = "IMPUGNAR")]
    Challenge,
    #[serde(alias = "RECONTEO")]
    Recount,
    SilentLog,
    #[serde(alias = "VALIDAR")]
    Validate,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Challenge => "CHALLENGE",
            Recommendation::Recount => "RECOUNT",
            Recommendation::SilentLog => "SILENT_LOG",
            Recommendation::Validate => "VALIDATE",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// IMPACT RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub intent: Intent,

    /// Net vote advantage (positive) or disadvantage (negative) for the client
    pub impact_score: i64,

    pub recommendation: Recommendation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_grounding: Option<String>,
}

impl ImpactResult {
    /// Result for documents without any client/rival alteration
    pub fn neutral() -> Self {
        ImpactResult {
            intent: Intent::Neutral,
            impact_score: 0,
            recommendation: Recommendation::Validate,
            legal_grounding: None,
        }
    }
}

impl Default for ImpactResult {
    fn default() -> Self {
        Self::neutral()
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Signed effect of a single alteration on the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contribution {
    pub intent: Intent,
    pub impact: i64,
}

impl Contribution {
    /// Effect of `event` under `config`; `None` for parties we don't track
    pub fn assess(event: &AlterationEvent, config: &ClientConfig) -> Option<Self> {
        let delta = event.delta();

        let contribution = match config.role_of(&event.affected_party)? {
            PartyRole::Client if delta < 0 => Contribution {
                intent: Intent::Prejudice,
                impact: delta,
            },
            PartyRole::Client => Contribution {
                intent: Intent::Benefit,
                impact: delta,
            },
            // Rival artificially gained votes
            PartyRole::Rival if delta > 0 => Contribution {
                intent: Intent::Prejudice,
                impact: delta.saturating_neg(),
            },
            PartyRole::Rival => Contribution {
                intent: Intent::Benefit,
                impact: delta.saturating_abs(),
            },
        };

        Some(contribution)
    }
}

/// Running total of contributions with priority-merged intent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentAccumulator {
    intent: Intent,
    total_impact: i64,
}

impl IntentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, contribution: Contribution) {
        self.intent = self.intent.merge(contribution.intent);
        self.total_impact = self.total_impact.saturating_add(contribution.impact);
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn total_impact(&self) -> i64 {
        self.total_impact
    }

    /// Turn the accumulated state into a recommendation
    pub fn finish(self, config: &ClientConfig) -> ImpactResult {
        match self.intent {
            Intent::Prejudice => ImpactResult {
                intent: Intent::Prejudice,
                impact_score: self.total_impact,
                recommendation: Recommendation::Challenge,
                legal_grounding: Some(PREJUDICE_GROUNDING.to_string()),
            },
            Intent::Benefit => ImpactResult {
                intent: Intent::Benefit,
                impact_score: self.total_impact,
                recommendation: if config.strict_ethics {
                    Recommendation::Recount
                } else {
                    Recommendation::SilentLog
                },
                legal_grounding: Some(BENEFIT_GROUNDING.to_string()),
            },
            Intent::Neutral => ImpactResult::neutral(),
        }
    }
}

impl Extend<Contribution> for IntentAccumulator {
    fn extend<I: IntoIterator<Item = Contribution>>(&mut self, iter: I) {
        for contribution in iter {
            self.add(contribution);
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Classify the alterations found on one document
pub fn classify(events: &[AlterationEvent], config: &ClientConfig) -> ImpactResult {
    if events.is_empty() {
        return ImpactResult::neutral();
    }

    let mut acc = IntentAccumulator::new();
    acc.extend(events.iter().filter_map(|e| Contribution::assess(e, config)));

    let result = acc.finish(config);
    debug!(
        events = events.len(),
        intent = %result.intent,
        impact = result.impact_score,
        recommendation = %result.recommendation,
        "Classified alterations"
    );
    result
}

// ============================================================================
// TESTS
// ============================================================================
