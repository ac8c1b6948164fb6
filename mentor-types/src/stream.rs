use serde::{Deserialize, Serialize};

use crate::{PlanVersion, StudyPlan};

/// Verifier verdict for one plan version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub missing_topics: Vec<String>,
    pub overloaded_days: Vec<u32>,
    pub prerequisite_issues: Vec<String>,
    pub critique: String,
}

impl VerificationResult {
    pub fn passing() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSummary {
    pub coverage_percent: u32,
    pub overloaded_days_count: usize,
    pub prerequisite_issues_count: usize,
    pub is_valid: bool,
    pub iterations_used: u32,
}

/// Payload of the terminal `complete` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub final_plan: StudyPlan,
    #[serde(default)]
    pub versions: Vec<PlanVersion>,
    #[serde(default)]
    pub total_iterations: u32,
    #[serde(default)]
    pub self_correction_applied: bool,
    #[serde(default)]
    pub verification_summary: Option<VerificationSummary>,
}

/// One newline-delimited record of the generation stream, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        #[serde(default)]
        message: String,
    },
    Draft {
        version: u32,
        plan: StudyPlan,
    },
    Verification {
        version: u32,
        result: VerificationResult,
    },
    Complete {
        final_result: FinalResult,
    },
}
