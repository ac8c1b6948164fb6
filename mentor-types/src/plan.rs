use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::VerificationResult;

/// One topic scheduled on a plan day.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyPlan {
    pub day: u32,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub estimated_hours: f64,
}

/// The artifact produced by a generation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyPlan {
    pub exam_name: String,
    pub total_days: u32,
    pub overview: String,
    pub schedule: Vec<DailyPlan>,
    pub critical_topics: Vec<String>,
}

impl StudyPlan {
    /// Distinct topic names in schedule order.
    pub fn topic_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.schedule
            .iter()
            .flat_map(|day| day.topics.iter())
            .map(|t| t.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    pub fn total_hours(&self) -> f64 {
        self.schedule.iter().map(|d| d.estimated_hours).sum()
    }
}

/// Parameters of a plan generation request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub syllabus_text: String,
    pub exam_type: String,
    pub goal: String,
    pub days: u32,
}

impl PlanRequest {
    pub fn new(exam_type: impl Into<String>, goal: impl Into<String>, days: u32) -> Self {
        Self {
            syllabus_text: String::new(),
            exam_type: exam_type.into(),
            goal: goal.into(),
            days,
        }
    }

    pub fn with_syllabus(mut self, syllabus_text: impl Into<String>) -> Self {
        self.syllabus_text = syllabus_text.into();
        self
    }
}

/// One draft in a correction run, with its verification once attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanVersion {
    pub version: u32,
    pub plan: StudyPlan,
    #[serde(default)]
    pub verification: Option<VerificationResult>,
    #[serde(default, rename = "was_accepted", alias = "accepted")]
    pub accepted: bool,
}

impl PlanVersion {
    pub fn draft(version: u32, plan: StudyPlan) -> Self {
        Self {
            version,
            plan,
            verification: None,
            accepted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str) -> Topic {
        Topic {
            name: name.into(),
            ..Topic::default()
        }
    }

    #[test]
    fn topic_names_are_distinct_and_ordered() {
        let plan = StudyPlan {
            schedule: vec![
                DailyPlan {
                    day: 1,
                    topics: vec![topic("Genetics"), topic("Ecology")],
                    estimated_hours: 4.0,
                    ..DailyPlan::default()
                },
                DailyPlan {
                    day: 2,
                    topics: vec![topic("Genetics"), topic("Optics")],
                    estimated_hours: 2.5,
                    ..DailyPlan::default()
                },
            ],
            ..StudyPlan::default()
        };
        assert_eq!(plan.topic_names(), vec!["Genetics", "Ecology", "Optics"]);
        assert_eq!(plan.total_hours(), 6.5);
    }

    #[test]
    fn version_reads_remote_accepted_flag() {
        let v: PlanVersion = serde_json::from_str(
            r#"{"version": 2, "plan": {"exam_name": "NEET"}, "verification": null, "was_accepted": true}"#,
        )
        .unwrap();
        assert!(v.accepted);
        assert_eq!(v.plan.exam_name, "NEET");
    }
}
