use std::collections::HashSet;

use mentor_types::PlanVersion;

/// What changed between two plan versions.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionDiff {
    pub from: u32,
    pub to: u32,
    /// Topics in `to` but not in `from`, in `to`'s schedule order.
    pub added: Vec<String>,
    /// Topics in `from` but not in `to`, in `from`'s schedule order.
    pub removed: Vec<String>,
    pub hours_before: f64,
    pub hours_after: f64,
}

impl VersionDiff {
    pub fn between(from: &PlanVersion, to: &PlanVersion) -> Self {
        let before = from.plan.topic_names();
        let after = to.plan.topic_names();
        let before_set: HashSet<&str> = before.iter().copied().collect();
        let after_set: HashSet<&str> = after.iter().copied().collect();

        Self {
            from: from.version,
            to: to.version,
            added: after
                .iter()
                .filter(|t| !before_set.contains(*t))
                .map(|t| t.to_string())
                .collect(),
            removed: before
                .iter()
                .filter(|t| !after_set.contains(*t))
                .map(|t| t.to_string())
                .collect(),
            hours_before: from.plan.total_hours(),
            hours_after: to.plan.total_hours(),
        }
    }

    pub fn hours_delta(&self) -> f64 {
        self.hours_after - self.hours_before
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.hours_delta() == 0.0
    }
}

#[cfg(test)]
mod tests {
    use mentor_types::{DailyPlan, StudyPlan, Topic};

    use super::*;

    fn version(n: u32, days: &[(&[&str], f64)]) -> PlanVersion {
        let schedule = days
            .iter()
            .enumerate()
            .map(|(i, (topics, hours))| DailyPlan {
                day: i as u32 + 1,
                topics: topics
                    .iter()
                    .map(|name| Topic {
                        name: name.to_string(),
                        ..Topic::default()
                    })
                    .collect(),
                estimated_hours: *hours,
                ..DailyPlan::default()
            })
            .collect();
        PlanVersion::draft(
            n,
            StudyPlan {
                schedule,
                ..StudyPlan::default()
            },
        )
    }

    #[test]
    fn reports_topic_and_hour_changes() {
        let v1 = version(1, &[(&["Cell Biology", "Genetics"], 6.0), (&["Ecology"], 5.0)]);
        let v2 = version(2, &[(&["Cell Biology"], 4.0), (&["Ecology", "Human Physiology"], 5.5)]);

        let diff = VersionDiff::between(&v1, &v2);

        assert_eq!(diff.added, vec!["Human Physiology"]);
        assert_eq!(diff.removed, vec!["Genetics"]);
        assert_eq!(diff.hours_delta(), -1.5);
        assert!(!diff.is_empty());
        assert!(VersionDiff::between(&v2, &v2).is_empty());
    }
}
