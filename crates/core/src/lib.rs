#![forbid(unsafe_code)]

mod catalog;
mod error;
mod model;
mod progress;
mod schedule;

pub use catalog::{
    CatalogPlan, PlanCatalog, PlanMeta, ScheduleEntry, StaticCatalog, plan_days_from_catalog,
};
pub use error::DomainError;
pub use model::{HistoryRecord, Plan, PlanDay, PlanKind, ReadStatus};
pub use progress::{
    completed_days, count_completed_iterations, date_anchored_current_day, highest_completed_day,
    independent_pointer, is_iteration_complete, longest_completed_prefix, prefix_pointer,
    resolve_current_day,
};
pub use schedule::ScheduleDate;

pub mod ids {
    use crate::DomainError;
    use serde::{Deserialize, Serialize};

    const MAX_PLAN_ID_LEN: usize = 255;

    /// Stable textual identifier of a plan (the catalog file name, formerly "plan code").
    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(try_from = "String", into = "String")]
    pub struct PlanId(String);

    impl PlanId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
            let value = value.into();
            validate_plan_id(&value)?;
            Ok(Self(value))
        }
    }

    impl std::fmt::Display for PlanId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl TryFrom<String> for PlanId {
        type Error = DomainError;

        fn try_from(value: String) -> Result<Self, Self::Error> {
            Self::try_new(value)
        }
    }

    impl From<PlanId> for String {
        fn from(value: PlanId) -> Self {
            value.0
        }
    }

    fn validate_plan_id(value: &str) -> Result<(), DomainError> {
        if value.trim().is_empty() {
            return Err(DomainError::EmptyPlanId);
        }
        if value.chars().count() > MAX_PLAN_ID_LEN {
            return Err(DomainError::PlanIdTooLong {
                max: MAX_PLAN_ID_LEN,
            });
        }
        if let Some(index) = value.chars().position(char::is_control) {
            return Err(DomainError::InvalidPlanIdChar { index });
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn accepts_catalog_file_names() {
            let id = PlanId::try_new("y1ot1nt1_OTthenNT").expect("valid id");
            assert_eq!(id.as_str(), "y1ot1nt1_OTthenNT");
            assert_eq!(id.to_string(), "y1ot1nt1_OTthenNT");
        }

        #[test]
        fn rejects_blank_and_control_characters() {
            assert_eq!(PlanId::try_new("  "), Err(DomainError::EmptyPlanId));
            assert_eq!(
                PlanId::try_new("plan\nname"),
                Err(DomainError::InvalidPlanIdChar { index: 4 })
            );
            assert!(matches!(
                PlanId::try_new("x".repeat(256)),
                Err(DomainError::PlanIdTooLong { max: 255 })
            ));
        }

        #[test]
        fn deserialization_validates() {
            let parsed: Result<PlanId, _> = serde_json::from_str("\"\"");
            assert!(parsed.is_err());
            let parsed: PlanId = serde_json::from_str("\"chronological\"").expect("plan id");
            assert_eq!(parsed.as_str(), "chronological");
        }
    }
}
