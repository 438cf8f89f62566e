#![forbid(unsafe_code)]

use crate::ids::PlanId;
use crate::{PlanDay, ScheduleDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day_number: u32,
    #[serde(default)]
    pub date: Option<ScheduleDate>,
    #[serde(default)]
    pub assignment: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanMeta {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Read-only source of plan definitions. Every lookup returns `None` for an unknown id.
pub trait PlanCatalog {
    fn plan_ids(&self) -> Vec<PlanId>;

    fn day_count(&self, id: &PlanId) -> Option<u32>;

    /// Monotonic content revision of the plan definition.
    fn version(&self, id: &PlanId) -> Option<u32>;

    /// Ordered by day number.
    fn schedule(&self, id: &PlanId) -> Option<Vec<ScheduleEntry>>;

    fn versification(&self, id: &PlanId) -> Option<String>;

    fn metadata(&self, id: &PlanId) -> Option<PlanMeta> {
        self.day_count(id).map(|_| PlanMeta::default())
    }
}

/// Builds the full `1..=day_count` day table for a plan. Days the schedule omits become
/// ordinal days with an empty assignment; entries outside the range are ignored.
pub fn plan_days_from_catalog<C: PlanCatalog + ?Sized>(
    catalog: &C,
    id: &PlanId,
) -> Option<Vec<PlanDay>> {
    let day_count = catalog.day_count(id)?;
    let mut by_day: BTreeMap<u32, ScheduleEntry> = catalog
        .schedule(id)
        .unwrap_or_default()
        .into_iter()
        .filter(|entry| (1..=day_count).contains(&entry.day_number))
        .map(|entry| (entry.day_number, entry))
        .collect();

    let days = (1..=day_count)
        .map(|day_number| {
            let entry = by_day.remove(&day_number);
            PlanDay {
                plan_id: id.clone(),
                day_number,
                date: entry.as_ref().and_then(|entry| entry.date),
                assignment: entry.map(|entry| entry.assignment).unwrap_or_default(),
            }
        })
        .collect();
    Some(days)
}

/// One plan definition as a host hands it over, e.g. after parsing a plan file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPlan {
    pub id: PlanId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: u32,
    #[serde(default = "default_versification")]
    pub versification: String,
    pub day_count: u32,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

fn default_versification() -> String {
    "KJV".to_string()
}

impl CatalogPlan {
    pub fn ordinal(id: PlanId, day_count: u32) -> Self {
        let schedule = (1..=day_count)
            .map(|day_number| ScheduleEntry {
                day_number,
                date: None,
                assignment: format!("reading {day_number}"),
            })
            .collect();
        Self {
            id,
            name: None,
            description: None,
            version: 1,
            versification: default_versification(),
            day_count,
            schedule,
        }
    }

    pub fn dated(id: PlanId, dates: &[ScheduleDate]) -> Self {
        let schedule: Vec<ScheduleEntry> = dates
            .iter()
            .zip(1u32..)
            .map(|(date, day_number)| ScheduleEntry {
                day_number,
                date: Some(*date),
                assignment: format!("reading {day_number}"),
            })
            .collect();
        Self {
            id,
            name: None,
            description: None,
            version: 1,
            versification: default_versification(),
            day_count: u32::try_from(schedule.len()).unwrap_or(u32::MAX),
            schedule,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// In-memory catalog keyed by plan id.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    plans: BTreeMap<PlanId, CatalogPlan>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(mut self, plan: CatalogPlan) -> Self {
        self.insert(plan);
        self
    }

    /// Adds or replaces a definition, returning the previous one.
    pub fn insert(&mut self, plan: CatalogPlan) -> Option<CatalogPlan> {
        self.plans.insert(plan.id.clone(), plan)
    }

    pub fn get(&self, id: &PlanId) -> Option<&CatalogPlan> {
        self.plans.get(id)
    }

    /// Parses a JSON array of plan definitions.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let plans: Vec<CatalogPlan> = serde_json::from_str(raw)?;
        Ok(plans
            .into_iter()
            .fold(Self::new(), |catalog, plan| catalog.with_plan(plan)))
    }
}

impl PlanCatalog for StaticCatalog {
    fn plan_ids(&self) -> Vec<PlanId> {
        self.plans.keys().cloned().collect()
    }

    fn day_count(&self, id: &PlanId) -> Option<u32> {
        self.plans
            .get(id)
            .map(|plan| plan.day_count)
            .filter(|count| *count > 0)
    }

    fn version(&self, id: &PlanId) -> Option<u32> {
        self.plans.get(id).map(|plan| plan.version)
    }

    fn schedule(&self, id: &PlanId) -> Option<Vec<ScheduleEntry>> {
        self.plans.get(id).map(|plan| {
            let mut schedule = plan.schedule.clone();
            schedule.sort_by_key(|entry| entry.day_number);
            schedule
        })
    }

    fn versification(&self, id: &PlanId) -> Option<String> {
        self.plans.get(id).map(|plan| plan.versification.clone())
    }

    fn metadata(&self, id: &PlanId) -> Option<PlanMeta> {
        self.plans.get(id).map(|plan| PlanMeta {
            name: plan.name.clone(),
            description: plan.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> PlanId {
        PlanId::try_new(value).expect("plan id")
    }

    #[test]
    fn day_table_fills_gaps_and_drops_out_of_range_entries() {
        let mut plan = CatalogPlan::ordinal(id("gospels"), 4);
        plan.schedule.retain(|entry| entry.day_number != 3);
        plan.schedule.push(ScheduleEntry {
            day_number: 9,
            date: None,
            assignment: "stray".to_string(),
        });
        let catalog = StaticCatalog::new().with_plan(plan);

        let days = plan_days_from_catalog(&catalog, &id("gospels")).expect("known plan");
        let numbers: Vec<u32> = days.iter().map(|day| day.day_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(days[2].assignment, "");
        assert_eq!(days[3].assignment, "reading 4");
    }

    #[test]
    fn unknown_plan_has_no_day_table() {
        let catalog = StaticCatalog::new();
        assert!(plan_days_from_catalog(&catalog, &id("missing")).is_none());
    }

    #[test]
    fn parses_json_definitions() {
        let raw = r#"[
            {"id": "yearly", "version": 3, "day_count": 2,
             "schedule": [{"day_number": 1, "date": "Jan-1", "assignment": "Gen.1"},
                          {"day_number": 2, "date": "Jan-2", "assignment": "Gen.2"}]},
            {"id": "short", "day_count": 1}
        ]"#;
        let catalog = StaticCatalog::from_json(raw).expect("catalog");
        assert_eq!(catalog.plan_ids(), vec![id("short"), id("yearly")]);
        assert_eq!(catalog.version(&id("yearly")), Some(3));
        assert_eq!(catalog.versification(&id("short")).as_deref(), Some("KJV"));
        let schedule = catalog.schedule(&id("yearly")).expect("schedule");
        assert_eq!(
            schedule[1].date,
            Some(ScheduleDate::Yearly { month: 1, day: 2 })
        );
    }
}
