use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::datetime::WeekdayCode;

const TEMP_ID_PREFIX: &str = "tmp-";

/// Habit identity. The service has handed out both numeric and string ids,
/// so both decode into the same textual form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct HabitId(String);

impl HabitId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Placeholder id for a habit the server has not confirmed yet.
    pub fn temporary() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HabitId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHabitId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl<'de> Deserialize<'de> for HabitId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = match RawHabitId::deserialize(deserializer)? {
            RawHabitId::Text(text) => text,
            RawHabitId::Signed(n) => n.to_string(),
            RawHabitId::Unsigned(n) => n.to_string(),
        };
        if id.trim().is_empty() {
            return Err(serde::de::Error::custom("habit id cannot be empty"));
        }
        Ok(Self(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(alias = "Saude", alias = "Saúde")]
    Health,
    #[serde(alias = "Trabalho")]
    Work,
    #[serde(alias = "Estudo", alias = "Estudos")]
    Study,
    #[serde(alias = "Espirito", alias = "Espírito", alias = "Espiritual")]
    Spirit,
    #[serde(alias = "Autocuidado")]
    SelfCare,
    #[serde(alias = "Mente")]
    Mind,
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Health,
        Category::Work,
        Category::Study,
        Category::Spirit,
        Category::SelfCare,
        Category::Mind,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Health => "Health",
            Category::Work => "Work",
            Category::Study => "Study",
            Category::Spirit => "Spirit",
            Category::SelfCare => "SelfCare",
            Category::Mind => "Mind",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', '_', ' '], "");
        let alias = match wanted.as_str() {
            "saude" | "saúde" => Some(Category::Health),
            "trabalho" => Some(Category::Work),
            "estudo" | "estudos" => Some(Category::Study),
            "espirito" | "espírito" | "espiritual" => Some(Category::Spirit),
            "autocuidado" => Some(Category::SelfCare),
            "mente" => Some(Category::Mind),
            _ => None,
        };
        alias
            .or_else(|| {
                Category::ALL
                    .into_iter()
                    .find(|c| c.label().to_ascii_lowercase() == wanted)
            })
            .ok_or_else(|| {
                anyhow!("unknown category: {s} (expected one of Health, Work, Study, Spirit, SelfCare, Mind, Other)")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,

    #[serde(rename = "nome", alias = "name")]
    pub name: String,

    #[serde(rename = "categoria", alias = "category", default = "default_category")]
    pub category: Category,
}

fn default_category() -> Category {
    Category::Other
}

/// A habit as the user typed it, before any id exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewHabit {
    #[serde(rename = "nome")]
    pub name: String,

    #[serde(rename = "categoria")]
    pub category: Category,
}

impl NewHabit {
    pub fn into_habit(self, id: HabitId) -> Habit {
        Habit {
            id,
            name: self.name,
            category: self.category,
        }
    }
}

/// Habit ids assigned to each weekday. All seven days always exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyPlan {
    days: [BTreeSet<HabitId>; 7],
}

impl WeeklyPlan {
    /// Builds a plan from the service's `{mon: [...], ...}` map; absent days are empty.
    pub fn from_wire(raw: BTreeMap<WeekdayCode, Vec<HabitId>>) -> Self {
        let mut plan = Self::default();
        for (day, ids) in raw {
            plan.set_day(day, ids.into_iter().collect());
        }
        plan
    }

    pub fn day(&self, day: WeekdayCode) -> &BTreeSet<HabitId> {
        &self.days[day.index()]
    }

    pub fn set_day(&mut self, day: WeekdayCode, ids: BTreeSet<HabitId>) {
        self.days[day.index()] = ids;
    }

    /// Flips membership and returns whether the id is now assigned.
    pub fn toggle(&mut self, day: WeekdayCode, id: &HabitId) -> bool {
        let slot = &mut self.days[day.index()];
        if slot.remove(id) {
            false
        } else {
            slot.insert(id.clone());
            true
        }
    }

    pub fn replicate_from(&mut self, source: WeekdayCode) {
        let template = self.day(source).clone();
        for slot in &mut self.days {
            slot.clone_from(&template);
        }
    }

    pub fn rename_habit(&mut self, from: &HabitId, to: &HabitId) {
        for slot in &mut self.days {
            if slot.remove(from) {
                slot.insert(to.clone());
            }
        }
    }

    pub fn remove_habit(&mut self, id: &HabitId) {
        for slot in &mut self.days {
            slot.remove(id);
        }
    }
}

/// Ids marked done for the currently viewed day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSet(BTreeSet<HabitId>);

impl CompletionSet {
    pub fn contains(&self, id: &HabitId) -> bool {
        self.0.contains(id)
    }

    /// Flips membership and returns whether the id is now marked done.
    pub fn toggle(&mut self, id: &HabitId) -> bool {
        if self.0.remove(id) {
            false
        } else {
            self.0.insert(id.clone());
            true
        }
    }

    pub fn rename_habit(&mut self, from: &HabitId, to: &HabitId) {
        if self.0.remove(from) {
            self.0.insert(to.clone());
        }
    }

    pub fn remove_habit(&mut self, id: &HabitId) {
        self.0.remove(id);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<HabitId> for CompletionSet {
    fn from_iter<I: IntoIterator<Item = HabitId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn ids(raw: &[&str]) -> BTreeSet<HabitId> {
        raw.iter().map(|s| HabitId::from(*s)).collect()
    }

    #[test]
    fn habit_decodes_numeric_ids_and_portuguese_keys() {
        let habit: Habit =
            serde_json::from_str(r#"{"id": 42, "nome": "Meditar", "categoria": "Mente"}"#)
                .expect("decode habit");
        assert_eq!(habit.id.as_str(), "42");
        assert_eq!(habit.name, "Meditar");
        assert_eq!(habit.category, Category::Mind);
    }

    #[test]
    fn unknown_or_missing_category_is_other() {
        let routine: Habit =
            serde_json::from_str(r#"{"id": "a1", "name": "Read", "categoria": "Rotina"}"#)
                .expect("decode habit");
        assert_eq!(routine.category, Category::Other);

        let bare: Habit =
            serde_json::from_str(r#"{"id": "a2", "nome": "Walk"}"#).expect("decode habit");
        assert_eq!(bare.category, Category::Other);
    }

    #[test]
    fn empty_ids_are_rejected() {
        let result = serde_json::from_str::<Habit>(r#"{"id": "  ", "nome": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn temporary_ids_are_unique_and_flagged() {
        let a = HabitId::temporary();
        let b = HabitId::temporary();
        assert_ne!(a, b);
        assert!(a.is_temporary());
        assert!(!HabitId::from("17").is_temporary());
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("self-care".parse::<Category>().expect("parse"), Category::SelfCare);
        assert_eq!("HEALTH".parse::<Category>().expect("parse"), Category::Health);
        assert_eq!("Saúde".parse::<Category>().expect("parse"), Category::Health);
        assert!("chores".parse::<Category>().is_err());
    }

    #[test]
    fn plan_from_wire_fills_missing_days() {
        let mut raw = BTreeMap::new();
        raw.insert(WeekdayCode::Mon, vec![HabitId::from("1"), HabitId::from("2")]);
        let plan = WeeklyPlan::from_wire(raw);

        assert_eq!(plan.day(WeekdayCode::Mon), &ids(&["1", "2"]));
        for day in WeekdayCode::ALL.into_iter().filter(|d| *d != WeekdayCode::Mon) {
            assert!(plan.day(day).is_empty(), "{day} should be empty");
        }
    }

    #[test]
    fn plan_toggle_flips_membership() {
        let mut plan = WeeklyPlan::default();
        let id = HabitId::from("7");
        assert!(plan.toggle(WeekdayCode::Wed, &id));
        assert!(plan.day(WeekdayCode::Wed).contains(&id));
        assert!(!plan.toggle(WeekdayCode::Wed, &id));
        assert!(plan.day(WeekdayCode::Wed).is_empty());
    }

    #[test]
    fn replicate_copies_source_day_everywhere() {
        let mut plan = WeeklyPlan::default();
        plan.set_day(WeekdayCode::Mon, ids(&["1", "3"]));
        plan.set_day(WeekdayCode::Sat, ids(&["9"]));

        plan.replicate_from(WeekdayCode::Mon);

        for day in WeekdayCode::ALL {
            assert_eq!(plan.day(day), &ids(&["1", "3"]));
        }
    }

    #[test]
    fn rename_rewrites_every_day() {
        let mut plan = WeeklyPlan::default();
        plan.set_day(WeekdayCode::Mon, ids(&["tmp-x", "1"]));
        plan.set_day(WeekdayCode::Fri, ids(&["tmp-x"]));

        plan.rename_habit(&HabitId::from("tmp-x"), &HabitId::from("55"));

        assert_eq!(plan.day(WeekdayCode::Mon), &ids(&["1", "55"]));
        assert_eq!(plan.day(WeekdayCode::Fri), &ids(&["55"]));
        assert!(plan.day(WeekdayCode::Sun).is_empty());
    }
}
