// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievement rule engine.
//!
//! The catalog is a static table of predicate descriptors. A single
//! dispatcher (`measure`) interprets each descriptor, so new achievements
//! are added by extending the table only.

use crate::models::{
    AchievementCategory, AchievementDefinition, AchievementProgress, PredicateKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Reference catalog.
pub static CATALOG: &[AchievementDefinition] = &[
    AchievementDefinition {
        achievement_id: "first_activity",
        title: "First Steps",
        description: "Complete your first session",
        category: AchievementCategory::Frequency,
        target_value: 1.0,
        predicate: PredicateKind::SessionCount,
    },
    AchievementDefinition {
        achievement_id: "distance_5k",
        title: "5K Finisher",
        description: "Cover 5,000 m in a single session",
        category: AchievementCategory::Distance,
        target_value: 5_000.0,
        predicate: PredicateKind::SessionDistance,
    },
    AchievementDefinition {
        achievement_id: "distance_10k",
        title: "10K Finisher",
        description: "Cover 10,000 m in a single session",
        category: AchievementCategory::Distance,
        target_value: 10_000.0,
        predicate: PredicateKind::SessionDistance,
    },
    AchievementDefinition {
        achievement_id: "lifetime_100k",
        title: "Century Club",
        description: "Cover 100 km across all sessions",
        category: AchievementCategory::Distance,
        target_value: 100_000.0,
        predicate: PredicateKind::LifetimeDistance,
    },
    AchievementDefinition {
        achievement_id: "pace_5_min_km",
        title: "Speedster",
        description: "Average 5:00 min/km or faster over at least 1 km",
        category: AchievementCategory::Speed,
        target_value: 5.0,
        predicate: PredicateKind::PaceAtMost {
            min_distance_meters: 1_000.0,
        },
    },
    AchievementDefinition {
        achievement_id: "streak_7",
        title: "Week Warrior",
        description: "Meet your daily goal 7 days in a row",
        category: AchievementCategory::Consistency,
        target_value: 7.0,
        predicate: PredicateKind::StreakDays,
    },
    AchievementDefinition {
        achievement_id: "streak_30",
        title: "Habit Formed",
        description: "Meet your daily goal 30 days in a row",
        category: AchievementCategory::Consistency,
        target_value: 30.0,
        predicate: PredicateKind::StreakDays,
    },
    AchievementDefinition {
        achievement_id: "sessions_10",
        title: "Regular",
        description: "Complete 10 sessions",
        category: AchievementCategory::Frequency,
        target_value: 10.0,
        predicate: PredicateKind::SessionCount,
    },
    AchievementDefinition {
        achievement_id: "sessions_50",
        title: "Dedicated",
        description: "Complete 50 sessions",
        category: AchievementCategory::Frequency,
        target_value: 50.0,
        predicate: PredicateKind::SessionCount,
    },
    AchievementDefinition {
        achievement_id: "social_5",
        title: "Running Crew",
        description: "Connect with 5 friends",
        category: AchievementCategory::Social,
        target_value: 5.0,
        predicate: PredicateKind::SocialCount,
    },
];

/// Facts a session makes available to the rules.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AchievementFacts {
    pub session_distance_meters: f64,
    /// `None` when the session covered no distance
    pub session_pace_min_per_km: Option<f64>,
    pub current_streak: u32,
    /// Totals including this session
    pub lifetime_sessions: u32,
    pub lifetime_distance_meters: f64,
    pub social_connections: u32,
}

/// Result of one evaluation pass.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub rows: Vec<AchievementProgress>,
    pub newly_unlocked: Vec<&'static AchievementDefinition>,
}

/// One catalog entry joined with a user's progress.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    #[serde(flatten)]
    pub definition: AchievementDefinition,
    pub current_value: f64,
    pub progress_ratio: f64,
    pub is_unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub category: AchievementCategory,
    pub achievements: Vec<AchievementView>,
}

struct Measure {
    value: f64,
    ratio: f64,
    satisfied: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct AchievementEngine {
    catalog: &'static [AchievementDefinition],
}

impl Default for AchievementEngine {
    fn default() -> Self {
        Self { catalog: CATALOG }
    }
}

impl AchievementEngine {
    pub fn definition(&self, achievement_id: &str) -> Option<&'static AchievementDefinition> {
        self.catalog
            .iter()
            .find(|d| d.achievement_id == achievement_id)
    }

    /// Add a fresh row for every catalog entry the owner lacks.
    ///
    /// Returns the complete row set and whether anything was created.
    pub fn ensure_rows(
        &self,
        owner_id: &str,
        mut rows: Vec<AchievementProgress>,
    ) -> (Vec<AchievementProgress>, bool) {
        let before = rows.len();
        for def in self.catalog {
            if !rows.iter().any(|r| r.achievement_id == def.achievement_id) {
                rows.push(AchievementProgress::new(owner_id, def.achievement_id));
            }
        }
        let created = rows.len() > before;
        (rows, created)
    }

    /// Evaluate every locked row against `facts`.
    ///
    /// Unlocked rows are skipped entirely, so unlocking never reverts.
    pub fn evaluate(
        &self,
        owner_id: &str,
        rows: Vec<AchievementProgress>,
        facts: &AchievementFacts,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let (mut rows, _) = self.ensure_rows(owner_id, rows);
        let mut newly_unlocked = Vec::new();

        for row in rows.iter_mut().filter(|r| !r.is_unlocked) {
            let Some(def) = self.definition(&row.achievement_id) else {
                continue;
            };

            let measure = measure(def, facts, row);
            if measure.satisfied {
                if row.unlock(measure.value, now) {
                    tracing::info!(
                        owner_id,
                        achievement_id = def.achievement_id,
                        "Achievement unlocked"
                    );
                    newly_unlocked.push(def);
                }
            } else {
                row.record_progress(measure.value, measure.ratio);
            }
        }

        Evaluation {
            rows,
            newly_unlocked,
        }
    }

    /// Join rows with the catalog and group by category, in catalog order.
    pub fn group(&self, rows: &[AchievementProgress]) -> Vec<CategoryGroup> {
        let by_id: HashMap<&str, &AchievementProgress> = rows
            .iter()
            .map(|r| (r.achievement_id.as_str(), r))
            .collect();

        AchievementCategory::ALL
            .iter()
            .map(|&category| CategoryGroup {
                category,
                achievements: self
                    .catalog
                    .iter()
                    .filter(|d| d.category == category)
                    .map(|d| {
                        let row = by_id.get(d.achievement_id);
                        AchievementView {
                            definition: *d,
                            current_value: row.map_or(0.0, |r| r.current_value),
                            progress_ratio: row.map_or(0.0, |r| r.progress_ratio),
                            is_unlocked: row.is_some_and(|r| r.is_unlocked),
                            unlocked_at: row.and_then(|r| r.unlocked_at),
                        }
                    })
                    .collect(),
            })
            .filter(|group| !group.achievements.is_empty())
            .collect()
    }
}

/// Single dispatcher over predicate kinds.
fn measure(
    def: &AchievementDefinition,
    facts: &AchievementFacts,
    row: &AchievementProgress,
) -> Measure {
    let target = def.target_value;
    let toward = |value: f64| Measure {
        value,
        ratio: if target > 0.0 { value / target } else { 1.0 },
        satisfied: value >= target,
    };

    match def.predicate {
        PredicateKind::SessionDistance => {
            // Best single session so far
            let best = row.current_value.max(facts.session_distance_meters);
            Measure {
                satisfied: facts.session_distance_meters >= target,
                ..toward(best)
            }
        }
        PredicateKind::LifetimeDistance => {
            toward(row.current_value.max(facts.lifetime_distance_meters))
        }
        PredicateKind::SessionCount => {
            toward(row.current_value.max(f64::from(facts.lifetime_sessions)))
        }
        PredicateKind::StreakDays => toward(f64::from(facts.current_streak)),
        PredicateKind::SocialCount => toward(f64::from(facts.social_connections)),
        PredicateKind::PaceAtMost {
            min_distance_meters,
        } => {
            // current_value holds the best qualifying pace; 0 means none yet
            let session_pace = facts
                .session_pace_min_per_km
                .filter(|p| p.is_finite() && *p > 0.0)
                .filter(|_| facts.session_distance_meters >= min_distance_meters);
            let best = match (row.current_value > 0.0, session_pace) {
                (true, Some(p)) => row.current_value.min(p),
                (true, None) => row.current_value,
                (false, Some(p)) => p,
                (false, None) => 0.0,
            };
            Measure {
                value: best,
                ratio: if best > 0.0 { target / best } else { 0.0 },
                satisfied: session_pace.is_some_and(|p| p <= target),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 9, 0, 0).unwrap()
    }

    fn facts(distance: f64, minutes: f64, streak: u32, sessions: u32, lifetime: f64) -> AchievementFacts {
        AchievementFacts {
            session_distance_meters: distance,
            session_pace_min_per_km: (distance > 0.0).then(|| minutes / (distance / 1000.0)),
            current_streak: streak,
            lifetime_sessions: sessions,
            lifetime_distance_meters: lifetime,
            social_connections: 0,
        }
    }

    fn titles(eval: &Evaluation) -> Vec<&'static str> {
        eval.newly_unlocked.iter().map(|d| d.title).collect()
    }

    #[test]
    fn test_catalog_ids_unique() {
        let mut ids: Vec<_> = CATALOG.iter().map(|d| d.achievement_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), CATALOG.len());
        assert_eq!(CATALOG.len(), 10);
    }

    #[test]
    fn test_ensure_rows_creates_all_once() {
        let engine = AchievementEngine::default();
        let (rows, created) = engine.ensure_rows("u1", Vec::new());
        assert!(created);
        assert_eq!(rows.len(), CATALOG.len());

        let (rows, created) = engine.ensure_rows("u1", rows);
        assert!(!created);
        assert_eq!(rows.len(), CATALOG.len());
    }

    #[test]
    fn test_first_5k_session_unlocks_two() {
        let engine = AchievementEngine::default();
        let eval = engine.evaluate("u1", Vec::new(), &facts(5200.0, 31.2, 1, 1, 5200.0), now());
        let unlocked = titles(&eval);
        assert!(unlocked.contains(&"First Steps"));
        assert!(unlocked.contains(&"5K Finisher"));
        assert!(!unlocked.contains(&"10K Finisher"));
        assert!(!unlocked.contains(&"Speedster")); // 6:00 min/km
    }

    #[test]
    fn test_partial_progress_recorded() {
        let engine = AchievementEngine::default();
        let eval = engine.evaluate("u1", Vec::new(), &facts(2500.0, 15.0, 3, 1, 2500.0), now());
        let row = |id: &str| eval.rows.iter().find(|r| r.achievement_id == id).unwrap();

        assert!((row("streak_7").progress_ratio - 3.0 / 7.0).abs() < 1e-9);
        assert!((row("distance_5k").progress_ratio - 0.5).abs() < 1e-9);
        assert!((row("lifetime_100k").current_value - 2500.0).abs() < 1e-9);
        assert!((row("pace_5_min_km").progress_ratio - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_lifetime_value_never_decreases() {
        let engine = AchievementEngine::default();
        let first = engine.evaluate("u1", Vec::new(), &facts(3000.0, 18.0, 1, 1, 3000.0), now());
        // Stale totals must not pull the cumulative value back down
        let second = engine.evaluate("u1", first.rows, &facts(1000.0, 6.0, 1, 1, 1000.0), now());
        let row = second
            .rows
            .iter()
            .find(|r| r.achievement_id == "lifetime_100k")
            .unwrap();
        assert_eq!(row.current_value, 3000.0);
    }

    #[test]
    fn test_unlocked_rows_are_never_revisited() {
        let engine = AchievementEngine::default();
        let first = engine.evaluate("u1", Vec::new(), &facts(5000.0, 30.0, 7, 1, 5000.0), now());
        assert!(titles(&first).contains(&"Week Warrior"));

        let later = now() + chrono::Duration::days(3);
        let second = engine.evaluate("u1", first.rows, &facts(0.0, 0.0, 1, 2, 5000.0), later);
        let streak = second
            .rows
            .iter()
            .find(|r| r.achievement_id == "streak_7")
            .unwrap();
        assert!(streak.is_unlocked);
        assert_eq!(streak.progress_ratio, 1.0);
        assert_eq!(streak.unlocked_at, Some(now()));
        assert!(second.newly_unlocked.is_empty());
    }

    #[test]
    fn test_pace_requires_minimum_distance() {
        let engine = AchievementEngine::default();
        // 4:00 min/km but only 800 m
        let eval = engine.evaluate("u1", Vec::new(), &facts(800.0, 3.2, 1, 1, 800.0), now());
        assert!(!titles(&eval).contains(&"Speedster"));

        let eval = engine.evaluate("u1", eval.rows, &facts(2000.0, 9.0, 1, 2, 2800.0), now());
        assert!(titles(&eval).contains(&"Speedster"));
    }

    #[test]
    fn test_social_count() {
        let engine = AchievementEngine::default();
        let mut f = facts(0.0, 0.0, 0, 1, 0.0);
        f.social_connections = 5;
        let eval = engine.evaluate("u1", Vec::new(), &f, now());
        assert!(titles(&eval).contains(&"Running Crew"));
    }

    #[test]
    fn test_ratios_stay_in_unit_interval() {
        let engine = AchievementEngine::default();
        let mut rows = Vec::new();
        for (i, d) in [0.0, 50.0, 12_000.0, 99_000.0, 0.0].iter().enumerate() {
            let f = facts(*d, 4.0, i as u32 * 9, i as u32 + 1, d * 3.0);
            rows = engine.evaluate("u1", rows, &f, now()).rows;
            for r in &rows {
                assert!((0.0..=1.0).contains(&r.progress_ratio), "{:?}", r);
            }
        }
    }

    #[test]
    fn test_group_by_category_in_catalog_order() {
        let engine = AchievementEngine::default();
        let eval = engine.evaluate("u1", Vec::new(), &facts(5200.0, 31.2, 1, 1, 5200.0), now());
        let groups = engine.group(&eval.rows);

        assert_eq!(groups.len(), 5);
        assert_eq!(groups[0].category, AchievementCategory::Distance);
        let distance: Vec<_> = groups[0]
            .achievements
            .iter()
            .map(|a| a.definition.achievement_id)
            .collect();
        assert_eq!(distance, vec!["distance_5k", "distance_10k", "lifetime_100k"]);
        assert!(groups[0].achievements[0].is_unlocked);
    }
}
