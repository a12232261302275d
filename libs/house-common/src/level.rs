//! Experience thresholds and the level derived from them.

/// Ascending table of `(level, minimum experience)` pairs.
///
/// A user's level is the highest level whose threshold does not exceed their
/// experience total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    tiers: Vec<Tier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tier {
    level: i32,
    threshold: i64,
    name: &'static str,
}

impl LevelTable {
    /// Build a table from `(level, threshold)` pairs in any order.
    ///
    /// Panics if `thresholds` is empty.
    pub fn new(thresholds: Vec<(i32, i64)>) -> Self {
        assert!(!thresholds.is_empty(), "level table needs at least one tier");
        let mut tiers: Vec<Tier> = thresholds
            .into_iter()
            .map(|(level, threshold)| Tier {
                level,
                threshold,
                name: "",
            })
            .collect();
        tiers.sort_by_key(|t| (t.threshold, t.level));
        Self { tiers }
    }

    fn with_names(mut self, names: &[(i32, &'static str)]) -> Self {
        for tier in &mut self.tiers {
            if let Some((_, name)) = names.iter().find(|(level, _)| *level == tier.level) {
                tier.name = name;
            }
        }
        self
    }

    pub fn level_for(&self, exp: i64) -> i32 {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.threshold <= exp)
            .unwrap_or(&self.tiers[0])
            .level
    }

    pub fn threshold_of(&self, level: i32) -> Option<i64> {
        self.tiers.iter().find(|t| t.level == level).map(|t| t.threshold)
    }

    /// Display name of `level`, falling back to the lowest tier's name.
    pub fn name_of(&self, level: i32) -> &'static str {
        self.tiers
            .iter()
            .find(|t| t.level == level)
            .unwrap_or(&self.tiers[0])
            .name
    }

    pub fn max_level(&self) -> i32 {
        self.tiers.iter().map(|t| t.level).max().unwrap_or(1)
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        LevelTable::new(vec![(1, 0), (2, 100), (3, 500), (4, 2000), (5, 10000)]).with_names(&[
            (1, "Ordinary Grinder"),
            (2, "Overtime Grinder"),
            (3, "Elite Grinder"),
            (4, "Chosen Grinder"),
            (5, "Nuclear Grinder"),
        ])
    }
}
