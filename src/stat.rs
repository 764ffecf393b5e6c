//! Combat stats and effective-stat resolution.
//!
//! A combatant's *effective* stats are its base stats plus every active
//! buff and debuff, summed additively. Resolution keeps a breakdown of
//! every contribution so round reports can explain a number.
//!
//! ```text
//! [StatBlock] + [Buff/Debuff deltas] → [EffectiveStats]
//! ```

use crate::effect::ActiveEffect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One of the six combat stats.
///
/// Serialized in lowercase, matching jutsu data (`"power"`, `"defense"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Power,
    Defense,
    Health,
    Chakra,
    Accuracy,
    Dodge,
}

impl Stat {
    /// All stats, in display order.
    pub const ALL: [Stat; 6] = [
        Stat::Power,
        Stat::Defense,
        Stat::Health,
        Stat::Chakra,
        Stat::Accuracy,
        Stat::Dodge,
    ];

    /// Lowercase name used in formulas (`user.<name>`).
    pub fn name(self) -> &'static str {
        match self {
            Stat::Power => "power",
            Stat::Defense => "defense",
            Stat::Health => "health",
            Stat::Chakra => "chakra",
            Stat::Accuracy => "accuracy",
            Stat::Dodge => "dodge",
        }
    }

    /// Value used when the base stat is zero or missing.
    pub fn fallback(self) -> f64 {
        match self {
            Stat::Power | Stat::Defense | Stat::Chakra => 10.0,
            Stat::Health | Stat::Accuracy => 100.0,
            Stat::Dodge => 1.0,
        }
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Base values for all six stats.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{Stat, StatBlock};
///
/// let mut block = StatBlock::new(120.0, 40.0, 20.0);
/// block.set(Stat::Dodge, 5.0);
/// assert_eq!(block.get(Stat::Health), 120.0);
/// assert_eq!(block.get(Stat::Dodge), 5.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatBlock {
    pub power: f64,
    pub defense: f64,
    pub health: f64,
    pub chakra: f64,
    pub accuracy: f64,
    pub dodge: f64,
}

impl StatBlock {
    /// Create a block from health, power and defense; the rest start at zero.
    pub fn new(health: f64, power: f64, defense: f64) -> Self {
        Self {
            health,
            power,
            defense,
            ..Self::default()
        }
    }

    /// Read a stat.
    pub fn get(&self, stat: Stat) -> f64 {
        match stat {
            Stat::Power => self.power,
            Stat::Defense => self.defense,
            Stat::Health => self.health,
            Stat::Chakra => self.chakra,
            Stat::Accuracy => self.accuracy,
            Stat::Dodge => self.dodge,
        }
    }

    /// Write a stat.
    pub fn set(&mut self, stat: Stat, value: f64) {
        match stat {
            Stat::Power => self.power = value,
            Stat::Defense => self.defense = value,
            Stat::Health => self.health = value,
            Stat::Chakra => self.chakra = value,
            Stat::Accuracy => self.accuracy = value,
            Stat::Dodge => self.dodge = value,
        }
    }
}

/// Stat deltas carried by a buff or debuff.
pub type StatChanges = BTreeMap<Stat, f64>;

/// Format stat changes as `"power: +10, defense: -5"`.
pub fn format_changes(changes: &StatChanges) -> String {
    changes
        .iter()
        .map(|(stat, value)| format!("{}: {:+}", stat, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single resolved stat with its breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveStat {
    /// The stat.
    pub stat: Stat,
    /// Final value: base plus all modifiers.
    pub value: f64,
    /// Base value after the zero fallback.
    pub base: f64,
    /// `(label, delta)` for each buff or debuff, in application order.
    pub modifiers: Vec<(String, f64)>,
}

impl EffectiveStat {
    fn new(stat: Stat, base: f64) -> Self {
        Self {
            stat,
            value: base,
            base,
            modifiers: Vec::new(),
        }
    }

    fn add_modifier(&mut self, label: impl Into<String>, delta: f64) {
        self.value += delta;
        self.modifiers.push((label.into(), delta));
    }
}

/// Effective stats for a combatant at a point in time.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{ActiveEffect, EffectiveStats, Stat, StatBlock};
/// use std::collections::BTreeMap;
///
/// let base = StatBlock::new(100.0, 50.0, 0.0);
/// let mut stats = BTreeMap::new();
/// stats.insert(Stat::Power, 25.0);
/// let effects = vec![ActiveEffect::buff(stats, 2)];
///
/// let effective = EffectiveStats::resolve(&base, &effects);
/// assert_eq!(effective.get(Stat::Power), 75.0);
/// assert_eq!(effective.get(Stat::Defense), 10.0); // zero falls back
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveStats {
    stats: Vec<EffectiveStat>,
}

impl EffectiveStats {
    /// Resolve effective stats from a base block and active effects.
    pub fn resolve(base: &StatBlock, effects: &[ActiveEffect]) -> Self {
        let mut stats: Vec<EffectiveStat> = Stat::ALL
            .iter()
            .map(|&stat| {
                let raw = base.get(stat);
                let base_value = if raw == 0.0 { stat.fallback() } else { raw };
                EffectiveStat::new(stat, base_value)
            })
            .collect();

        for effect in effects {
            if let Some(changes) = effect.stat_changes() {
                for (&stat, &delta) in changes {
                    stats[Self::index(stat)].add_modifier(effect.label(), delta);
                }
            }
        }

        Self { stats }
    }

    fn index(stat: Stat) -> usize {
        Stat::ALL
            .iter()
            .position(|s| *s == stat)
            .unwrap_or_default()
    }

    /// Effective value of a stat.
    pub fn get(&self, stat: Stat) -> f64 {
        self.stats[Self::index(stat)].value
    }

    /// Full breakdown of a stat.
    pub fn breakdown(&self, stat: Stat) -> &EffectiveStat {
        &self.stats[Self::index(stat)]
    }

    /// Iterate over `(stat, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Stat, f64)> + '_ {
        self.stats.iter().map(|s| (s.stat, s.value))
    }

    /// Override a value in place, dropping its breakdown.
    ///
    /// Used for per-action adjustments such as Flying Raijin zeroing accuracy.
    pub fn force(&mut self, stat: Stat, value: f64) {
        let entry = &mut self.stats[Self::index(stat)];
        entry.modifiers.push(("override".to_string(), value - entry.value));
        entry.value = value;
    }
}
