//! Effect definitions and the effects that stay on a combatant.
//!
//! An [`EffectSpec`] is what jutsu data declares (`{"type": "damage", ...}`).
//! Applying a spec may leave an [`ActiveEffect`] on the user or target that
//! lasts a number of rounds.

use crate::formula::Formula;
use crate::stat::{Stat, StatChanges};
use crate::status::StatusId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn one_round() -> u32 {
    1
}

fn certain() -> f64 {
    1.0
}

/// A stat payload entry: a literal number or a formula.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::StatValueSpec;
///
/// let literal: StatValueSpec = serde_json::from_str("15").unwrap();
/// let formula: StatValueSpec = serde_json::from_str("\"user.power * 0.1\"").unwrap();
/// assert_eq!(literal, StatValueSpec::Value(15.0));
/// assert!(matches!(formula, StatValueSpec::Formula(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValueSpec {
    Value(f64),
    Formula(Formula),
}

/// Stat payload of a buff or debuff definition.
pub type StatSpecs = BTreeMap<Stat, StatValueSpec>;

/// One effect declared by a jutsu, round effect or combo.
///
/// Serialized with a `type` tag and the camelCase field names jutsu data
/// uses. A missing `duration` means one round; a missing `chance` means
/// the effect always lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EffectSpec {
    /// Roll to hit, then deal `formula` damage.
    Damage {
        formula: Formula,
        #[serde(rename = "accuracyBonus", default)]
        accuracy_bonus: f64,
    },
    /// Stat bonus on the user.
    Buff {
        stats: StatSpecs,
        #[serde(default = "one_round")]
        duration: u32,
    },
    /// Stat penalty on the target; values are always applied as negatives.
    Debuff {
        stats: StatSpecs,
        #[serde(default = "one_round")]
        duration: u32,
    },
    /// Heal the user.
    Heal { formula: Formula },
    /// With probability `chance`, deal the target's full health as damage.
    InstantKill { chance: f64 },
    /// Damage over time on the target.
    Bleed {
        #[serde(default = "one_round")]
        duration: u32,
        #[serde(rename = "damagePerTurn", default, skip_serializing_if = "Option::is_none")]
        damage_per_turn: Option<f64>,
        #[serde(
            rename = "damagePerTurnFormula",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        damage_per_turn_formula: Option<Formula>,
    },
    /// A named status on the target, optionally ticking damage or healing.
    Status {
        status: StatusId,
        #[serde(default = "certain")]
        chance: f64,
        #[serde(default = "one_round")]
        duration: u32,
        #[serde(rename = "damagePerTurn", default, skip_serializing_if = "Option::is_none")]
        damage_per_turn: Option<f64>,
        #[serde(rename = "healPerTurn", default, skip_serializing_if = "Option::is_none")]
        heal_per_turn: Option<f64>,
        #[serde(
            rename = "damagePerTurnFormula",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        damage_per_turn_formula: Option<Formula>,
        #[serde(
            rename = "healPerTurnFormula",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        heal_per_turn_formula: Option<Formula>,
    },
    /// Restore chakra to the user.
    #[serde(rename = "chakra_gain")]
    ChakraGain { formula: Formula },
    /// Fixed damage that never misses. Only combos use it.
    FlatDamage { value: f64 },
}

impl EffectSpec {
    /// The `type` tag, as it appears in data.
    pub fn type_name(&self) -> &'static str {
        match self {
            EffectSpec::Damage { .. } => "damage",
            EffectSpec::Buff { .. } => "buff",
            EffectSpec::Debuff { .. } => "debuff",
            EffectSpec::Heal { .. } => "heal",
            EffectSpec::InstantKill { .. } => "instantKill",
            EffectSpec::Bleed { .. } => "bleed",
            EffectSpec::Status { .. } => "status",
            EffectSpec::ChakraGain { .. } => "chakra_gain",
            EffectSpec::FlatDamage { .. } => "flatDamage",
        }
    }

    /// Shorthand for a damage effect with no accuracy bonus.
    pub fn damage(formula: Formula) -> Self {
        EffectSpec::Damage {
            formula,
            accuracy_bonus: 0.0,
        }
    }

    /// Shorthand for a certain, non-ticking status.
    pub fn status(status: impl Into<StatusId>, duration: u32) -> Self {
        EffectSpec::Status {
            status: status.into(),
            chance: 1.0,
            duration,
            damage_per_turn: None,
            heal_per_turn: None,
            damage_per_turn_formula: None,
            heal_per_turn_formula: None,
        }
    }
}

/// An effect currently attached to a combatant.
///
/// `duration` counts the rounds left; it is decremented once per round and
/// the effect is removed when it reaches zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActiveEffect {
    Buff {
        stats: StatChanges,
        duration: u32,
    },
    Debuff {
        stats: StatChanges,
        duration: u32,
    },
    Bleed {
        damage_per_turn: f64,
        duration: u32,
    },
    Status {
        status: StatusId,
        duration: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        damage_per_turn: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heal_per_turn: Option<f64>,
    },
}

impl ActiveEffect {
    pub fn buff(stats: StatChanges, duration: u32) -> Self {
        ActiveEffect::Buff { stats, duration }
    }

    pub fn debuff(stats: StatChanges, duration: u32) -> Self {
        ActiveEffect::Debuff { stats, duration }
    }

    pub fn bleed(damage_per_turn: f64, duration: u32) -> Self {
        ActiveEffect::Bleed {
            damage_per_turn,
            duration,
        }
    }

    /// A plain status with no per-turn damage or healing.
    pub fn status(status: StatusId, duration: u32) -> Self {
        ActiveEffect::Status {
            status,
            duration,
            damage_per_turn: None,
            heal_per_turn: None,
        }
    }

    /// Rounds remaining.
    pub fn duration(&self) -> u32 {
        match self {
            ActiveEffect::Buff { duration, .. }
            | ActiveEffect::Debuff { duration, .. }
            | ActiveEffect::Bleed { duration, .. }
            | ActiveEffect::Status { duration, .. } => *duration,
        }
    }

    /// Decrement the duration; returns `true` when the effect has expired.
    pub fn tick_down(&mut self) -> bool {
        let duration = match self {
            ActiveEffect::Buff { duration, .. }
            | ActiveEffect::Debuff { duration, .. }
            | ActiveEffect::Bleed { duration, .. }
            | ActiveEffect::Status { duration, .. } => duration,
        };
        *duration = duration.saturating_sub(1);
        *duration == 0
    }

    /// Stat deltas for buffs and debuffs.
    pub fn stat_changes(&self) -> Option<&StatChanges> {
        match self {
            ActiveEffect::Buff { stats, .. } | ActiveEffect::Debuff { stats, .. } => Some(stats),
            _ => None,
        }
    }

    /// The status id, for status effects.
    pub fn status_id(&self) -> Option<&StatusId> {
        match self {
            ActiveEffect::Status { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Short label used in breakdowns and "worn off" messages.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::{ActiveEffect, StatusId};
    ///
    /// let stun = ActiveEffect::status(StatusId::from_str("stun"), 2);
    /// assert_eq!(stun.label(), "status (stun)");
    /// assert_eq!(ActiveEffect::bleed(10.0, 3).label(), "bleed");
    /// ```
    pub fn label(&self) -> String {
        match self {
            ActiveEffect::Buff { .. } => "buff".to_string(),
            ActiveEffect::Debuff { .. } => "debuff".to_string(),
            ActiveEffect::Bleed { .. } => "bleed".to_string(),
            ActiveEffect::Status { status, .. } => format!("status ({})", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_damage_with_bonus() {
        let spec: EffectSpec = serde_json::from_str(
            r#"{"type": "damage", "formula": "user.power * 2", "accuracyBonus": 15}"#,
        )
        .unwrap();
        match spec {
            EffectSpec::Damage {
                formula,
                accuracy_bonus,
            } => {
                assert_eq!(formula.source(), "user.power * 2");
                assert_eq!(accuracy_bonus, 15.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let spec: EffectSpec =
            serde_json::from_str(r#"{"type": "status", "status": "stun"}"#).unwrap();
        match spec {
            EffectSpec::Status {
                chance, duration, ..
            } => {
                assert_eq!(chance, 1.0);
                assert_eq!(duration, 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let buff: EffectSpec = serde_json::from_str(
            r#"{"type": "buff", "stats": {"power": 10, "defense": "user.defense * 0.5"}}"#,
        )
        .unwrap();
        assert_eq!(buff.type_name(), "buff");
    }

    #[test]
    fn test_parse_tag_names() {
        let gain: EffectSpec =
            serde_json::from_str(r#"{"type": "chakra_gain", "formula": "3"}"#).unwrap();
        assert_eq!(gain.type_name(), "chakra_gain");
        let kill: EffectSpec =
            serde_json::from_str(r#"{"type": "instantKill", "chance": 0.1}"#).unwrap();
        assert_eq!(kill, EffectSpec::InstantKill { chance: 0.1 });
        let bleed: EffectSpec = serde_json::from_str(
            r#"{"type": "bleed", "duration": 3, "damagePerTurnFormula": "target.health * 0.1"}"#,
        )
        .unwrap();
        assert!(matches!(
            bleed,
            EffectSpec::Bleed {
                duration: 3,
                damage_per_turn: None,
                damage_per_turn_formula: Some(_)
            }
        ));
    }

    #[test]
    fn test_bad_formula_rejected() {
        let result: Result<EffectSpec, _> =
            serde_json::from_str(r#"{"type": "heal", "formula": "user.health *"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_tick_down_expires() {
        let mut effect = ActiveEffect::status(StatusId::from_str("mist"), 2);
        assert!(!effect.tick_down());
        assert_eq!(effect.duration(), 1);
        assert!(effect.tick_down());
        assert_eq!(effect.duration(), 0);
    }

    #[test]
    fn test_active_effect_accessors() {
        let mut stats = StatChanges::new();
        stats.insert(Stat::Power, -5.0);
        let debuff = ActiveEffect::debuff(stats, 1);
        assert!(debuff.stat_changes().is_some());
        assert!(debuff.status_id().is_none());

        let stun = ActiveEffect::status(StatusId::from_str("stun"), 1);
        assert!(stun.stat_changes().is_none());
        assert_eq!(stun.status_id().map(|s| s.as_str()), Some("stun"));
    }
}
