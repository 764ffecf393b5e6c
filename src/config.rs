//! Engine configuration.
//!
//! Every field has a default, so a config file only needs to list what it
//! changes. Durations are written as whole seconds.

use crate::error::BattleError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Tunables for the round loop and the effect interpreter.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::BattleConfig;
/// use std::time::Duration;
///
/// let config = BattleConfig::from_json_str(r#"{"max_chakra": 20, "move_timeout": 30}"#).unwrap();
/// assert_eq!(config.max_chakra, 20.0);
/// assert_eq!(config.move_timeout, Duration::from_secs(30));
/// assert_eq!(config.passive_chakra_regen, 2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Chakra never rises above this through gains.
    pub max_chakra: f64,
    /// Chakra for players whose stats carry none.
    pub starting_chakra: f64,
    /// Chakra gained by resting.
    pub rest_chakra_gain: f64,
    /// Chakra both sides regain at the end of every round.
    pub passive_chakra_regen: f64,
    /// How long a move provider may take before the side forfeits.
    #[serde(with = "secs")]
    pub move_timeout: Duration,
    /// Rounds played before the battle is called a draw.
    pub max_rounds: u32,
    /// Default bleed damage per round, as a share of max health.
    pub bleed_percent: f64,
    /// Default poison damage per round, as a share of max health.
    pub poison_percent: f64,
    /// Accuracy for players whose stats carry none.
    pub default_accuracy: f64,
    /// Accuracy damage rolls use when the attacker's is zero.
    pub damage_context_accuracy: f64,
    /// Health fraction at or below which threshold bloodlines trigger.
    pub bloodline_threshold: f64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            max_chakra: 15.0,
            starting_chakra: 10.0,
            rest_chakra_gain: 1.0,
            passive_chakra_regen: 2.0,
            move_timeout: Duration::from_secs(90),
            max_rounds: 100,
            bleed_percent: 0.20,
            poison_percent: 0.05,
            default_accuracy: 100.0,
            damage_context_accuracy: 80.0,
            bloodline_threshold: 0.5,
        }
    }
}

impl BattleConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BattleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BattleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Timing for the ranked queue and ranked invitations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue wait after which a player is matched against an NPC.
    #[serde(with = "secs")]
    pub npc_fallback_after: Duration,
    /// Time both sides have to accept a ranked invitation.
    #[serde(with = "secs")]
    pub invitation_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            npc_fallback_after: Duration::from_secs(60),
            invitation_timeout: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BattleError> {
        Ok(serde_json::from_str(json)?)
    }
}
