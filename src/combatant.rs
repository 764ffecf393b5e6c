//! Battle participants.
//!
//! A [`Combatant`] is the in-battle state of a player or NPC: base stats,
//! current health and chakra, known jutsu, bloodline, combo progress and
//! active effects.

use crate::bloodline::{Bloodline, BloodlineState};
use crate::config::BattleConfig;
use crate::effect::ActiveEffect;
use crate::jutsu::ComboProgress;
use crate::stat::{EffectiveStats, StatBlock};
use crate::status::StatusId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

const NPC_PREFIX: &str = "NPC_";

/// Opaque participant identifier. NPC ids carry an `NPC_` prefix.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::CombatantId;
///
/// let player = CombatantId::from("123456789");
/// let npc = CombatantId::npc("Zabuza");
///
/// assert!(!player.is_npc());
/// assert!(npc.is_npc());
/// assert_eq!(npc.as_str(), "NPC_Zabuza");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CombatantId(Arc<str>);

impl CombatantId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    /// Id for an NPC named `name`.
    pub fn npc(name: &str) -> Self {
        Self(Arc::from(format!("{}{}", NPC_PREFIX, name)))
    }

    pub fn is_npc(&self) -> bool {
        self.0.starts_with(NPC_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for CombatantId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CombatantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(CombatantId(Arc::from(s)))
    }
}

impl From<&str> for CombatantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CombatantId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl std::fmt::Display for CombatantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-battle state of a player or NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub level: u32,
    /// Power and defense come from here; the other fields are tracked below.
    pub base: StatBlock,
    pub current_health: f64,
    pub max_health: f64,
    pub chakra: f64,
    pub accuracy: f64,
    pub dodge: f64,
    /// Known jutsu in slot order.
    pub jutsu: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloodline: Option<Bloodline>,
    #[serde(default)]
    pub bloodline_state: BloodlineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combo: Option<ComboProgress>,
    #[serde(default)]
    pub active_effects: Vec<ActiveEffect>,
}

impl Combatant {
    /// Build a player combatant.
    ///
    /// Health starts full. Chakra is `stats.chakra`, or the configured
    /// starting chakra when that is zero. Empty and `"None"` jutsu slots
    /// are dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::{BattleConfig, Combatant, StatBlock};
    ///
    /// let naruto = Combatant::player(
    ///     "1",
    ///     "Naruto",
    ///     StatBlock::new(300.0, 60.0, 40.0),
    ///     vec!["Attack".into(), "None".into(), "Rasengan".into()],
    ///     &BattleConfig::default(),
    /// );
    ///
    /// assert_eq!(naruto.current_health, 300.0);
    /// assert_eq!(naruto.chakra, 10.0);
    /// assert_eq!(naruto.jutsu_by_slot(2), Some("Rasengan"));
    /// ```
    pub fn player(
        id: impl Into<CombatantId>,
        name: impl Into<String>,
        stats: StatBlock,
        jutsu: Vec<String>,
        config: &BattleConfig,
    ) -> Self {
        let chakra = if stats.chakra > 0.0 {
            stats.chakra
        } else {
            config.starting_chakra
        };
        let accuracy = if stats.accuracy > 0.0 {
            stats.accuracy
        } else {
            config.default_accuracy
        };
        Self {
            id: id.into(),
            name: name.into(),
            level: 1,
            base: stats,
            current_health: stats.health,
            max_health: stats.health,
            chakra,
            accuracy,
            dodge: stats.dodge,
            jutsu: jutsu
                .into_iter()
                .filter(|j| !j.is_empty() && j != "None")
                .collect(),
            bloodline: None,
            bloodline_state: BloodlineState::default(),
            combo: None,
            active_effects: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_bloodline(mut self, bloodline: Bloodline) -> Self {
        self.bloodline = Some(bloodline);
        self
    }

    pub fn with_combo(mut self, progress: ComboProgress) -> Self {
        self.combo = Some(progress);
        self
    }

    /// Current stats with buffs and debuffs applied.
    ///
    /// Health resolves from max health and chakra from current chakra.
    pub fn effective_stats(&self) -> EffectiveStats {
        let block = StatBlock {
            power: self.base.power,
            defense: self.base.defense,
            health: self.max_health,
            chakra: self.chakra,
            accuracy: self.accuracy,
            dodge: self.dodge,
        };
        EffectiveStats::resolve(&block, &self.active_effects)
    }

    pub fn is_alive(&self) -> bool {
        self.current_health > 0.0
    }

    /// The first active status that prevents acting, if any.
    pub fn incapacitating_status(&self) -> Option<&StatusId> {
        self.active_effects
            .iter()
            .filter_map(ActiveEffect::status_id)
            .find(|s| s.incapacitates())
    }

    pub fn has_status(&self, name: &str) -> bool {
        self.active_effects
            .iter()
            .filter_map(ActiveEffect::status_id)
            .any(|s| s.is(name))
    }

    /// Lose health, never below zero. Returns the amount actually lost.
    pub fn take_damage(&mut self, amount: f64) -> f64 {
        let before = self.current_health;
        self.current_health = (self.current_health - amount.max(0.0)).max(0.0);
        before - self.current_health
    }

    /// Regain health, never above max. Returns the amount actually healed.
    pub fn heal(&mut self, amount: f64) -> f64 {
        let before = self.current_health;
        self.current_health = (self.current_health + amount.max(0.0)).min(self.max_health);
        (self.current_health - before).max(0.0)
    }

    /// Regain chakra up to `cap`. Returns the amount gained.
    pub fn gain_chakra(&mut self, amount: f64, cap: f64) -> f64 {
        if self.chakra >= cap {
            return 0.0;
        }
        let before = self.chakra;
        self.chakra = (self.chakra + amount.max(0.0)).min(cap);
        self.chakra - before
    }

    /// Spend chakra if there is enough; returns whether it was spent.
    pub fn spend_chakra(&mut self, amount: f64) -> bool {
        if self.chakra < amount {
            return false;
        }
        self.chakra = (self.chakra - amount).max(0.0);
        true
    }

    pub fn add_effect(&mut self, effect: ActiveEffect) {
        self.active_effects.push(effect);
    }

    /// Remove the first status named `name`. Returns whether one was removed.
    pub fn remove_status(&mut self, name: &str) -> bool {
        match self
            .active_effects
            .iter()
            .position(|e| e.status_id().is_some_and(|s| s.is(name)))
        {
            Some(index) => {
                self.active_effects.remove(index);
                true
            }
            None => false,
        }
    }

    /// Jutsu behind a 1-based move button.
    pub fn jutsu_by_slot(&self, slot: usize) -> Option<&str> {
        slot.checked_sub(1)
            .and_then(|i| self.jutsu.get(i))
            .map(String::as_str)
    }

    /// Health as a fraction of max health.
    pub fn health_fraction(&self) -> f64 {
        if self.max_health <= 0.0 {
            0.0
        } else {
            self.current_health / self.max_health
        }
    }
}
