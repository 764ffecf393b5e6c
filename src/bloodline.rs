//! Bloodline abilities.
//!
//! Nara is passive and fires every round. The others fire at most once per
//! battle, the first round their condition holds.

use crate::combatant::Combatant;
use crate::config::BattleConfig;
use crate::effect::ActiveEffect;
use crate::status::{known, StatusId};
use serde::{Deserialize, Serialize};
use std::fmt;

const NARA_CHAKRA: f64 = 3.0;
const SENJU_HEAL_FRACTION: f64 = 0.5;
const HYUGA_DRAIN: f64 = 5.0;
const UCHIHA_ACCURACY: f64 = 100.0;
const UCHIHA_ROUNDS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bloodline {
    Uchiha,
    Hyuga,
    Uzumaki,
    Senju,
    Nara,
}

impl fmt::Display for Bloodline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-battle bloodline bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BloodlineState {
    /// Uchiha's Sharingan is running.
    pub active: bool,
    pub rounds_left: u32,
    /// The once-per-battle ability has fired.
    pub used: bool,
}

/// A bloodline ability that fired this round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodlineTrigger {
    pub bloodline: Bloodline,
    pub ability: String,
    pub owner: String,
    pub description: String,
}

impl Bloodline {
    /// Display name of the ability.
    pub fn ability_name(self) -> &'static str {
        match self {
            Bloodline::Uchiha => "Sharingan",
            Bloodline::Hyuga => "Byakugan",
            Bloodline::Uzumaki => "Uzumaki Will",
            Bloodline::Senju => "Hyper Regeneration",
            Bloodline::Nara => "Battle IQ",
        }
    }

    /// Run the bloodline for `owner` at the start of a round.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::{BattleConfig, Bloodline, Combatant, StatBlock};
    ///
    /// let config = BattleConfig::default();
    /// let mut hashirama = Combatant::player("1", "Hashirama", StatBlock::new(200.0, 10.0, 10.0), vec![], &config)
    ///     .with_bloodline(Bloodline::Senju);
    /// let mut madara = Combatant::player("2", "Madara", StatBlock::new(200.0, 10.0, 10.0), vec![], &config);
    ///
    /// hashirama.take_damage(120.0);
    /// let trigger = Bloodline::Senju.on_round_start(&mut hashirama, &mut madara, &config);
    ///
    /// assert!(trigger.is_some());
    /// assert_eq!(hashirama.current_health, 180.0);
    /// assert!(hashirama.bloodline_state.used);
    /// ```
    pub fn on_round_start(
        self,
        owner: &mut Combatant,
        opponent: &mut Combatant,
        config: &BattleConfig,
    ) -> Option<BloodlineTrigger> {
        let owner_name = owner.name.clone();
        let trigger = |description: String| BloodlineTrigger {
            bloodline: self,
            ability: self.ability_name().to_string(),
            owner: owner_name,
            description,
        };

        if self == Bloodline::Nara {
            let gained = owner.gain_chakra(NARA_CHAKRA, config.max_chakra);
            tracing::debug!(owner = %owner.id, gained, "battle iq");
            return Some(trigger(format!("Battle IQ grants +{} chakra this round!", gained)));
        }

        let state = &mut owner.bloodline_state;
        if self == Bloodline::Uchiha && state.active {
            state.rounds_left = state.rounds_left.saturating_sub(1);
            if state.rounds_left == 0 {
                state.active = false;
                owner.accuracy = UCHIHA_ACCURACY;
            }
        }

        if owner.bloodline_state.used {
            return None;
        }

        let at_threshold = owner.current_health <= owner.max_health * config.bloodline_threshold;
        let description = match self {
            Bloodline::Senju if at_threshold => {
                let healed = owner.heal((owner.max_health * SENJU_HEAL_FRACTION).floor());
                format!("Hyper Regeneration restores {} HP!", healed)
            }
            Bloodline::Uzumaki if at_threshold && owner.chakra < config.max_chakra => {
                owner.chakra = config.max_chakra;
                format!("Uzumaki Will surges, chakra set to {}!", config.max_chakra)
            }
            Bloodline::Hyuga if owner.chakra >= config.max_chakra && opponent.chakra > 0.0 => {
                let drained = opponent.chakra.min(HYUGA_DRAIN);
                opponent.chakra -= drained;
                owner.chakra = (owner.chakra + drained).min(config.max_chakra.max(owner.chakra));
                format!("Byakugan drains {} chakra from {}!", drained, opponent.name)
            }
            Bloodline::Uchiha if !owner.bloodline_state.active && at_threshold => {
                owner.accuracy = UCHIHA_ACCURACY;
                owner.bloodline_state.active = true;
                owner.bloodline_state.rounds_left = UCHIHA_ROUNDS;
                opponent.add_effect(ActiveEffect::status(
                    StatusId::from_str(known::STUN),
                    UCHIHA_ROUNDS,
                ));
                format!(
                    "Sharingan grants {}% accuracy and stuns {} for {} rounds!",
                    UCHIHA_ACCURACY, opponent.name, UCHIHA_ROUNDS
                )
            }
            _ => return None,
        };

        owner.bloodline_state.used = true;
        tracing::info!(owner = %owner.id, bloodline = %self, "bloodline activated");
        Some(trigger(description))
    }
}
