//! NPC templates and move selection.

use crate::battle::Move;
use crate::combatant::{Combatant, CombatantId};
use crate::config::BattleConfig;
use crate::jutsu::JutsuCatalog;
use crate::stat::StatBlock;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

fn one() -> f64 {
    1.0
}

/// An NPC described relative to the player it fights.
///
/// Health, power and defense are multipliers on the player's values.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{BattleConfig, Combatant, NpcTemplate, StatBlock};
///
/// let config = BattleConfig::default();
/// let jugo: NpcTemplate = serde_json::from_str(
///     r#"{"name": "Jugo", "baseHealth": 4.0, "basePower": 1.2, "baseDefense": 0.8,
///         "accuracy": 85, "dodge": 15, "jutsu": ["Attack"]}"#,
/// ).unwrap();
///
/// let player = Combatant::player("1", "Sakura", StatBlock::new(100.0, 25.0, 10.0), vec![], &config);
/// let npc = jugo.spawn(&player, &config);
///
/// assert_eq!(npc.id.as_str(), "NPC_Jugo");
/// assert_eq!(npc.max_health, 400.0);
/// assert_eq!(npc.base.power, 30.0);
/// assert_eq!(npc.base.defense, 8.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcTemplate {
    pub name: String,
    #[serde(default = "one")]
    pub base_health: f64,
    #[serde(default = "one")]
    pub base_power: f64,
    #[serde(default = "one")]
    pub base_defense: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub dodge: f64,
    #[serde(default)]
    pub jutsu: Vec<String>,
}

impl NpcTemplate {
    /// The template used when a requested NPC cannot be found.
    ///
    /// It mirrors the player's stats.
    pub fn fallback() -> Self {
        Self {
            name: "Rogue Ninja".to_string(),
            base_health: 1.0,
            base_power: 1.0,
            base_defense: 1.0,
            accuracy: 80.0,
            dodge: 10.0,
            jutsu: vec!["Attack".to_string()],
        }
    }

    /// Build the NPC combatant scaled off `player`.
    pub fn spawn(&self, player: &Combatant, config: &BattleConfig) -> Combatant {
        let stats = StatBlock {
            health: (player.max_health * self.base_health).floor(),
            power: (player.base.power * self.base_power).floor(),
            defense: (player.base.defense * self.base_defense).floor(),
            chakra: config.starting_chakra,
            accuracy: self.accuracy,
            dodge: self.dodge,
        };
        Combatant::player(
            CombatantId::npc(&self.name),
            self.name.clone(),
            stats,
            self.jutsu.clone(),
            config,
        )
        .with_level(player.level)
    }
}

/// Picks moves for NPCs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpcBrain;

impl NpcBrain {
    /// Skip while incapacitated, otherwise a uniformly random affordable
    /// jutsu, otherwise rest.
    pub fn choose_move<R: Rng>(&self, npc: &Combatant, catalog: &JutsuCatalog, rng: &mut R) -> Move {
        if npc.incapacitating_status().is_some() {
            return Move::Skip;
        }
        let affordable: Vec<&String> = npc
            .jutsu
            .iter()
            .filter(|name| {
                // Scripted jutsu carry no data cost.
                let cost = match catalog.get(name) {
                    Some(jutsu) => Some(jutsu.chakra_cost),
                    None if catalog.contains(name) => Some(0.0),
                    None => None,
                };
                cost.is_some_and(|cost| cost <= npc.chakra)
            })
            .collect();
        match affordable.choose(rng) {
            Some(name) => Move::Jutsu((*name).clone()),
            None => Move::Rest,
        }
    }
}
