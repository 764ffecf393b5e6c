//! Ranked play: ELO, tiers, the reward ladder and jutsu usage stats.

use crate::combatant::CombatantId;
use crate::error::BattleError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// ELO rules and rank names.
///
/// Ranks are listed lowest first. Each rank has `divisions_per_rank`
/// divisions, numbered downwards so division 1 is the top of the rank.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::RankConfig;
///
/// let config = RankConfig::default();
///
/// let tier = config.tier(0);
/// assert_eq!((tier.rank.as_str(), tier.division), ("Genin", 5));
///
/// let tier = config.tier(740);
/// assert_eq!((tier.rank.as_str(), tier.division, tier.elo_in_division), ("Chuunin", 3, 40));
///
/// let tier = config.tier(10_000);
/// assert_eq!((tier.rank.as_str(), tier.division), ("The Shinobi God", 1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub ranks: Vec<String>,
    pub divisions_per_rank: u32,
    pub elo_per_division: u32,
    pub win_elo: u32,
    pub loss_elo: u32,
    pub npc_win_elo: u32,
    pub npc_loss_elo: u32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            ranks: [
                "Genin",
                "Chuunin",
                "Jounin",
                "Sannin",
                "Master Shinobi",
                "The Shinobi God",
            ]
            .iter()
            .map(|r| r.to_string())
            .collect(),
            divisions_per_rank: 5,
            elo_per_division: 100,
            win_elo: 50,
            loss_elo: 50,
            npc_win_elo: 20,
            npc_loss_elo: 0,
        }
    }
}

/// Rank and division for an ELO value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub rank: String,
    pub division: u32,
    /// Progress inside the division.
    pub elo_in_division: u32,
}

/// ELO changes after a ranked result. NPC sides carry no ELO or tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EloUpdate {
    pub winner_change: u32,
    /// ELO the loser actually lost.
    pub loser_change: u32,
    pub winner_elo: Option<u32>,
    pub loser_elo: Option<u32>,
    pub winner_tier: Option<Tier>,
    pub loser_tier: Option<Tier>,
}

impl RankConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BattleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BattleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn tier(&self, elo: u32) -> Tier {
        let per_division = self.elo_per_division.max(1);
        let per_rank = self.divisions_per_rank.max(1);
        let total = self.ranks.len() as u32 * per_rank;
        let division_index = elo / per_division;
        let elo_in_division = elo % per_division;

        if division_index >= total {
            return Tier {
                rank: self.ranks.last().cloned().unwrap_or_default(),
                division: 1,
                elo_in_division,
            };
        }
        Tier {
            rank: self.ranks[(division_index / per_rank) as usize].clone(),
            division: per_rank - division_index % per_rank,
            elo_in_division,
        }
    }

    /// Apply a ranked result. Pass `None` for an NPC side.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::RankConfig;
    ///
    /// let config = RankConfig::default();
    ///
    /// let pvp = config.apply_result(Some(480), Some(30));
    /// assert_eq!(pvp.winner_elo, Some(530));
    /// assert_eq!(pvp.loser_elo, Some(0));
    /// assert_eq!(pvp.loser_change, 30);
    ///
    /// let beat_npc = config.apply_result(Some(100), None);
    /// assert_eq!(beat_npc.winner_elo, Some(120));
    ///
    /// let lost_to_npc = config.apply_result(None, Some(100));
    /// assert_eq!(lost_to_npc.loser_elo, Some(100));
    /// ```
    pub fn apply_result(&self, winner_elo: Option<u32>, loser_elo: Option<u32>) -> EloUpdate {
        let vs_npc = winner_elo.is_none() || loser_elo.is_none();
        let (win, loss) = if vs_npc {
            (self.npc_win_elo, self.npc_loss_elo)
        } else {
            (self.win_elo, self.loss_elo)
        };

        let new_winner = winner_elo.map(|elo| elo.saturating_add(win));
        let new_loser = loser_elo.map(|elo| elo.saturating_sub(loss));
        let loser_change = match (loser_elo, new_loser) {
            (Some(before), Some(after)) => before - after,
            _ => loss,
        };

        tracing::info!(
            winner_elo = ?new_winner,
            loser_elo = ?new_loser,
            vs_npc,
            "ranked result applied"
        );
        EloUpdate {
            winner_change: win,
            loser_change,
            winner_elo: new_winner,
            loser_elo: new_loser,
            winner_tier: new_winner.map(|elo| self.tier(elo)),
            loser_tier: new_loser.map(|elo| self.tier(elo)),
        }
    }
}

/// One step of the ranked reward ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedReward {
    /// ELO needed to claim.
    pub elo: u32,
    /// Whatever the host grants; the engine does not interpret it.
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// Where a player stands on the reward ladder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RewardStatus<'a> {
    /// The highest reward at or below the player's ELO not yet claimed.
    pub claimable: Option<&'a RankedReward>,
    /// The cheapest reward above the player's ELO.
    pub next: Option<&'a RankedReward>,
}

/// Rewards unlocked by reaching ELO thresholds.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::RewardLadder;
/// use std::collections::BTreeSet;
///
/// let ladder = RewardLadder::from_json_str(
///     r#"[{"elo": 100, "item": "Kunai"}, {"elo": 300, "item": "Scroll"}, {"elo": 500, "item": "Cloak"}]"#,
/// ).unwrap();
///
/// let claimed: BTreeSet<u32> = [100].into_iter().collect();
/// let status = ladder.status(350, &claimed);
/// assert_eq!(status.claimable.map(|r| r.elo), Some(300));
/// assert_eq!(status.next.map(|r| r.elo), Some(500));
/// assert_eq!(status.claimable.unwrap().payload["item"], "Scroll");
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardLadder {
    pub rewards: Vec<RankedReward>,
}

impl RewardLadder {
    pub fn from_json_str(json: &str) -> Result<Self, BattleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BattleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn status(&self, elo: u32, claimed: &BTreeSet<u32>) -> RewardStatus<'_> {
        let claimable = self
            .rewards
            .iter()
            .filter(|r| r.elo <= elo && !claimed.contains(&r.elo))
            .max_by_key(|r| r.elo);
        let next = self
            .rewards
            .iter()
            .filter(|r| r.elo > elo)
            .min_by_key(|r| r.elo);
        RewardStatus { claimable, next }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct UsageStats {
    jutsu_usage: BTreeMap<String, u32>,
    total_damage: f64,
    rounds: u32,
}

/// Per-player jutsu usage and damage, for profile stats.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageTracker {
    players: BTreeMap<CombatantId, UsageStats>,
}

impl UsageTracker {
    pub fn record(&mut self, user: &CombatantId, jutsu: &str, damage: f64) {
        let stats = self.players.entry(user.clone()).or_default();
        *stats.jutsu_usage.entry(jutsu.to_string()).or_insert(0) += 1;
        stats.total_damage += damage.max(0.0);
        stats.rounds += 1;
    }

    /// The jutsu `user` used most, with its count. Ties go to the name
    /// that sorts first.
    pub fn most_used(&self, user: &CombatantId) -> Option<(&str, u32)> {
        self.players
            .get(user)?
            .jutsu_usage
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, count)| (name.as_str(), *count))
    }

    /// Damage per recorded jutsu use, or 0 with no uses.
    pub fn average_damage(&self, user: &CombatantId) -> f64 {
        match self.players.get(user) {
            Some(stats) if stats.rounds > 0 => stats.total_damage / f64::from(stats.rounds),
            _ => 0.0,
        }
    }

    /// Fold another tracker into this one.
    pub fn merge(&mut self, other: &UsageTracker) {
        for (id, theirs) in &other.players {
            let ours = self.players.entry(id.clone()).or_default();
            for (jutsu, count) in &theirs.jutsu_usage {
                *ours.jutsu_usage.entry(jutsu.clone()).or_insert(0) += count;
            }
            ours.total_damage += theirs.total_damage;
            ours.rounds += theirs.rounds;
        }
    }
}
