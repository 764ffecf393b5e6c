//! The round loop.
//!
//! A [`Battle`] owns both combatants and plays one round per [`Battle::step`].
//! Moves come from a [`MoveProvider`] per side, so the same loop serves a
//! chat frontend ([`ChannelMoves`]), NPCs ([`NpcMoves`]) and tests
//! ([`ScriptedMoves`]).
//!
//! Each round runs in this order:
//!
//! 1. Active effects tick on both sides.
//! 2. Bloodlines trigger, player one first.
//! 3. Channelled round-based jutsu continue.
//! 4. Player one acts. Fleeing or timing out ends the battle.
//! 5. Player two acts.
//! 6. Damage from both actions lands, then healing from both.
//! 7. Completed combos fire, player one first.
//! 8. A side at zero health loses.
//! 9. Both sides regain passive chakra and the round advances.
//! 10. Past `max_rounds` the battle is a draw.

use crate::bloodline::BloodlineTrigger;
use crate::combatant::{Combatant, CombatantId};
use crate::config::BattleConfig;
use crate::error::BattleError;
use crate::interpreter::{ActionKind, ActionOutcome, ComboReport, EffectInterpreter, RoundBasedSummary};
use crate::jutsu::JutsuCatalog;
use crate::npc::NpcBrain;
use crate::rank::UsageTracker;
use crate::status::{known, StatusId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

/// A move chosen by one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Move {
    Jutsu(String),
    /// 1-based index into the combatant's jutsu list.
    Slot(usize),
    Rest,
    Flee,
    /// Do nothing this round.
    Skip,
}

/// What a provider answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDecision {
    Move(Move),
    TimedOut,
}

/// Read-only battle state handed to move providers.
#[derive(Debug, Clone, Copy)]
pub struct BattleView<'a> {
    pub kind: BattleKind,
    pub round: u32,
    pub combatants: &'a [Combatant; 2],
    pub catalog: &'a JutsuCatalog,
}

impl<'a> BattleView<'a> {
    pub fn combatant(&self, id: &CombatantId) -> Option<&'a Combatant> {
        self.combatants.iter().find(|c| &c.id == id)
    }

    pub fn opponent_of(&self, id: &CombatantId) -> Option<&'a Combatant> {
        self.combatants.iter().find(|c| &c.id != id)
    }
}

/// Source of moves for one side.
pub trait MoveProvider {
    fn choose(&mut self, view: &BattleView<'_>, actor: &CombatantId) -> MoveDecision;
}

/// Plays back a fixed list of moves. Times out once the list runs dry.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{Move, ScriptedMoves};
///
/// let moves = ScriptedMoves::new(vec![Move::Rest, Move::Slot(1)]);
/// assert_eq!(moves.remaining(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedMoves {
    moves: VecDeque<Move>,
}

impl ScriptedMoves {
    pub fn new(moves: impl IntoIterator<Item = Move>) -> Self {
        Self {
            moves: moves.into_iter().collect(),
        }
    }

    pub fn push(&mut self, mv: Move) {
        self.moves.push_back(mv);
    }

    pub fn remaining(&self) -> usize {
        self.moves.len()
    }
}

impl MoveProvider for ScriptedMoves {
    fn choose(&mut self, _view: &BattleView<'_>, _actor: &CombatantId) -> MoveDecision {
        match self.moves.pop_front() {
            Some(mv) => MoveDecision::Move(mv),
            None => MoveDecision::TimedOut,
        }
    }
}

/// Waits on a channel for each move, giving up after `timeout`.
///
/// A disconnected sender counts as a timeout.
#[derive(Debug)]
pub struct ChannelMoves {
    rx: Receiver<Move>,
    timeout: Duration,
}

impl ChannelMoves {
    pub fn new(rx: Receiver<Move>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }

    pub fn from_config(rx: Receiver<Move>, config: &BattleConfig) -> Self {
        Self::new(rx, config.move_timeout)
    }
}

impl MoveProvider for ChannelMoves {
    fn choose(&mut self, _view: &BattleView<'_>, actor: &CombatantId) -> MoveDecision {
        match self.rx.recv_timeout(self.timeout) {
            Ok(mv) => MoveDecision::Move(mv),
            Err(err) => {
                tracing::debug!(actor = %actor, error = %err, "no move received");
                MoveDecision::TimedOut
            }
        }
    }
}

/// Drives a side with [`NpcBrain`].
#[derive(Debug, Clone)]
pub struct NpcMoves<R> {
    brain: NpcBrain,
    rng: R,
}

impl<R: Rng> NpcMoves<R> {
    pub fn new(rng: R) -> Self {
        Self {
            brain: NpcBrain,
            rng,
        }
    }
}

impl<R: Rng> MoveProvider for NpcMoves<R> {
    fn choose(&mut self, view: &BattleView<'_>, actor: &CombatantId) -> MoveDecision {
        match view.combatant(actor) {
            Some(npc) => MoveDecision::Move(self.brain.choose_move(npc, view.catalog, &mut self.rng)),
            None => MoveDecision::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleKind {
    Mission,
    Trial,
    Ranked,
    Friendly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleResult {
    Victory {
        winner: CombatantId,
        loser: CombatantId,
    },
    Draw,
    /// `loser` fled or timed out.
    Forfeit {
        winner: CombatantId,
        loser: CombatantId,
    },
}

impl BattleResult {
    pub fn winner(&self) -> Option<&CombatantId> {
        match self {
            BattleResult::Victory { winner, .. } | BattleResult::Forfeit { winner, .. } => Some(winner),
            BattleResult::Draw => None,
        }
    }

    pub fn loser(&self) -> Option<&CombatantId> {
        match self {
            BattleResult::Victory { loser, .. } | BattleResult::Forfeit { loser, .. } => Some(loser),
            BattleResult::Draw => None,
        }
    }
}

/// Damage one side dealt and took over the battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageTally {
    pub id: CombatantId,
    pub dealt: f64,
    pub taken: f64,
}

/// Everything that happened in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: u32,
    /// Player one's action, then player two's unless the battle ended first.
    pub actions: Vec<ActionOutcome>,
    pub round_based: Vec<RoundBasedSummary>,
    pub bloodlines: Vec<BloodlineTrigger>,
    pub ticks: Vec<String>,
    pub combos: Vec<ComboReport>,
    pub health: [f64; 2],
    pub chakra: [f64; 2],
    /// Custom background of a channelled jutsu, player one first.
    pub background: Option<String>,
    pub finished: Option<BattleResult>,
}

/// Final summary of a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleReport {
    pub kind: BattleKind,
    pub rounds: u32,
    pub result: Option<BattleResult>,
    pub damage: [DamageTally; 2],
    pub usage: UsageTracker,
}

fn split(pair: &mut [Combatant; 2], side: usize) -> (&mut Combatant, &mut Combatant) {
    let (left, right) = pair.split_at_mut(1);
    if side == 0 {
        (&mut left[0], &mut right[0])
    } else {
        (&mut right[0], &mut left[0])
    }
}

fn incapacitated(actor: &Combatant, status: StatusId) -> ActionOutcome {
    let description = match status.as_str() {
        known::STUN => format!("{} is stunned and can't move!", actor.name),
        known::FLINCH => format!("{} flinched and couldn't act!", actor.name),
        known::DROWN => format!("{} is drowning and can't act!", actor.name),
        _ => format!("{} can't act!", actor.name),
    };
    let mut outcome = ActionOutcome::new(actor.id.clone(), ActionKind::Incapacitated(status.clone()), description);
    outcome.special_effects.push(format!("{} active", status.title()));
    outcome
}

fn unlearned(actor: &Combatant, name: String) -> ActionOutcome {
    let mut outcome = ActionOutcome::new(
        actor.id.clone(),
        ActionKind::UnknownJutsu,
        format!("{} attempted unknown jutsu: {}", actor.name, name),
    );
    outcome.jutsu_used = Some(name);
    outcome.special_effects.push("Jutsu failed!".to_string());
    outcome
}

/// A battle between two combatants.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{
///     Battle, BattleConfig, BattleKind, BattleResult, Combatant, JutsuCatalog, Move,
///     ScriptedMoves, StatBlock,
/// };
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use std::sync::Arc;
///
/// let config = BattleConfig::default();
/// let catalog = JutsuCatalog::from_json_str(
///     r#"{"Attack": {"chakraCost": 0, "effects": [
///         {"type": "damage", "formula": "user.power", "accuracyBonus": 10}]}}"#,
/// ).unwrap();
///
/// let naruto = Combatant::player("1", "Naruto", StatBlock::new(100.0, 60.0, 10.0), vec!["Attack".into()], &config);
/// let sasuke = Combatant::player("2", "Sasuke", StatBlock::new(100.0, 20.0, 10.0), vec!["Attack".into()], &config);
///
/// let mut battle = Battle::new(BattleKind::Friendly, naruto, sasuke, Arc::new(catalog), config);
/// let mut p1 = ScriptedMoves::new(vec![Move::Slot(1), Move::Slot(1)]);
/// let mut p2 = ScriptedMoves::new(vec![Move::Rest, Move::Rest]);
///
/// let report = battle.run(&mut p1, &mut p2, &mut StdRng::seed_from_u64(3));
/// assert_eq!(report.rounds, 2);
/// assert!(matches!(report.result, Some(BattleResult::Victory { .. })));
/// assert_eq!(report.damage[0].dealt, 100.0);
/// ```
#[derive(Debug, Clone)]
pub struct Battle {
    kind: BattleKind,
    round: u32,
    combatants: [Combatant; 2],
    catalog: Arc<JutsuCatalog>,
    interpreter: EffectInterpreter,
    /// Channelled jutsu per side and the round each has reached.
    channels: [BTreeMap<String, u32>; 2],
    tallies: [DamageTally; 2],
    usage: UsageTracker,
    result: Option<BattleResult>,
}

impl Battle {
    pub fn new(
        kind: BattleKind,
        player1: Combatant,
        player2: Combatant,
        catalog: Arc<JutsuCatalog>,
        config: BattleConfig,
    ) -> Self {
        tracing::info!(
            kind = ?kind,
            player1 = %player1.id,
            player2 = %player2.id,
            "battle started"
        );
        let tallies = [
            DamageTally {
                id: player1.id.clone(),
                dealt: 0.0,
                taken: 0.0,
            },
            DamageTally {
                id: player2.id.clone(),
                dealt: 0.0,
                taken: 0.0,
            },
        ];
        Self {
            kind,
            round: 1,
            combatants: [player1, player2],
            catalog,
            interpreter: EffectInterpreter::new(config),
            channels: [BTreeMap::new(), BTreeMap::new()],
            tallies,
            usage: UsageTracker::default(),
            result: None,
        }
    }

    pub fn kind(&self) -> BattleKind {
        self.kind
    }

    /// The round about to be played.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn combatants(&self) -> &[Combatant; 2] {
        &self.combatants
    }

    pub fn result(&self) -> Option<&BattleResult> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Jutsu `side` (0 or 1) is channelling and the round each has reached.
    pub fn channelling(&self, side: usize) -> Option<&BTreeMap<String, u32>> {
        self.channels.get(side)
    }

    pub fn view(&self) -> BattleView<'_> {
        BattleView {
            kind: self.kind,
            round: self.round,
            combatants: &self.combatants,
            catalog: &self.catalog,
        }
    }

    pub fn report(&self) -> BattleReport {
        BattleReport {
            kind: self.kind,
            rounds: self.round.saturating_sub(1),
            result: self.result.clone(),
            damage: self.tallies.clone(),
            usage: self.usage.clone(),
        }
    }

    /// Play rounds until the battle has a result.
    pub fn run<P1, P2, R>(&mut self, p1_moves: &mut P1, p2_moves: &mut P2, rng: &mut R) -> BattleReport
    where
        P1: MoveProvider,
        P2: MoveProvider,
        R: Rng,
    {
        while self.step(p1_moves, p2_moves, rng).is_ok() {
            if self.is_finished() {
                break;
            }
        }
        self.report()
    }

    /// Play one round.
    pub fn step<P1, P2, R>(
        &mut self,
        p1_moves: &mut P1,
        p2_moves: &mut P2,
        rng: &mut R,
    ) -> Result<RoundReport, BattleError>
    where
        P1: MoveProvider,
        P2: MoveProvider,
        R: Rng,
    {
        if self.result.is_some() {
            return Err(BattleError::BattleFinished);
        }
        let round = self.round;
        let mut report = RoundReport {
            round,
            actions: Vec::with_capacity(2),
            round_based: Vec::new(),
            bloodlines: Vec::new(),
            ticks: Vec::new(),
            combos: Vec::new(),
            health: [0.0; 2],
            chakra: [0.0; 2],
            background: None,
            finished: None,
        };

        for combatant in self.combatants.iter_mut() {
            report.ticks.extend(self.interpreter.tick_effects(combatant));
        }

        for side in 0..2 {
            let (owner, opponent) = split(&mut self.combatants, side);
            if let Some(bloodline) = owner.bloodline {
                report
                    .bloodlines
                    .extend(bloodline.on_round_start(owner, opponent, self.interpreter.config()));
            }
        }

        for side in 0..2 {
            self.continue_channels(side, &mut report, rng);
        }
        report.background = self.background();

        if self.settle_deaths() {
            return Ok(self.close_round(report));
        }

        let first = self.take_turn(0, p1_moves, rng);
        if first.is_forfeit() {
            self.finish_by_forfeit(0);
            report.actions.push(first);
            return Ok(self.close_round(report));
        }
        let second = self.take_turn(1, p2_moves, rng);
        if second.is_forfeit() {
            self.finish_by_forfeit(1);
            report.actions.push(first);
            report.actions.push(second);
            return Ok(self.close_round(report));
        }

        // Both hits land before either heal.
        let outcomes = [&first, &second];
        let mut dealt = [0.0; 2];
        for (side, outcome) in outcomes.into_iter().enumerate() {
            dealt[side] = self.combatants[1 - side].take_damage(outcome.damage);
        }
        for (side, outcome) in outcomes.into_iter().enumerate() {
            self.combatants[side].heal(outcome.heal);
            self.tally(side, dealt[side]);
            if outcome.kind == ActionKind::Jutsu {
                if let Some(jutsu) = &outcome.jutsu_used {
                    self.usage.record(&outcome.actor, jutsu, dealt[side]);
                }
            }
        }
        report.actions.push(first);
        report.actions.push(second);

        for side in 0..2 {
            let (user, target) = split(&mut self.combatants, side);
            if let Some(combo) = self.interpreter.apply_combo(user, target, rng) {
                self.tally(side, combo.damage);
                report.combos.push(combo);
            }
        }

        if self.settle_deaths() {
            return Ok(self.close_round(report));
        }

        let config = self.interpreter.config();
        for combatant in self.combatants.iter_mut() {
            combatant.gain_chakra(config.passive_chakra_regen, config.max_chakra);
        }
        if round >= config.max_rounds {
            self.finish(BattleResult::Draw);
        }
        Ok(self.close_round(report))
    }

    fn tally(&mut self, side: usize, dealt: f64) {
        self.tallies[side].dealt += dealt;
        self.tallies[1 - side].taken += dealt;
    }

    fn continue_channels<R: Rng>(&mut self, side: usize, report: &mut RoundReport, rng: &mut R) {
        let active: Vec<(String, u32)> = self.channels[side]
            .iter()
            .map(|(name, round)| (name.clone(), *round))
            .collect();
        for (name, reached) in active {
            let Some(jutsu) = self.catalog.get(&name) else {
                self.channels[side].remove(&name);
                continue;
            };
            let next = reached + 1;
            let (user, target) = split(&mut self.combatants, side);
            if let Some(summary) = self.interpreter.continue_channel(user, target, jutsu, next, rng) {
                self.tallies[side].dealt += summary.damage;
                self.tallies[1 - side].taken += summary.damage;
                report.round_based.push(summary);
            }
            if next >= jutsu.max_round() {
                self.channels[side].remove(&name);
            } else {
                self.channels[side].insert(name, next);
            }
        }
    }

    fn background(&self) -> Option<String> {
        self.channels.iter().find_map(|channels| {
            channels.iter().find_map(|(name, round)| {
                self.catalog
                    .get(name)
                    .and_then(|jutsu| jutsu.background_at(*round))
                    .map(str::to_string)
            })
        })
    }

    fn take_turn<P: MoveProvider, R: Rng>(&mut self, side: usize, provider: &mut P, rng: &mut R) -> ActionOutcome {
        let actor = &self.combatants[side];
        if let Some(status) = actor.incapacitating_status() {
            return incapacitated(actor, status.clone());
        }

        let decision = provider.choose(&self.view(), &actor.id);
        let actor = &self.combatants[side];
        let mv = match decision {
            MoveDecision::TimedOut => {
                let mut outcome = ActionOutcome::new(
                    actor.id.clone(),
                    ActionKind::TimedOut,
                    format!("{} did not make a move.", actor.name),
                );
                outcome.special_effects.push("Missed opportunity!".to_string());
                return outcome;
            }
            MoveDecision::Move(mv) => mv,
        };

        let name = match mv {
            Move::Flee => {
                return ActionOutcome::new(
                    actor.id.clone(),
                    ActionKind::Fled,
                    format!("{} fled from the battle!", actor.name),
                );
            }
            Move::Skip => {
                return ActionOutcome::new(
                    actor.id.clone(),
                    ActionKind::Passed,
                    format!("{} holds still.", actor.name),
                );
            }
            Move::Rest => {
                let (user, _) = split(&mut self.combatants, side);
                return self.interpreter.rest(user);
            }
            Move::Slot(slot) => match actor.jutsu_by_slot(slot) {
                Some(name) => name.to_string(),
                None => format!("slot {}", slot),
            },
            Move::Jutsu(name) if actor.jutsu.contains(&name) => name,
            Move::Jutsu(name) => return unlearned(actor, name),
        };

        let round_based = self.catalog.get(&name).is_some_and(|j| j.round_based);
        if round_based && self.channels[side].contains_key(&name) {
            let mut outcome = ActionOutcome::new(
                actor.id.clone(),
                ActionKind::AlreadyChanneling,
                format!("{} is already channelling {}!", actor.name, name),
            );
            outcome.jutsu_used = Some(name);
            return outcome;
        }

        let round = if round_based { 1 } else { self.round };
        let (user, target) = split(&mut self.combatants, side);
        let outcome = self
            .interpreter
            .execute_jutsu(user, target, &self.catalog, &name, round, rng);

        if outcome.kind == ActionKind::Jutsu {
            if let Some(jutsu) = self.catalog.get(&name).filter(|j| j.round_based && j.max_round() > 1) {
                self.channels[side].insert(jutsu.name.clone(), 1);
            }
            if let Some(progress) = user.combo.as_mut() {
                progress.record(&name);
            }
        }
        outcome
    }

    /// Decide the battle if someone is down. Returns whether it ended.
    fn settle_deaths(&mut self) -> bool {
        let [p1, p2] = &self.combatants;
        let result = match (p1.is_alive(), p2.is_alive()) {
            (true, true) => return false,
            (false, false) => BattleResult::Draw,
            (true, false) => BattleResult::Victory {
                winner: p1.id.clone(),
                loser: p2.id.clone(),
            },
            (false, true) => BattleResult::Victory {
                winner: p2.id.clone(),
                loser: p1.id.clone(),
            },
        };
        self.finish(result);
        true
    }

    fn finish_by_forfeit(&mut self, side: usize) {
        let result = BattleResult::Forfeit {
            winner: self.combatants[1 - side].id.clone(),
            loser: self.combatants[side].id.clone(),
        };
        self.finish(result);
    }

    fn finish(&mut self, result: BattleResult) {
        tracing::info!(
            kind = ?self.kind,
            round = self.round,
            winner = ?result.winner().map(CombatantId::as_str),
            "battle finished"
        );
        self.result = Some(result);
    }

    fn close_round(&mut self, mut report: RoundReport) -> RoundReport {
        report.health = [self.combatants[0].current_health, self.combatants[1].current_health];
        report.chakra = [self.combatants[0].chakra, self.combatants[1].chakra];
        report.finished = self.result.clone();
        self.round += 1;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::StatBlock;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::mpsc;

    const CATALOG: &str = r#"{
        "Attack": {"chakraCost": 0, "effects": [{"type": "damage", "formula": "user.power", "accuracyBonus": 10}]},
        "Stun Palm": {"chakraCost": 2, "effects": [{"type": "status", "status": "stun", "duration": 1}]},
        "Water Prison": {
            "chakraCost": 4,
            "roundBased": true,
            "roundEffects": {
                "1": {"description": "user traps target"},
                "2-3": {"damage": {"formula": "10", "accuracyBonus": 10}}
            },
            "custombackground": {"round": 2, "url": "prison.png"}
        }
    }"#;

    fn battle(p1_power: f64, p2_power: f64) -> Battle {
        let config = BattleConfig::default();
        let jutsu = vec!["Attack".to_string(), "Stun Palm".into(), "Water Prison".into()];
        let p1 = Combatant::player("1", "Naruto", StatBlock::new(100.0, p1_power, 10.0), jutsu.clone(), &config);
        let p2 = Combatant::player("2", "Sasuke", StatBlock::new(100.0, p2_power, 10.0), jutsu, &config);
        let catalog = JutsuCatalog::from_json_str(CATALOG).unwrap();
        Battle::new(BattleKind::Friendly, p1, p2, Arc::new(catalog), config)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_actions_land_together() {
        let mut battle = battle(30.0, 20.0);
        let mut p1 = ScriptedMoves::new(vec![Move::Jutsu("Attack".into())]);
        let mut p2 = ScriptedMoves::new(vec![Move::Slot(1)]);
        let report = battle.step(&mut p1, &mut p2, &mut rng()).unwrap();
        assert_eq!(report.health, [80.0, 70.0]);
        assert_eq!(report.actions.len(), 2);
        assert_eq!(battle.round(), 2);
        // Passive regen is capped.
        assert_eq!(report.chakra, [12.0, 12.0]);
    }

    #[test]
    fn test_unlearned_jutsu_fails() {
        let config = BattleConfig::default();
        let p1 = Combatant::player("1", "Naruto", StatBlock::new(100.0, 30.0, 10.0), vec!["Attack".into()], &config);
        let p2 = Combatant::player("2", "Sasuke", StatBlock::new(100.0, 20.0, 10.0), vec![], &config);
        let catalog = JutsuCatalog::from_json_str(CATALOG).unwrap();
        let mut battle = Battle::new(BattleKind::Friendly, p1, p2, Arc::new(catalog), config);
        let mut p1 = ScriptedMoves::new(vec![Move::Jutsu("Stun Palm".into())]);
        let mut p2 = ScriptedMoves::new(vec![Move::Rest]);
        let report = battle.step(&mut p1, &mut p2, &mut rng()).unwrap();
        assert_eq!(report.actions[0].kind, ActionKind::UnknownJutsu);
        assert_eq!(report.actions[0].description, "Naruto attempted unknown jutsu: Stun Palm");
        // Nothing was spent and Sasuke still got to rest.
        assert_eq!(report.chakra, [12.0, 13.0]);
        assert_eq!(report.actions[1].kind, ActionKind::Rest);
    }

    #[test]
    fn test_timeout_forfeits() {
        let mut battle = battle(30.0, 20.0);
        let mut p1 = ScriptedMoves::default();
        let mut p2 = ScriptedMoves::new(vec![Move::Rest]);
        let report = battle.step(&mut p1, &mut p2, &mut rng()).unwrap();
        assert_eq!(
            report.finished,
            Some(BattleResult::Forfeit {
                winner: CombatantId::from("2"),
                loser: CombatantId::from("1"),
            })
        );
        assert_eq!(report.actions.len(), 1);
        assert_eq!(p2.remaining(), 1);
        assert!(matches!(
            battle.step(&mut p1, &mut p2, &mut rng()),
            Err(BattleError::BattleFinished)
        ));
    }

    #[test]
    fn test_stun_skips_opponent_same_round() {
        let mut battle = battle(30.0, 20.0);
        let mut p1 = ScriptedMoves::new(vec![Move::Jutsu("Stun Palm".into())]);
        let mut p2 = ScriptedMoves::new(vec![Move::Jutsu("Attack".into())]);
        let report = battle.step(&mut p1, &mut p2, &mut rng()).unwrap();
        assert_eq!(
            report.actions[1].kind,
            ActionKind::Incapacitated(StatusId::from_str(known::STUN))
        );
        assert_eq!(report.health, [100.0, 100.0]);
        // The provider was never asked.
        assert_eq!(p2.remaining(), 1);
    }

    #[test]
    fn test_channel_runs_and_rejects_recast() {
        let mut battle = battle(30.0, 20.0);
        let mut p1 = ScriptedMoves::new(vec![
            Move::Jutsu("Water Prison".into()),
            Move::Jutsu("Water Prison".into()),
            Move::Rest,
        ]);
        let mut p2 = ScriptedMoves::new(vec![Move::Rest, Move::Rest, Move::Rest]);
        let mut rng = rng();

        let first = battle.step(&mut p1, &mut p2, &mut rng).unwrap();
        assert_eq!(first.actions[0].round_based_description.as_deref(), Some("Naruto traps Sasuke"));
        assert_eq!(battle.channelling(0).unwrap().get("Water Prison"), Some(&1));

        let second = battle.step(&mut p1, &mut p2, &mut rng).unwrap();
        assert_eq!(second.round_based.len(), 1);
        assert_eq!(second.background.as_deref(), Some("prison.png"));
        assert_eq!(second.actions[0].kind, ActionKind::AlreadyChanneling);
        assert_eq!(second.health[1], 90.0);

        let third = battle.step(&mut p1, &mut p2, &mut rng).unwrap();
        assert_eq!(third.health[1], 80.0);
        assert!(battle.channelling(0).unwrap().is_empty());
        assert_eq!(battle.report().damage[0].dealt, 20.0);
    }

    #[test]
    fn test_max_rounds_draw() {
        let config = BattleConfig {
            max_rounds: 2,
            ..BattleConfig::default()
        };
        let p1 = Combatant::player("1", "A", StatBlock::new(100.0, 10.0, 10.0), vec![], &config);
        let p2 = Combatant::player("2", "B", StatBlock::new(100.0, 10.0, 10.0), vec![], &config);
        let mut battle = Battle::new(BattleKind::Trial, p1, p2, Arc::new(JutsuCatalog::new()), config);
        let mut p1 = ScriptedMoves::new(vec![Move::Rest; 5]);
        let mut p2 = ScriptedMoves::new(vec![Move::Rest; 5]);
        let report = battle.run(&mut p1, &mut p2, &mut rng());
        assert_eq!(report.result, Some(BattleResult::Draw));
        assert_eq!(report.rounds, 2);
    }

    #[test]
    fn test_channel_moves_timeout() {
        let battle = battle(30.0, 20.0);
        let (tx, rx) = mpsc::channel();
        let mut moves = ChannelMoves::new(rx, Duration::from_millis(10));
        tx.send(Move::Rest).unwrap();
        let id = CombatantId::from("1");
        assert_eq!(moves.choose(&battle.view(), &id), MoveDecision::Move(Move::Rest));
        assert_eq!(moves.choose(&battle.view(), &id), MoveDecision::TimedOut);
    }

    #[test]
    fn test_usage_is_tracked() {
        let mut battle = battle(30.0, 20.0);
        let mut p1 = ScriptedMoves::new(vec![Move::Slot(1), Move::Slot(1)]);
        let mut p2 = ScriptedMoves::new(vec![Move::Rest, Move::Rest]);
        let mut rng = rng();
        battle.step(&mut p1, &mut p2, &mut rng).unwrap();
        battle.step(&mut p1, &mut p2, &mut rng).unwrap();
        let report = battle.report();
        let id = CombatantId::from("1");
        assert_eq!(report.usage.most_used(&id), Some(("Attack", 2)));
        assert_eq!(report.usage.average_damage(&id), 30.0);
    }
}
