//! Single-elimination tournaments with best-of-N series.
//!
//! The bracket only records results; the battles themselves are played
//! elsewhere and reported through [`Tournament::record_fight`]. Within a
//! series the loser of each fight must start the next one.

use crate::combatant::CombatantId;
use crate::error::BattleError;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentStatus {
    Registration,
    Running,
    Completed,
}

/// One pairing in the bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub round: u32,
    pub p1: CombatantId,
    /// `None` is a bye.
    pub p2: Option<CombatantId>,
    pub winner: Option<CombatantId>,
    pub played: bool,
    /// Played without a winner; neither side advances.
    #[serde(default)]
    pub forfeited: bool,
    pub p1_score: u32,
    pub p2_score: u32,
    /// Who must start the next fight of the series.
    pub next_initiator: Option<CombatantId>,
}

impl Match {
    fn series<R: Rng>(round: u32, p1: CombatantId, p2: CombatantId, rng: &mut R) -> Self {
        let next_initiator = if rng.gen_bool(0.5) { p1.clone() } else { p2.clone() };
        Self {
            round,
            p1,
            p2: Some(p2),
            winner: None,
            played: false,
            forfeited: false,
            p1_score: 0,
            p2_score: 0,
            next_initiator: Some(next_initiator),
        }
    }

    fn bye(round: u32, p1: CombatantId) -> Self {
        Self {
            round,
            winner: Some(p1.clone()),
            p1,
            p2: None,
            played: true,
            forfeited: false,
            p1_score: 0,
            p2_score: 0,
            next_initiator: None,
        }
    }

    pub fn is_bye(&self) -> bool {
        self.p2.is_none()
    }

    fn is_between(&self, a: &CombatantId, b: &CombatantId) -> bool {
        match &self.p2 {
            Some(p2) => (&self.p1 == a && p2 == b) || (&self.p1 == b && p2 == a),
            None => false,
        }
    }
}

/// Outcome of a reported fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FightResult {
    /// The series goes on; `next_initiator` starts the next fight.
    SeriesContinues {
        p1_score: u32,
        p2_score: u32,
        next_initiator: CombatantId,
    },
    SeriesWon {
        winner: CombatantId,
        p1_score: u32,
        p2_score: u32,
    },
}

/// A single-elimination bracket.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{CombatantId, FightResult, Tournament, TournamentStatus};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut rng = StdRng::seed_from_u64(9);
/// let mut cup = Tournament::new("Chunin Exams", 1, 0);
/// cup.register(CombatantId::from("naruto")).unwrap();
/// cup.register(CombatantId::from("neji")).unwrap();
/// cup.start(&mut rng).unwrap();
///
/// let next = cup.next_match().unwrap().clone();
/// let initiator = next.next_initiator.clone().unwrap();
/// let (winner, loser) = (next.p1.clone(), next.p2.clone().unwrap());
///
/// let result = cup.record_fight(&winner, &loser, &initiator, &mut rng).unwrap();
/// assert!(matches!(result, FightResult::SeriesWon { .. }));
/// assert_eq!(cup.status, TournamentStatus::Completed);
/// assert_eq!(cup.champion, Some(winner));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub name: String,
    pub best_of: u32,
    /// Zero means no limit.
    pub max_participants: usize,
    pub status: TournamentStatus,
    pub participants: Vec<CombatantId>,
    pub matches: Vec<Match>,
    pub current_round: u32,
    pub champion: Option<CombatantId>,
}

impl Tournament {
    pub fn new(name: impl Into<String>, best_of: u32, max_participants: usize) -> Self {
        Self {
            name: name.into(),
            best_of: best_of.max(1),
            max_participants,
            status: TournamentStatus::Registration,
            participants: Vec::new(),
            matches: Vec::new(),
            current_round: 0,
            champion: None,
        }
    }

    fn require(&self, status: TournamentStatus) -> Result<(), BattleError> {
        if self.status != status {
            return Err(BattleError::InvalidState(format!(
                "tournament is {:?}, expected {:?}",
                self.status, status
            )));
        }
        Ok(())
    }

    /// Fights needed to take a series.
    pub fn wins_needed(&self) -> u32 {
        self.best_of.div_ceil(2)
    }

    pub fn register(&mut self, id: CombatantId) -> Result<(), BattleError> {
        self.require(TournamentStatus::Registration)?;
        if self.participants.contains(&id) {
            return Err(BattleError::AlreadyRegistered(id));
        }
        if self.max_participants > 0 && self.participants.len() >= self.max_participants {
            return Err(BattleError::TournamentFull(self.max_participants));
        }
        self.participants.push(id);
        Ok(())
    }

    pub fn unregister(&mut self, id: &CombatantId) -> Result<(), BattleError> {
        self.require(TournamentStatus::Registration)?;
        let before = self.participants.len();
        self.participants.retain(|p| p != id);
        if self.participants.len() == before {
            return Err(BattleError::NotRegistered(id.clone()));
        }
        Ok(())
    }

    /// Close registration and draw the first round.
    pub fn start<R: Rng>(&mut self, rng: &mut R) -> Result<(), BattleError> {
        self.require(TournamentStatus::Registration)?;
        if self.participants.len() < 2 {
            return Err(BattleError::NotEnoughParticipants(self.participants.len()));
        }
        let mut drawn = self.participants.clone();
        drawn.shuffle(rng);
        self.status = TournamentStatus::Running;
        self.current_round = 1;
        self.matches.clear();
        self.pair_round(drawn, rng);
        tracing::info!(
            tournament = %self.name,
            participants = self.participants.len(),
            "tournament started"
        );
        Ok(())
    }

    fn pair_round<R: Rng>(&mut self, players: Vec<CombatantId>, rng: &mut R) {
        let round = self.current_round;
        let mut players = players.into_iter();
        while let Some(p1) = players.next() {
            let entry = match players.next() {
                Some(p2) => Match::series(round, p1, p2, rng),
                None => Match::bye(round, p1),
            };
            self.matches.push(entry);
        }
    }

    /// The first match still waiting to be played.
    pub fn next_match(&self) -> Option<&Match> {
        self.matches.iter().find(|m| !m.played)
    }

    /// Report one fight of a series.
    pub fn record_fight<R: Rng>(
        &mut self,
        winner: &CombatantId,
        loser: &CombatantId,
        initiator: &CombatantId,
        rng: &mut R,
    ) -> Result<FightResult, BattleError> {
        self.require(TournamentStatus::Running)?;
        let wins_needed = self.wins_needed();
        let entry = self
            .matches
            .iter_mut()
            .find(|m| !m.played && m.is_between(winner, loser))
            .ok_or_else(|| BattleError::NoSuchMatch(winner.clone(), loser.clone()))?;

        if entry.next_initiator.as_ref() != Some(initiator) {
            let expected = entry.next_initiator.clone().unwrap_or_else(|| loser.clone());
            tracing::warn!(expected = %expected, got = %initiator, "fight started out of turn");
            return Err(BattleError::WrongInitiator {
                expected,
                got: initiator.clone(),
            });
        }

        if &entry.p1 == winner {
            entry.p1_score += 1;
        } else {
            entry.p2_score += 1;
        }

        if entry.p1_score.max(entry.p2_score) >= wins_needed {
            entry.winner = Some(winner.clone());
            entry.played = true;
            entry.next_initiator = None;
            let result = FightResult::SeriesWon {
                winner: winner.clone(),
                p1_score: entry.p1_score,
                p2_score: entry.p2_score,
            };
            tracing::info!(tournament = %self.name, winner = %winner, "series won");
            self.advance_round(rng);
            return Ok(result);
        }

        entry.next_initiator = Some(loser.clone());
        Ok(FightResult::SeriesContinues {
            p1_score: entry.p1_score,
            p2_score: entry.p2_score,
            next_initiator: loser.clone(),
        })
    }

    /// Close match `index` with no winner.
    pub fn forfeit_match<R: Rng>(&mut self, index: usize, rng: &mut R) -> Result<(), BattleError> {
        self.require(TournamentStatus::Running)?;
        let entry = self
            .matches
            .get_mut(index)
            .filter(|m| !m.played)
            .ok_or_else(|| BattleError::InvalidState(format!("no open match at index {}", index)))?;
        entry.played = true;
        entry.forfeited = true;
        entry.winner = None;
        entry.next_initiator = None;
        tracing::info!(tournament = %self.name, index, "match forfeited");
        self.advance_round(rng);
        Ok(())
    }

    /// Move to the next round once every match of the current one is played.
    ///
    /// Returns whether anything changed.
    pub fn advance_round<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.status != TournamentStatus::Running {
            return false;
        }
        let round = self.current_round;
        let mut current = self.matches.iter().filter(|m| m.round == round);
        if !current.all(|m| m.played) {
            return false;
        }

        let mut winners: Vec<CombatantId> = self
            .matches
            .iter()
            .filter(|m| m.round == round && !m.forfeited)
            .filter_map(|m| m.winner.clone())
            .collect();

        match winners.len() {
            0 => {
                self.status = TournamentStatus::Completed;
                tracing::info!(tournament = %self.name, "tournament ended without a champion");
            }
            1 => {
                self.status = TournamentStatus::Completed;
                self.champion = winners.pop();
                tracing::info!(
                    tournament = %self.name,
                    champion = ?self.champion.as_ref().map(CombatantId::as_str),
                    "tournament completed"
                );
            }
            _ => {
                winners.shuffle(rng);
                self.current_round += 1;
                tracing::info!(tournament = %self.name, round = self.current_round, "round advanced");
                self.pair_round(winners, rng);
            }
        }
        true
    }
}
