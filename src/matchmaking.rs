//! The ranked queue and ranked invitations.
//!
//! Both are plain state machines driven by the caller's clock: every
//! operation takes `now`, so a host can poll on whatever timer it has and
//! tests can step time by hand.

use crate::combatant::CombatantId;
use crate::config::QueueConfig;
use crate::error::BattleError;
use crate::npc::NpcTemplate;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

/// A match produced by the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Pairing {
    PvP(CombatantId, CombatantId),
    /// Nobody else showed up in time.
    PvNpc(CombatantId, NpcTemplate),
}

/// First-in, first-out ranked queue with an NPC fallback.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{CombatantId, Pairing, QueueConfig, RankedQueue};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use std::time::{Duration, Instant};
///
/// let mut queue = RankedQueue::new(QueueConfig::default());
/// let start = Instant::now();
/// let mut rng = StdRng::seed_from_u64(5);
///
/// queue.join(CombatantId::from("a"), start).unwrap();
/// assert!(queue.poll(start, &[], &mut rng).is_empty());
///
/// let later = start + Duration::from_secs(61);
/// let pairings = queue.poll(later, &[], &mut rng);
/// assert!(matches!(&pairings[0], Pairing::PvNpc(id, npc) if id.as_str() == "a" && npc.name == "Rogue Ninja"));
/// assert!(queue.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct RankedQueue {
    config: QueueConfig,
    entries: VecDeque<(CombatantId, Instant)>,
}

impl RankedQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            entries: VecDeque::new(),
        }
    }

    pub fn join(&mut self, id: CombatantId, now: Instant) -> Result<(), BattleError> {
        if self.contains(&id) {
            return Err(BattleError::AlreadyRegistered(id));
        }
        tracing::debug!(player = %id, queued = self.entries.len() + 1, "joined ranked queue");
        self.entries.push_back((id, now));
        Ok(())
    }

    /// Returns whether `id` was queued.
    pub fn leave(&mut self, id: &CombatantId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(queued, _)| queued != id);
        before != self.entries.len()
    }

    pub fn contains(&self, id: &CombatantId) -> bool {
        self.entries.iter().any(|(queued, _)| queued == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Form matches.
    ///
    /// Queued players pair off in queue order, however long they have
    /// waited. An odd one out who has waited at least `npc_fallback_after`
    /// is matched against a random template from `npcs` (the fallback NPC
    /// when empty); otherwise they keep waiting.
    pub fn poll<R: Rng>(&mut self, now: Instant, npcs: &[NpcTemplate], rng: &mut R) -> Vec<Pairing> {
        let mut pairings = Vec::new();
        while self.entries.len() >= 2 {
            if let (Some((first, _)), Some((second, _))) = (self.entries.pop_front(), self.entries.pop_front()) {
                tracing::info!(player1 = %first, player2 = %second, "ranked match found");
                pairings.push(Pairing::PvP(first, second));
            }
        }

        let expired = self
            .entries
            .front()
            .is_some_and(|(_, joined)| now.saturating_duration_since(*joined) >= self.config.npc_fallback_after);
        if expired {
            if let Some((id, _)) = self.entries.pop_front() {
                let npc = npcs.choose(rng).cloned().unwrap_or_else(NpcTemplate::fallback);
                tracing::info!(player = %id, npc = %npc.name, "queue fell back to NPC");
                pairings.push(Pairing::PvNpc(id, npc));
            }
        }
        pairings
    }
}

/// State of a ranked invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationState {
    Pending,
    /// Everyone accepted; the battle can start.
    Ready,
    Cancelled,
    /// Only `winner` accepted before the deadline.
    WonByDefault {
        winner: CombatantId,
        loser: CombatantId,
    },
}

/// Accept gate in front of a ranked battle.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{CombatantId, Invitation, InvitationState};
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let a = CombatantId::from("a");
/// let b = CombatantId::from("b");
/// let mut invite = Invitation::new(a.clone(), b.clone(), now + Duration::from_secs(60));
///
/// assert_eq!(invite.accept(&a, now).unwrap(), InvitationState::Pending);
/// assert_eq!(
///     invite.expire(now + Duration::from_secs(61)),
///     InvitationState::WonByDefault { winner: a, loser: b }
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Invitation {
    participants: [CombatantId; 2],
    accepted: BTreeSet<CombatantId>,
    deadline: Instant,
    state: InvitationState,
}

impl Invitation {
    pub fn new(a: CombatantId, b: CombatantId, deadline: Instant) -> Self {
        Self {
            participants: [a, b],
            accepted: BTreeSet::new(),
            deadline,
            state: InvitationState::Pending,
        }
    }

    /// An invitation that expires `invitation_timeout` after `now`.
    pub fn from_config(a: CombatantId, b: CombatantId, now: Instant, config: &QueueConfig) -> Self {
        Self::new(a, b, now + config.invitation_timeout)
    }

    pub fn state(&self) -> &InvitationState {
        &self.state
    }

    pub fn participants(&self) -> &[CombatantId; 2] {
        &self.participants
    }

    fn check(&self, id: &CombatantId) -> Result<(), BattleError> {
        if !self.participants.contains(id) {
            return Err(BattleError::NotRegistered(id.clone()));
        }
        if self.state != InvitationState::Pending {
            return Err(BattleError::InvalidState(format!(
                "invitation already resolved: {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Accept on behalf of `id`. Accepting after the deadline resolves the
    /// invitation as [`Invitation::expire`] would.
    pub fn accept(&mut self, id: &CombatantId, now: Instant) -> Result<InvitationState, BattleError> {
        self.check(id)?;
        if now > self.deadline {
            return Ok(self.expire(now));
        }
        self.accepted.insert(id.clone());
        if self.participants.iter().all(|p| self.accepted.contains(p)) {
            self.state = InvitationState::Ready;
        }
        Ok(self.state.clone())
    }

    pub fn decline(&mut self, id: &CombatantId) -> Result<InvitationState, BattleError> {
        self.check(id)?;
        tracing::info!(player = %id, "ranked invitation declined");
        self.state = InvitationState::Cancelled;
        Ok(self.state.clone())
    }

    /// Resolve a pending invitation whose deadline has passed.
    ///
    /// Before the deadline, and once resolved, this only reports the state.
    pub fn expire(&mut self, now: Instant) -> InvitationState {
        if self.state != InvitationState::Pending || now <= self.deadline {
            return self.state.clone();
        }
        let [a, b] = &self.participants;
        self.state = match (self.accepted.contains(a), self.accepted.contains(b)) {
            (true, false) => InvitationState::WonByDefault {
                winner: a.clone(),
                loser: b.clone(),
            },
            (false, true) => InvitationState::WonByDefault {
                winner: b.clone(),
                loser: a.clone(),
            },
            _ => InvitationState::Cancelled,
        };
        tracing::info!(state = ?self.state, "ranked invitation expired");
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn id(s: &str) -> CombatantId {
        CombatantId::from(s)
    }

    #[test]
    fn test_join_twice_rejected() {
        let mut queue = RankedQueue::new(QueueConfig::default());
        let now = Instant::now();
        queue.join(id("a"), now).unwrap();
        assert!(matches!(
            queue.join(id("a"), now),
            Err(BattleError::AlreadyRegistered(_))
        ));
        assert!(queue.leave(&id("a")));
        assert!(!queue.leave(&id("a")));
    }

    #[test]
    fn test_pairs_fifo_and_keeps_odd_one() {
        let mut queue = RankedQueue::new(QueueConfig::default());
        let now = Instant::now();
        for name in ["a", "b", "c"] {
            queue.join(id(name), now).unwrap();
        }
        let pairings = queue.poll(now, &[], &mut StdRng::seed_from_u64(1));
        assert_eq!(pairings, vec![Pairing::PvP(id("a"), id("b"))]);
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&id("c")));
    }

    #[test]
    fn test_long_waiters_still_pair_with_each_other() {
        let mut queue = RankedQueue::new(QueueConfig::default());
        let start = Instant::now();
        queue.join(id("a"), start).unwrap();
        queue.join(id("b"), start).unwrap();

        let later = start + Duration::from_secs(61);
        let pairings = queue.poll(later, &[], &mut StdRng::seed_from_u64(1));
        assert_eq!(pairings, vec![Pairing::PvP(id("a"), id("b"))]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_odd_one_out_falls_back_once_expired() {
        let mut queue = RankedQueue::new(QueueConfig::default());
        let start = Instant::now();
        queue.join(id("old"), start).unwrap();
        let later = start + Duration::from_secs(60);
        queue.join(id("new1"), later).unwrap();
        queue.join(id("new2"), later).unwrap();

        let haku = NpcTemplate {
            name: "Haku".into(),
            ..NpcTemplate::fallback()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let pairings = queue.poll(later, &[haku.clone()], &mut rng);
        assert_eq!(pairings, vec![Pairing::PvP(id("old"), id("new1"))]);
        assert!(queue.contains(&id("new2")));

        assert!(queue.poll(later + Duration::from_secs(59), &[haku.clone()], &mut rng).is_empty());
        let pairings = queue.poll(later + Duration::from_secs(60), &[haku.clone()], &mut rng);
        assert_eq!(pairings, vec![Pairing::PvNpc(id("new2"), haku)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_invitation_ready() {
        let now = Instant::now();
        let config = QueueConfig::default();
        let mut invite = Invitation::from_config(id("a"), id("b"), now, &config);
        assert_eq!(invite.accept(&id("b"), now).unwrap(), InvitationState::Pending);
        assert_eq!(invite.accept(&id("a"), now).unwrap(), InvitationState::Ready);
        assert!(invite.decline(&id("a")).is_err());
    }

    #[test]
    fn test_invitation_stranger_and_decline() {
        let now = Instant::now();
        let mut invite = Invitation::new(id("a"), id("b"), now + Duration::from_secs(5));
        assert!(matches!(
            invite.accept(&id("z"), now),
            Err(BattleError::NotRegistered(_))
        ));
        assert_eq!(invite.decline(&id("b")).unwrap(), InvitationState::Cancelled);
    }

    #[test]
    fn test_invitation_expiry() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(5);
        let mut invite = Invitation::new(id("a"), id("b"), deadline);
        assert_eq!(invite.expire(now), InvitationState::Pending);
        assert_eq!(
            invite.expire(deadline + Duration::from_secs(1)),
            InvitationState::Cancelled
        );

        let mut late = Invitation::new(id("a"), id("b"), deadline);
        late.accept(&id("b"), now).unwrap();
        assert_eq!(
            late.accept(&id("a"), deadline + Duration::from_secs(1)).unwrap(),
            InvitationState::WonByDefault {
                winner: id("b"),
                loser: id("a"),
            }
        );
    }
}
