//! # shinobi-battle - Data-Driven Turn-Based Battle Engine
//!
//! A battle engine for shinobi RPGs where every jutsu is data:
//! - **Formula-driven** effects (`"user.power * 1.5 - target.defense"`)
//! - **Timed effects** (buffs, debuffs, bleeds and statuses with durations)
//! - **Channelled** round-based jutsu and combos
//! - **Deterministic** when driven by a seeded RNG
//!
//! The engine has no UI. Moves come in through a [`MoveProvider`] and every
//! round comes back as a plain [`RoundReport`] for a frontend to render.
//!
//! ## Core Concepts
//!
//! ### Round Pipeline
//!
//! ```text
//! [JutsuCatalog] → [EffectInterpreter] → [ActionOutcome] → [RoundReport]
//! ```
//!
//! 1. **Catalogs** load jutsu and combos from JSON, compiling every formula
//! 2. **The interpreter** evaluates formulas against effective stats
//! 3. **The battle** applies outcomes, ticks effects and decides the winner
//!
//! ### Around the battle
//!
//! - **Ranked**: ELO, tiers and the reward ladder ([`RankConfig`], [`RewardLadder`])
//! - **Matchmaking**: FIFO queue with NPC fallback, accept gates ([`RankedQueue`], [`Invitation`])
//! - **Tournaments**: single-elimination, best-of-N ([`Tournament`])
//!
//! ## Example
//!
//! ```rust
//! use shinobi_battle::*;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use std::sync::Arc;
//!
//! let config = BattleConfig::default();
//! let catalog = JutsuCatalog::from_json_str(r#"{
//!     "Attack": {"chakraCost": 0, "effects": [
//!         {"type": "damage", "formula": "user.power * 2 - target.defense", "accuracyBonus": 10}
//!     ]}
//! }"#).unwrap();
//!
//! let lee = Combatant::player("1", "Rock Lee", StatBlock::new(120.0, 40.0, 20.0), vec!["Attack".into()], &config);
//! let npc = NpcTemplate::fallback().spawn(&lee, &config);
//!
//! let mut battle = Battle::new(BattleKind::Mission, lee, npc, Arc::new(catalog), config);
//! let mut player = ScriptedMoves::new(vec![Move::Slot(1); 10]);
//! let mut npc_moves = NpcMoves::new(StdRng::seed_from_u64(1));
//!
//! let report = battle.run(&mut player, &mut npc_moves, &mut StdRng::seed_from_u64(2));
//! assert!(report.result.is_some());
//! ```
//!
//! ## Modules
//!
//! - [`formula`] - Arithmetic formula compiler and evaluator
//! - [`context`] - Variables formulas are evaluated against
//! - [`stat`] - Stats and effective stats
//! - [`status`] - Status identifiers
//! - [`effect`] - Effect definitions and active effects
//! - [`jutsu`] - Jutsu and combo catalogs
//! - [`combatant`] - Battle participants
//! - [`interpreter`] - Jutsu execution
//! - [`bloodline`] - Bloodline abilities
//! - [`npc`] - NPC templates and AI
//! - [`battle`] - The round loop
//! - [`rank`] - ELO, tiers, rewards and usage stats
//! - [`matchmaking`] - Ranked queue and invitations
//! - [`tournament`] - Single-elimination brackets
//! - [`config`] - Engine configuration
//! - [`error`] - Error types

pub mod battle;
pub mod bloodline;
pub mod combatant;
pub mod config;
pub mod context;
pub mod effect;
pub mod error;
pub mod formula;
pub mod interpreter;
pub mod jutsu;
pub mod matchmaking;
pub mod npc;
pub mod rank;
pub mod stat;
pub mod status;
pub mod tournament;

// Re-export main types for convenience
pub use battle::{
    Battle, BattleKind, BattleReport, BattleResult, BattleView, ChannelMoves, DamageTally, Move,
    MoveDecision, MoveProvider, NpcMoves, RoundReport, ScriptedMoves,
};
pub use combatant::{Combatant, CombatantId};
pub use config::{BattleConfig, QueueConfig};
pub use context::FormulaContext;
pub use error::{BattleError, FormulaError};
pub use formula::Formula;
pub use interpreter::{
    ActionKind, ActionOutcome, ComboReport, DamageRoll, EffectInterpreter, EffectSink,
    JutsuScript, RoundBasedSummary, ScriptContext,
};
pub use stat::{EffectiveStat, EffectiveStats, Stat, StatBlock, StatChanges};
pub use status::StatusId;

// Re-export data definitions
pub use bloodline::{Bloodline, BloodlineState, BloodlineTrigger};
pub use effect::{ActiveEffect, EffectSpec, StatSpecs, StatValueSpec};
pub use jutsu::{
    Combo, ComboCatalog, ComboProgress, CustomBackground, Jutsu, JutsuCatalog, RoundEffect,
    RoundKey,
};
pub use npc::{NpcBrain, NpcTemplate};

// Re-export game-mode types
pub use matchmaking::{Invitation, InvitationState, Pairing, RankedQueue};
pub use rank::{EloUpdate, RankConfig, RankedReward, RewardLadder, RewardStatus, Tier, UsageTracker};
pub use tournament::{FightResult, Match, Tournament, TournamentStatus};
