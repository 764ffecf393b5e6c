//! Error types for formula evaluation and battle bookkeeping.
//!
//! Formula failures are represented by `FormulaError`; everything else
//! (catalog loading, tournament and queue state violations) by `BattleError`.

use crate::combatant::CombatantId;
use thiserror::Error;

/// Errors produced while compiling or evaluating a formula.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{Formula, FormulaError};
///
/// let err = Formula::compile("user.power *").unwrap_err();
/// assert_eq!(err, FormulaError::UnexpectedEnd);
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    /// A character the lexer does not understand.
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },

    /// A token that does not fit the grammar at this point.
    #[error("Unexpected token '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },

    /// The formula ended in the middle of an expression.
    #[error("Unexpected end of formula")]
    UnexpectedEnd,

    /// The formula is empty or only whitespace.
    #[error("Empty formula")]
    Empty,

    /// A variable was referenced that the context does not define.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// A function call to something that is not a built-in.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A built-in was called with the wrong number of arguments.
    #[error("Function {name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// Evaluation produced NaN or infinity (e.g. division by zero).
    #[error("Formula produced a non-finite value")]
    NonFinite,
}

/// Errors raised by catalogs, queues and tournaments.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Reading a catalog or config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A catalog or config document is not valid JSON for its schema.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A formula inside a catalog failed to compile.
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// A jutsu name is not present in the catalog.
    #[error("Unknown jutsu: {0}")]
    UnknownJutsu(String),

    /// A round-effect key is neither `"N"` nor `"A-B"`.
    #[error("Invalid round key: {0}")]
    InvalidRoundKey(String),

    /// The participant is already registered or queued.
    #[error("{0} is already registered")]
    AlreadyRegistered(CombatantId),

    /// The participant is not registered or queued.
    #[error("{0} is not registered")]
    NotRegistered(CombatantId),

    /// Registration is closed because the bracket is full.
    #[error("Tournament is full ({0} participants)")]
    TournamentFull(usize),

    /// The operation is not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No unplayed match exists between the two participants.
    #[error("No open match between {0} and {1}")]
    NoSuchMatch(CombatantId, CombatantId),

    /// The fight was started by the wrong participant.
    #[error("{got} started the fight, but it was {expected}'s turn")]
    WrongInitiator {
        expected: CombatantId,
        got: CombatantId,
    },

    /// A tournament cannot start with fewer than two participants.
    #[error("Not enough participants: {0}")]
    NotEnoughParticipants(usize),

    /// The battle already has a result.
    #[error("Battle is already finished")]
    BattleFinished,
}
