//! Status identifier module.
//!
//! Statuses are defined by game data, so the set is open. `StatusId` is an
//! interned string identifier using `Arc<str>`; a handful of names carry
//! engine semantics and are listed in [`known`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Status names the engine itself interprets.
pub mod known {
    /// Skips the afflicted combatant's action.
    pub const STUN: &str = "stun";
    /// Skips the afflicted combatant's action.
    pub const FLINCH: &str = "flinch";
    /// Skips the afflicted combatant's action.
    pub const DROWN: &str = "drown";
    /// Exposed to formulas as `hasHiddenMist`.
    pub const MIST: &str = "mist";
    /// Makes the next attack against the holder miss, then is consumed.
    pub const FLYING_RAIJIN: &str = "flying_raijin";
    /// Damage over time; defaults to a share of max health.
    pub const BLEED: &str = "bleed";
    /// Damage over time; defaults to a share of max health.
    pub const POISON: &str = "poison";
}

/// Interned status identifier.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::StatusId;
///
/// let stun = StatusId::from_str("stun");
/// let stun2: StatusId = "stun".into();
///
/// assert_eq!(stun, stun2);
/// assert!(stun.incapacitates());
/// assert!(!StatusId::from_str("mist").incapacitates());
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatusId(Arc<str>);

impl Serialize for StatusId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StatusId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(StatusId::from(s))
    }
}

impl StatusId {
    /// Create a new `StatusId` from a string slice.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this status is the given well-known name.
    pub fn is(&self, name: &str) -> bool {
        self.as_str() == name
    }

    /// Whether this status prevents its holder from acting.
    pub fn incapacitates(&self) -> bool {
        matches!(self.as_str(), known::STUN | known::FLINCH | known::DROWN)
    }

    /// Capitalized label, e.g. `"Stun"` for `stun`.
    pub fn title(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl From<&str> for StatusId {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for StatusId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl std::fmt::Display for StatusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
