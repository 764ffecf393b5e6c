//! Variable bindings for formula evaluation.
//!
//! A `FormulaContext` maps dotted names (`user.power`, `target.defense`,
//! `hasHiddenMist`) to numbers. Booleans are stored as `1.0`/`0.0`.

use crate::stat::EffectiveStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Variables visible to a formula.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::FormulaContext;
///
/// let mut context = FormulaContext::new();
/// context.set("user.power", 40.0);
/// context.set_flag("hasHiddenMist", true);
///
/// assert_eq!(context.get("user.power"), Some(40.0));
/// assert_eq!(context.get("hasHiddenMist"), Some(1.0));
/// assert_eq!(context.get("target.power"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaContext {
    vars: HashMap<String, f64>,
}

impl FormulaContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a numeric variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.vars.insert(name.into(), value);
    }

    /// Bind a boolean variable as `1.0` or `0.0`.
    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.set(name, if value { 1.0 } else { 0.0 });
    }

    /// Bind `prefix.power`, `prefix.defense`, ... for every stat.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::{EffectiveStats, FormulaContext, StatBlock};
    ///
    /// let stats = EffectiveStats::resolve(&StatBlock::new(150.0, 30.0, 20.0), &[]);
    /// let mut context = FormulaContext::new();
    /// context.set_stats("target", &stats);
    ///
    /// assert_eq!(context.get("target.health"), Some(150.0));
    /// assert_eq!(context.get("target.dodge"), Some(1.0));
    /// ```
    pub fn set_stats(&mut self, prefix: &str, stats: &EffectiveStats) {
        for (stat, value) in stats.iter() {
            self.set(format!("{}.{}", prefix, stat.name()), value);
        }
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }

    /// Check whether a variable is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}
