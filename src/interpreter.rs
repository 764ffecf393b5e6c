//! Jutsu execution.
//!
//! The [`EffectInterpreter`] turns [`EffectSpec`]s into changes on the
//! combatants: damage and heal totals on the [`ActionOutcome`], chakra,
//! and new [`ActiveEffect`]s. Effective stats are taken once at the start
//! of an action, so a buff gained mid-jutsu counts from the next action on.
//!
//! Formula failures never abort an action. They are logged, count as zero,
//! and leave an `"Error applying <type> effect"` line on the outcome.

use crate::combatant::{Combatant, CombatantId};
use crate::config::BattleConfig;
use crate::context::FormulaContext;
use crate::effect::{ActiveEffect, EffectSpec, StatSpecs, StatValueSpec};
use crate::formula::Formula;
use crate::jutsu::{Jutsu, JutsuCatalog};
use crate::stat::{format_changes, EffectiveStats, Stat, StatChanges};
use crate::status::{known, StatusId};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// What kind of action a side took this round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Jutsu,
    Rest,
    /// The side chose to do nothing.
    Passed,
    Fled,
    TimedOut,
    Incapacitated(StatusId),
    NotEnoughChakra,
    UnknownJutsu,
    AlreadyChanneling,
}

/// The result of one side's action in a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub actor: CombatantId,
    pub kind: ActionKind,
    pub description: String,
    pub jutsu_used: Option<String>,
    /// Damage to deal to the opponent.
    pub damage: f64,
    /// Health to restore to the actor.
    pub heal: f64,
    /// Chakra already restored to the actor.
    pub chakra_gain: f64,
    pub hit: bool,
    pub special_effects: Vec<String>,
    pub round_based_description: Option<String>,
    pub round_based_effects: Vec<String>,
}

impl ActionOutcome {
    pub fn new(actor: CombatantId, kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            actor,
            kind,
            description: description.into(),
            jutsu_used: None,
            damage: 0.0,
            heal: 0.0,
            chakra_gain: 0.0,
            hit: false,
            special_effects: Vec::new(),
            round_based_description: None,
            round_based_effects: Vec::new(),
        }
    }

    fn push(&mut self, sink: EffectSink, line: String) {
        match sink {
            EffectSink::Immediate => self.special_effects.push(line),
            EffectSink::RoundBased => self.round_based_effects.push(line),
        }
    }

    /// Whether the action ends the battle for its actor.
    pub fn is_forfeit(&self) -> bool {
        matches!(self.kind, ActionKind::Fled | ActionKind::TimedOut)
    }
}

/// Which message list an applied effect reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectSink {
    /// `special_effects`: the jutsu's own effects.
    Immediate,
    /// `round_based_effects`: a channelled round's effects.
    RoundBased,
}

/// Outcome of a hit roll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageRoll {
    pub damage: f64,
    pub hit: bool,
}

impl DamageRoll {
    const MISS: DamageRoll = DamageRoll {
        damage: 0.0,
        hit: false,
    };
}

/// Everything a scripted jutsu may touch.
pub struct ScriptContext<'a> {
    pub user: &'a mut Combatant,
    pub target: &'a mut Combatant,
    pub round: u32,
    pub config: &'a BattleConfig,
    pub rng: &'a mut dyn RngCore,
}

/// A jutsu implemented in code instead of data.
///
/// Register one with [`JutsuCatalog::register_script`]; it replaces any data
/// definition with the same name.
pub trait JutsuScript: Send + Sync {
    fn execute(&self, ctx: ScriptContext<'_>) -> ActionOutcome;
}

/// Summary of one channelled round applied at round start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundBasedSummary {
    pub jutsu: String,
    pub round: u32,
    pub description: String,
    pub effects: Vec<String>,
    pub damage: f64,
    pub heal: f64,
}

/// A completed combo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboReport {
    pub owner: CombatantId,
    pub combo: String,
    pub damage: f64,
    pub heal: f64,
    pub special_effects: Vec<String>,
}

struct Scope {
    user: EffectiveStats,
    target: EffectiveStats,
    target_mist: bool,
    target_incapacitated: bool,
    evaded: bool,
}

impl Scope {
    fn new(user: &Combatant, target: &Combatant) -> Self {
        Self {
            user: user.effective_stats(),
            target: target.effective_stats(),
            target_mist: target.has_status(known::MIST),
            target_incapacitated: target.has_status(known::STUN)
                || target.has_status(known::FLINCH),
            evaded: false,
        }
    }
}

fn eval_logged(formula: &Formula, ctx: &FormulaContext, failed: &mut bool) -> f64 {
    match formula.evaluate(ctx) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(formula = %formula, error = %err, "formula evaluation failed");
            *failed = true;
            0.0
        }
    }
}

fn stats_context(prefix: &str, stats: &EffectiveStats) -> FormulaContext {
    let mut ctx = FormulaContext::new();
    ctx.set_stats(prefix, stats);
    ctx
}

/// Replace the words `user` and `target` in round descriptions with names.
fn substitute_names(text: &str, user: &str, target: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        match word.to_lowercase().as_str() {
            "user" | "undefined" => out.push_str(user),
            "target" => out.push_str(target),
            _ => out.push_str(word),
        }
        word.clear();
    };
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
        } else {
            flush(&mut word, &mut out);
            out.push(ch);
        }
    }
    flush(&mut word, &mut out);
    out
}

/// Applies jutsu effects.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{
///     BattleConfig, Combatant, EffectInterpreter, EffectSpec, Formula, Jutsu, JutsuCatalog,
///     StatBlock,
/// };
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let config = BattleConfig::default();
/// let mut catalog = JutsuCatalog::new();
/// catalog.insert(Jutsu::new(
///     "Strike",
///     2.0,
///     vec![EffectSpec::Damage {
///         formula: Formula::compile("user.power * 2").unwrap(),
///         accuracy_bonus: 10.0,
///     }],
/// ));
///
/// let mut user = Combatant::player("1", "Lee", StatBlock::new(100.0, 30.0, 10.0), vec![], &config);
/// let mut target = Combatant::player("2", "Gaara", StatBlock::new(100.0, 10.0, 10.0), vec![], &config);
///
/// let interpreter = EffectInterpreter::new(config);
/// let mut rng = StdRng::seed_from_u64(7);
/// let outcome = interpreter.execute_jutsu(&mut user, &mut target, &catalog, "Strike", 1, &mut rng);
///
/// assert!(outcome.hit);
/// assert_eq!(outcome.damage, 60.0);
/// assert_eq!(user.chakra, 8.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EffectInterpreter {
    config: BattleConfig,
}

impl EffectInterpreter {
    pub fn new(config: BattleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    fn damage_context(&self, scope: &Scope) -> FormulaContext {
        let mut ctx = FormulaContext::new();
        ctx.set_stats("user", &scope.user);
        ctx.set_stats("target", &scope.target);
        if scope.user.get(Stat::Accuracy) == 0.0 {
            ctx.set("user.accuracy", self.config.damage_context_accuracy);
        }
        if scope.target.get(Stat::Defense) == 0.0 {
            ctx.set("target.defense", 1.0);
        }
        ctx.set_flag("hasHiddenMist", scope.target_mist);
        ctx.set_flag("isTargetIncapacitated", scope.target_incapacitated);
        ctx
    }

    fn try_roll<R: Rng>(
        &self,
        scope: &Scope,
        formula: &Formula,
        accuracy_bonus: f64,
        rng: &mut R,
    ) -> Result<DamageRoll, crate::error::FormulaError> {
        if scope.evaded {
            return Ok(DamageRoll::MISS);
        }
        let ctx = self.damage_context(scope);
        let accuracy = ctx
            .get("user.accuracy")
            .unwrap_or(self.config.damage_context_accuracy);
        let dodge = ctx.get("target.dodge").unwrap_or(0.0);
        let hit_chance = (accuracy + accuracy_bonus - dodge).clamp(0.0, 100.0);
        if rng.gen::<f64>() * 100.0 > hit_chance {
            return Ok(DamageRoll::MISS);
        }
        let damage = formula.evaluate(&ctx)?.floor().max(0.0);
        Ok(DamageRoll { damage, hit: true })
    }

    /// Roll to hit and evaluate a damage formula.
    ///
    /// The hit chance is `accuracy + bonus - dodge`, clamped to `0..=100`.
    /// A formula error counts as a miss.
    pub fn roll_damage<R: Rng>(
        &self,
        user: &Combatant,
        target: &Combatant,
        formula: &Formula,
        accuracy_bonus: f64,
        rng: &mut R,
    ) -> DamageRoll {
        let scope = Scope::new(user, target);
        match self.try_roll(&scope, formula, accuracy_bonus, rng) {
            Ok(roll) => roll,
            Err(err) => {
                tracing::warn!(formula = %formula, error = %err, "damage formula failed");
                DamageRoll::MISS
            }
        }
    }

    fn buff_changes(user: &EffectiveStats, stats: &StatSpecs, failed: &mut bool) -> StatChanges {
        let ctx = stats_context("user", user);
        stats
            .iter()
            .map(|(&stat, spec)| {
                let value = match spec {
                    StatValueSpec::Value(v) => *v,
                    StatValueSpec::Formula(f) => eval_logged(f, &ctx, failed).floor(),
                };
                (stat, value)
            })
            .collect()
    }

    fn debuff_changes(target: &EffectiveStats, stats: &StatSpecs, failed: &mut bool) -> StatChanges {
        let ctx = stats_context("target", target);
        stats
            .iter()
            .map(|(&stat, spec)| {
                let value = match spec {
                    StatValueSpec::Value(v) => *v,
                    StatValueSpec::Formula(f) => eval_logged(f, &ctx, failed),
                };
                (stat, 0.0 - value.abs())
            })
            .collect()
    }

    fn non_negative(user: &EffectiveStats, formula: &Formula, failed: &mut bool) -> f64 {
        let ctx = stats_context("user", user);
        eval_logged(formula, &ctx, failed).floor().max(0.0)
    }

    /// Buff deltas: numbers as-is, formulas against `user.*`, floored.
    pub fn compute_buff(&self, user: &Combatant, stats: &StatSpecs) -> StatChanges {
        Self::buff_changes(&user.effective_stats(), stats, &mut false)
    }

    /// Debuff deltas against `target.*`, always negative.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::{BattleConfig, Combatant, EffectInterpreter, Stat, StatBlock, StatValueSpec};
    /// use std::collections::BTreeMap;
    ///
    /// let config = BattleConfig::default();
    /// let target = Combatant::player("2", "Kisame", StatBlock::new(100.0, 10.0, 40.0), vec![], &config);
    /// let mut stats = BTreeMap::new();
    /// stats.insert(Stat::Defense, StatValueSpec::Value(15.0));
    ///
    /// let changes = EffectInterpreter::new(config).compute_debuff(&target, &stats);
    /// assert_eq!(changes[&Stat::Defense], -15.0);
    /// ```
    pub fn compute_debuff(&self, target: &Combatant, stats: &StatSpecs) -> StatChanges {
        Self::debuff_changes(&target.effective_stats(), stats, &mut false)
    }

    /// Heal amount: `max(0, floor(formula))` against `user.*`.
    pub fn compute_heal(&self, user: &Combatant, formula: &Formula) -> f64 {
        Self::non_negative(&user.effective_stats(), formula, &mut false)
    }

    /// Chakra gain: `max(0, floor(formula))` against `user.*`.
    pub fn compute_chakra_gain(&self, user: &Combatant, formula: &Formula) -> f64 {
        Self::non_negative(&user.effective_stats(), formula, &mut false)
    }

    /// Apply one effect with stats taken from the combatants as they are now.
    pub fn apply_effect<R: Rng>(
        &self,
        spec: &EffectSpec,
        user: &mut Combatant,
        target: &mut Combatant,
        outcome: &mut ActionOutcome,
        sink: EffectSink,
        rng: &mut R,
    ) {
        let scope = Scope::new(user, target);
        self.apply_in_scope(spec, &scope, user, target, outcome, sink, rng);
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_in_scope<R: Rng>(
        &self,
        spec: &EffectSpec,
        scope: &Scope,
        user: &mut Combatant,
        target: &mut Combatant,
        outcome: &mut ActionOutcome,
        sink: EffectSink,
        rng: &mut R,
    ) {
        let mut failed = false;
        match spec {
            EffectSpec::Damage {
                formula,
                accuracy_bonus,
            } => {
                let roll = match self.try_roll(scope, formula, *accuracy_bonus, rng) {
                    Ok(roll) => roll,
                    Err(err) => {
                        tracing::warn!(formula = %formula, error = %err, "damage formula failed");
                        failed = true;
                        DamageRoll::MISS
                    }
                };
                outcome.damage += roll.damage;
                outcome.hit = roll.hit;
                if roll.hit && roll.damage > 0.0 {
                    outcome.push(sink, format!("Dealt {} damage", roll.damage));
                } else if !roll.hit {
                    if sink == EffectSink::Immediate {
                        if let Some(jutsu) = &outcome.jutsu_used {
                            outcome.description = format!("{} missed with {}!", user.name, jutsu);
                        }
                    }
                    outcome.push(sink, "Attack missed!".to_string());
                }
            }
            EffectSpec::Buff { stats, duration } => {
                let changes = Self::buff_changes(&scope.user, stats, &mut failed);
                outcome.push(
                    sink,
                    format!("Gained buffs: {} for {} turns", format_changes(&changes), duration),
                );
                user.add_effect(ActiveEffect::buff(changes, *duration));
            }
            EffectSpec::Debuff { stats, duration } => {
                let changes = Self::debuff_changes(&scope.target, stats, &mut failed);
                outcome.push(
                    sink,
                    format!("Applied debuffs: {} for {} turns", format_changes(&changes), duration),
                );
                target.add_effect(ActiveEffect::debuff(changes, *duration));
            }
            EffectSpec::Heal { formula } => {
                let amount = Self::non_negative(&scope.user, formula, &mut failed);
                outcome.heal += amount;
                if amount > 0.0 {
                    outcome.push(sink, format!("Healed {} HP", amount));
                }
            }
            EffectSpec::InstantKill { chance } => {
                if !scope.evaded && rng.gen::<f64>() < *chance {
                    outcome.damage = scope.target.get(Stat::Health);
                    outcome.push(sink, "INSTANT KILL!".to_string());
                }
            }
            EffectSpec::Bleed {
                duration,
                damage_per_turn,
                damage_per_turn_formula,
            } => {
                let per_turn = match (damage_per_turn_formula, damage_per_turn) {
                    (Some(formula), _) => {
                        let mut ctx = stats_context("user", &scope.user);
                        ctx.set_stats("target", &scope.target);
                        eval_logged(formula, &ctx, &mut failed).floor()
                    }
                    (None, Some(value)) => value.floor(),
                    (None, None) => {
                        (scope.target.get(Stat::Health) * self.config.bleed_percent).floor()
                    }
                };
                target.add_effect(ActiveEffect::bleed(per_turn, *duration));
                outcome.push(sink, format!("Applied bleed for {} turns", duration));
            }
            EffectSpec::Status {
                status,
                chance,
                duration,
                damage_per_turn,
                heal_per_turn,
                damage_per_turn_formula,
                heal_per_turn_formula,
            } => {
                if rng.gen::<f64>() < *chance {
                    let mut ctx = stats_context("user", &scope.user);
                    ctx.set_stats("target", &scope.target);
                    let damage_per_turn = match damage_per_turn_formula {
                        Some(f) => Some(eval_logged(f, &ctx, &mut failed).floor()),
                        None => *damage_per_turn,
                    };
                    let heal_per_turn = match heal_per_turn_formula {
                        Some(f) => Some(eval_logged(f, &ctx, &mut failed).floor()),
                        None => *heal_per_turn,
                    };
                    target.add_effect(ActiveEffect::Status {
                        status: status.clone(),
                        duration: *duration,
                        damage_per_turn,
                        heal_per_turn,
                    });
                    outcome.push(sink, format!("Applied {} for {} turns", status, duration));
                }
            }
            EffectSpec::ChakraGain { formula } => {
                let amount = Self::non_negative(&scope.user, formula, &mut failed);
                let gained = user.gain_chakra(amount, self.config.max_chakra);
                outcome.chakra_gain += gained;
                if amount > 0.0 {
                    outcome.push(sink, format!("Gained {} Chakra", amount));
                }
            }
            EffectSpec::FlatDamage { value } => {
                outcome.damage += value;
                outcome.hit = true;
                outcome.push(sink, format!("Dealt {} damage", value));
            }
        }

        if failed {
            outcome.push(sink, format!("Error applying {} effect", spec.type_name()));
        }
        tracing::debug!(
            user = %user.id,
            target = %target.id,
            effect = spec.type_name(),
            "applied effect"
        );
    }

    /// Execute a jutsu by name.
    ///
    /// For round-based jutsu, the round effect for `round` is applied too
    /// and reported in the round-based fields. If the target holds
    /// `flying_raijin`, every damage roll of this action misses and the
    /// status is consumed.
    pub fn execute_jutsu<R: Rng>(
        &self,
        user: &mut Combatant,
        target: &mut Combatant,
        catalog: &JutsuCatalog,
        name: &str,
        round: u32,
        rng: &mut R,
    ) -> ActionOutcome {
        if let Some(script) = catalog.script(name) {
            let mut outcome = script.execute(ScriptContext {
                user,
                target,
                round,
                config: &self.config,
                rng,
            });
            outcome.jutsu_used.get_or_insert_with(|| name.to_string());
            return outcome;
        }

        let Some(jutsu) = catalog.get(name) else {
            let mut outcome = ActionOutcome::new(
                user.id.clone(),
                ActionKind::UnknownJutsu,
                format!("{} attempted unknown jutsu: {}", user.name, name),
            );
            outcome.jutsu_used = Some(name.to_string());
            outcome.special_effects.push("Jutsu failed!".to_string());
            return outcome;
        };

        if !user.spend_chakra(jutsu.chakra_cost) {
            let mut outcome = ActionOutcome::new(
                user.id.clone(),
                ActionKind::NotEnoughChakra,
                format!("{} failed to perform {} (not enough chakra)", user.name, jutsu.name),
            );
            outcome.jutsu_used = Some(name.to_string());
            outcome.special_effects.push("Not enough chakra!".to_string());
            return outcome;
        }

        let mut scope = Scope::new(user, target);
        scope.user.force(Stat::Chakra, scope.user.get(Stat::Chakra) + jutsu.chakra_cost);
        scope.evaded = target.has_status(known::FLYING_RAIJIN);

        let description = jutsu
            .description
            .clone()
            .unwrap_or_else(|| format!("{} used {}", user.name, jutsu.name));
        let mut outcome = ActionOutcome::new(user.id.clone(), ActionKind::Jutsu, description);
        outcome.hit = true;
        outcome.jutsu_used = Some(name.to_string());

        for spec in &jutsu.effects {
            self.apply_in_scope(spec, &scope, user, target, &mut outcome, EffectSink::Immediate, rng);
        }

        if jutsu.round_based {
            if let Some(effect) = jutsu.round_effect(round) {
                let text = effect.description.as_deref().unwrap_or_default();
                outcome.round_based_description =
                    Some(substitute_names(text, &user.name, &target.name));
                for spec in effect.effects() {
                    self.apply_in_scope(&spec, &scope, user, target, &mut outcome, EffectSink::RoundBased, rng);
                }
            }
        }

        if scope.evaded {
            target.remove_status(known::FLYING_RAIJIN);
            outcome
                .special_effects
                .push(format!("{} evaded with Flying Raijin!", target.name));
        }

        tracing::debug!(
            user = %user.id,
            jutsu = name,
            damage = outcome.damage,
            heal = outcome.heal,
            hit = outcome.hit,
            "executed jutsu"
        );
        outcome
    }

    /// Apply round `round` of a channelled jutsu directly to both sides.
    ///
    /// Returns `None` when the jutsu has no effect for that round.
    pub fn continue_channel<R: Rng>(
        &self,
        user: &mut Combatant,
        target: &mut Combatant,
        jutsu: &Jutsu,
        round: u32,
        rng: &mut R,
    ) -> Option<RoundBasedSummary> {
        let effect = jutsu.round_effect(round)?;
        let scope = Scope::new(user, target);
        let mut scratch = ActionOutcome::new(user.id.clone(), ActionKind::Jutsu, "");
        for spec in effect.effects() {
            self.apply_in_scope(&spec, &scope, user, target, &mut scratch, EffectSink::RoundBased, rng);
        }
        let damage = target.take_damage(scratch.damage);
        let heal = user.heal(scratch.heal);
        let text = effect.description.as_deref().unwrap_or_default();
        Some(RoundBasedSummary {
            jutsu: jutsu.name.clone(),
            round,
            description: substitute_names(text, &user.name, &target.name),
            effects: scratch.round_based_effects,
            damage,
            heal,
        })
    }

    /// Rest: regain `rest_chakra_gain`, capped at `max_chakra`.
    pub fn rest(&self, user: &mut Combatant) -> ActionOutcome {
        let gained = user.gain_chakra(self.config.rest_chakra_gain, self.config.max_chakra);
        let mut outcome = ActionOutcome::new(
            user.id.clone(),
            ActionKind::Rest,
            format!("{} gathered chakra and rested", user.name),
        );
        outcome.hit = true;
        outcome.chakra_gain = gained;
        outcome
            .special_effects
            .push(format!("+{} Chakra", self.config.rest_chakra_gain));
        outcome
    }

    /// Fire `user`'s combo if every required jutsu has been used.
    ///
    /// Damage and healing are applied immediately and the progress resets.
    pub fn apply_combo<R: Rng>(
        &self,
        user: &mut Combatant,
        target: &mut Combatant,
        rng: &mut R,
    ) -> Option<ComboReport> {
        let combo = user
            .combo
            .as_ref()
            .filter(|progress| progress.is_complete())?
            .combo()
            .clone();

        let scope = Scope::new(user, target);
        let mut scratch = ActionOutcome::new(user.id.clone(), ActionKind::Jutsu, "");
        scratch.damage = combo.damage;
        for spec in &combo.effects {
            self.apply_in_scope(spec, &scope, user, target, &mut scratch, EffectSink::Immediate, rng);
        }

        let damage = target.take_damage(scratch.damage);
        let heal = user.heal(scratch.heal);
        if let Some(progress) = user.combo.as_mut() {
            progress.reset();
        }
        tracing::info!(user = %user.id, combo = %combo.name, damage, "combo completed");
        Some(ComboReport {
            owner: user.id.clone(),
            combo: combo.name,
            damage,
            heal,
            special_effects: scratch.special_effects,
        })
    }

    /// Tick every active effect once: damage and healing over time, then
    /// durations. Returns one message per tick and per expiry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::{ActiveEffect, BattleConfig, Combatant, EffectInterpreter, StatBlock};
    ///
    /// let config = BattleConfig::default();
    /// let mut zabuza = Combatant::player("1", "Zabuza", StatBlock::new(100.0, 10.0, 10.0), vec![], &config);
    /// zabuza.add_effect(ActiveEffect::bleed(7.0, 1));
    ///
    /// let messages = EffectInterpreter::new(config).tick_effects(&mut zabuza);
    /// assert_eq!(zabuza.current_health, 93.0);
    /// assert!(zabuza.active_effects.is_empty());
    /// assert_eq!(messages.len(), 2);
    /// ```
    pub fn tick_effects(&self, combatant: &mut Combatant) -> Vec<String> {
        let mut messages = Vec::new();
        let effects = std::mem::take(&mut combatant.active_effects);
        let mut remaining = Vec::with_capacity(effects.len());

        for mut effect in effects {
            match &effect {
                ActiveEffect::Bleed {
                    damage_per_turn, ..
                } => {
                    let lost = combatant.take_damage(*damage_per_turn);
                    messages.push(format!("{} is bleeding, taking {} damage.", combatant.name, lost));
                }
                ActiveEffect::Status {
                    status,
                    damage_per_turn,
                    heal_per_turn,
                    ..
                } => {
                    let default_share = if status.is(known::BLEED) {
                        Some(self.config.bleed_percent)
                    } else if status.is(known::POISON) {
                        Some(self.config.poison_percent)
                    } else {
                        None
                    };
                    let per_turn = damage_per_turn.or_else(|| {
                        default_share.map(|share| (combatant.max_health * share).floor())
                    });
                    if let Some(amount) = per_turn {
                        let lost = combatant.take_damage(amount);
                        messages.push(format!(
                            "{} takes {} damage from {}.",
                            combatant.name, lost, status
                        ));
                    }
                    if let Some(amount) = heal_per_turn {
                        let healed = combatant.heal(*amount);
                        messages.push(format!(
                            "{} recovers {} HP from {}.",
                            combatant.name, healed, status
                        ));
                    }
                }
                ActiveEffect::Buff { .. } | ActiveEffect::Debuff { .. } => {}
            }

            if effect.tick_down() {
                tracing::debug!(combatant = %combatant.id, effect = %effect.label(), "effect expired");
                messages.push(format!(
                    "{}'s {} effect has worn off.",
                    combatant.name,
                    effect.label()
                ));
            } else {
                remaining.push(effect);
            }
        }

        // Anything added while ticking stays after the survivors.
        remaining.append(&mut combatant.active_effects);
        combatant.active_effects = remaining;
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jutsu::Combo;
    use crate::jutsu::ComboProgress;
    use crate::stat::StatBlock;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn f(src: &str) -> Formula {
        Formula::compile(src).unwrap()
    }

    fn fighter(id: &str, hp: f64, power: f64, defense: f64) -> Combatant {
        Combatant::player(
            id,
            id,
            StatBlock::new(hp, power, defense),
            vec![],
            &BattleConfig::default(),
        )
    }

    fn sure_hit(src: &str) -> EffectSpec {
        EffectSpec::Damage {
            formula: f(src),
            accuracy_bonus: 10.0,
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_sure_hit_damage_is_floored() {
        let interp = EffectInterpreter::default();
        let user = fighter("a", 100.0, 33.0, 10.0);
        let target = fighter("b", 100.0, 10.0, 10.0);
        let roll = interp.roll_damage(&user, &target, &f("user.power / 2"), 10.0, &mut rng());
        assert!(roll.hit);
        assert_eq!(roll.damage, 16.0);
    }

    #[test]
    fn test_zero_accuracy_always_misses() {
        let interp = EffectInterpreter::default();
        let mut user = fighter("a", 100.0, 33.0, 10.0);
        let target = fighter("b", 100.0, 10.0, 10.0);
        user.add_effect(ActiveEffect::debuff([(Stat::Accuracy, -200.0)].into_iter().collect(), 1));
        let mut rng = rng();
        for _ in 0..20 {
            let roll = interp.roll_damage(&user, &target, &f("10"), 0.0, &mut rng);
            assert!(!roll.hit);
        }
    }

    #[test]
    fn test_negative_damage_clamped() {
        let interp = EffectInterpreter::default();
        let user = fighter("a", 100.0, 5.0, 10.0);
        let target = fighter("b", 100.0, 10.0, 90.0);
        let roll = interp.roll_damage(
            &user,
            &target,
            &f("user.power - target.defense"),
            10.0,
            &mut rng(),
        );
        assert!(roll.hit);
        assert_eq!(roll.damage, 0.0);
    }

    #[test]
    fn test_formula_error_is_a_miss() {
        let interp = EffectInterpreter::default();
        let user = fighter("a", 100.0, 5.0, 10.0);
        let target = fighter("b", 100.0, 10.0, 90.0);
        let roll = interp.roll_damage(&user, &target, &f("user.speed"), 10.0, &mut rng());
        assert_eq!(roll, DamageRoll::MISS);
    }

    #[test]
    fn test_hidden_mist_flag() {
        let interp = EffectInterpreter::default();
        let user = fighter("a", 100.0, 40.0, 10.0);
        let mut target = fighter("b", 100.0, 10.0, 10.0);
        let formula = f("hasHiddenMist ? 0 : user.power");
        assert_eq!(
            interp.roll_damage(&user, &target, &formula, 10.0, &mut rng()).damage,
            40.0
        );
        target.add_effect(ActiveEffect::status(StatusId::from_str(known::MIST), 2));
        assert_eq!(
            interp.roll_damage(&user, &target, &formula, 10.0, &mut rng()).damage,
            0.0
        );
    }

    #[test]
    fn test_debuff_forced_negative() {
        let interp = EffectInterpreter::default();
        let target = fighter("b", 100.0, 10.0, 40.0);
        let mut stats = StatSpecs::new();
        stats.insert(Stat::Power, StatValueSpec::Value(-5.0));
        stats.insert(Stat::Defense, StatValueSpec::Formula(f("target.defense * 0.25")));
        let changes = interp.compute_debuff(&target, &stats);
        assert_eq!(changes[&Stat::Power], -5.0);
        assert_eq!(changes[&Stat::Defense], -10.0);
    }

    #[test]
    fn test_buff_formula_floored() {
        let interp = EffectInterpreter::default();
        let user = fighter("a", 100.0, 25.0, 10.0);
        let mut stats = StatSpecs::new();
        stats.insert(Stat::Power, StatValueSpec::Formula(f("user.power * 0.3")));
        stats.insert(Stat::Dodge, StatValueSpec::Value(2.5));
        let changes = interp.compute_buff(&user, &stats);
        assert_eq!(changes[&Stat::Power], 7.0);
        assert_eq!(changes[&Stat::Dodge], 2.5);
    }

    #[test]
    fn test_heal_and_chakra_never_negative() {
        let interp = EffectInterpreter::default();
        let user = fighter("a", 100.0, 25.0, 10.0);
        assert_eq!(interp.compute_heal(&user, &f("0 - 5")), 0.0);
        assert_eq!(interp.compute_heal(&user, &f("user.health * 0.15")), 15.0);
        assert_eq!(interp.compute_chakra_gain(&user, &f("2.9")), 2.0);
    }

    #[test]
    fn test_execute_not_enough_chakra_spends_nothing() {
        let interp = EffectInterpreter::default();
        let mut catalog = JutsuCatalog::new();
        catalog.insert(Jutsu::new("Rasengan", 12.0, vec![sure_hit("50")]));
        let mut user = fighter("a", 100.0, 25.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);

        let outcome = interp.execute_jutsu(&mut user, &mut target, &catalog, "Rasengan", 1, &mut rng());
        assert_eq!(outcome.kind, ActionKind::NotEnoughChakra);
        assert_eq!(outcome.damage, 0.0);
        assert_eq!(user.chakra, 10.0);
    }

    #[test]
    fn test_execute_unknown() {
        let interp = EffectInterpreter::default();
        let mut user = fighter("a", 100.0, 25.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);
        let outcome = interp.execute_jutsu(
            &mut user,
            &mut target,
            &JutsuCatalog::new(),
            "Nope",
            1,
            &mut rng(),
        );
        assert_eq!(outcome.kind, ActionKind::UnknownJutsu);
    }

    #[test]
    fn test_execute_applies_effects_in_order() {
        let interp = EffectInterpreter::default();
        let mut catalog = JutsuCatalog::new();
        let mut buff = StatSpecs::new();
        buff.insert(Stat::Power, StatValueSpec::Value(20.0));
        catalog.insert(Jutsu::new(
            "Eight Gates",
            3.0,
            vec![
                EffectSpec::Buff {
                    stats: buff,
                    duration: 2,
                },
                sure_hit("user.power"),
                EffectSpec::Heal { formula: f("5") },
                EffectSpec::status(known::FLINCH, 1),
            ],
        ));
        let mut user = fighter("a", 100.0, 25.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);

        let outcome = interp.execute_jutsu(&mut user, &mut target, &catalog, "Eight Gates", 1, &mut rng());
        assert_eq!(outcome.kind, ActionKind::Jutsu);
        // The buff counts from the next action on.
        assert_eq!(outcome.damage, 25.0);
        assert_eq!(outcome.heal, 5.0);
        assert_eq!(user.chakra, 7.0);
        assert_eq!(user.effective_stats().get(Stat::Power), 45.0);
        assert!(target.has_status(known::FLINCH));
        assert_eq!(outcome.special_effects.len(), 4);
    }

    #[test]
    fn test_flying_raijin_forces_miss_and_is_consumed() {
        let interp = EffectInterpreter::default();
        let mut catalog = JutsuCatalog::new();
        catalog.insert(Jutsu::new("Strike", 0.0, vec![sure_hit("50")]));
        let mut user = fighter("a", 100.0, 25.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);
        target.add_effect(ActiveEffect::status(StatusId::from_str(known::FLYING_RAIJIN), 3));

        let outcome = interp.execute_jutsu(&mut user, &mut target, &catalog, "Strike", 1, &mut rng());
        assert!(!outcome.hit);
        assert_eq!(outcome.damage, 0.0);
        assert!(!target.has_status(known::FLYING_RAIJIN));
        assert_eq!(outcome.description, "a missed with Strike!");

        let outcome = interp.execute_jutsu(&mut user, &mut target, &catalog, "Strike", 1, &mut rng());
        assert_eq!(outcome.damage, 50.0);
    }

    #[test]
    fn test_flying_raijin_also_stops_instant_kill() {
        let interp = EffectInterpreter::default();
        let mut catalog = JutsuCatalog::new();
        catalog.insert(Jutsu::new("Reaper", 0.0, vec![EffectSpec::InstantKill { chance: 1.0 }]));
        let mut user = fighter("a", 100.0, 25.0, 10.0);
        let mut target = fighter("b", 250.0, 25.0, 10.0);
        target.add_effect(ActiveEffect::status(StatusId::from_str(known::FLYING_RAIJIN), 1));

        let outcome = interp.execute_jutsu(&mut user, &mut target, &catalog, "Reaper", 1, &mut rng());
        assert_eq!(outcome.damage, 0.0);
        assert!(!outcome.special_effects.contains(&"INSTANT KILL!".to_string()));
        assert!(!target.has_status(known::FLYING_RAIJIN));
    }

    #[test]
    fn test_instant_kill_uses_effective_health() {
        let interp = EffectInterpreter::default();
        let mut catalog = JutsuCatalog::new();
        catalog.insert(Jutsu::new("Reaper", 0.0, vec![EffectSpec::InstantKill { chance: 1.0 }]));
        let mut user = fighter("a", 100.0, 25.0, 10.0);
        let mut target = fighter("b", 250.0, 25.0, 10.0);
        let outcome = interp.execute_jutsu(&mut user, &mut target, &catalog, "Reaper", 1, &mut rng());
        assert_eq!(outcome.damage, 250.0);
        assert!(outcome.special_effects.contains(&"INSTANT KILL!".to_string()));
    }

    #[test]
    fn test_bleed_default_share() {
        let interp = EffectInterpreter::default();
        let mut user = fighter("a", 100.0, 25.0, 10.0);
        let mut target = fighter("b", 150.0, 25.0, 10.0);
        let mut outcome = ActionOutcome::new(user.id.clone(), ActionKind::Jutsu, "");
        let spec = EffectSpec::Bleed {
            duration: 3,
            damage_per_turn: None,
            damage_per_turn_formula: None,
        };
        interp.apply_effect(&spec, &mut user, &mut target, &mut outcome, EffectSink::Immediate, &mut rng());
        assert_eq!(target.active_effects, vec![ActiveEffect::bleed(30.0, 3)]);
    }

    #[test]
    fn test_status_formulas_see_both_sides() {
        let interp = EffectInterpreter::default();
        let mut user = fighter("a", 100.0, 40.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);
        let mut outcome = ActionOutcome::new(user.id.clone(), ActionKind::Jutsu, "");
        let spec = EffectSpec::Status {
            status: StatusId::from_str("burn"),
            chance: 1.0,
            duration: 2,
            damage_per_turn: None,
            heal_per_turn: None,
            damage_per_turn_formula: Some(f("user.power * 0.25 + target.power * 0")),
            heal_per_turn_formula: None,
        };
        interp.apply_effect(&spec, &mut user, &mut target, &mut outcome, EffectSink::Immediate, &mut rng());
        match &target.active_effects[0] {
            ActiveEffect::Status {
                damage_per_turn, ..
            } => assert_eq!(*damage_per_turn, Some(10.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_chakra_gain_capped() {
        let interp = EffectInterpreter::default();
        let mut user = fighter("a", 100.0, 40.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);
        let mut outcome = ActionOutcome::new(user.id.clone(), ActionKind::Jutsu, "");
        let spec = EffectSpec::ChakraGain { formula: f("12") };
        interp.apply_effect(&spec, &mut user, &mut target, &mut outcome, EffectSink::Immediate, &mut rng());
        assert_eq!(user.chakra, 15.0);
        assert_eq!(outcome.chakra_gain, 5.0);
    }

    #[test]
    fn test_formula_error_reported() {
        let interp = EffectInterpreter::default();
        let mut user = fighter("a", 100.0, 40.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);
        let mut outcome = ActionOutcome::new(user.id.clone(), ActionKind::Jutsu, "");
        let spec = EffectSpec::Heal {
            formula: f("user.speed"),
        };
        interp.apply_effect(&spec, &mut user, &mut target, &mut outcome, EffectSink::Immediate, &mut rng());
        assert_eq!(outcome.heal, 0.0);
        assert_eq!(outcome.special_effects, vec!["Error applying heal effect".to_string()]);
    }

    #[test]
    fn test_tick_effects_statuses() {
        let interp = EffectInterpreter::default();
        let mut c = fighter("a", 200.0, 40.0, 10.0);
        c.add_effect(ActiveEffect::status(StatusId::from_str(known::POISON), 2));
        c.add_effect(ActiveEffect::Status {
            status: StatusId::from_str("regen"),
            duration: 1,
            damage_per_turn: None,
            heal_per_turn: Some(4.0),
        });
        let messages = interp.tick_effects(&mut c);
        // 200 * 0.05 = 10 poison; regen heals 4.
        assert_eq!(c.current_health, 194.0);
        assert_eq!(c.active_effects.len(), 1);
        assert!(messages.iter().any(|m| m.contains("status (regen) effect has worn off")));
    }

    #[test]
    fn test_rest_caps_chakra() {
        let interp = EffectInterpreter::default();
        let mut c = fighter("a", 200.0, 40.0, 10.0);
        c.chakra = 15.0;
        let outcome = interp.rest(&mut c);
        assert_eq!(outcome.kind, ActionKind::Rest);
        assert_eq!(c.chakra, 15.0);
        c.chakra = 3.0;
        interp.rest(&mut c);
        assert_eq!(c.chakra, 4.0);
    }

    #[test]
    fn test_round_based_first_cast_and_continuation() {
        let interp = EffectInterpreter::default();
        let catalog = JutsuCatalog::from_json_str(
            r#"{
                "Water Prison": {
                    "chakraCost": 5,
                    "roundBased": true,
                    "roundEffects": {
                        "1": {"description": "user traps target", "effects": [{"type": "status", "status": "drown", "duration": 1}]},
                        "2-3": {"description": "target struggles", "damage": {"formula": "20", "accuracyBonus": 10}}
                    }
                }
            }"#,
        )
        .unwrap();
        let mut user = fighter("Kisame", 100.0, 40.0, 10.0);
        let mut target = fighter("Guy", 100.0, 25.0, 10.0);
        let mut rng = rng();

        let outcome = interp.execute_jutsu(&mut user, &mut target, &catalog, "Water Prison", 1, &mut rng);
        assert_eq!(outcome.round_based_description.as_deref(), Some("Kisame traps Guy"));
        assert!(target.has_status(known::DROWN));

        let jutsu = catalog.get("Water Prison").unwrap();
        let summary = interp
            .continue_channel(&mut user, &mut target, jutsu, 2, &mut rng)
            .unwrap();
        assert_eq!(summary.damage, 20.0);
        assert_eq!(target.current_health, 80.0);
        assert_eq!(summary.description, "Guy struggles");
        assert!(interp
            .continue_channel(&mut user, &mut target, jutsu, 4, &mut rng)
            .is_none());
    }

    #[test]
    fn test_combo_fires_and_resets() {
        let interp = EffectInterpreter::default();
        let combo = Combo {
            name: "Basic Combo".into(),
            required_jutsus: vec!["Attack".into()],
            damage: 30.0,
            effects: vec![
                EffectSpec::FlatDamage { value: 5.0 },
                EffectSpec::status(known::STUN, 1),
            ],
        };
        let mut user = fighter("a", 100.0, 40.0, 10.0).with_combo(ComboProgress::new(combo));
        let mut target = fighter("b", 100.0, 25.0, 10.0);
        let mut rng = rng();

        assert!(interp.apply_combo(&mut user, &mut target, &mut rng).is_none());
        user.combo.as_mut().unwrap().record("Attack");
        let report = interp.apply_combo(&mut user, &mut target, &mut rng).unwrap();
        assert_eq!(report.damage, 35.0);
        assert_eq!(target.current_health, 65.0);
        assert!(target.has_status(known::STUN));
        assert_eq!(user.combo.as_ref().unwrap().used_count(), 0);
    }

    struct Shadow;

    impl JutsuScript for Shadow {
        fn execute(&self, ctx: ScriptContext<'_>) -> ActionOutcome {
            ctx.target
                .add_effect(ActiveEffect::status(StatusId::from_str(known::STUN), 1));
            let mut outcome = ActionOutcome::new(ctx.user.id.clone(), ActionKind::Jutsu, "caught");
            outcome.hit = ctx.rng.gen_bool(1.0);
            outcome
        }
    }

    #[test]
    fn test_script_takes_precedence() {
        let interp = EffectInterpreter::default();
        let mut catalog = JutsuCatalog::new();
        catalog.insert(Jutsu::new("Shadow Possession", 0.0, vec![sure_hit("99")]));
        catalog.register_script("Shadow Possession", Arc::new(Shadow));
        let mut user = fighter("a", 100.0, 40.0, 10.0);
        let mut target = fighter("b", 100.0, 25.0, 10.0);
        let outcome =
            interp.execute_jutsu(&mut user, &mut target, &catalog, "Shadow Possession", 1, &mut rng());
        assert_eq!(outcome.description, "caught");
        assert_eq!(outcome.damage, 0.0);
        assert_eq!(outcome.jutsu_used.as_deref(), Some("Shadow Possession"));
        assert!(target.has_status(known::STUN));
    }

    #[test]
    fn test_substitute_names() {
        assert_eq!(
            substitute_names("User strikes target; users stay", "Kakashi", "Obito"),
            "Kakashi strikes Obito; users stay"
        );
    }
}
