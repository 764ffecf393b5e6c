//! Jutsu and combo definitions, and the catalogs that hold them.
//!
//! Catalogs are JSON objects keyed by name, using the field names of the
//! game data (`chakraCost`, `roundBased`, `roundEffects`, `requiredJutsus`).
//! Every formula is compiled while loading, so a catalog that loads is a
//! catalog whose formulas parse.

use crate::effect::{EffectSpec, StatSpecs};
use crate::error::BattleError;
use crate::formula::Formula;
use crate::interpreter::JutsuScript;
use crate::status::StatusId;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A round-effect key: a single round (`"3"`) or an inclusive range (`"8-16"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundKey {
    Single(u32),
    Range(u32, u32),
}

impl RoundKey {
    /// Parse `"N"` or `"A-B"`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::RoundKey;
    ///
    /// let key = RoundKey::parse("8-16").unwrap();
    /// assert!(key.contains(8));
    /// assert!(key.contains(16));
    /// assert!(!key.contains(17));
    /// assert_eq!(key.last_round(), 16);
    /// assert!(RoundKey::parse("soon").is_err());
    /// ```
    pub fn parse(key: &str) -> Result<Self, BattleError> {
        let invalid = || BattleError::InvalidRoundKey(key.to_string());
        match key.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                if start > end {
                    return Err(invalid());
                }
                Ok(RoundKey::Range(start, end))
            }
            None => key
                .trim()
                .parse()
                .map(RoundKey::Single)
                .map_err(|_| invalid()),
        }
    }

    /// First round covered.
    pub fn first_round(&self) -> u32 {
        match *self {
            RoundKey::Single(n) | RoundKey::Range(n, _) => n,
        }
    }

    /// Last round covered.
    pub fn last_round(&self) -> u32 {
        match *self {
            RoundKey::Single(n) | RoundKey::Range(_, n) => n,
        }
    }

    /// Whether `round` falls under this key.
    pub fn contains(&self, round: u32) -> bool {
        (self.first_round()..=self.last_round()).contains(&round)
    }
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundKey::Single(n) => write!(f, "{}", n),
            RoundKey::Range(a, b) => write!(f, "{}-{}", a, b),
        }
    }
}

/// Legacy `damage` key of a round effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDamage {
    pub formula: Formula,
    #[serde(rename = "accuracyBonus", default)]
    pub accuracy_bonus: f64,
}

/// Legacy `heal` and `chakra_gain` keys of a round effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyFormula {
    pub formula: Formula,
}

/// Legacy `buff` and `debuff` keys of a round effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyStats {
    pub stats: StatSpecs,
}

/// Legacy `bleed` key of a round effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyBleed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(rename = "damagePerTurn", default, skip_serializing_if = "Option::is_none")]
    pub damage_per_turn: Option<f64>,
    #[serde(
        rename = "damagePerTurnFormula",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub damage_per_turn_formula: Option<Formula>,
}

/// What a round-based jutsu does on one of its rounds.
///
/// Older data puts effects under fixed keys (`damage`, `heal`, `status`, ...)
/// instead of the `effects` list; both forms are accepted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoundEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<EffectSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<LegacyDamage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heal: Option<LegacyFormula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debuff: Option<LegacyStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buff: Option<LegacyStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bleed: Option<LegacyBleed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chakra_gain: Option<LegacyFormula>,
    /// Duration for the legacy `status`, `debuff` and `buff` keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

impl RoundEffect {
    /// Explicit effects followed by the legacy keys, normalized.
    ///
    /// Legacy keys come in the order damage, heal, status, debuff, buff,
    /// bleed, chakra_gain.
    pub fn effects(&self) -> Vec<EffectSpec> {
        let duration = self.duration.unwrap_or(1);
        let mut out = self.effects.clone();

        if let Some(damage) = &self.damage {
            out.push(EffectSpec::Damage {
                formula: damage.formula.clone(),
                accuracy_bonus: damage.accuracy_bonus,
            });
        }
        if let Some(heal) = &self.heal {
            out.push(EffectSpec::Heal {
                formula: heal.formula.clone(),
            });
        }
        if let Some(status) = &self.status {
            out.push(EffectSpec::status(status.clone(), duration));
        }
        if let Some(debuff) = &self.debuff {
            out.push(EffectSpec::Debuff {
                stats: debuff.stats.clone(),
                duration,
            });
        }
        if let Some(buff) = &self.buff {
            out.push(EffectSpec::Buff {
                stats: buff.stats.clone(),
                duration,
            });
        }
        if let Some(bleed) = &self.bleed {
            out.push(EffectSpec::Bleed {
                duration: bleed.duration.unwrap_or(1),
                damage_per_turn: bleed.damage_per_turn,
                damage_per_turn_formula: bleed.damage_per_turn_formula.clone(),
            });
        }
        if let Some(gain) = &self.chakra_gain {
            out.push(EffectSpec::ChakraGain {
                formula: gain.formula.clone(),
            });
        }
        out
    }
}

/// Round effects of a jutsu, sorted by first round.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoundEffects(Vec<(RoundKey, RoundEffect)>);

impl RoundEffects {
    /// Build from keyed entries; order is normalized by first round.
    pub fn new(mut entries: Vec<(RoundKey, RoundEffect)>) -> Self {
        entries.sort_by_key(|(key, _)| (key.first_round(), key.last_round()));
        Self(entries)
    }

    /// Iterate over `(key, effect)` in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &(RoundKey, RoundEffect)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for RoundEffects {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let map: BTreeMap<String, &RoundEffect> = self
            .0
            .iter()
            .map(|(key, effect)| (key.to_string(), effect))
            .collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RoundEffects {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, RoundEffect>::deserialize(deserializer)?;
        let entries = raw
            .into_iter()
            .map(|(key, effect)| {
                RoundKey::parse(&key)
                    .map(|k| (k, effect))
                    .map_err(D::Error::custom)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }
}

/// Background shown once a channelled jutsu reaches `round`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomBackground {
    pub round: u32,
    pub url: String,
}

/// A jutsu definition.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::JutsuCatalog;
///
/// let catalog = JutsuCatalog::from_json_str(r#"{
///     "Rasengan": {
///         "chakraCost": 4,
///         "effects": [{"type": "damage", "formula": "user.power * 1.5"}]
///     }
/// }"#).unwrap();
///
/// let rasengan = catalog.get("Rasengan").unwrap();
/// assert_eq!(rasengan.name, "Rasengan");
/// assert_eq!(rasengan.chakra_cost, 4.0);
/// assert!(!rasengan.round_based);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jutsu {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub chakra_cost: f64,
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
    #[serde(default)]
    pub round_based: bool,
    #[serde(default, skip_serializing_if = "RoundEffects::is_empty")]
    pub round_effects: RoundEffects,
    #[serde(
        rename = "custombackground",
        alias = "customBackground",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_background: Option<CustomBackground>,
}

impl Jutsu {
    /// A plain jutsu with the given cost and immediate effects.
    pub fn new(name: impl Into<String>, chakra_cost: f64, effects: Vec<EffectSpec>) -> Self {
        Self {
            name: name.into(),
            description: None,
            chakra_cost,
            effects,
            round_based: false,
            round_effects: RoundEffects::default(),
            custom_background: None,
        }
    }

    /// The effect for `round`: the first key containing it, in ascending start order.
    pub fn round_effect(&self, round: u32) -> Option<&RoundEffect> {
        self.round_effects
            .iter()
            .find(|(key, _)| key.contains(round))
            .map(|(_, effect)| effect)
    }

    /// Last round any key covers, or 0 without round effects.
    pub fn max_round(&self) -> u32 {
        self.round_effects
            .iter()
            .map(|(key, _)| key.last_round())
            .max()
            .unwrap_or(0)
    }

    /// Background URL once the jutsu has been channelled for `round` rounds.
    pub fn background_at(&self, round: u32) -> Option<&str> {
        self.custom_background
            .as_ref()
            .filter(|bg| round >= bg.round)
            .map(|bg| bg.url.as_str())
    }
}

/// Every jutsu the engine knows, plus scripted overrides.
#[derive(Clone, Default)]
pub struct JutsuCatalog {
    jutsus: HashMap<String, Jutsu>,
    scripts: HashMap<String, Arc<dyn JutsuScript>>,
}

impl JutsuCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from a JSON object keyed by jutsu name.
    ///
    /// A missing `name` is filled in from the key.
    pub fn from_json_str(json: &str) -> Result<Self, BattleError> {
        let raw: BTreeMap<String, Jutsu> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for (key, mut jutsu) in raw {
            if jutsu.name.is_empty() {
                jutsu.name = key.clone();
            }
            catalog.jutsus.insert(key, jutsu);
        }
        tracing::debug!(count = catalog.len(), "loaded jutsu catalog");
        Ok(catalog)
    }

    /// Read and parse a catalog file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BattleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Add or replace a jutsu under its own name.
    pub fn insert(&mut self, jutsu: Jutsu) {
        self.jutsus.insert(jutsu.name.clone(), jutsu);
    }

    /// Register a scripted jutsu; it takes precedence over data effects.
    pub fn register_script(&mut self, name: impl Into<String>, script: Arc<dyn JutsuScript>) {
        self.scripts.insert(name.into(), script);
    }

    pub fn get(&self, name: &str) -> Option<&Jutsu> {
        self.jutsus.get(name)
    }

    /// The script registered for `name`, if any.
    pub fn script(&self, name: &str) -> Option<&Arc<dyn JutsuScript>> {
        self.scripts.get(name)
    }

    /// Whether `name` is a data jutsu or a script.
    pub fn contains(&self, name: &str) -> bool {
        self.jutsus.contains_key(name) || self.scripts.contains_key(name)
    }

    /// Sorted jutsu names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jutsus.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.jutsus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jutsus.is_empty()
    }
}

impl fmt::Debug for JutsuCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scripts: Vec<&String> = self.scripts.keys().collect();
        scripts.sort();
        f.debug_struct("JutsuCatalog")
            .field("jutsus", &self.names())
            .field("scripts", &scripts)
            .finish()
    }
}

fn combo_effects<'de, D>(deserializer: D) -> Result<Vec<EffectSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|mut value| {
            let flat = value.get("type").and_then(|t| t.as_str()) == Some("damage")
                && value.get("formula").is_none()
                && value.get("value").is_some();
            if flat {
                value["type"] = serde_json::Value::from("flatDamage");
            }
            serde_json::from_value(value).map_err(D::Error::custom)
        })
        .collect()
}

/// A combo: using every required jutsu triggers a bonus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combo {
    #[serde(default)]
    pub name: String,
    pub required_jutsus: Vec<String>,
    /// Flat damage dealt on completion.
    #[serde(default)]
    pub damage: f64,
    /// Extra effects on completion (flat damage, heal, status, debuff).
    #[serde(default, deserialize_with = "combo_effects")]
    pub effects: Vec<EffectSpec>,
}

/// Every combo the engine knows.
#[derive(Debug, Clone, Default)]
pub struct ComboCatalog {
    combos: HashMap<String, Combo>,
}

impl ComboCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from a JSON object keyed by combo name.
    pub fn from_json_str(json: &str) -> Result<Self, BattleError> {
        let raw: BTreeMap<String, Combo> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for (key, mut combo) in raw {
            if combo.name.is_empty() {
                combo.name = key.clone();
            }
            catalog.combos.insert(key, combo);
        }
        Ok(catalog)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BattleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn insert(&mut self, combo: Combo) {
        self.combos.insert(combo.name.clone(), combo);
    }

    pub fn get(&self, name: &str) -> Option<&Combo> {
        self.combos.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.combos.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }
}

/// Progress toward completing a combo.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{Combo, ComboProgress};
///
/// let combo = Combo {
///     name: "Basic Combo".into(),
///     required_jutsus: vec!["Attack".into(), "Transformation Jutsu".into()],
///     damage: 100.0,
///     effects: vec![],
/// };
/// let mut progress = ComboProgress::new(combo);
///
/// assert!(!progress.record("Rasengan"));
/// assert!(progress.record("Attack"));
/// assert!(!progress.is_complete());
/// progress.record("Transformation Jutsu");
/// assert!(progress.is_complete());
/// progress.reset();
/// assert_eq!(progress.used_count(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboProgress {
    combo: Combo,
    used: BTreeSet<String>,
}

impl ComboProgress {
    pub fn new(combo: Combo) -> Self {
        Self {
            combo,
            used: BTreeSet::new(),
        }
    }

    pub fn combo(&self) -> &Combo {
        &self.combo
    }

    /// Record a jutsu use. Returns `true` if it counted toward the combo.
    pub fn record(&mut self, jutsu: &str) -> bool {
        if self.combo.required_jutsus.iter().any(|r| r == jutsu) {
            self.used.insert(jutsu.to_string());
            true
        } else {
            false
        }
    }

    /// Whether every required jutsu has been used. A combo with no
    /// requirements never completes.
    pub fn is_complete(&self) -> bool {
        !self.combo.required_jutsus.is_empty()
            && self
                .combo
                .required_jutsus
                .iter()
                .all(|r| self.used.contains(r))
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Required jutsus not used yet, in declaration order.
    pub fn remaining(&self) -> Vec<&str> {
        self.combo
            .required_jutsus
            .iter()
            .filter(|r| !self.used.contains(*r))
            .map(String::as_str)
            .collect()
    }

    pub fn reset(&mut self) {
        self.used.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHIDORI_STREAM: &str = r#"{
        "Chidori Stream": {
            "chakraCost": 6,
            "roundBased": true,
            "roundEffects": {
                "2-3": {"description": "Lightning spreads", "damage": {"formula": "user.power"}},
                "1": {"description": "Sparks", "effects": [{"type": "damage", "formula": "10"}]},
                "4": {"status": "stun", "duration": 2, "heal": {"formula": "5"}}
            },
            "custombackground": {"round": 2, "url": "https://example.invalid/bg.png"}
        }
    }"#;

    #[test]
    fn test_round_key_parse() {
        assert_eq!(RoundKey::parse("3").unwrap(), RoundKey::Single(3));
        assert_eq!(RoundKey::parse("8-16").unwrap(), RoundKey::Range(8, 16));
        assert!(matches!(
            RoundKey::parse("5-2"),
            Err(BattleError::InvalidRoundKey(_))
        ));
        assert!(RoundKey::parse("a-b").is_err());
        assert_eq!(RoundKey::Range(2, 4).to_string(), "2-4");
    }

    #[test]
    fn test_round_based_lookup() {
        let catalog = JutsuCatalog::from_json_str(CHIDORI_STREAM).unwrap();
        let jutsu = catalog.get("Chidori Stream").unwrap();

        assert!(jutsu.round_based);
        assert_eq!(jutsu.max_round(), 4);
        assert_eq!(
            jutsu.round_effect(1).and_then(|e| e.description.as_deref()),
            Some("Sparks")
        );
        assert_eq!(
            jutsu.round_effect(3).and_then(|e| e.description.as_deref()),
            Some("Lightning spreads")
        );
        assert!(jutsu.round_effect(5).is_none());
    }

    #[test]
    fn test_legacy_keys_normalized_in_order() {
        let catalog = JutsuCatalog::from_json_str(CHIDORI_STREAM).unwrap();
        let jutsu = catalog.get("Chidori Stream").unwrap();

        let round_two = jutsu.round_effect(2).unwrap().effects();
        assert_eq!(round_two.len(), 1);
        assert_eq!(round_two[0].type_name(), "damage");

        let round_four = jutsu.round_effect(4).unwrap().effects();
        let names: Vec<&str> = round_four.iter().map(|e| e.type_name()).collect();
        assert_eq!(names, vec!["heal", "status"]);
        assert!(matches!(round_four[1], EffectSpec::Status { duration: 2, .. }));
    }

    #[test]
    fn test_background() {
        let catalog = JutsuCatalog::from_json_str(CHIDORI_STREAM).unwrap();
        let jutsu = catalog.get("Chidori Stream").unwrap();
        assert_eq!(jutsu.background_at(1), None);
        assert_eq!(jutsu.background_at(2), Some("https://example.invalid/bg.png"));
    }

    #[test]
    fn test_invalid_round_key_fails_to_load() {
        let result = JutsuCatalog::from_json_str(
            r#"{"X": {"roundBased": true, "roundEffects": {"first": {}}}}"#,
        );
        assert!(matches!(result, Err(BattleError::Json(_))));
    }

    #[test]
    fn test_bad_formula_fails_to_load() {
        let result = JutsuCatalog::from_json_str(
            r#"{"X": {"effects": [{"type": "damage", "formula": "max(1,"}]}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_names_sorted() {
        let mut catalog = JutsuCatalog::new();
        catalog.insert(Jutsu::new("Substitution Jutsu", 0.0, vec![]));
        catalog.insert(Jutsu::new("Attack", 0.0, vec![]));
        assert_eq!(catalog.names(), vec!["Attack", "Substitution Jutsu"]);
        assert!(catalog.contains("Attack"));
        assert!(!catalog.contains("Rasengan"));
    }

    #[test]
    fn test_combo_flat_damage_mapping() {
        let combos = ComboCatalog::from_json_str(
            r#"{
                "Basic Combo": {
                    "requiredJutsus": ["Attack", "Transformation Jutsu"],
                    "damage": 100,
                    "effects": [
                        {"type": "damage", "value": 25},
                        {"type": "status", "status": "stun", "duration": 1}
                    ]
                }
            }"#,
        )
        .unwrap();
        let combo = combos.get("Basic Combo").unwrap();
        assert_eq!(combo.name, "Basic Combo");
        assert_eq!(combo.effects[0], EffectSpec::FlatDamage { value: 25.0 });
        assert_eq!(combo.effects[1].type_name(), "status");
    }

    #[test]
    fn test_empty_combo_never_completes() {
        let progress = ComboProgress::new(Combo {
            name: "Nothing".into(),
            required_jutsus: vec![],
            damage: 10.0,
            effects: vec![],
        });
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_combo_remaining() {
        let mut progress = ComboProgress::new(Combo {
            name: "C".into(),
            required_jutsus: vec!["A".into(), "B".into()],
            damage: 0.0,
            effects: vec![],
        });
        progress.record("B");
        assert_eq!(progress.remaining(), vec!["A"]);
    }
}
