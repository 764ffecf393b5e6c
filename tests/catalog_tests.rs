use rand::rngs::StdRng;
use rand::SeedableRng;
use shinobi_battle::*;
use std::io::Write;
use std::sync::Arc;

/// Formulas read like the data files write them.
#[test]
fn test_formula_grammar() {
    let mut ctx = FormulaContext::new();
    ctx.set("user.power", 40.0);
    ctx.set("target.defense", 15.0);
    ctx.set_flag("hasHiddenMist", true);

    let cases = [
        ("max(5, user.power * 0.5 - target.defense * 0.2)", 17.0),
        ("hasHiddenMist ? 0 : user.power", 0.0),
        ("not hasHiddenMist or user.power > 30", 1.0),
        ("2 ^ 3 ^ 2", 512.0),
        ("-2 ^ 2", -4.0),
        ("floor(user.power / 3) % 4", 1.0),
        ("min(pow(2, 4), sqrt(81), abs(-20))", 9.0),
        ("user.power >= 40 && target.defense != 15", 0.0),
        (".5 * round(2.5)", 1.5),
    ];
    for (src, expected) in cases {
        let value = Formula::compile(src).unwrap().evaluate(&ctx).unwrap();
        assert_eq!(value, expected, "{}", src);
    }
}

/// Bad formulas are rejected when compiled or evaluated, never by panicking.
#[test]
fn test_formula_errors() {
    assert!(matches!(
        Formula::compile("user.power $ 2"),
        Err(FormulaError::UnexpectedCharacter { ch: '$', .. })
    ));
    assert!(matches!(
        Formula::compile("speed(3)"),
        Err(FormulaError::UnknownFunction(_))
    ));
    assert!(matches!(
        Formula::compile("pow(1)"),
        Err(FormulaError::Arity { .. })
    ));
    assert_eq!(Formula::compile("   "), Err(FormulaError::Empty));

    let ctx = FormulaContext::new();
    assert_eq!(
        Formula::compile("1 / 0").unwrap().evaluate(&ctx),
        Err(FormulaError::NonFinite)
    );
    assert_eq!(
        Formula::compile("user.chakra").unwrap().evaluate(&ctx),
        Err(FormulaError::UnknownVariable("user.chakra".to_string()))
    );
}

/// A broken formula anywhere in a catalog fails the whole load.
#[test]
fn test_catalog_rejects_bad_formula() {
    let err = JutsuCatalog::from_json_str(
        r#"{"Broken": {"chakraCost": 1, "effects": [{"type": "heal", "formula": "user.health *"}]}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, BattleError::Json(_)));
}

/// Legacy round keys and explicit effects load into the same shape.
#[test]
fn test_legacy_round_effects() {
    let catalog = JutsuCatalog::from_json_str(
        r#"{
            "Sand Coffin": {
                "chakraCost": 4,
                "roundBased": true,
                "roundEffects": {
                    "3": {"effects": [{"type": "instantKill", "chance": 0.1}]},
                    "1-2": {
                        "damage": {"formula": "user.power"},
                        "debuff": {"stats": {"dodge": 5}},
                        "bleed": {"duration": 2},
                        "duration": 2
                    }
                }
            }
        }"#,
    )
    .unwrap();

    let jutsu = catalog.get("Sand Coffin").unwrap();
    assert_eq!(jutsu.max_round(), 3);
    let types: Vec<&str> = jutsu
        .round_effect(2)
        .unwrap()
        .effects()
        .iter()
        .map(EffectSpec::type_name)
        .collect();
    assert_eq!(types, vec!["damage", "debuff", "bleed"]);
    assert_eq!(
        jutsu.round_effect(3).unwrap().effects()[0].type_name(),
        "instantKill"
    );
    assert!(jutsu.round_effect(4).is_none());
}

#[test]
fn test_invalid_round_key() {
    let err = JutsuCatalog::from_json_str(
        r#"{"X": {"roundBased": true, "roundEffects": {"5-2": {}}}}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("5-2"));
}

/// Catalogs load from files too.
#[test]
fn test_catalog_from_file() {
    let dir = std::env::temp_dir().join(format!("shinobi-battle-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("jutsus.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(br#"{"Attack": {"chakraCost": 0, "effects": []}}"#)
        .unwrap();
    drop(file);

    let catalog = JutsuCatalog::from_json_file(&path).unwrap();
    assert!(catalog.contains("Attack"));
    assert_eq!(catalog.len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
    assert!(matches!(
        JutsuCatalog::from_json_file(&path),
        Err(BattleError::Io(_))
    ));
}

/// Combo catalogs accept the short `{"type": "damage", "value": N}` form.
#[test]
fn test_combo_catalog() {
    let combos = ComboCatalog::from_json_str(
        r#"{
            "Lion Combo": {
                "requiredJutsus": ["Leaf Hurricane", "Front Lotus"],
                "damage": 40,
                "effects": [
                    {"type": "damage", "value": 10},
                    {"type": "heal", "formula": "user.health * 0.1"},
                    {"type": "debuff", "stats": {"defense": "target.defense * 0.5"}, "duration": 2}
                ]
            }
        }"#,
    )
    .unwrap();

    let combo = combos.get("Lion Combo").unwrap();
    assert_eq!(combo.name, "Lion Combo");
    assert_eq!(combo.effects[0], EffectSpec::FlatDamage { value: 10.0 });

    let mut progress = ComboProgress::new(combo.clone());
    assert!(!progress.record("Attack"));
    assert!(progress.record("Front Lotus"));
    assert_eq!(progress.remaining(), vec!["Leaf Hurricane"]);
    assert!(!progress.is_complete());
    progress.record("Leaf Hurricane");
    assert!(progress.is_complete());
}

struct Substitution;

impl JutsuScript for Substitution {
    fn execute(&self, ctx: ScriptContext<'_>) -> ActionOutcome {
        let healed = ctx.user.heal(ctx.user.max_health);
        ctx.user.add_effect(ActiveEffect::status(
            StatusId::from_str("flying_raijin"),
            1,
        ));
        let mut outcome = ActionOutcome::new(
            ctx.user.id.clone(),
            ActionKind::Jutsu,
            format!("{} swapped with a log", ctx.user.name),
        );
        outcome.hit = true;
        outcome.special_effects.push(format!("Healed {} HP", healed));
        outcome
    }
}

/// Scripted jutsu run through the same battle loop as data jutsu.
#[test]
fn test_scripted_jutsu_in_battle() {
    let mut catalog = JutsuCatalog::from_json_str(
        r#"{"Attack": {"chakraCost": 0, "effects": [{"type": "damage", "formula": "30", "accuracyBonus": 10}]}}"#,
    )
    .unwrap();
    catalog.register_script("Substitution", Arc::new(Substitution));

    let config = BattleConfig::default();
    let kakashi = Combatant::player(
        "1",
        "Kakashi",
        StatBlock::new(100.0, 10.0, 10.0),
        vec!["Substitution".into(), "Attack".into()],
        &config,
    );
    let zabuza = Combatant::player(
        "2",
        "Zabuza",
        StatBlock::new(100.0, 10.0, 10.0),
        vec!["Attack".into()],
        &config,
    );
    let mut battle = Battle::new(BattleKind::Friendly, kakashi, zabuza, Arc::new(catalog), config);
    let mut p1 = ScriptedMoves::new(vec![Move::Slot(1), Move::Rest]);
    let mut p2 = ScriptedMoves::new(vec![Move::Slot(1), Move::Slot(1)]);
    let mut rng = StdRng::seed_from_u64(10);

    let first = battle.step(&mut p1, &mut p2, &mut rng).unwrap();
    assert_eq!(first.actions[0].description, "Kakashi swapped with a log");
    // Zabuza's attack met the substitution.
    assert!(!first.actions[1].hit);
    assert_eq!(first.health[0], 100.0);

    let second = battle.step(&mut p1, &mut p2, &mut rng).unwrap();
    assert!(second.actions[1].hit);
    assert_eq!(second.health[0], 70.0);
}

/// Config files change only what they list.
#[test]
fn test_configs_from_json() {
    let battle = BattleConfig::from_json_str(r#"{"max_rounds": 10, "bleed_percent": 0.1}"#).unwrap();
    assert_eq!(battle.max_rounds, 10);
    assert_eq!(battle.max_chakra, 15.0);

    let rank = RankConfig::from_json_str(r#"{"ranks": ["Academy", "Genin"]}"#).unwrap();
    assert_eq!(rank.tier(600).rank, "Genin");
    assert_eq!(rank.tier(5000).rank, "Genin");
}
