//! Duel Example
//!
//! A player with the Uzumaki bloodline fights a data-defined NPC:
//! - Jutsu and combos loaded from JSON
//! - An NPC template scaled to the player
//! - The player's moves scripted, the NPC's chosen by its AI
//! - Every round printed as it comes back from the engine
//! - ELO settled at the end
//!
//! Run with `RUST_LOG=debug` to see the engine's own logging.

use rand::rngs::StdRng;
use rand::SeedableRng;
use shinobi_battle::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const JUTSUS: &str = r#"{
    "Attack": {
        "chakraCost": 0,
        "effects": [{"type": "damage", "formula": "max(5, user.power - target.defense * 0.5)"}]
    },
    "Shadow Clone Jutsu": {
        "chakraCost": 3,
        "effects": [{"type": "buff", "stats": {"power": "user.power * 0.3", "dodge": 10}, "duration": 3}]
    },
    "Rasengan": {
        "chakraCost": 5,
        "effects": [
            {"type": "damage", "formula": "user.power * 2 - target.defense", "accuracyBonus": 5},
            {"type": "status", "status": "flinch", "chance": 0.3}
        ]
    },
    "Hidden Mist": {
        "chakraCost": 2,
        "effects": [{"type": "status", "status": "mist", "duration": 2}]
    },
    "Water Prison": {
        "chakraCost": 6,
        "roundBased": true,
        "roundEffects": {
            "1": {"description": "user traps target in a sphere of water", "status": "drown", "duration": 1},
            "2-3": {"description": "target struggles for air", "damage": {"formula": "target.health * 0.1"}}
        }
    }
}"#;

const COMBOS: &str = r#"{
    "Ninja Way": {
        "requiredJutsus": ["Shadow Clone Jutsu", "Rasengan"],
        "damage": 60,
        "effects": [{"type": "heal", "formula": "user.health * 0.1"}]
    }
}"#;

const ZABUZA: &str = r#"{
    "name": "Zabuza",
    "baseHealth": 1.2,
    "basePower": 0.9,
    "baseDefense": 1.1,
    "accuracy": 85,
    "dodge": 10,
    "jutsu": ["Attack", "Hidden Mist", "Water Prison"]
}"#;

fn print_round(report: &RoundReport, names: [&str; 2]) {
    println!("--- Round {} ---", report.round);
    for line in &report.ticks {
        println!("  * {}", line);
    }
    for trigger in &report.bloodlines {
        println!("  [{}] {}", trigger.ability, trigger.description);
    }
    for summary in &report.round_based {
        println!("  ({} round {}) {}", summary.jutsu, summary.round, summary.description);
    }
    for action in &report.actions {
        println!("  {}", action.description);
        for effect in &action.special_effects {
            println!("      {}", effect);
        }
    }
    for combo in &report.combos {
        println!("  COMBO {}: {} damage", combo.combo, combo.damage);
    }
    if let Some(url) = &report.background {
        println!("  background -> {}", url);
    }
    println!(
        "  {}: {:.0} HP / {:.0} chakra | {}: {:.0} HP / {:.0} chakra",
        names[0], report.health[0], report.chakra[0], names[1], report.health[1], report.chakra[1]
    );
}

fn main() -> Result<(), BattleError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BattleConfig::default();
    let catalog = Arc::new(JutsuCatalog::from_json_str(JUTSUS)?);
    let combos = ComboCatalog::from_json_str(COMBOS)?;
    let template: NpcTemplate = serde_json::from_str(ZABUZA)?;

    let mut naruto = Combatant::player(
        "1001",
        "Naruto",
        StatBlock::new(300.0, 60.0, 40.0),
        vec![
            "Attack".into(),
            "Shadow Clone Jutsu".into(),
            "Rasengan".into(),
        ],
        &config,
    )
    .with_level(12)
    .with_bloodline(Bloodline::Uzumaki);
    if let Some(combo) = combos.get("Ninja Way") {
        naruto = naruto.with_combo(ComboProgress::new(combo.clone()));
    }
    let zabuza = template.spawn(&naruto, &config);
    let names = [naruto.name.clone(), zabuza.name.clone()];

    let mut battle = Battle::new(BattleKind::Mission, naruto, zabuza, catalog, config);
    let mut player = ScriptedMoves::new(
        [Move::Slot(2), Move::Slot(3), Move::Rest]
            .into_iter()
            .cycle()
            .take(100),
    );
    let mut npc = NpcMoves::new(StdRng::seed_from_u64(7));
    let mut rng = StdRng::seed_from_u64(2024);

    while !battle.is_finished() {
        let report = battle.step(&mut player, &mut npc, &mut rng)?;
        print_round(&report, [names[0].as_str(), names[1].as_str()]);
    }

    let report = battle.report();
    println!();
    println!("Battle over after {} rounds: {:?}", report.rounds, report.result);
    for tally in &report.damage {
        println!("  {} dealt {:.0}, took {:.0}", tally.id, tally.dealt, tally.taken);
        if let Some((jutsu, uses)) = report.usage.most_used(&tally.id) {
            println!("    favourite jutsu: {} ({} uses)", jutsu, uses);
        }
    }

    let ranks = RankConfig::default();
    if let Some(result) = &report.result {
        let (winner, loser) = match result.winner() {
            Some(id) if id.is_npc() => (None, Some(1040)),
            Some(_) => (Some(1040), None),
            None => return Ok(()),
        };
        let update = ranks.apply_result(winner, loser);
        println!("ELO: {:?}", update);
    }

    Ok(())
}
