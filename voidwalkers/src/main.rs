//! Voidwalkers, a turn-based text adventure.
//!
//! A line-oriented front end over `voidwalkers-core`:
//!
//! ```bash
//! cargo run -p voidwalkers -- --name Ash --archetype rogue --slot ash
//! ```

mod play;

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use voidwalkers_core::{Archetype, EngineConfig, FileSaveStore, GameSession, Oracles, SaveSlot, SessionConfig};

/// Command-line options.
#[derive(Debug)]
struct Args {
    name: String,
    archetype: Archetype,
    slot: SaveSlot,
    saves_dir: PathBuf,
    offline: bool,
    new_game: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            name: "Wanderer".to_string(),
            archetype: Archetype::Warrior,
            slot: SaveSlot::autosave(),
            saves_dir: PathBuf::from("saves"),
            offline: false,
            new_game: false,
        }
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--name" => parsed.name = value("--name")?,
            "--archetype" => {
                let name = value("--archetype")?;
                parsed.archetype =
                    Archetype::from_name(&name).ok_or_else(|| format!("unknown archetype: {name}"))?;
            }
            "--slot" => parsed.slot = value("--slot")?.parse::<SaveSlot>().map_err(|e| e.to_string())?,
            "--saves" => parsed.saves_dir = PathBuf::from(value("--saves")?),
            "--offline" => parsed.offline = true,
            "--new" => parsed.new_game = true,
            other => return Err(format!("unknown option: {other}")),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run with --help for usage.");
            std::process::exit(2);
        }
    };

    let config = SessionConfig::new(args.slot.clone())
        .with_character_name(&args.name)
        .with_archetype(args.archetype)
        .with_engine_config(EngineConfig::from_env()?);
    let oracles = if args.offline {
        Oracles::offline()
    } else {
        Oracles::from_env()
    };
    let saves = std::sync::Arc::new(FileSaveStore::new(args.saves_dir.clone()));

    let session = if args.new_game {
        GameSession::create(config.clone(), &oracles, saves).await?
    } else {
        GameSession::create_or_load(config.clone(), &oracles, saves).await?
    };

    play::run(session, config, oracles).await?;
    Ok(())
}

fn print_help() {
    println!("Voidwalkers - a turn-based adventure at the edge of the Void");
    println!();
    println!("USAGE:");
    println!("  voidwalkers [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help              Show this help message");
    println!("  --name <NAME>           Character name for a new game (default: Wanderer)");
    println!("  --archetype <NAME>      warrior, mage, rogue, cleric, ranger or paladin");
    println!("  --slot <SLOT>           Save slot to load or create: letters, digits, - and _ (default: autosave)");
    println!("  --saves <DIR>           Directory holding save files (default: saves)");
    println!("  --new                   Start a new game even if the slot has a save");
    println!("  --offline               Play without oracles, using built-in rules only");
    println!();
    println!("ENVIRONMENT:");
    println!("  ANTHROPIC_API_KEY       Key used by both oracles unless overridden");
    println!("  RULES_ORACLE_*          URL, MODEL and API_KEY for the rules oracle");
    println!("  NARRATIVE_ORACLE_*      URL, MODEL and API_KEY for the narrator");
    println!("  VOIDWALKERS_*           Engine settings, e.g. VOIDWALKERS_SEED=42");
    println!("  RUST_LOG                Log filter (default: warn)");
}
