//! The interactive loop.
//!
//! Line-oriented protocol:
//! - Lines starting with `#` are commands (quit, status, quests, saves, new, help)
//! - Every other line is a player action
//! - `[TAG]` prefixed lines are game state, everything else is narration

use std::io::{self, BufRead, Write};
use voidwalkers_core::world::QuestStatus;
use voidwalkers_core::{ActionTag, GameSession, Oracles, Response, SessionConfig, SessionError};

pub async fn run(mut session: GameSession, config: SessionConfig, oracles: Oracles) -> Result<(), SessionError> {
    println!("=== Voidwalkers ===");
    print_status(&session);
    println!();
    if session.state().turn == 0 {
        println!("{}", session.intro());
    } else if let Some(last) = session.state().log.last() {
        println!("{}", last.narration);
    }
    println!();
    print_commands();
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("status") => print_status(&session),
                Some("quests") => print_quests(&session),
                Some("complete") => {
                    let quest = parts
                        .get(1)
                        .and_then(|n| n.parse::<usize>().ok())
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|i| session.state().world.active_quests().nth(i))
                        .map(|q| q.id);
                    match quest {
                        Some(id) => {
                            let result = session.act(ActionTag::CompleteQuest(id).into()).await;
                            report(&session, result)?;
                        }
                        None => println!("[ERROR] Usage: #complete <n>, see #quests"),
                    }
                }
                Some("saves") => match session.list_saves().await {
                    Ok(saves) if saves.is_empty() => println!("[SAVES] none"),
                    Ok(saves) => {
                        println!("[SAVES]");
                        for save in saves {
                            let m = &save.metadata;
                            println!(
                                "  {}: {} the {} (level {}) at {}, turn {}",
                                save.slot, m.character_name, m.archetype, m.level, m.location, m.turn
                            );
                        }
                    }
                    Err(e) => println!("[ERROR] Could not list saves: {e}"),
                },
                Some("new") => match session.new_game(config.clone(), &oracles).await {
                    Ok(()) => {
                        println!("[NEW GAME]");
                        print_status(&session);
                        println!("{}", session.intro());
                    }
                    Err(e) => println!("[ERROR] Could not start a new game: {e}"),
                },
                Some("help") => print_commands(),
                _ => println!("[ERROR] Unknown command. Type #help for commands."),
            }
        } else {
            let result = session.act_text(line).await;
            report(&session, result)?;
        }

        if session.is_over() {
            println!("[GAME OVER] Type #new to start again or #quit to leave.");
        }
        let _ = stdout.flush();
    }

    Ok(())
}

/// Print the outcome of an action. Invalid actions are a reprompt; a failed
/// save ends the loop.
fn report(session: &GameSession, result: Result<Response, SessionError>) -> Result<(), SessionError> {
    match result {
        Ok(response) => {
            println!();
            println!("{}", response.narrative);
            println!();
            if response.in_combat {
                let (hp, max) = response.hp;
                println!("[COMBAT] HP {hp}/{max}{}", combat_line(session));
            }
            Ok(())
        }
        Err(SessionError::InvalidAction(reason)) => {
            println!("[INVALID] {reason}");
            Ok(())
        }
        Err(e) => {
            eprintln!("[ERROR] {e}");
            Err(e)
        }
    }
}

fn combat_line(session: &GameSession) -> String {
    let Some(encounter) = session.state().encounter.as_ref() else {
        return String::new();
    };
    let foes: Vec<String> = encounter
        .living_enemies()
        .map(|(id, enemy)| format!("{} {}", encounter.name_of(id), enemy.hit_points.band()))
        .collect();
    format!(" | round {} | {}", encounter.round, foes.join(", "))
}

fn print_status(session: &GameSession) {
    let state = session.state();
    let character = &state.character;
    let (hp, max) = session.hp_status();
    println!("[STATUS]");
    println!(
        "  {} the {} (level {}, {} XP)",
        character.name, character.archetype, character.level, character.experience
    );
    println!("  Location: {}", state.world.current_name());
    println!("  HP: {hp}/{max}");
    if !character.status_effects.is_empty() {
        let effects: Vec<String> = character.status_effects.iter().map(|s| s.to_string()).collect();
        println!("  Effects: {}", effects.join(", "));
    }
    if !character.inventory.items.is_empty() {
        let items: Vec<String> = character
            .inventory
            .items
            .iter()
            .map(|i| if i.quantity > 1 { format!("{} x{}", i.name, i.quantity) } else { i.name.clone() })
            .collect();
        println!("  Inventory: {}", items.join(", "));
    }
    println!("  In Combat: {}", session.in_combat());
    println!("  Turn: {}", state.turn);
}

fn print_quests(session: &GameSession) {
    let quests = &session.state().world.quests;
    if quests.is_empty() {
        println!("[QUESTS] none yet, try \"seek a quest\"");
        return;
    }
    println!("[QUESTS]");
    for (i, quest) in session.state().world.active_quests().enumerate() {
        println!("  {}. {}: {}", i + 1, quest.title, quest.description);
    }
    for quest in quests.iter().filter(|q| q.status != QuestStatus::Active) {
        let status = if quest.status == QuestStatus::Completed { "done" } else { "failed" };
        println!("  -  {} ({status})", quest.title);
    }
}

fn print_commands() {
    println!("Actions: attack [target], defend, flee, explore, meet, seek a quest, hunt, or anything else.");
    println!("Commands:");
    println!("  #status       - Show your character");
    println!("  #quests       - List quests");
    println!("  #complete <n> - Turn in active quest n");
    println!("  #saves        - List save slots");
    println!("  #new          - Start over in this slot");
    println!("  #quit         - Exit (every turn is already saved)");
}
