//! Line-oriented command loop.
//!
//! - Lines starting with `#` are commands (start, end, save, load, ...)
//! - Any other line is recorded as a play action in the active session

use campaign_core::{Campaign, LedgerAction, Outcome, SessionSnapshot};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
  #start <location> [xp]     - Start a session
  #act <text>                - Record an action (plain lines do the same)
  #enter <location>          - Move to another location
  #npc <id>                  - Record an NPC interaction
  #event <id>                - Record a triggered event
  #time <minutes> [date]     - Advance the in-world clock
  #recent [n]                - Show recent actions
  #status                    - Show the active session
  #end [summary]             - End the session, write the log and commit
  #save <name> [description] - Create a save point
  #saves                     - List save points
  #load <name> [force]       - Roll back to a save point
  #quit                      - Exit (an active session stays resumable)
  #help                      - Show this help";

/// Run the command loop until `#quit` or end of input.
pub async fn run(campaign: &Campaign) -> anyhow::Result<()> {
    println!("=== Campaign Session Engine ===");
    println!("Root: {}", campaign.config().root.display());
    if let Some(Some(snapshot)) = campaign.current_session().await.data {
        println!("[RESUMED] {}", describe(&snapshot));
    }
    println!();
    println!("Commands:");
    println!("{HELP}");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(command) = line.strip_prefix('#') else {
            report(campaign.record_action(LedgerAction::new(line)).await, |entry| {
                format!("[ACTION] {} @ {}", entry.description, entry.location_id)
            });
            continue;
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        match name {
            "quit" | "exit" => {
                if campaign.is_active().await {
                    println!("[INFO] Session left open; it resumes on next start.");
                }
                println!("Goodbye!");
                break;
            }
            "start" => match args.first() {
                Some(location) => {
                    let xp = args.get(1).and_then(|xp| xp.parse().ok());
                    report(campaign.start_session(None, location, xp).await, |s| {
                        format!("[STARTED] {}", describe(&s))
                    });
                }
                None => println!("[ERROR] Usage: #start <location> [xp]"),
            },
            "act" if !rest.is_empty() => {
                report(campaign.record_action(LedgerAction::new(rest)).await, |entry| {
                    format!("[ACTION] {} @ {}", entry.description, entry.location_id)
                });
            }
            "act" => println!("[ERROR] Usage: #act <text>"),
            "enter" => match args.first() {
                Some(location) => report(campaign.enter_location(location).await, |s| {
                    format!("[MOVED] {}", s.location.current_location_id)
                }),
                None => println!("[ERROR] Usage: #enter <location>"),
            },
            "npc" => match args.first() {
                Some(npc) => report(campaign.record_npc_interaction(npc).await, |s| {
                    format!("[NPC] {} interaction(s) this session", s.npcs.interacted_with.len())
                }),
                None => println!("[ERROR] Usage: #npc <id>"),
            },
            "event" => match args.first() {
                Some(event) => report(campaign.record_event(event).await, |s| {
                    format!("[EVENT] {} event(s) this session", s.events.triggered_this_session.len())
                }),
                None => println!("[ERROR] Usage: #event <id>"),
            },
            "time" => match args.first().and_then(|m| m.parse().ok()) {
                Some(minutes) => {
                    let date = (args.len() > 1).then(|| args[1..].join(" "));
                    report(
                        campaign.advance_calendar(minutes, date.as_deref()).await,
                        |s| format!("[TIME] {} {}", s.calendar.current_date, s.calendar.current_time),
                    );
                }
                None => println!("[ERROR] Usage: #time <minutes> [date]"),
            },
            "recent" => {
                let count = args
                    .first()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(campaign_core::ledger::DEFAULT_RECENT_COUNT);
                report(campaign.action_context(count).await, |context| {
                    format!("[RECENT]\n{}", context.trim_end())
                });
            }
            "status" => match campaign.current_session().await.data.flatten() {
                Some(snapshot) => {
                    println!("[STATUS] {}", describe(&snapshot));
                    println!("  Visits: {}", snapshot.location.visited.len());
                    println!("  NPCs: {}", snapshot.npc_counts().len());
                    println!("  Events: {}", snapshot.events.triggered_this_session.len());
                    println!("  Autosaves: {}", snapshot.performance.autosave_count);
                }
                None => println!("[STATUS] No active session"),
            },
            "end" => {
                let summary = (!rest.is_empty()).then_some(rest);
                report(campaign.end_session(summary).await, |close| {
                    let mut out = format!(
                        "[ENDED] {}\n  Log: {}",
                        close.report.session_id,
                        close.report.log_path.display()
                    );
                    match (&close.report.commit, &close.report.checkpoint_error) {
                        (Some(commit), _) => out.push_str(&format!("\n  Commit: {commit}")),
                        (None, Some(error)) => out.push_str(&format!("\n  Not committed: {error}")),
                        (None, None) => {}
                    }
                    out
                });
            }
            "save" => match args.first() {
                Some(save_name) => {
                    let description = rest[save_name.len()..].trim();
                    report(campaign.create_save_point(save_name, description).await, |save| {
                        format!("[SAVED] {}", save.tag)
                    });
                }
                None => println!("[ERROR] Usage: #save <name> [description]"),
            },
            "saves" => report(campaign.list_save_points().await, |saves| {
                if saves.is_empty() {
                    return "[SAVES] none".to_string();
                }
                let mut out = "[SAVES]".to_string();
                for save in saves {
                    let date = save
                        .created_at
                        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    out.push_str(&format!("\n  {:<24} {date:<16} {}", save.name(), save.description));
                }
                out
            }),
            "load" => match args.first() {
                Some(save_name) => {
                    let force = args.get(1) == Some(&"force");
                    let dirty = campaign.has_uncommitted_changes().await.data.unwrap_or(false);
                    if dirty && !force {
                        println!("[WARN] Uncommitted changes would be lost. Use #load {save_name} force");
                    } else {
                        report(campaign.rollback_to_save(save_name).await, |tag| {
                            format!("[LOADED] {tag}")
                        });
                    }
                }
                None => println!("[ERROR] Usage: #load <name> [force]"),
            },
            "help" => {
                println!("[HELP]");
                println!("{HELP}");
            }
            _ => println!("[ERROR] Unknown command. Type #help for help."),
        }
        stdout.flush().ok();
    }

    Ok(())
}

fn report<T>(outcome: Outcome<T>, render: impl FnOnce(T) -> String) {
    match (outcome.data, outcome.error) {
        (Some(data), None) => println!("{}", render(data)),
        (_, Some(error)) => println!("[ERROR] {error}"),
        (None, None) => println!("[OK]"),
    }
}

fn describe(snapshot: &SessionSnapshot) -> String {
    format!(
        "{} at {} ({} {})",
        snapshot.session_id,
        snapshot.location.current_location_id,
        snapshot.calendar.current_date,
        snapshot.calendar.current_time
    )
}
