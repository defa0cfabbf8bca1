//! Interactive stdin REPL.
//!
//! `research <query>` starts a session and streams its events;
//! `resume <id>` continues one; `list` and `show <id>` inspect the
//! store.

use std::sync::Arc;

use fathom_domain::config::Config;
use fathom_domain::research::ResearchMode;
use fathom_eventstore::FileEventStore;

use crate::aggregate::ResearchAggregate;
use crate::bus::{BusEvent, EventBus};
use crate::cancel::CancelToken;
use crate::orchestrator::{Capabilities, Orchestrator};

/// Run the REPL until EOF or `quit`.
pub async fn run(config: Arc<Config>, caps: Capabilities) -> anyhow::Result<()> {
    let store = Arc::new(FileEventStore::new(config.engine.store_path.clone())?);
    let bus = EventBus::new();
    let orchestrator = Orchestrator::new(config.clone(), caps, store.clone(), bus.clone());

    let history_path = config.engine.store_path.join("repl_history.txt");
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("fathom research engine");
    eprintln!("Commands: research [fast|deep] <query>, resume <id>, list, show <id>, quit");
    eprintln!();

    loop {
        match rl.readline("fathom> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                let (command, rest) = match trimmed.split_once(char::is_whitespace) {
                    Some((c, r)) => (c, r.trim()),
                    None => (trimmed, ""),
                };

                match command {
                    "quit" | "exit" => break,
                    "help" => {
                        eprintln!("research [fast|deep] <query>  start a new session");
                        eprintln!("resume <id>                   continue a stored session");
                        eprintln!("list                          sessions with status and cost");
                        eprintln!("show <id>                     session summary");
                        eprintln!("quit                          exit");
                    }
                    "research" => {
                        if rest.is_empty() {
                            eprintln!("usage: research [fast|deep] <query>");
                            continue;
                        }
                        let (mode, query) = split_mode(rest);
                        if let Err(e) = research(&orchestrator, query, mode).await {
                            eprintln!("error: {e}");
                        }
                    }
                    "resume" => {
                        if rest.is_empty() {
                            eprintln!("usage: resume <id>");
                            continue;
                        }
                        if let Err(e) = resume(&orchestrator, rest).await {
                            eprintln!("error: {e}");
                        }
                    }
                    "list" => {
                        if let Err(e) = list(&store) {
                            eprintln!("error: {e}");
                        }
                    }
                    "show" => {
                        if rest.is_empty() {
                            eprintln!("usage: show <id>");
                            continue;
                        }
                        if let Err(e) = show(&store, rest) {
                            eprintln!("error: {e}");
                        }
                    }
                    other => eprintln!("unknown command: {other} (try help)"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

fn split_mode(rest: &str) -> (ResearchMode, &str) {
    match rest.split_once(char::is_whitespace) {
        Some((first, query)) => match ResearchMode::parse(first) {
            Some(mode) if !query.trim().is_empty() => (mode, query.trim()),
            _ => (ResearchMode::Deep, rest),
        },
        None => (ResearchMode::Deep, rest),
    }
}

async fn research(
    orchestrator: &Orchestrator,
    query: &str,
    mode: ResearchMode,
) -> anyhow::Result<()> {
    let aggregate = orchestrator.new_session(query, mode)?;
    let session_id = aggregate.state().id;
    println!("session {session_id}");

    let state = drive_with_stream(orchestrator, aggregate).await?;
    print_outcome(&state);
    Ok(())
}

async fn resume(orchestrator: &Orchestrator, id: &str) -> anyhow::Result<()> {
    let mut events = orchestrator.bus().subscribe(&[]);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_bus_event(&event);
        }
    });

    let result = orchestrator.resume(id, &CancelToken::new()).await;
    printer.abort();
    print_outcome(&result?);
    Ok(())
}

async fn drive_with_stream(
    orchestrator: &Orchestrator,
    aggregate: Arc<ResearchAggregate>,
) -> anyhow::Result<crate::aggregate::ResearchState> {
    let mut events = orchestrator.bus().subscribe(&[]);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_bus_event(&event);
        }
    });

    let result = orchestrator.drive(aggregate, &CancelToken::new()).await;
    printer.abort();
    Ok(result?)
}

fn print_bus_event(event: &BusEvent) {
    match event {
        BusEvent::Domain { event } => {
            println!("  [{}] v{}", event.event_type(), event.version);
        }
        BusEvent::ToolCall { agent, tool, .. } => {
            println!("  [{agent}] → {tool}");
        }
        BusEvent::ToolResult {
            agent,
            tool,
            preview,
            is_error,
        } => {
            let marker = if *is_error { "!" } else { "✓" };
            println!("  [{agent}] {marker} {tool}: {}", first_line(preview));
        }
        // Token deltas are too chatty for the session log.
        BusEvent::AgentDelta { .. } => {}
    }
}

fn print_outcome(state: &crate::aggregate::ResearchState) {
    println!(
        "{} — status {}, progress {:.0}%, cost ${:.4} ({} tokens)",
        state.id,
        state.status.as_str(),
        state.progress * 100.0,
        state.total_cost.total_cost_usd,
        state.total_cost.total_tokens,
    );
    if let Some(report) = &state.report {
        println!("report: {} ({} citations)", report.title, report.citations.len());
    }
}

fn list(store: &Arc<FileEventStore>) -> anyhow::Result<()> {
    let ids = store.all_aggregate_ids()?;
    if ids.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for id in ids {
        let events = store.load_events(&id)?;
        match ResearchAggregate::load_from_events(&id, &events) {
            Ok(aggregate) => {
                let state = aggregate.state();
                println!(
                    "{id}  {}  ${:.4}  {}",
                    state.status.as_str(),
                    state.total_cost.total_cost_usd,
                    truncate(&state.query, 60),
                );
            }
            Err(e) => println!("{id}  (unreadable: {e})"),
        }
    }
    Ok(())
}

fn show(store: &Arc<FileEventStore>, id: &str) -> anyhow::Result<()> {
    let events = store.load_events(id)?;
    if events.is_empty() {
        println!("unknown session {id}");
        return Ok(());
    }
    let aggregate = ResearchAggregate::load_from_events(id, &events)?;
    let state = aggregate.state();

    println!("session   {id}");
    println!("query     {}", state.query);
    println!("status    {}", state.status.as_str());
    println!("progress  {:.0}%", state.progress * 100.0);
    println!("events    {}", state.version);
    println!(
        "cost      ${:.4} ({} tokens)",
        state.total_cost.total_cost_usd, state.total_cost.total_tokens
    );
    if let Some(plan) = &state.plan {
        println!("topic     {}", plan.topic);
    }
    for worker in state.workers.values() {
        println!(
            "  worker {} [{}] {} source(s), {} fact(s)",
            worker.id,
            status_str(worker),
            worker.sources.len(),
            worker.facts.len(),
        );
    }
    if let Some(report) = &state.report {
        println!("report    {} ({} citations)", report.title, report.citations.len());
    }
    Ok(())
}

fn status_str(worker: &fathom_domain::research::WorkerState) -> &'static str {
    match worker.status {
        fathom_domain::research::WorkerStatus::Pending => "pending",
        fathom_domain::research::WorkerStatus::Running => "running",
        fathom_domain::research::WorkerStatus::Complete => "complete",
        fathom_domain::research::WorkerStatus::Failed => "failed",
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_prefix_is_optional() {
        let (mode, query) = split_mode("fast history of espresso");
        assert_eq!(mode, ResearchMode::Fast);
        assert_eq!(query, "history of espresso");

        let (mode, query) = split_mode("history of espresso");
        assert_eq!(mode, ResearchMode::Deep);
        assert_eq!(query, "history of espresso");

        // A bare "fast" with no query is the query itself.
        let (mode, query) = split_mode("fast");
        assert_eq!(mode, ResearchMode::Deep);
        assert_eq!(query, "fast");
    }
}
