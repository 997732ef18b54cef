use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;

use branch_registry::{
    import_branches, init_tracing, load_csv, Branch, BranchRegistry, ConsoleToasts,
    FileSelectionStore, NewBranch, NotificationBus, RegistryConfig, SqliteGateway, BRANCHES_TABLE,
};

const USAGE: &str = "\
Usage: branches <command>

Commands:
  list                          List branches (* marks the current one)
  current                       Show the current branch
  add <name> <address> [city]   Create a branch
  switch <id>                   Make <id> the current branch
  remove <id>                   Delete a branch
  import <file.csv>             Create branches from a CSV file
  events <id>                   Show the audit trail of a branch";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = RegistryConfig::discover()?;
    init_tracing(&config.log_filter);

    let gateway = SqliteGateway::open(&config.database_path)?;

    if command == "events" {
        let id = required(&args, 2, "<id>");
        return run_events(&gateway, id);
    }

    let registry = BranchRegistry::from_config(
        &config,
        Arc::new(gateway),
        Arc::new(FileSelectionStore::open(&config.selection_path)),
        Arc::new(NotificationBus::new()),
    )
    .with_toasts(Arc::new(ConsoleToasts));

    registry.load().await;

    let ok = match command {
        "list" => {
            run_list(&registry);
            true
        }
        "current" => {
            run_current(&registry);
            true
        }
        "add" => {
            let mut fields = NewBranch::new(
                required(&args, 2, "<name>"),
                required(&args, 3, "<address>"),
            );
            if let Some(city) = args.get(4) {
                fields = fields.with_city(city.as_str());
            }
            registry.create(fields).await.is_ok()
        }
        "switch" => registry.switch_branch(required(&args, 2, "<id>")).is_ok(),
        "remove" => registry.delete(required(&args, 2, "<id>")).await.is_ok(),
        "import" => run_import(&registry, Path::new(required(&args, 2, "<file.csv>"))).await?,
        other => {
            eprintln!("❌ Unknown command: {}", other);
            eprintln!("{}", USAGE);
            false
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> &'a str {
    match args.get(index) {
        Some(value) => value,
        None => {
            eprintln!("❌ Missing argument {}", name);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn print_branch(branch: &Branch, current: bool) {
    let marker = if current { "*" } else { " " };
    let status = if branch.is_active { "" } else { "  (inactive)" };
    println!(
        "{} {:<38} {:<24} {}{}",
        marker,
        branch.id,
        branch.label(),
        branch.city.as_deref().unwrap_or("-"),
        status
    );
}

fn run_list(registry: &BranchRegistry) {
    let branches = registry.branches();
    if branches.is_empty() {
        println!("No branches yet. Add one with: branches add <name> <address>");
        return;
    }

    let current = registry.current_branch_id();
    for branch in &branches {
        print_branch(branch, current.as_deref() == Some(branch.id.as_str()));
    }
    println!("\n{} branches", branches.len());
}

fn run_current(registry: &BranchRegistry) {
    match registry.current_branch() {
        Some(branch) => print_branch(&branch, true),
        None => println!("No branch selected"),
    }
}

async fn run_import(registry: &BranchRegistry, csv_path: &Path) -> Result<bool> {
    println!("📂 Loading {}...", csv_path.display());
    let rows = load_csv(csv_path)?;
    println!("✓ Loaded {} rows", rows.len());

    let report = import_branches(registry, rows).await;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Created:    {}", report.created);
    println!("✓ Duplicates: {}", report.conflicts);
    if report.failed > 0 {
        println!("❌ Failed:     {}", report.failed);
    }
    Ok(report.failed == 0)
}

fn run_events(gateway: &SqliteGateway, id: &str) -> Result<()> {
    let events = gateway
        .events_for(BRANCHES_TABLE, id)
        .context("Failed to read audit trail")?;

    if events.is_empty() {
        println!("No events for {}", id);
        return Ok(());
    }

    for event in events {
        println!(
            "{}  {:<14} {:<16} {}",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.actor,
            event.data
        );
    }
    Ok(())
}
