use localsync::background::BackgroundRefresher;
use localsync::error::CoreError;
use localsync::events::{self, Event};
use localsync::flusher::Flusher;
use localsync::remote::models::{CreateTaskFields, Patch, TaskPatch};
use localsync::remote::RemoteClient;
use localsync::repository::Coordinator;
use localsync::store::Store;
use localsync::{config, credentials, logging};
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

/// Prompt for an API token and save it to the platform credential store.
fn run_setup() -> i32 {
    print!("Enter your API token: ");
    if io::stdout().flush().is_err() {
        return 1;
    }
    let mut token = String::new();
    if io::stdin().lock().read_line(&mut token).is_err() {
        error!("failed to read token from stdin");
        return 1;
    }
    let token = token.trim();
    if token.is_empty() {
        eprintln!("no token entered");
        return 1;
    }
    match credentials::store_token(token) {
        Ok(()) => {
            println!("Token saved.");
            0
        }
        Err(e) => {
            eprintln!("failed to save token: {e}");
            1
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();

    if std::env::args().any(|a| a == "--setup") {
        return std::process::ExitCode::from(run_setup() as u8);
    }

    let app_config = logging::init_logging();

    match run(app_config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e @ CoreError::Credential(_)) => {
            eprintln!("{e}. Run `localsync --setup` to configure an API token.");
            std::process::ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Wires up the store, remote client, and coordinators, then drives the
/// event loop until `quit`. Every fallible setup step surfaces through
/// `CoreError` so `main` has one place to report failure and pick an exit
/// code.
async fn run(app_config: config::AppConfig) -> Result<(), CoreError> {
    let token = credentials::load_token()?;
    let store = Arc::new(Store::open(&config::get_cache_db_path())?);
    let remote = Arc::new(RemoteClient::new(app_config.sync.base_url.clone(), token));
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        remote.clone(),
        app_config.sync.ttl_seconds,
        events_tx.clone(),
    ));
    let flusher = Arc::new(Flusher::new(
        store.clone(),
        remote.clone(),
        events_tx.clone(),
        app_config.sync.max_attempts,
    ));
    let background = Arc::new(BackgroundRefresher::new(coordinator.clone(), events_tx.clone()));

    info!("localsync starting; cache at {:?}", config::get_cache_db_path());

    if let Err(e) = coordinator.warm_directory().await {
        error!("user-directory warm-up failed: {e}");
    }
    if let Err(e) = coordinator.load_projects(false).await {
        error!("initial project load failed: {e}");
    }

    spawn_flush_loop(flusher.clone());

    println!("localsync ready. Commands: list, refresh, add <project> <text>, close <id>, update <id> <text>, dismiss <mutation_id>, quit");
    let (input_tx, mut input_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                if let Event::BackgroundRefresh { project_ids } = &event {
                    background.start(project_ids.clone());
                }
                print_event(&event);
            }
            Some(line) = input_rx.recv() => {
                if !handle_command(&line, &coordinator).await {
                    break;
                }
            }
            else => break,
        }
    }

    Ok(())
}

/// Drive the flusher's drain loop on its own task. Each tick tail-calls the
/// next one; a transient result waits briefly before retrying (cooperative
/// backoff rather than a fixed interval).
fn spawn_flush_loop(flusher: Arc<Flusher>) {
    tokio::spawn(async move {
        loop {
            match flusher.flush_next().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(e) => {
                    error!("flusher: store error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });
}

async fn handle_command(line: &str, coordinator: &Arc<Coordinator>) -> bool {
    let mut parts = line.trim().splitn(3, ' ');
    match parts.next().unwrap_or("") {
        "quit" | "q" | "exit" => return false,
        "list" => {
            if let Err(e) = coordinator.load_projects(false).await {
                error!("list failed: {e}");
            }
        }
        "refresh" => {
            if let Err(e) = coordinator.load_projects(true).await {
                error!("refresh failed: {e}");
            }
        }
        "add" => {
            let project_id = parts.next().unwrap_or("").to_string();
            let content = parts.next().unwrap_or("").to_string();
            if project_id.is_empty() || content.is_empty() {
                println!("usage: add <project_id> <content>");
            } else {
                let fields = CreateTaskFields {
                    content,
                    project_id,
                    ..Default::default()
                };
                if let Err(e) = coordinator.create_task(fields) {
                    error!("add failed: {e}");
                }
            }
        }
        "close" => {
            let id = parts.next().unwrap_or("");
            if id.is_empty() {
                println!("usage: close <task_id>");
            } else if let Err(e) = coordinator.close_task(id) {
                error!("close failed: {e}");
            }
        }
        "update" => {
            let id = parts.next().unwrap_or("").to_string();
            let content = parts.next().unwrap_or("").to_string();
            if id.is_empty() || content.is_empty() {
                println!("usage: update <task_id> <content>");
            } else {
                let patch = TaskPatch {
                    content: Patch::Value(content),
                    ..Default::default()
                };
                if let Err(e) = coordinator.update_task(&id, &patch) {
                    error!("update failed: {e}");
                }
            }
        }
        "dismiss" => {
            let id = parts.next().unwrap_or("");
            match id.parse::<i64>() {
                Ok(id) => {
                    if let Err(e) = coordinator.dismiss_conflict(id) {
                        error!("dismiss failed: {e}");
                    }
                }
                Err(_) => println!("usage: dismiss <mutation_id>"),
            }
        }
        "" => {}
        other => println!("unknown command: {other}"),
    }
    true
}

fn print_event(event: &Event) {
    match event {
        Event::CachedProjects { projects, stale } => {
            println!("[projects:cached] {} project(s){}", projects.len(), if *stale { " (stale)" } else { "" });
            for p in projects {
                println!("  {} {}", p.id, p.name);
            }
        }
        Event::FreshProjects { projects } => {
            println!("[projects:fresh] {} project(s)", projects.len());
        }
        Event::CachedTasks { project_id, tasks, stale } => {
            println!(
                "[tasks:cached] {project_id}: {} task(s){}",
                tasks.len(),
                if *stale { " (stale)" } else { "" }
            );
            for t in tasks {
                println!("  [{}] {} {}", if t.checked { "x" } else { " " }, t.id, t.content);
            }
        }
        Event::FreshTasks { project_id, tasks } => {
            println!("[tasks:fresh] {project_id}: {} task(s)", tasks.len());
        }
        Event::CachedSections { project_id, sections, .. } => {
            println!("[sections:cached] {project_id}: {} section(s)", sections.len());
        }
        Event::FreshSections { project_id, sections } => {
            println!("[sections:fresh] {project_id}: {} section(s)", sections.len());
        }
        Event::Created { task } => {
            println!("[created] {} {}", task.id, task.content);
        }
        Event::MutationFlushed { outcome, .. } => match outcome {
            events::FlushOutcome::Ok => println!("[sync] flushed"),
            events::FlushOutcome::TransientError(msg) => println!("[sync] retrying: {msg}"),
        },
        Event::MutationConflict { conflict, .. } => {
            println!("Sync conflict — press Q to review: {conflict}");
        }
        Event::BackgroundRefresh { project_ids } => {
            println!("[background] refreshing {} project(s)", project_ids.len());
        }
        Event::BackgroundRefreshDone { chain, remaining } => {
            println!("[background] chain {chain} done, {} remaining", remaining.len());
        }
        Event::Toast { message } => println!("[toast] {message}"),
        Event::ProjectArchived { project_id } => println!("[project] {project_id} archived"),
        Event::ProjectUnarchived { project } => println!("[project] {} unarchived", project.id),
        Event::ProjectCreated { project } => println!("[project] created {} {}", project.id, project.name),
    }
}
