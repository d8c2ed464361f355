use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use todostore::config::{self, Backend, Config};
use todostore::{EmptyState, FileSlot, Priority, Slot, SortOrder, SqliteSlot, StatusFilter, Task, TaskPatch, TaskStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "todostore - a single-user task list")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the store directory (default: <data dir>/todostore)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Storage backend, overrides config.yaml
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// low, medium or high
        #[arg(short, long)]
        priority: Option<Priority>,
    },

    /// List tasks
    List {
        /// all, active or completed
        #[arg(short, long, default_value_t = StatusFilter::All)]
        filter: StatusFilter,

        /// created, priority or alphabetical
        #[arg(long, default_value_t = SortOrder::Created)]
        sort: SortOrder,

        /// Case-insensitive text to look for in titles and descriptions
        #[arg(short = 'q', long, default_value = "")]
        search: String,
    },

    /// Edit a task's title, description or priority
    Edit {
        /// Task id, or a unique prefix or suffix of one
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        /// New description, empty to clear
        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        priority: Option<Priority>,
    },

    /// Mark a task complete, or incomplete again
    Toggle {
        /// Task id, or a unique prefix or suffix of one
        id: String,
    },

    /// Delete a task
    Delete {
        /// Task id, or a unique prefix or suffix of one
        id: String,
    },

    /// Show task counts
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store_path = cli.store_path.clone().unwrap_or_else(config::default_store_dir);
    let config = Config::load(&store_path)?;
    let backend = cli.backend.unwrap_or(config.backend);

    let mut store = open_store(&store_path, backend, &config.storage_key)?;
    run(cli.command, &mut store, &config)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(path: &Path, backend: Backend, key: &str) -> Result<TaskStore<Box<dyn Slot>>> {
    let slot: Box<dyn Slot> = match backend {
        Backend::Sqlite => Box::new(SqliteSlot::open(path)?),
        Backend::File => Box::new(FileSlot::open(path)?),
    };
    let store = TaskStore::open_with_key(slot, key)?;
    if let Some(diagnostic) = store.load_diagnostic() {
        eprintln!("{} {}", "warning: stored tasks could not be loaded:".yellow(), diagnostic);
    }
    Ok(store)
}

fn run<S: Slot>(command: Commands, store: &mut TaskStore<S>, config: &Config) -> Result<()> {
    match command {
        Commands::Add {
            title,
            description,
            priority,
        } => {
            let priority = priority.unwrap_or(config.default_priority);
            let id = store
                .add(&title, description.as_deref(), priority)
                .ok_or_else(|| eyre!("Task title cannot be empty"))?;
            check_written(store)?;
            println!("Added {}", short_id(&id).cyan());
        }
        Commands::List { filter, sort, search } => {
            store.set_filter(filter);
            store.set_sort(sort);
            store.set_search_query(search);
            print_list(store);
        }
        Commands::Edit {
            id,
            title,
            description,
            priority,
        } => {
            let id = resolve_id(store, &id)?;
            let patch = edit_patch(store, &id, title, description, priority)?;
            store.update(&id, patch);
            check_written(store)?;
            println!("Updated {}", short_id(&id).cyan());
        }
        Commands::Toggle { id } => {
            let id = resolve_id(store, &id)?;
            store.toggle(&id);
            check_written(store)?;
            if let Some(task) = store.get(&id) {
                let state = if task.completed {
                    "completed".green()
                } else {
                    "active".yellow()
                };
                println!("{} is now {}", task.title, state);
            }
        }
        Commands::Delete { id } => {
            let id = resolve_id(store, &id)?;
            store.delete(&id);
            check_written(store)?;
            println!("Deleted {}", short_id(&id).cyan());
        }
        Commands::Stats => {
            let stats = store.stats();
            println!("Total:         {}", stats.total);
            println!("Active:        {}", stats.active.to_string().yellow());
            println!("Completed:     {}", stats.completed.to_string().green());
            println!("High priority: {}", stats.high_priority.to_string().red());
            if stats.total > 0 {
                println!("Progress:      {:.0}%", stats.completion_percent());
            }
        }
    }

    Ok(())
}

/// Match a full id, or a unique prefix or suffix of one (`list` prints suffixes)
fn resolve_id<S: Slot>(store: &TaskStore<S>, needle: &str) -> Result<String> {
    if store.get(needle).is_some() {
        return Ok(needle.to_string());
    }

    let matches: Vec<&Task> = store
        .tasks()
        .iter()
        .filter(|t| t.id.starts_with(needle) || t.id.ends_with(needle))
        .collect();
    match matches.as_slice() {
        [task] => Ok(task.id.clone()),
        [] => Err(eyre!("No task with id {}", needle)),
        _ => Err(eyre!("Id {} matches {} tasks", needle, matches.len())),
    }
}

/// Build an update from CLI flags, keeping unset fields as they are
fn edit_patch<S: Slot>(
    store: &TaskStore<S>,
    id: &str,
    title: Option<String>,
    description: Option<String>,
    priority: Option<Priority>,
) -> Result<TaskPatch> {
    if title.is_none() && description.is_none() && priority.is_none() {
        return Err(eyre!("Nothing to change: pass --title, --description or --priority"));
    }
    let task = store.get(id).ok_or_else(|| eyre!("No task with id {}", id))?;

    let title = title.unwrap_or_else(|| task.title.clone());
    let description = description.unwrap_or_else(|| task.description.clone().unwrap_or_default());
    let mut patch = TaskPatch::edit(&title, &description).ok_or_else(|| eyre!("Task title cannot be empty"))?;
    patch.priority = priority;
    Ok(patch)
}

fn check_written<S: Slot>(store: &TaskStore<S>) -> Result<()> {
    match store.last_write_error() {
        Some(err) => Err(eyre!("Failed to save tasks: {}", err)),
        None => Ok(()),
    }
}

fn print_list<S: Slot>(store: &TaskStore<S>) {
    let view = store.view();
    if view.is_empty() {
        if let Some(state) = store.empty_state() {
            println!("{}", empty_message(state, store.search_query()).dimmed());
        }
        return;
    }

    for task in &view {
        print_task(task);
    }

    let stats = store.stats();
    println!(
        "\n{} of {} completed",
        stats.completed.to_string().green(),
        stats.total
    );
}

fn print_task(task: &Task) {
    let check = if task.completed { "[x]".green() } else { "[ ]".normal() };
    let title = if task.completed {
        task.title.dimmed().strikethrough()
    } else {
        task.title.bold()
    };
    println!(
        "{} {} {} {}",
        check,
        short_id(&task.id).cyan(),
        title,
        priority_colored(task.priority)
    );
    if let Some(description) = &task.description {
        println!("      {}", description.dimmed());
    }
}

fn priority_colored(priority: Priority) -> String {
    match priority {
        Priority::Low => "low".green().to_string(),
        Priority::Medium => "medium".yellow().to_string(),
        Priority::High => "high".red().bold().to_string(),
    }
}

fn empty_message(state: EmptyState, search: &str) -> String {
    match state {
        EmptyState::NoTasks => "No tasks yet. Add one with `todostore add <title>`.".to_string(),
        EmptyState::NoResults if !search.is_empty() => {
            format!("No tasks match \"{}\". Try a different search term.", search)
        }
        EmptyState::NoResults => "No tasks match your current filter.".to_string(),
        EmptyState::AllComplete => "All tasks complete!".to_string(),
    }
}

/// Last 8 characters of an id; UUIDv7 ids share their leading timestamp bits
fn short_id(id: &str) -> &str {
    let start = id.char_indices().rev().nth(7).map(|(i, _)| i).unwrap_or(0);
    &id[start..]
}
