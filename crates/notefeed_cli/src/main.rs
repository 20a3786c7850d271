//! Interactive notefeed shell.
//!
//! # Responsibility
//! - Resolve configuration, start logging and open the document store.
//! - Mount one note list controller and drive it from line commands.
//! - Print notifications as toasts and ask y/N for destructive actions.
//! - Announce live list changes and keep the open edit card current.
//!
//! # Invariants
//! - The controller is deactivated before the process exits.
//! - Store and validation failures are printed, never panicked on.

use clap::Parser;
use log::{error, info};
use notefeed_core::{
    default_log_level, format_created_at, init_logging, ClearOutcome, ConfigOverrides, Confirm,
    DocumentStore, ListState, MemoryDocumentStore, Note, NoteCard, NoteListController,
    NoteService, Notification, NotificationLevel, Notifier, SqliteDocumentStore, StoreConfig,
    ToastQueue,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "notefeed", version, about = "Live-synchronized note list")]
struct Args {
    /// SQLite file backing the project.
    #[arg(long, env = "NOTEFEED_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Keep notes in memory for this session only; ignores `--db-path`.
    #[arg(long)]
    memory: bool,

    #[arg(long, env = "NOTEFEED_COLLECTION")]
    collection: Option<String>,

    #[arg(long, env = "NOTEFEED_PROJECT_ID")]
    project_id: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, env = "NOTEFEED_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files.
    #[arg(long, env = "NOTEFEED_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("notefeed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let log_dir = args
        .log_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("notefeed-logs"));
    init_logging(&level, &log_dir.to_string_lossy()).map_err(|err| err.to_string())?;

    let config = StoreConfig::resolve(ConfigOverrides {
        project_id: args.project_id,
        collection: args.collection,
        db_path: args.db_path,
    })
    .map_err(|err| err.to_string())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("cannot start runtime: {err}"))?;

    let store: Arc<dyn DocumentStore> = if args.memory {
        Arc::new(MemoryDocumentStore::new())
    } else {
        Arc::new(SqliteDocumentStore::open(&config.db_path).map_err(|err| err.to_string())?)
    };
    info!(
        "event=shell_start module=cli status=ok project_id={} collection={} backend={}",
        config.project_id,
        config.collection,
        if args.memory { "memory" } else { "sqlite" }
    );

    let service = NoteService::new(store, &config.collection).map_err(|err| err.to_string())?;
    let notifier = Arc::new(ConsoleNotifier::default());
    let mut shell = Shell {
        runtime,
        controller: NoteListController::new(service, notifier.clone()),
        notifier,
        editing: None,
        feed_echo: None,
    };

    println!("notefeed {} ({})", env!("CARGO_PKG_VERSION"), config.collection);
    shell.mount();
    let result = shell.repl();
    if let Some(echo) = shell.feed_echo.take() {
        echo.abort();
    }
    shell.controller.deactivate();
    info!("event=shell_stop module=cli status=ok");
    result
}

struct Shell {
    runtime: Runtime,
    controller: NoteListController,
    notifier: Arc<ConsoleNotifier>,
    editing: Option<NoteCard>,
    feed_echo: Option<JoinHandle<()>>,
}

impl Shell {
    fn mount(&mut self) {
        if self.runtime.block_on(self.controller.activate()).is_err() {
            return;
        }
        let mut updates = self.controller.watch();
        let loaded = self.runtime.block_on(async move {
            tokio::time::timeout(
                FIRST_SNAPSHOT_TIMEOUT,
                updates.wait_for(|state: &ListState| !state.loading),
            )
            .await
            .map(|ready| ready.is_ok())
            .unwrap_or(false)
        });
        if loaded {
            self.print_list();
        } else {
            println!("Loading notes...");
        }
        self.feed_echo = Some(self.runtime.spawn(echo_feed(self.controller.watch())));
    }

    /// Applies the latest snapshot to the open edit card.
    fn sync_editing(&mut self) {
        let Some(card) = self.editing.as_mut() else {
            return;
        };
        if !self.controller.refresh_card(card) {
            println!("The note you were editing was deleted; edit discarded.");
            self.editing = None;
        }
    }

    fn repl(&mut self) -> Result<(), String> {
        print_help();
        let stdin = io::stdin();
        loop {
            print!("> ");
            io::stdout().flush().map_err(|err| err.to_string())?;

            let mut line = String::new();
            let read = stdin
                .lock()
                .read_line(&mut line)
                .map_err(|err| err.to_string())?;
            if read == 0 {
                return Ok(());
            }

            let line = line.trim_end_matches(['\n', '\r']);
            let (command, rest) = match line.trim_start().split_once(' ') {
                Some((command, rest)) => (command, rest),
                None => (line.trim(), ""),
            };
            self.sync_editing();
            match command {
                "" => {}
                "list" | "ls" => self.print_list(),
                "add" => self.add(rest),
                "search" => {
                    self.controller.set_search_term(rest);
                    self.print_list();
                }
                "edit" => self.edit(rest),
                "title" => self.set_draft(|card| card.set_title(rest)),
                "content" => self.set_draft(|card| card.set_content(rest)),
                "save" => self.save(),
                "cancel" => self.cancel(),
                "delete" | "rm" => self.delete(rest),
                "clear" => self.clear(),
                "toasts" => self.print_toasts(),
                "dismiss" => self.notifier.dismiss_all(),
                "help" => print_help(),
                "quit" | "exit" => return Ok(()),
                other => println!("Unknown command `{other}`. Type `help`."),
            }
        }
    }

    fn print_list(&self) {
        if self.controller.is_loading() {
            println!("Loading notes...");
            return;
        }
        let visible = self.controller.visible_notes();
        if visible.is_empty() {
            if self.controller.search_term().is_empty() {
                println!("No notes yet.");
            } else {
                println!("No notes match your search.");
            }
            return;
        }
        for (index, note) in visible.iter().enumerate() {
            print_note(index + 1, note);
        }
    }

    fn add(&mut self, rest: &str) {
        let (title, content) = rest.split_once('|').unwrap_or((rest, ""));
        let form = self.controller.form_mut();
        form.title = title.to_string();
        form.content = content.to_string();
        // Outcome is reported through the notifier.
        let _ = self.runtime.block_on(self.controller.submit_form());
    }

    fn pick(&self, rest: &str) -> Option<Note> {
        let visible = self.controller.visible_notes();
        let picked = rest
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| visible.get(index).cloned());
        if picked.is_none() {
            println!("No note at `{}`. Use the number shown by `list`.", rest.trim());
        }
        picked
    }

    fn edit(&mut self, rest: &str) {
        let Some(note) = self.pick(rest) else {
            return;
        };
        let mut card = self.controller.card(note);
        card.begin_edit();
        if let Some(draft) = card.draft() {
            println!("Editing \"{}\"", draft.title);
            println!("  title {}", draft.title);
            println!("  content {}", draft.content);
        }
        self.editing = Some(card);
    }

    fn set_draft(&mut self, apply: impl FnOnce(&mut NoteCard)) {
        match self.editing.as_mut() {
            Some(card) => apply(card),
            None => println!("Not editing. Use `edit <n>` first."),
        }
    }

    fn save(&mut self) {
        let Some(card) = self.editing.as_mut() else {
            println!("Not editing. Use `edit <n>` first.");
            return;
        };
        // Failures keep the card in edit mode with its draft.
        let _ = self.runtime.block_on(card.save());
        if !card.is_editing() {
            self.editing = None;
        }
    }

    fn cancel(&mut self) {
        match self.editing.take().and_then(|mut card| card.cancel()) {
            Some(original) => println!("Edit cancelled; \"{}\" is unchanged.", original.title),
            None => println!("Not editing."),
        }
    }

    fn delete(&mut self, rest: &str) {
        let Some(note) = self.pick(rest) else {
            return;
        };
        let card = self.controller.card(note);
        if self.runtime.block_on(card.delete()).is_ok()
            && self.editing.as_ref().map(NoteCard::id) == Some(card.id())
        {
            self.editing = None;
        }
    }

    fn clear(&mut self) {
        let confirm = StdinConfirm;
        match self.runtime.block_on(self.controller.clear_all(&confirm)) {
            Ok(ClearOutcome::Declined) => println!("Nothing was deleted."),
            Ok(ClearOutcome::Cleared(_)) => self.editing = None,
            Ok(ClearOutcome::NothingToClear) | Err(_) => {}
        }
    }

    fn print_toasts(&self) {
        let visible = self.notifier.visible();
        if visible.is_empty() {
            println!("No recent notifications.");
        }
        for toast in visible {
            println!("[{}] {}", toast.level.as_str(), toast.message);
        }
    }
}

/// Prints a one-line notice whenever a snapshot changes the list.
async fn echo_feed(mut updates: watch::Receiver<ListState>) {
    let mut seen = updates.borrow_and_update().revision;
    while updates.changed().await.is_ok() {
        let (revision, count, live) = {
            let state = updates.borrow_and_update();
            (state.revision, state.notes.len(), state.is_live())
        };
        if !live {
            break;
        }
        if revision != seen {
            seen = revision;
            println!("\n[feed] {count} notes; type `list` to show them");
        }
    }
}

fn print_note(index: usize, note: &Note) {
    println!(
        "{index:>3}. {}  ({})",
        note.title,
        format_created_at(note.created_at)
    );
    for line in note.content.lines() {
        println!("     {line}");
    }
}

fn print_help() {
    println!("Commands:");
    println!("  list                    show notes, newest first");
    println!("  add <title> | <content> create a note");
    println!("  search [term]           filter by title or content; empty clears");
    println!("  edit <n>                start editing note n");
    println!("  title <text>            set the draft title");
    println!("  content <text>          set the draft content");
    println!("  save | cancel           finish editing");
    println!("  delete <n>              delete note n");
    println!("  clear                   delete every note");
    println!("  toasts | dismiss        show or dismiss recent notifications");
    println!("  help | quit");
}

/// Prints each notification and keeps it on screen for the auto-close window.
#[derive(Default)]
struct ConsoleNotifier {
    toasts: Mutex<ToastQueue>,
}

impl ConsoleNotifier {
    fn dismiss_all(&self) {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.dismiss_all();
        }
    }

    fn visible(&self) -> Vec<Notification> {
        match self.toasts.lock() {
            Ok(mut toasts) => toasts.visible(Instant::now()),
            Err(_) => Vec::new(),
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        let marker = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Info => "--",
            NotificationLevel::Error => "!!",
        };
        println!("[{marker}] {}", notification.message);
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.push(notification, Instant::now());
        }
    }
}

/// Asks on stdin; anything but `y`/`yes` declines.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if let Err(err) = io::stdin().lock().read_line(&mut answer) {
            error!("event=confirm_read module=cli status=error error={err}");
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
