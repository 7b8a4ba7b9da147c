/*!
 * Command-line interface for filenav
 */

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;

use filenav::commands;
use filenav::config::{Args, Command, Config};
use filenav::navigation::{DirectoryChange, NavigationListener, NavigationView, TaskState};
use filenav::operations::{FileOperations, ItemResult, Operation, OperationListener};
use filenav::path;
use filenav::prompt::{AutoPrompt, Decision, UserPrompt};
use filenav::report::{ReportFormat, Reporter};
use filenav::session::{Session, SessionBuilder};
use filenav::task::CancellationToken;
use filenav::{FileSystemObject, NavError};

/// Asks on the terminal
struct TerminalPrompt;

impl TerminalPrompt {
    fn ask(&self, question: &str) -> Decision {
        eprint!("{} [y/N] ", question);
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => Decision::Cancelled,
            Ok(_) if answer.trim().eq_ignore_ascii_case("y") => Decision::Granted,
            Ok(_) => Decision::Denied,
        }
    }
}

impl UserPrompt for TerminalPrompt {
    fn request_relaunch(&self, cause: &NavError) -> Decision {
        self.ask(&format!("🔐 {}. Retry with elevated privileges?", cause))
    }

    fn confirm_overwrite(&self, paths: &[String]) -> Decision {
        for p in paths {
            eprintln!("  {}", p);
        }
        self.ask(&format!("⚠️ Overwrite {} existing items?", paths.len()))
    }
}

/// Remembers why the last listing failed
#[derive(Default)]
struct CliListener {
    failure: Mutex<Option<String>>,
}

impl NavigationListener for CliListener {
    fn on_navigation_failed(&self, path: &str, error: &NavError) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(format!("{}: {}", path, error));
        }
    }
}

/// Drives an indicatif bar from operation progress
struct ProgressListener {
    bar: ProgressBar,
}

impl OperationListener for ProgressListener {
    fn on_progress(&self, done: usize, total: usize, item: &ItemResult) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
        match &item.error {
            Some(e) => self.bar.println(format!("❌ {}: {}", item.source, e)),
            None => self.bar.set_message(item.source.clone()),
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Absolute normalized form of a command-line path
fn absolute(raw: &str) -> io::Result<String> {
    if raw.starts_with('/') {
        return Ok(path::normalize(raw));
    }
    let cwd = std::env::current_dir()?;
    Ok(path::normalize(&path::join(
        &path::normalize(&cwd.to_string_lossy()),
        raw,
    )))
}

fn stat_all(session: &Session, raw: &[String]) -> io::Result<Vec<FileSystemObject>> {
    raw.iter()
        .map(|p| -> io::Result<FileSystemObject> { Ok(commands::stat(session, &absolute(p)?)?) })
        .collect()
}

fn run_operation(operation: Operation, reporter: &Reporter, bar: ProgressBar) -> io::Result<()> {
    let report = operation.wait();
    bar.finish_and_clear();
    let report = report?;
    println!("{}", reporter.operation(&report));
    if report.is_success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("operation {}", report.status),
        ))
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} {wide_msg:.dim.white} {pos}/{len} ({percent}%) ⏱️  Elapsed: {elapsed_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    if let Some(shell) = args.generate {
        clap_complete::generate(shell, &mut Args::command(), "filenav", &mut io::stdout());
        return Ok(());
    }

    init_logging(args.verbose);

    let config = Config::from_args(&args);
    config.validate()?;

    let prompt: Arc<dyn UserPrompt> = if config.assume_yes {
        Arc::new(AutoPrompt::yes())
    } else {
        Arc::new(TerminalPrompt)
    };
    let session = SessionBuilder::from_config(&config).prompt(prompt).build();
    let reporter = Reporter::new(ReportFormat::ConsoleTable);

    let command = args.command.clone().unwrap_or(Command::Ls {
        path: ".".to_string(),
    });
    match command {
        Command::Ls { path: dir } => {
            let listener = Arc::new(CliListener::default());
            let mut view = NavigationView::new("cli", Arc::clone(&session), listener.clone());
            view.change_current_dir(DirectoryChange::to(&absolute(&dir)?))?;
            if view.wait_idle()? != TaskState::Loaded {
                let failure = listener
                    .failure
                    .lock()
                    .ok()
                    .and_then(|f| f.clone())
                    .unwrap_or_else(|| "listing cancelled".to_string());
                return Err(io::Error::new(io::ErrorKind::Other, failure));
            }
            let current = view.current_dir().unwrap_or(path::ROOT).to_string();
            println!("{}", reporter.listing(&current, view.files()));
        }
        Command::Cp { paths } | Command::Mv { paths } if paths.len() < 2 => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "expected sources followed by a destination directory",
            ));
        }
        Command::Cp { mut paths } => {
            let dest = absolute(&paths.pop().unwrap_or_default())?;
            let sources = stat_all(&session, &paths)?;
            let bar = progress_bar();
            bar.set_prefix("📋 Copying");
            let ops = FileOperations::new(session, Arc::new(ProgressListener { bar: bar.clone() }));
            run_operation(ops.copy(&sources, &dest)?, &reporter, bar)?;
        }
        Command::Mv { mut paths } => {
            let dest = absolute(&paths.pop().unwrap_or_default())?;
            let sources = stat_all(&session, &paths)?;
            let bar = progress_bar();
            bar.set_prefix("🚚 Moving");
            let ops = FileOperations::new(session, Arc::new(ProgressListener { bar: bar.clone() }))
                .with_current_dir(&absolute(".")?);
            run_operation(ops.move_files(&sources, &dest)?, &reporter, bar)?;
        }
        Command::Rename { path: target, name } => {
            let source = commands::stat(&session, &absolute(&target)?)?;
            let bar = progress_bar();
            bar.set_prefix("✏️ Renaming");
            let ops = FileOperations::new(session, Arc::new(ProgressListener { bar: bar.clone() }));
            run_operation(ops.rename(&source, &name)?, &reporter, bar)?;
        }
        Command::Dup { path: target } => {
            let source = commands::stat(&session, &absolute(&target)?)?;
            let bar = progress_bar();
            bar.set_prefix("📑 Duplicating");
            let ops = FileOperations::new(session, Arc::new(ProgressListener { bar: bar.clone() }));
            run_operation(ops.create_duplicate(&source)?, &reporter, bar)?;
        }
        Command::Rm { paths } => {
            let targets = stat_all(&session, &paths)?;
            let bar = progress_bar();
            bar.set_prefix("🗑️ Deleting");
            let ops = FileOperations::new(session, Arc::new(ProgressListener { bar: bar.clone() }));
            run_operation(ops.delete(&targets)?, &reporter, bar)?;
        }
        Command::Find { dir, pattern } => {
            let search = commands::find(&session, &absolute(&dir)?, &pattern, &CancellationToken::new())?;
            println!("{}", reporter.search(&search));
        }
    }

    Ok(())
}
