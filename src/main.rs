use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use log::error;
use std::io::Write;
use std::sync::Arc;
use werkbank::cli::{Cli, Command};
use werkbank::domains::processes::{BackgroundProcess, ProcessRegistry, UnixProcessProbe};
use werkbank::domains::repos::progress::ProgressSink;
use werkbank::domains::repos::spec::RepoSpec;
use werkbank::domains::repos::sync::DirtyReport;
use werkbank::domains::sessions::{
    DisplayMode, ExitChoice, ResumeController, ResumeUi, Session, SessionUpdate,
    SubprocessAgentRunner,
};
use werkbank::infrastructure::database::{AppConfigMethods, Database, SessionMethods};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are not errors; everything else is a
            // resolvable user error.
            let is_error = err.use_stderr();
            let _ = err.print();
            std::process::exit(if is_error { 1 } else { 0 });
        }
    };

    if let Err(err) = dispatch(cli).await {
        error!("{err:#}");
        eprintln!("werkbank: {err:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let db = Database::new(None)?;
    let registry = ProcessRegistry::new(db.clone(), Arc::new(UnixProcessProbe));

    match cli.command {
        Command::Resume {
            name,
            plain,
            skip_refresh,
        } => {
            let session = db.get_session(&name)?;
            let mode = if plain {
                DisplayMode::Plain
            } else {
                DisplayMode::Rich
            };
            let agent_command = db.get_agent_command()?;
            let agent = Arc::new(SubprocessAgentRunner::new(registry.clone(), agent_command));

            ResumeController::new(
                session,
                mode,
                !skip_refresh,
                db,
                registry,
                Arc::new(PlainUi),
                agent,
            )
            .run()
            .await
        }
        Command::Ps { session } => {
            let processes = match session {
                Some(name) => registry.list_for_session(&name)?,
                None => registry.list_running()?,
            };
            if processes.is_empty() {
                println!("no running agent processes");
            }
            for process in processes {
                println!(
                    "{:<8} {:<20} {}  {}",
                    process.pid,
                    process.session_name,
                    process.start_time.format("%Y-%m-%d %H:%M:%S"),
                    process.command
                );
            }
            Ok(())
        }
        Command::Kill { pid } => {
            let outcome = registry.kill(pid).await?;
            println!("process {pid} terminated ({outcome:?})");
            Ok(())
        }
    }
}

/// Line-oriented prompts over inherited stdio. Rich terminal rendering is a
/// separate front end; this one is enough to drive the resume cycle from a
/// plain shell or a script.
struct PlainUi;

async fn prompt_line(prompt: String) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        print!("{prompt}");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    })
    .await
    .ok()
    .flatten()
}

async fn confirm(prompt: String) -> bool {
    matches!(
        prompt_line(format!("{prompt} [y/N] ")).await.as_deref(),
        Some("y") | Some("Y") | Some("yes")
    )
}

fn printing_sink(heading: String, labels: Vec<String>) -> ProgressSink {
    let (sink, mut rx) = ProgressSink::channel();
    tokio::spawn(async move {
        println!("{heading}");
        while let Some(event) = rx.recv().await {
            let label = event
                .repo_index
                .and_then(|index| labels.get(index).cloned())
                .unwrap_or_else(|| "-".to_string());
            match event.lines.as_ref().and_then(|lines| lines.last()) {
                Some(line) => println!("  {label}: {} | {line}", event.status),
                None => println!("  {label}: {}", event.status),
            }
        }
    });
    sink
}

#[async_trait]
impl ResumeUi for PlainUi {
    async fn confirm_running_agents(&self, processes: &[BackgroundProcess]) -> bool {
        println!("agent processes are already running against this session:");
        for process in processes {
            println!("  pid {}: {}", process.pid, process.command);
        }
        confirm("continue anyway?".to_string()).await
    }

    async fn confirm_reclone(&self, repo: &RepoSpec, reason: &str) -> bool {
        println!("refresh of {} failed: {reason}", repo.spec);
        confirm(format!("reclone {} (destroys local state)?", repo.spec)).await
    }

    async fn exit_choice(&self, _session: &Session, dirty: &DirtyReport) -> ExitChoice {
        if dirty.has_changes {
            println!(
                "repos with uncommitted changes: {}",
                dirty.repos_with_changes.join(", ")
            );
        }
        loop {
            let Some(answer) =
                prompt_line("[r]esume, [e]dit, [d]elete, [q] home: ".to_string()).await
            else {
                return ExitChoice::Home;
            };
            match answer.as_str() {
                "r" | "resume" => return ExitChoice::Resume,
                "e" | "edit" => return ExitChoice::Edit,
                "d" | "delete" => return ExitChoice::Delete,
                "q" | "home" | "" => return ExitChoice::Home,
                other => println!("unrecognized choice '{other}'"),
            }
        }
    }

    async fn confirm_delete(&self, session: &Session) -> bool {
        confirm(format!(
            "permanently delete session '{}' and all its files?",
            session.name
        ))
        .await
    }

    async fn edit_settings(&self, _session: &Session) -> Option<SessionUpdate> {
        // The settings form ships with the rich front end.
        println!("settings editing is not available in plain mode");
        None
    }

    fn refresh_sink(&self, session: &Session, read_only: &[RepoSpec]) -> ProgressSink {
        printing_sink(
            format!("refreshing read-only repos of '{}'", session.name),
            read_only.iter().map(|repo| repo.spec.clone()).collect(),
        )
    }

    fn reclone_sink(&self, repo: &RepoSpec) -> ProgressSink {
        printing_sink(format!("recloning {}", repo.spec), vec![repo.spec.clone()])
    }

    fn report_error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}
