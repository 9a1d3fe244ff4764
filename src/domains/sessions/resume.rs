use super::agent::{AgentRunner, DisplayMode};
use super::context;
use super::entity::{Session, SessionUpdate};
use crate::domains::processes::{BackgroundProcess, ProcessRegistry};
use crate::domains::repos::progress::ProgressSink;
use crate::domains::repos::spec::RepoSpec;
use crate::domains::repos::sync::{self, DirtyReport, RefreshStatus};
use crate::infrastructure::database::{Database, SessionMethods};
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

/// States of one resume cycle. Every transition lives in [`ResumeController::step`]
/// so each is testable on its own; `Home` is the only terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    Init,
    BackgroundCheck,
    RefreshDecision,
    RunningAgent,
    ExitPrompt,
    Home,
}

/// What the user picked after the agent exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitChoice {
    Resume,
    Edit,
    Delete,
    Home,
}

/// Interactive collaborator of the resume cycle. A cancelled prompt is a
/// choice (usually `Home`), never an error.
#[async_trait]
pub trait ResumeUi: Send + Sync {
    /// Warns that agents are already running against the session; returning
    /// false aborts straight to Home without running anything.
    async fn confirm_running_agents(&self, processes: &[BackgroundProcess]) -> bool;

    /// Offers to reclone one repo whose refresh failed.
    async fn confirm_reclone(&self, repo: &RepoSpec, reason: &str) -> bool;

    async fn exit_choice(&self, session: &Session, dirty: &DirtyReport) -> ExitChoice;

    async fn confirm_delete(&self, session: &Session) -> bool;

    /// Opens settings editing; `None` means the edit was cancelled.
    async fn edit_settings(&self, session: &Session) -> Option<SessionUpdate>;

    /// Sink for the refresh pass over the session's read-only repos. The UI
    /// owns the consumer end and renders however it likes.
    fn refresh_sink(&self, session: &Session, read_only: &[RepoSpec]) -> ProgressSink;

    fn reclone_sink(&self, repo: &RepoSpec) -> ProgressSink;

    fn report_error(&self, message: &str);
}

/// Sequences one session resume: background-process check, conditional
/// refresh of read-only repos, agent run, and the exit prompt loop.
///
/// No repo operation failure is fatal here; every failure downgrades to a
/// visible status the user resolves. The controller has no retry logic of
/// its own.
pub struct ResumeController {
    session: Session,
    mode: DisplayMode,
    refresh_due: bool,
    db: Database,
    registry: ProcessRegistry,
    ui: Arc<dyn ResumeUi>,
    agent: Arc<dyn AgentRunner>,
}

impl ResumeController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Session,
        mode: DisplayMode,
        initial_refresh: bool,
        db: Database,
        registry: ProcessRegistry,
        ui: Arc<dyn ResumeUi>,
        agent: Arc<dyn AgentRunner>,
    ) -> Self {
        Self {
            session,
            mode,
            refresh_due: initial_refresh,
            db,
            registry,
            ui,
            agent,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut state = ResumeState::Init;
        while state != ResumeState::Home {
            state = self.step(state).await?;
        }
        info!("Session '{}' returned home", self.session.name);
        Ok(())
    }

    /// Executes one transition and returns the next state.
    pub async fn step(&mut self, state: ResumeState) -> Result<ResumeState> {
        match state {
            ResumeState::Init => Ok(match self.mode {
                DisplayMode::Rich => ResumeState::BackgroundCheck,
                DisplayMode::Plain => ResumeState::RefreshDecision,
            }),
            ResumeState::BackgroundCheck => self.step_background_check().await,
            ResumeState::RefreshDecision => self.step_refresh_decision().await,
            ResumeState::RunningAgent => self.step_running_agent().await,
            ResumeState::ExitPrompt => self.step_exit_prompt().await,
            ResumeState::Home => Ok(ResumeState::Home),
        }
    }

    async fn step_background_check(&mut self) -> Result<ResumeState> {
        let running = self.registry.list_for_session(&self.session.name)?;
        if running.is_empty() {
            return Ok(ResumeState::RefreshDecision);
        }

        warn!(
            "{} agent process(es) already running against session '{}'",
            running.len(),
            self.session.name
        );
        if self.ui.confirm_running_agents(&running).await {
            Ok(ResumeState::RefreshDecision)
        } else {
            Ok(ResumeState::Home)
        }
    }

    async fn step_refresh_decision(&mut self) -> Result<ResumeState> {
        let refresh_now = self.refresh_due;
        // Only the first pass honors the caller's flag; every later loop
        // iteration refreshes unconditionally.
        self.refresh_due = true;

        if refresh_now {
            self.refresh_and_offer_reclones().await?;
        }
        Ok(ResumeState::RunningAgent)
    }

    async fn refresh_and_offer_reclones(&self) -> Result<()> {
        let read_only = self.session.read_only_repos();
        if read_only.is_empty() {
            return Ok(());
        }

        let sink = self.ui.refresh_sink(&self.session, &read_only);
        let results = sync::refresh_repos(&self.session.repos, &self.session.path, &sink).await?;

        // Reclone stays sequential: concurrent replacement of sibling
        // directories is an unresolved question upstream.
        for result in results
            .into_iter()
            .filter(|result| result.status == RefreshStatus::Error)
        {
            let reason = result
                .reason
                .unwrap_or_else(|| "unknown error".to_string());
            if !self.ui.confirm_reclone(&result.repo, &reason).await {
                continue;
            }

            let sink = self.ui.reclone_sink(&result.repo);
            if let Err(err) = sync::reclone_repo(&result.repo, &self.session.path, &sink).await {
                warn!("Reclone of '{}' failed: {err:#}", result.repo.spec);
                self.ui
                    .report_error(&format!("Reclone of '{}' failed: {err:#}", result.repo.spec));
            }
        }
        Ok(())
    }

    async fn step_running_agent(&mut self) -> Result<ResumeState> {
        match self.agent.run(&self.session, self.mode).await {
            Ok(exit) => info!(
                "Agent for session '{}' exited with code {:?}",
                self.session.name, exit.exit_code
            ),
            Err(err) => {
                warn!("Agent run for session '{}' failed: {err:#}", self.session.name);
                self.ui.report_error(&format!("Agent failed: {err:#}"));
            }
        }
        Ok(ResumeState::ExitPrompt)
    }

    async fn step_exit_prompt(&mut self) -> Result<ResumeState> {
        let dirty = sync::session_dirty(&self.session.repos, &self.session.path).await?;

        match self.ui.exit_choice(&self.session, &dirty).await {
            ExitChoice::Resume => Ok(ResumeState::RefreshDecision),
            ExitChoice::Home => Ok(ResumeState::Home),
            ExitChoice::Delete => {
                if self.ui.confirm_delete(&self.session).await {
                    self.delete_session().await?;
                    Ok(ResumeState::Home)
                } else {
                    Ok(ResumeState::ExitPrompt)
                }
            }
            ExitChoice::Edit => {
                if let Some(update) = self.ui.edit_settings(&self.session).await {
                    self.session.apply_update(update);
                    self.db.update_session_settings(&self.session)?;
                    if let Err(err) = context::write_agent_context(&self.session) {
                        warn!(
                            "Failed to regenerate agent context for '{}': {err:#}",
                            self.session.name
                        );
                        self.ui
                            .report_error(&format!("Failed to regenerate agent context: {err:#}"));
                    }
                    info!("Session '{}' settings updated", self.session.name);
                }
                Ok(ResumeState::ExitPrompt)
            }
        }
    }

    /// Removes registry rows, the database row, and the session directory.
    /// Running agents are not signalled; their rows are dropped with the
    /// session.
    async fn delete_session(&self) -> Result<()> {
        info!("Deleting session '{}'", self.session.name);
        self.registry.remove_for_session(&self.session.name)?;
        self.db.delete_session(&self.session.name)?;

        match tokio::fs::remove_dir_all(&self.session.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    "Failed to remove session directory {}: {err}",
                    self.session.path.display()
                );
                self.ui.report_error(&format!(
                    "Failed to remove {}: {err}",
                    self.session.path.display()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl ResumeController {
    pub(crate) fn refresh_due(&self) -> bool {
        self.refresh_due
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::processes::probe::ProcessProbe;
    use crate::domains::processes::registry::tests::FakeProbe;
    use crate::domains::repos::spec::GIT_BASE_ENV;
    use crate::domains::sessions::agent::AgentExit;
    use crate::infrastructure::database::ProcessMethods;
    use crate::utils::env_adapter::ScopedEnv;
    use serial_test::serial;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct ScriptedUi {
        continue_with_running: bool,
        reclone: bool,
        delete_confirm: bool,
        exit_choices: Mutex<VecDeque<ExitChoice>>,
        edit: Mutex<Option<SessionUpdate>>,
        running_warnings: AtomicUsize,
        reclone_prompts: Mutex<Vec<String>>,
        dirty_reports: Mutex<Vec<DirtyReport>>,
        errors: Mutex<Vec<String>>,
    }

    impl ScriptedUi {
        fn new(exit_choices: &[ExitChoice]) -> Self {
            Self {
                continue_with_running: true,
                reclone: false,
                delete_confirm: true,
                exit_choices: Mutex::new(exit_choices.iter().copied().collect()),
                edit: Mutex::new(None),
                running_warnings: AtomicUsize::new(0),
                reclone_prompts: Mutex::new(Vec::new()),
                dirty_reports: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResumeUi for ScriptedUi {
        async fn confirm_running_agents(&self, _processes: &[BackgroundProcess]) -> bool {
            self.running_warnings.fetch_add(1, Ordering::SeqCst);
            self.continue_with_running
        }

        async fn confirm_reclone(&self, repo: &RepoSpec, _reason: &str) -> bool {
            self.reclone_prompts
                .lock()
                .expect("prompts mutex")
                .push(repo.spec.clone());
            self.reclone
        }

        async fn exit_choice(&self, _session: &Session, dirty: &DirtyReport) -> ExitChoice {
            self.dirty_reports
                .lock()
                .expect("reports mutex")
                .push(dirty.clone());
            self.exit_choices
                .lock()
                .expect("choices mutex")
                .pop_front()
                .unwrap_or(ExitChoice::Home)
        }

        async fn confirm_delete(&self, _session: &Session) -> bool {
            self.delete_confirm
        }

        async fn edit_settings(&self, _session: &Session) -> Option<SessionUpdate> {
            self.edit.lock().expect("edit mutex").take()
        }

        fn refresh_sink(&self, _session: &Session, _read_only: &[RepoSpec]) -> ProgressSink {
            ProgressSink::discard()
        }

        fn reclone_sink(&self, _repo: &RepoSpec) -> ProgressSink {
            ProgressSink::discard()
        }

        fn report_error(&self, message: &str) {
            self.errors
                .lock()
                .expect("errors mutex")
                .push(message.to_string());
        }
    }

    struct FakeAgent {
        runs: AtomicUsize,
    }

    impl FakeAgent {
        fn new() -> Self {
            Self {
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AgentRunner for FakeAgent {
        async fn run(&self, _session: &Session, _mode: DisplayMode) -> Result<AgentExit> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(AgentExit { exit_code: Some(0) })
        }
    }

    struct Fixture {
        _dir: TempDir,
        db: Database,
        registry: ProcessRegistry,
        probe: Arc<FakeProbe>,
        session: Session,
    }

    fn fixture(repos: Vec<RepoSpec>) -> Fixture {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(Some(dir.path().join("resume.db"))).expect("open db");
        let probe = Arc::new(FakeProbe::new(&[4000], true));
        let registry = ProcessRegistry::new(db.clone(), probe.clone());

        let session_path = dir.path().join("session");
        std::fs::create_dir_all(&session_path).expect("session dir");
        let session = Session::new(
            "alpha".to_string(),
            session_path,
            "test goal".to_string(),
            repos,
            vec![],
        );
        db.create_session(&session).expect("persist session");

        Fixture {
            _dir: dir,
            db,
            registry,
            probe,
            session,
        }
    }

    fn controller(
        fx: &Fixture,
        mode: DisplayMode,
        initial_refresh: bool,
        ui: Arc<ScriptedUi>,
        agent: Arc<FakeAgent>,
    ) -> ResumeController {
        ResumeController::new(
            fx.session.clone(),
            mode,
            initial_refresh,
            fx.db.clone(),
            fx.registry.clone(),
            ui,
            agent,
        )
    }

    #[tokio::test]
    async fn plain_mode_skips_background_check() {
        let fx = fixture(vec![]);
        let ui = Arc::new(ScriptedUi::new(&[]));
        let agent = Arc::new(FakeAgent::new());

        let mut plain = controller(&fx, DisplayMode::Plain, true, ui.clone(), agent.clone());
        assert_eq!(
            plain.step(ResumeState::Init).await.unwrap(),
            ResumeState::RefreshDecision
        );

        let mut rich = controller(&fx, DisplayMode::Rich, true, ui, agent);
        assert_eq!(
            rich.step(ResumeState::Init).await.unwrap(),
            ResumeState::BackgroundCheck
        );
    }

    #[tokio::test]
    async fn background_check_without_processes_asks_nothing() {
        let fx = fixture(vec![]);
        let ui = Arc::new(ScriptedUi::new(&[]));
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Rich, true, ui.clone(), agent);
        assert_eq!(
            ctrl.step(ResumeState::BackgroundCheck).await.unwrap(),
            ResumeState::RefreshDecision
        );
        assert_eq!(ui.running_warnings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn declining_the_running_agents_warning_goes_home() {
        let fx = fixture(vec![]);
        fx.registry
            .register(4000, "claude", "coding agent", "alpha")
            .unwrap();

        let mut ui = ScriptedUi::new(&[]);
        ui.continue_with_running = false;
        let ui = Arc::new(ui);
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Rich, true, ui.clone(), agent.clone());
        assert_eq!(
            ctrl.step(ResumeState::BackgroundCheck).await.unwrap(),
            ResumeState::Home
        );
        assert_eq!(ui.running_warnings.load(Ordering::SeqCst), 1);
        assert_eq!(agent.runs.load(Ordering::SeqCst), 0, "agent must not start");
    }

    #[tokio::test]
    async fn resume_choice_loops_and_runs_the_agent_again() {
        let fx = fixture(vec![]);
        let ui = Arc::new(ScriptedUi::new(&[ExitChoice::Resume, ExitChoice::Home]));
        let agent = Arc::new(FakeAgent::new());

        controller(&fx, DisplayMode::Plain, false, ui, agent.clone())
            .run()
            .await
            .expect("full resume cycle");

        assert_eq!(agent.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_flag_is_forced_after_the_first_decision() {
        let fx = fixture(vec![]);
        let ui = Arc::new(ScriptedUi::new(&[]));
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Plain, false, ui, agent);
        assert!(!ctrl.refresh_due());

        assert_eq!(
            ctrl.step(ResumeState::RefreshDecision).await.unwrap(),
            ResumeState::RunningAgent
        );
        assert!(ctrl.refresh_due(), "later loops must always refresh");
    }

    #[tokio::test]
    async fn delete_choice_removes_files_rows_and_registry_entries() {
        let fx = fixture(vec![]);
        fx.registry
            .register(4000, "claude", "coding agent", "alpha")
            .unwrap();
        std::fs::write(fx.session.path.join("scratch.txt"), "data").unwrap();

        let ui = Arc::new(ScriptedUi::new(&[ExitChoice::Delete]));
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Plain, false, ui, agent);
        assert_eq!(
            ctrl.step(ResumeState::ExitPrompt).await.unwrap(),
            ResumeState::Home
        );

        assert!(!fx.session.path.exists(), "session directory must be gone");
        assert!(fx.db.get_session("alpha").is_err(), "db row must be gone");
        assert!(
            fx.db.list_processes().unwrap().is_empty(),
            "registry rows must be gone even though the pid was alive"
        );
        assert!(fx.probe.is_alive(4000), "deletion must not signal processes");
    }

    #[tokio::test]
    async fn declined_delete_returns_to_the_exit_prompt() {
        let fx = fixture(vec![]);
        let mut ui = ScriptedUi::new(&[ExitChoice::Delete]);
        ui.delete_confirm = false;
        let ui = Arc::new(ui);
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Plain, false, ui, agent);
        assert_eq!(
            ctrl.step(ResumeState::ExitPrompt).await.unwrap(),
            ResumeState::ExitPrompt
        );
        assert!(fx.session.path.exists());
        assert!(fx.db.get_session("alpha").is_ok());
    }

    #[tokio::test]
    async fn edit_persists_settings_and_regenerates_context() {
        let fx = fixture(vec![RepoSpec::parse("acme/lib").unwrap()]);
        let ui = Arc::new(ScriptedUi::new(&[ExitChoice::Edit]));
        *ui.edit.lock().unwrap() = Some(SessionUpdate {
            goal: "revised goal".to_string(),
            repos: vec![RepoSpec::parse("acme/lib").unwrap()],
            skills: vec!["sqlite".to_string()],
        });
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Plain, false, ui, agent);
        assert_eq!(
            ctrl.step(ResumeState::ExitPrompt).await.unwrap(),
            ResumeState::ExitPrompt,
            "edit loops back to the exit prompt, not the agent"
        );

        assert_eq!(ctrl.session().goal, "revised goal");
        let stored = fx.db.get_session("alpha").unwrap();
        assert_eq!(stored.goal, "revised goal");
        assert_eq!(stored.skills, vec!["sqlite".to_string()]);

        let rendered =
            std::fs::read_to_string(fx.session.path.join(context::AGENT_CONTEXT_FILE)).unwrap();
        assert!(rendered.contains("revised goal"));
    }

    #[tokio::test]
    async fn cancelled_edit_changes_nothing() {
        let fx = fixture(vec![]);
        let ui = Arc::new(ScriptedUi::new(&[ExitChoice::Edit]));
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Plain, false, ui, agent);
        assert_eq!(
            ctrl.step(ResumeState::ExitPrompt).await.unwrap(),
            ResumeState::ExitPrompt
        );
        assert_eq!(fx.db.get_session("alpha").unwrap().goal, "test goal");
    }

    #[tokio::test]
    #[serial]
    async fn refresh_errors_prompt_reclone_and_failures_do_not_abort() {
        // The remote base points at an empty directory: the pull fails (the
        // repo was never cloned) and the accepted reclone fails too.
        let remotes = TempDir::new().expect("remotes dir");
        let _base = ScopedEnv::set(GIT_BASE_ENV, &format!("file://{}", remotes.path().display()));

        let fx = fixture(vec![RepoSpec::parse("acme/lib").unwrap().with_read_only(true)]);
        let mut ui = ScriptedUi::new(&[]);
        ui.reclone = true;
        let ui = Arc::new(ui);
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Plain, true, ui.clone(), agent);
        let next = ctrl.step(ResumeState::RefreshDecision).await.unwrap();

        assert_eq!(next, ResumeState::RunningAgent, "failures never abort the flow");
        assert_eq!(
            *ui.reclone_prompts.lock().unwrap(),
            vec!["acme/lib".to_string()]
        );
        let errors = ui.errors.lock().unwrap();
        assert_eq!(errors.len(), 1, "the reclone failure must be reported");
        assert!(errors[0].contains("acme/lib"));
    }

    #[tokio::test]
    async fn exit_prompt_passes_the_dirty_report_to_the_ui() {
        let fx = fixture(vec![RepoSpec::parse("acme/lib").unwrap()]);

        // A real repo with an untracked file makes the session dirty.
        let repo_dir = fx.session.path.join("lib");
        std::fs::create_dir_all(&repo_dir).unwrap();
        let init = std::process::Command::new("git")
            .args(["init"])
            .current_dir(&repo_dir)
            .status()
            .expect("git init");
        assert!(init.success());
        std::fs::write(repo_dir.join("wip.txt"), "uncommitted").unwrap();

        let ui = Arc::new(ScriptedUi::new(&[ExitChoice::Home]));
        let agent = Arc::new(FakeAgent::new());

        let mut ctrl = controller(&fx, DisplayMode::Plain, false, ui.clone(), agent);
        assert_eq!(
            ctrl.step(ResumeState::ExitPrompt).await.unwrap(),
            ResumeState::Home
        );

        let reports = ui.dirty_reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].has_changes);
        assert_eq!(reports[0].repos_with_changes, vec!["lib".to_string()]);
    }
}
