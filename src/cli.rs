use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "werkbank",
    version,
    about = "Ephemeral multi-repository workspaces for AI coding agents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resume a session: refresh its read-only repos and launch the agent
    Resume {
        /// Session name
        name: String,
        /// Plain/scripted output instead of the interactive-rich flow
        #[arg(long)]
        plain: bool,
        /// Skip the initial repo refresh (later loops always refresh)
        #[arg(long)]
        skip_refresh: bool,
    },
    /// List live background agent processes
    Ps {
        /// Only processes belonging to this session
        #[arg(long)]
        session: Option<String>,
    },
    /// Terminate a registered background process (graceful, then forced)
    Kill {
        /// Process id from `werkbank ps`
        pid: i32,
    },
}
