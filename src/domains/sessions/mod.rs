pub mod agent;
pub mod context;
pub mod entity;
pub mod resume;

pub use agent::{AgentRunner, DisplayMode, SubprocessAgentRunner};
pub use entity::{Session, SessionUpdate};
pub use resume::{ExitChoice, ResumeController, ResumeState, ResumeUi};
