pub mod connection;
pub mod db_app_config;
pub mod db_processes;
pub mod db_schema;
pub mod db_sessions;
pub mod timestamps;

pub use connection::Database;
pub use db_app_config::{AppConfigMethods, DEFAULT_AGENT_COMMAND};
pub use db_processes::ProcessMethods;
pub use db_schema::initialize_schema;
pub use db_sessions::SessionMethods;
