use super::connection::Database;
use anyhow::Result;
use rusqlite::params;

pub const DEFAULT_AGENT_COMMAND: &str = "claude";

pub trait AppConfigMethods {
    fn get_agent_command(&self) -> Result<String>;
    fn set_agent_command(&self, command: &str) -> Result<()>;
}

impl AppConfigMethods for Database {
    fn get_agent_command(&self) -> Result<String> {
        let conn = self.get_conn()?;
        let result: rusqlite::Result<String> = conn.query_row(
            "SELECT agent_command FROM app_config WHERE id = 1",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(command) if !command.trim().is_empty() => Ok(command),
            Ok(_) | Err(rusqlite::Error::QueryReturnedNoRows) => {
                Ok(DEFAULT_AGENT_COMMAND.to_string())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn set_agent_command(&self, command: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE app_config SET agent_command = ?1 WHERE id = 1",
            params![command],
        )?;
        Ok(())
    }
}
