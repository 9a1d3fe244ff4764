pub mod processes;
pub mod repos;
pub mod sessions;
