pub mod database;
pub mod session_repository;

pub use database::Database;
pub use session_repository::SqliteSessionRepository;
