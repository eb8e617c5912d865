pub mod config;
pub mod etl;
pub mod sqlite_persistence;
pub mod warehouse;
