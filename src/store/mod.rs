//! PostgreSQL persistence for transfer records

pub mod pg;

pub use pg::{MESSAGE_MATCH_DDL, PgMessageStore};
