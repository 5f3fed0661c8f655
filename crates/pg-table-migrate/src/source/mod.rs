//! Source-side extraction.

mod postgres;

pub use postgres::PgExtractor;
