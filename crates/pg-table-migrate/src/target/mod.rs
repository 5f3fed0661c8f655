//! Target-side loading.

mod postgres;

pub use postgres::PgLoader;
