use sqlx::postgres::PgPoolOptions;

pub use migrations::run_migrations;

pub mod migrations;

pub type Database = sqlx::Pool<sqlx::Postgres>;

pub async fn connect(url: &str) -> Database {
    PgPoolOptions::new().connect(url).await.unwrap()
}

#[derive(Debug, sqlx::FromRow, Default)]
pub(crate) struct SumRow<T> {
    pub sum: T,
}
