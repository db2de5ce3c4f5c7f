use sqlx::PgPool;

/// Runs [`kanau::processor::Processor`] database operations against a pool.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
