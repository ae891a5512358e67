use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::{PgConnection, QueryResult};
use rand::RngCore;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

diesel::define_sql_function! {
    /// SQL `lower()`, matching the case-insensitive index on `hub_user.email`.
    fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

pub fn create_conn(database_url: &str) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(10)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
}

/// Run a blocking diesel closure on the blocking pool.
pub async fn with_conn<F, T>(pool: &DbPool, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| anyhow::anyhow!("DB connection error: {}", e))?;
        f(&mut conn).map_err(|e| anyhow::anyhow!("DB error: {}", e))
    })
    .await
    .map_err(|e| anyhow::anyhow!("Task error: {}", e))?
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS).map_err(
        |e| -> Box<dyn std::error::Error + Send + Sync> {
            Box::new(std::io::Error::other(format!("Migration error: {}", e)))
        },
    )?;
    Ok(())
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
