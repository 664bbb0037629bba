use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use ledger_service::config::Config;

/// One-shot ops tool: waits for Postgres to accept connections, then runs
/// migrations. Meant to run once before the service starts, the same role
/// `wait_for_db` plus `migrate` played in the original deployment.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    println!("Connecting to {}...", config.database_url);

    let pool = wait_for_db(&config.database_url, 10, Duration::from_secs(2)).await?;

    println!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| format!("Migration failed: {}", e))?;

    println!("Database ready.");
    Ok(())
}

async fn wait_for_db(
    database_url: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<sqlx::PgPool, Box<dyn std::error::Error>> {
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < max_attempts => {
                println!(
                    "database not ready yet (attempt {attempt}/{max_attempts}): {e}, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(format!("failed to connect after {max_attempts} attempts: {e}").into()),
        }
    }
    unreachable!()
}
