//! Applies the house-api schema migrations.
//!
//! Usage:
//!   cargo run -p house-api --bin house-migrate
//!   cargo run -p house-api --bin house-migrate -- --revert
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::path::Path;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");
    let revert = std::env::args().any(|arg| arg == "--revert");

    let mut conn = PgConnection::establish(&database_url).expect("failed to connect to database");

    if revert {
        let reverted = conn
            .revert_last_migration(MIGRATIONS)
            .expect("failed to revert migration");
        println!("Reverted: {reverted}");
        return;
    }

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .expect("failed to run migrations");

    if applied.is_empty() {
        println!("Schema is up to date.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }
}
