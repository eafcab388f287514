//! Test utilities for the database crate.

use crate::{Database, DatabaseConnectionProvider};

use preconf_oracle_migration::{Migrator, MigratorTrait};

/// Instantiates a new file-backed sqlite database in a temporary directory
/// and runs the migrations to set up the schema. The directory is removed
/// when the last handle to the database is dropped.
pub async fn setup_test_db() -> Database {
    let dir = tempfile::Builder::new()
        .prefix("oracle-test-")
        .rand_bytes(8)
        .tempdir()
        .expect("failed to create temp dir");
    let db = Database::test(dir).await.expect("failed to open test database");
    Migrator::up(db.get_connection(), None).await.expect("failed to run migrations");
    db
}
