use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "vidtube".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "accounts".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables, fields and indexes. Safe to run on every startup.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Credential store
        "DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS uid ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS username ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS full_name ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS avatar ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS cover_image ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS password_hash ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS refresh_token ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE user TYPE datetime VALUE time::now();",

        // Uniqueness is enforced by the store, not by callers
        "DEFINE INDEX IF NOT EXISTS user_uid ON TABLE user COLUMNS uid UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_username ON TABLE user COLUMNS username UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;",

        // Session audit trail
        "DEFINE TABLE IF NOT EXISTS audit_log SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE audit_log TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS action ON TABLE audit_log TYPE string;
         DEFINE FIELD IF NOT EXISTS details ON TABLE audit_log FLEXIBLE TYPE option<object>;
         DEFINE FIELD IF NOT EXISTS ip_address ON TABLE audit_log TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS user_agent ON TABLE audit_log TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE audit_log TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS audit_log_user ON TABLE audit_log COLUMNS user_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
