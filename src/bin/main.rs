use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use vidtube_auth::auth::{ClientInfo, RegisterRequest};
use vidtube_auth::{AuthConfig, DatabaseConfig, ServerConfig, SessionManager, build_app, parse_ttl};

#[derive(Parser)]
#[command(name = "vidtube-auth")]
#[command(about = "User accounts and session service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(short, long, env = "PORT", default_value = "8000")]
        port: u16,
        /// Interface to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Browser origin allowed to send credentialed requests
        #[arg(long, env = "CORS_ORIGIN")]
        cors_origin: Option<String>,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Initialize the database
    Init {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Create a user account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, env = "NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
    db_url: String,
    #[arg(long, env = "SURREALDB_NAMESPACE", default_value = "vidtube")]
    db_namespace: String,
    #[arg(long, env = "SURREALDB_DATABASE", default_value = "accounts")]
    db_database: String,
    #[arg(long, env = "SURREALDB_USERNAME")]
    db_username: Option<String>,
    #[arg(long, env = "SURREALDB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,
}

impl DbArgs {
    fn into_config(self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.db_url,
            namespace: self.db_namespace,
            database: self.db_database,
            username: self.db_username,
            password: self.db_password,
        }
    }
}

#[derive(Args)]
struct AuthArgs {
    #[arg(long, env = "ACCESS_TOKEN_SECRET", hide_env_values = true)]
    access_token_secret: String,
    /// Access token lifetime, e.g. `15m`, `1h`
    #[arg(long, env = "ACCESS_TOKEN_EXPIRY", default_value = "1h")]
    access_token_expiry: String,
    #[arg(long, env = "REFRESH_TOKEN_SECRET", hide_env_values = true)]
    refresh_token_secret: String,
    /// Refresh token lifetime, e.g. `10d`
    #[arg(long, env = "REFRESH_TOKEN_EXPIRY", default_value = "10d")]
    refresh_token_expiry: String,
    /// bcrypt work factor
    #[arg(long, env = "PASSWORD_HASH_COST", default_value_t = vidtube_auth::config::DEFAULT_PASSWORD_HASH_COST)]
    password_hash_cost: u32,
    /// Omit the `Secure` attribute on session cookies (plain-HTTP development)
    #[arg(long, env = "INSECURE_COOKIES", default_value_t = false)]
    insecure_cookies: bool,
}

impl AuthArgs {
    fn into_config(self) -> Result<AuthConfig> {
        let access_ttl = parse_ttl(&self.access_token_expiry).context("invalid ACCESS_TOKEN_EXPIRY")?;
        let refresh_ttl =
            parse_ttl(&self.refresh_token_expiry).context("invalid REFRESH_TOKEN_EXPIRY")?;

        let config = AuthConfig::new(self.access_token_secret, self.refresh_token_secret)
            .with_access_ttl(access_ttl)
            .with_refresh_ttl(refresh_ttl)
            .with_password_hash_cost(self.password_hash_cost)
            .with_secure_cookies(!self.insecure_cookies);

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("vidtube_auth=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            cors_origin,
            db,
            auth,
        } => {
            let db_config = db.into_config();
            let auth_config = auth.into_config()?;
            let server_config = ServerConfig {
                bind: format!("{}:{}", host, port),
                cors_origin,
                ..Default::default()
            };

            info!("Using database url: {}", db_config.url);
            if !auth_config.secure_cookies {
                tracing::warn!("Session cookies are sent without the Secure attribute");
            }

            let app = build_app(db_config, auth_config, &server_config).await?;

            let listener = tokio::net::TcpListener::bind(&server_config.bind).await?;
            info!("Server listening on http://{}", server_config.bind);

            axum::serve(listener, app).await?;
        }
        Commands::Init { db } => {
            let db_config = db.into_config();
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = vidtube_auth::create_connection(db_config).await?;
            vidtube_auth::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateUser {
            username,
            email,
            full_name,
            password,
            db,
            auth,
        } => {
            let auth_config = auth.into_config()?;
            let db = vidtube_auth::create_connection(db.into_config()).await?;
            vidtube_auth::ensure_schema(&db).await?;

            let sessions = SessionManager::from_db(db, auth_config);
            let user = sessions
                .register(
                    RegisterRequest {
                        full_name,
                        email,
                        username,
                        password,
                        avatar: None,
                        cover_image: None,
                    },
                    &ClientInfo::new(None, Some("vidtube-auth cli".to_string())),
                )
                .await?;

            println!("User created successfully!");
            println!();
            println!("  Id:       {}", user.id);
            println!("  Username: {}", user.username);
            println!("  Email:    {}", user.email);
        }
    }

    Ok(())
}
