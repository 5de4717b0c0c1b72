use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use roster::config::{ProviderKind, ServerConfig};
use roster::server::{AppState, create_router};
use roster::store::{SqliteStore, Store};
use roster::types::{Profile, Role};

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "A record manager with cookie sessions and role-scoped rows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands for the local provider
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// TOML config file. Flags given on the command line take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind to [default: 127.0.0.1]
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to [default: 8080]
    #[arg(long, short)]
    port: Option<u16>,

    /// Identity and data provider: local or hosted [default: local]
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Data directory for the local database [default: ./data]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Base URL of the hosted provider
    #[arg(long, env = "SUPABASE_URL")]
    provider_url: Option<String>,

    /// Public API key of the hosted provider
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    /// Override the session cookie name
    #[arg(long)]
    cookie_name: Option<String>,

    /// Mark session cookies Secure (serve over HTTPS)
    #[arg(long)]
    secure_cookies: bool,
}

impl ServeArgs {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if self.provider_url.is_some() {
            config.provider_url = self.provider_url;
        }
        if self.anon_key.is_some() {
            config.anon_key = self.anon_key;
        }
        if self.cookie_name.is_some() {
            config.cookie_name = self.cookie_name;
        }
        config.secure_cookies |= self.secure_cookies;

        Ok(config)
    }
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create the local database
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Grant or revoke the admin role of a local account
    SetRole {
        /// Email the account signed up with
        #[arg(long)]
        email: String,

        /// admin or user
        #[arg(long)]
        role: String,

        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

fn db_path(data_dir: PathBuf) -> PathBuf {
    ServerConfig {
        data_dir,
        ..ServerConfig::default()
    }
    .db_path()
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    fs::create_dir_all(&data_dir)?;

    let db_path = db_path(data_dir);
    let existed = db_path.exists();
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    if existed {
        println!("Database already present at {}", db_path.display());
    } else {
        println!("Created database at {}", db_path.display());
    }
    Ok(())
}

fn run_set_role(email: &str, role: &str, data_dir: PathBuf) -> anyhow::Result<()> {
    let Some(role) = Role::parse(role) else {
        bail!("Unknown role '{role}'. Expected 'admin' or 'user'.");
    };

    let db_path = db_path(data_dir);
    if !db_path.exists() {
        bail!(
            "No database at {}. Run 'roster admin init' first.",
            db_path.display()
        );
    }

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    let email = email.trim().to_lowercase();
    let Some(account) = store.get_account_by_email(&email)? else {
        bail!("No account with email '{email}'. Sign up first.");
    };

    let now = Utc::now();
    let created_at = store
        .get_profile(&account.id)?
        .map_or(now, |p| p.created_at);

    store.upsert_profile(&Profile {
        id: account.id.clone(),
        role: role.as_str().to_string(),
        created_at,
        updated_at: now,
    })?;

    println!("Set role of {email} to {role}");
    Ok(())
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config()?;
    let state = Arc::new(AppState::from_config(&config)?);

    match config.provider {
        ProviderKind::Local => info!("Using local provider at {}", config.db_path().display()),
        ProviderKind::Hosted => info!(
            "Using hosted provider at {}",
            config.provider_url.as_deref().unwrap_or_default()
        ),
    }
    info!("Session cookie: {}", state.session_cookie.name);

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("roster=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(data_dir)?,
            AdminCommands::SetRole {
                email,
                role,
                data_dir,
            } => run_set_role(&email, &role, data_dir)?,
        },
        Commands::Serve(args) => run_serve(args).await?,
    }

    Ok(())
}
