use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use parley_server::auth::jwt::{load_or_generate_jwt_secret, JwtVerifier};
use parley_server::auth::DynVerifier;
use parley_server::chat::router::ConversationRouter;
use parley_server::config::{generate_config_template, Config};
use parley_server::db::sqlite::SqliteStore;
use parley_server::db::DynStore;
use parley_server::routes;
use parley_server::state::AppState;
use parley_server::ws::registry::SessionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "parley_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "parley_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("parley server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite-backed store
    let store: DynStore = Arc::new(SqliteStore::open(&config.data_dir)?);

    // Load or generate JWT signing key (256-bit random, stored in data_dir).
    // Tokens themselves are minted by the identity service with this key.
    let jwt_secret = load_or_generate_jwt_secret(&config.data_dir)?;
    let verifier: DynVerifier = Arc::new(JwtVerifier::new(jwt_secret, store.clone()));

    // Build application state
    let app_state = AppState {
        store,
        verifier,
        sessions: SessionRegistry::new(),
        conversations: ConversationRouter::new(),
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
