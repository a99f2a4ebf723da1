use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use indictrans_server::config::Config;
use indictrans_server::routes;
use indictrans_server::state::AppState;
use indictrans_server::translate::TranslatorFactory;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, loaded_from) = Config::discover()?;

    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &loaded_from {
        Some(path) => info!("Loaded configuration from: {}", path),
        None => info!("No configuration file found, using defaults"),
    }

    // Model and tokenizer load once and live for the whole process.
    let translator = TranslatorFactory::create(&config).await?;
    info!(
        "Translator ready: {} on {}",
        translator.name(),
        translator.device()
    );

    let addr = config.server.addr();
    let app = routes::app(AppState::new(config, translator));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
