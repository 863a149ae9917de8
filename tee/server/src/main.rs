use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use teemock_server::config::Config;
use teemock_server::http;
use teemock_server::pki::{
    DirectoryPki, EmbeddedPki, KeyChainProvider, ProviderError, SigningMaterial,
};
use teemock_server::TokenIssuer;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Mock of the Confidential Space launcher token endpoint.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = Config::parse();
    info!(?config, "Loaded configuration");
    let claims_config = config
        .claims_config()
        .context("failed to load claims configuration")?;

    // The issuer must be complete before the socket exists, so clients never
    // connect to a server without signing material.
    let (material, root_pem) = match &config.pki_dir {
        Some(dir) => {
            info!("Loading PKI from {}", dir.display());
            load_pki(&DirectoryPki::new(dir))
        }
        None => load_pki(&EmbeddedPki),
    }
    .context("failed to load signing material")?;
    info!("Root Certificate:\n\n{}", root_pem);

    let issuer = Arc::new(TokenIssuer::new(material, claims_config));

    let listener = http::bind(&config.socket_path)
        .with_context(|| format!("failed to listen on {}", config.socket_path.display()))?;
    info!("Start serving on socket {} ...", config.socket_path.display());

    http::serve(listener, issuer, shutdown_signal()).await;
    http::remove_socket(&config.socket_path).await;

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")
}

fn load_pki<P: KeyChainProvider>(provider: &P) -> Result<(SigningMaterial, String), ProviderError> {
    let material = SigningMaterial::load(provider)?;
    Ok((material, provider.root_certificate_pem()?))
}

async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = terminate => {}
    }
    info!("Received termination signal");
}
