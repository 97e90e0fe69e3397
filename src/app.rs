use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::HttpBackend;
use crate::config::Config;
use crate::credential::FileStore;
use crate::error::ClientResult;
use crate::orchestrator::Orchestrator;
use crate::session::Session;

/// Initialize tracing and logging for the application. `RUST_LOG` takes
/// precedence over `default_filter`. Returns false if a subscriber was
/// already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Build an orchestrator talking HTTP to `config.api_base`, with the
/// credential loaded from the on-disk store
pub fn create_orchestrator(config: Config) -> ClientResult<Orchestrator<HttpBackend, FileStore>> {
    info!("Initializing client for {}", config.api_base);

    let store = FileStore::new(config.credentials_file()?);
    info!("Credential store at {}", store.path().display());
    let session = Session::load(store, config.model)?;
    let backend = HttpBackend::new(config.clone())?;

    Ok(Orchestrator::new(backend, session, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_LOG_FILTER;

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        init_tracing(DEFAULT_LOG_FILTER);
        assert!(!init_tracing(DEFAULT_LOG_FILTER));
    }
}
