#[cfg(feature = "multi-thread")]
use geolookup::config::ConfigThreads;
use geolookup::clock::SystemClock;
use geolookup::config::{parse_config, Config};
use geolookup::loader::{HttpSource, RangeLoader, RangeUpdater};
use geolookup::service::{log_response, make_error_response, LookupService};
use geolookup::store::{IntervalStore, StoreError};

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server};
use std::convert::Infallible;
use std::sync::Arc;

async fn async_main(config: Config) -> anyhow::Result<()> {
    let host = config.host;

    simple_logger::init_with_level(config.log_level)?;

    let source = HttpSource::new(config.data_uri()?.clone(), config.source.timeout());

    let store_config = config.store.clone();
    let store = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
        Ok(Arc::new(IntervalStore::from_config(&store_config)?))
    })
    .await??;

    let loader = Arc::new(RangeLoader::new(store.clone(), source, SystemClock));
    let mut updater = RangeUpdater::new(config.source.refresh_at);
    updater.start(loader);

    let lookup_service = Arc::new(LookupService::from_config(&config, store));

    let make_service = make_service_fn(move |connection: &AddrStream| {
        let socket_remote_ip = connection.remote_addr().ip();
        let lookup_service = lookup_service.clone();
        let service = service_fn(move |request: Request<Body>| {
            let lookup_service = lookup_service.clone();
            async move {
                let response = lookup_service
                    .response(socket_remote_ip, &request)
                    .unwrap_or_else(make_error_response);
                log_response(socket_remote_ip, &request, &response);
                Ok::<_, Infallible>(response)
            }
        });
        async move { Ok::<_, Infallible>(service) }
    });

    let server = Server::try_bind(&host)?.serve(make_service);
    log::info!("Listening on http://{host}");

    if let Err(e) = server.await {
        log::error!("server error: {}", e);
    }
    drop(updater);
    Err(anyhow::anyhow!("server exited"))
}

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "geolookup.toml".to_owned());

    let config = parse_config(&config_path)?;

    #[cfg(feature = "multi-thread")]
    let mut runtime_builder = match config.threads {
        ConfigThreads::Custom(threads) => match threads.into() {
            1 => tokio::runtime::Builder::new_current_thread(),
            threads => {
                let mut builder = tokio::runtime::Builder::new_multi_thread();
                builder.worker_threads(threads);
                builder
            }
        },
        ConfigThreads::Cores => tokio::runtime::Builder::new_multi_thread(),
    };
    #[cfg(not(feature = "multi-thread"))]
    let mut runtime_builder = tokio::runtime::Builder::new_current_thread();
    let runtime = runtime_builder.enable_all().build()?;

    runtime.block_on(async_main(config))
}
