use prioq_core::{ServiceBuilder, ServiceConfig};
use prioq_transport::EndpointServer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };

    let level = config.log_level()?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let threads = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name("prioq-worker")
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let service = ServiceBuilder::new().with_config(config).start();
        let server = EndpointServer::bind(service)?;

        server
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("prioqd: cannot listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("prioqd: shutdown requested");
            })
            .await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
