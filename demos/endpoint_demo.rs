use prioq_core::{IdentityMode, ServiceBuilder};
use prioq_transport::{EndpointClient, EndpointServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let dir = std::env::temp_dir().join(format!("prioq-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let endpoint = dir.join("prioq.sock");

    let service = ServiceBuilder::new()
        .with_endpoint(&endpoint)
        .with_identity(IdentityMode::Connection)
        .start();
    let server = EndpointServer::bind(service)?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let mut client = EndpointClient::connect(&endpoint).await?;
    client.set_capacity(100).await?;
    for (value, priority) in [(1, 2), (2, 1), (-2, 3), (-4, 5), (90, 10), (34, 1)] {
        client.insert(value, priority).await?;
    }
    let info = client.get_info().await?;
    println!("queue holds {} of {}", info.count, info.capacity);

    while let Ok(value) = client.pop().await {
        println!("extracted {}", value);
    }

    drop(client);
    let _ = stop_tx.send(());
    server_task.await??;
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
