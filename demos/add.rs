//! Add - one node serves `add`, another calls it over TCP.
//!
//! This example demonstrates:
//! - Listening on a TCP endpoint with `node.listen()`
//! - Connecting with `node.connect()`
//! - The discovery handshake and typed calls with `invoke`
//!
//! ```text
//! RUST_LOG=peerwire=debug cargo run --example add
//! ```

use peerwire::{DispatchTable, Node};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = Node::builder(
        DispatchTable::new()
            .method("add", |(x, y): (i64, i64)| x + y)
            .method("sub", |(x, y): (i64, i64)| x - y),
    )
    .on_ready(|remote, conn| {
        tracing::info!(conn = conn.id(), "client offers {:?}", remote.methods());
    })
    .build();

    let listener = server.listen("tcp://127.0.0.1:0").await?;
    let endpoint = listener.endpoint().to_string();
    tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            tracing::error!("Listener stopped: {}", e);
        }
    });

    let client = Node::new(DispatchTable::new());
    let session = client.connect(&endpoint).await?;
    let remote = session.remote().await?;
    println!("server methods: {:?}", remote.methods());

    let sum: i64 = remote.invoke("add", &(2, 3)).await?;
    let diff: i64 = remote.invoke("sub", &(2, 3)).await?;
    println!("2 + 3 = {}", sum);
    println!("2 - 3 = {}", diff);

    session.close();
    session.wait().await?;
    Ok(())
}
