//! Messages - running connections over a message transport.
//!
//! This example demonstrates:
//! - Registering client sessions with a `MessageHub`
//! - Delivering whole messages with no line framing
//! - Outbound messages arriving through a `SessionWriter`
//!
//! The "transport" here is a pair of channels standing in for a websocket
//! or push channel; the client side plays the peer by hand.
//!
//! ```text
//! cargo run --example messages
//! ```

use peerwire::{DispatchTable, MessageHub, Node};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let hub = MessageHub::new(Node::new(
        DispatchTable::new().method("shout", |(text,): (String,)| text.to_uppercase()),
    ));

    // Outbound messages for session "client-1".
    let (to_client, mut from_server) = mpsc::unbounded_channel::<String>();
    let session = hub.open("client-1", to_client);

    let discovery: Value = serde_json::from_str(&from_server.recv().await.unwrap_or_default())?;
    println!("server asks: {}", discovery);
    hub.deliver(
        "client-1",
        json!({"id": 0, "result": ["methods"]}).to_string(),
    )?;

    hub.deliver(
        "client-1",
        json!({"id": 0, "method": "methods", "arguments": []}).to_string(),
    )?;
    println!("server offers: {}", from_server.recv().await.unwrap_or_default());

    hub.deliver(
        "client-1",
        json!({"id": 1, "method": "shout", "arguments": ["hello"]}).to_string(),
    )?;
    println!("server answers: {}", from_server.recv().await.unwrap_or_default());

    hub.close("client-1");
    session.wait().await?;
    Ok(())
}
