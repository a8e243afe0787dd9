//! Deferred - asynchronous handlers and callbacks into the caller.
//!
//! This example demonstrates:
//! - `method_async` handlers that answer through a `Completion`
//! - A per-connection wrapper factory that calls back into the peer
//! - Responses arriving out of order
//!
//! Both nodes run in one process over an in-memory duplex stream.
//!
//! ```text
//! RUST_LOG=peerwire=trace cargo run --example deferred
//! ```

use std::time::Duration;

use peerwire::{Completion, DispatchTable, Node, RemoteHandle, Wrapper};
use tracing_subscriber::EnvFilter;

/// Table served to each connecting peer.
fn worker(remote: RemoteHandle) -> DispatchTable {
    DispatchTable::new()
        .method_async("sleep", |(ms,): (u64,), done: Completion| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let _ = done.complete(&ms);
            });
        })
        .method_async("report", move |(steps,): (u32,), done: Completion| {
            let remote = remote.clone();
            tokio::spawn(async move {
                let Some(peer) = remote.get() else {
                    let _ = done.fail("peer not ready");
                    return;
                };
                for step in 1..=steps {
                    let percent = step * 100 / steps;
                    if let Err(e) = peer.invoke::<_, ()>("progress", &(percent,)).await {
                        let _ = done.fail(e);
                        return;
                    }
                }
                let _ = done.complete(&"finished");
            });
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = Node::new(Wrapper::factory(worker));
    let client = Node::new(DispatchTable::new().method("progress", |(percent,): (u32,)| {
        println!("progress: {}%", percent);
    }));

    let (a, b) = tokio::io::duplex(64 * 1024);
    let _served = server.attach_stream(a);
    let session = client.attach_stream(b);
    let remote = session.remote().await?;

    // The slow call is sent first but answered last.
    let (slow_ms, fast_ms) = ((200u64,), (10u64,));
    let slow = remote.invoke::<_, u64>("sleep", &slow_ms);
    let fast = remote.invoke::<_, u64>("sleep", &fast_ms);
    let (slow, fast) = tokio::join!(slow, fast);
    println!("slept {}ms and {}ms", slow?, fast?);

    let status: String = remote.invoke("report", &(4,)).await?;
    println!("report: {}", status);

    session.close();
    session.wait().await?;
    Ok(())
}
