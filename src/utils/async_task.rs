use std::future::Future;

use tokio::task::JoinHandle;
use tracing::error;

use crate::Result;

/// Spawns a named long-running task, logging if it stops with an error.
pub fn spawn_task<F>(
    name: &str,
    task: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    // Clone the name so it can be safely moved into the async block
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(err) = task.await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", err);
        }
    })
}
