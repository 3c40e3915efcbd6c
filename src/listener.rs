// Unix socket listener for telemetry batches
// Each accepted connection is read to end-of-stream on its own task and the
// collected bytes are handed to the batch handler
//
// Numan Thabit 2025 Nov

use crate::errors::Result;
use crate::metrics::BATCHES;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const ACCEPT_RETRY: Duration = Duration::from_millis(10);

pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
    limit: Option<Arc<Semaphore>>,
}

impl SocketListener {
    /// Binds `path` and opens it to every user. The path must not exist;
    /// removing a stale socket is the owner's job.
    pub fn bind(path: impl AsRef<Path>, max_connections: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let listener = UnixListener::bind(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o777))?;

        let limit = (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections)));
        info!(path = %path.display(), max_connections = max_connections, "telemetry socket bound");
        Ok(Self {
            listener,
            path,
            limit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spawns the accept loop. `handler` runs once per connection with the
    /// full payload.
    pub fn start<F>(self, handler: F) -> ListenerHandle
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.accept_loop(Arc::new(handler), rx));
        ListenerHandle { shutdown, task }
    }

    async fn accept_loop<F>(self, handler: Arc<F>, mut shutdown: watch::Receiver<bool>)
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        loop {
            let permit = match &self.limit {
                Some(limit) => tokio::select! {
                    permit = Arc::clone(limit).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    _ = shutdown.changed() => break,
                },
                None => None,
            };

            let accepted = tokio::select! {
                res = self.listener.accept() => res,
                _ = shutdown.changed() => break,
            };

            match accepted {
                Ok((stream, _)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Some(payload) = read_payload(stream).await {
                            handler(payload);
                        }
                        drop(permit);
                    });
                }
                Err(err) => {
                    debug!(error = %err, "accept failed; retrying");
                    tokio::time::sleep(ACCEPT_RETRY).await;
                }
            }
        }
        info!(path = %self.path.display(), "telemetry socket closed");
    }
}

/// Reads until the peer closes its write side. Read failures drop the payload.
async fn read_payload(mut stream: UnixStream) -> Option<Vec<u8>> {
    let mut payload = Vec::new();
    let res = stream.read_to_end(&mut payload).await;
    drop(stream);
    match res {
        Ok(_) => Some(payload),
        Err(err) => {
            debug!(error = %err, "connection read failed; dropping payload");
            BATCHES.with_label_values(&["read_error"]).inc();
            None
        }
    }
}

pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Closes the socket and waits for the accept loop to exit. Connection
    /// tasks already running finish on their own.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            debug!(error = %err, "accept loop join failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
