//! SimulatedBackend - IRemoteBackend that performs no remote work
//!
//! Each operation sleeps for a fixed delay and succeeds. Creations return
//! the id `"0"`. Used for load testing the sync engine against large local
//! trees without an account.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::trace;

use treemirror_core::ports::{IRemoteBackend, RemoteParent};

/// Identifier returned for every simulated creation
pub const SIMULATED_ID: &str = "0";

/// Remote backend that only simulates operation latency
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    op_delay: Duration,
}

impl SimulatedBackend {
    pub fn new(op_delay: Duration) -> Self {
        Self { op_delay }
    }

    async fn pause(&self, op: &str, target: &str) {
        trace!(op, target, delay_ms = self.op_delay.as_millis() as u64, "Simulated remote op");
        tokio::time::sleep(self.op_delay).await;
    }
}

#[async_trait]
impl IRemoteBackend for SimulatedBackend {
    async fn create_directory(&self, local: &Path, _parent: RemoteParent<'_>) -> Result<String> {
        self.pause("mkdir", &local.to_string_lossy()).await;
        Ok(SIMULATED_ID.to_string())
    }

    async fn upload_file(&self, local: &Path, _parent: RemoteParent<'_>) -> Result<String> {
        self.pause("upload", &local.to_string_lossy()).await;
        Ok(SIMULATED_ID.to_string())
    }

    async fn update_file(&self, local: &Path, _remote_id: &str) -> Result<()> {
        self.pause("update", &local.to_string_lossy()).await;
        Ok(())
    }

    async fn delete_recursive(&self, remote_id: &str) -> Result<()> {
        self.pause("delete", remote_id).await;
        Ok(())
    }

    async fn switch_account(&self, account: &str) -> Result<()> {
        self.pause("switch", account).await;
        Ok(())
    }
}
