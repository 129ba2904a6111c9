pub mod mock;
pub mod models;
pub mod pelican;

use crate::error::ServerManagerError;
use async_trait::async_trait;

/// Inventory, metadata and power control of a game panel.
#[async_trait]
pub trait ApiProvider: Send + Sync {
    async fn list_servers(&self) -> Result<Vec<ServerSummary>, ServerManagerError>;

    async fn get_server_resources(
        &self,
        server_id: &str,
    ) -> Result<ServerResources, ServerManagerError>;

    /// Allocations and startup variables.
    async fn get_server_details(&self, server_id: &str)
    -> Result<ServerDetails, ServerManagerError>;

    async fn send_power_signal(
        &self,
        server_id: &str,
        signal: PowerSignal,
    ) -> Result<(), ServerManagerError>;

    async fn stop_server(&self, server_id: &str) -> Result<(), ServerManagerError> {
        self.send_power_signal(server_id, PowerSignal::Stop).await
    }
}

// Re-export useful items
pub use mock::MockApiProvider;
pub use models::*;
pub use pelican::PelicanClient;
