//! Defines the Provisioner trait implemented by network back-ends.

use async_trait::async_trait;

use crate::error::ProvisionError;
use crate::topology::{TopologyHandle, TopologySpec};

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Brings up a network matching `spec` and returns its handle.
    async fn provision(&self, spec: &TopologySpec) -> Result<TopologyHandle, ProvisionError>;

    /// Tears the network down. Must be safe to call on an already released
    /// handle.
    async fn release(&self, handle: &TopologyHandle);
}
