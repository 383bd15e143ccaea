//! Scoped ownership of a provisioned network.

use std::sync::Arc;

use tracing::{info, warn};

use netautotest_core::provision::Provisioner;
use netautotest_core::TopologyHandle;

/// Holds a provisioned network for the duration of a campaign.
///
/// [`NetworkLease::release`] tears the network down explicitly. A lease
/// dropped without release (panic, early return) schedules the release on the
/// current tokio runtime instead.
pub struct NetworkLease {
    provisioner: Arc<dyn Provisioner>,
    handle: Arc<TopologyHandle>,
    released: bool,
}

impl NetworkLease {
    pub fn new(provisioner: Arc<dyn Provisioner>, handle: TopologyHandle) -> Self {
        Self {
            provisioner,
            handle: Arc::new(handle),
            released: false,
        }
    }

    pub fn handle(&self) -> &Arc<TopologyHandle> {
        &self.handle
    }

    pub async fn release(mut self) {
        self.released = true;
        self.provisioner.release(&self.handle).await;
        info!(handle = %self.handle.id, "Network released");
    }
}

impl Drop for NetworkLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let provisioner = Arc::clone(&self.provisioner);
        let handle = Arc::clone(&self.handle);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(handle = %handle.id, "Network lease dropped unreleased, releasing in background");
                runtime.spawn(async move { provisioner.release(&handle).await });
            }
            Err(_) => warn!(handle = %handle.id, "Network lease dropped outside a runtime, network leaked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netautotest_core::{ProvisionError, TopologySpec};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingProvisioner {
        releases: AtomicUsize,
    }

    #[async_trait]
    impl Provisioner for CountingProvisioner {
        async fn provision(&self, _spec: &TopologySpec) -> Result<TopologyHandle, ProvisionError> {
            Err(ProvisionError::Unsupported("test".into()))
        }

        async fn release(&self, _handle: &TopologyHandle) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handle() -> TopologyHandle {
        TopologyHandle {
            id: "net-1".into(),
            endpoints: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_explicit_release_runs_once() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let lease = NetworkLease::new(provisioner.clone(), handle());
        lease.release().await;
        tokio::task::yield_now().await;
        assert_eq!(provisioner.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let provisioner = Arc::new(CountingProvisioner::default());
        drop(NetworkLease::new(provisioner.clone(), handle()));
        for _ in 0..50 {
            if provisioner.releases.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("lease drop did not release the network");
    }
}
