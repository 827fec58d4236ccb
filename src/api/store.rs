//! Deploys held between build, approval and submission

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::chain::deploy::{DeployHash, SignedDeploy, UnsignedDeploy};

#[derive(Debug, Clone)]
pub enum PendingDeploy {
    Unsigned(UnsignedDeploy),
    Signed(SignedDeploy),
}

impl PendingDeploy {
    pub fn is_signed(&self) -> bool {
        matches!(self, PendingDeploy::Signed(_))
    }

    fn expires_at(&self) -> u64 {
        match self {
            PendingDeploy::Unsigned(deploy) => deploy.expires_at(),
            PendingDeploy::Signed(signed) => signed.deploy().expires_at(),
        }
    }
}

/// Pending deploys keyed by hash. Taking a deploy removes it, so each built
/// deploy is approved at most once.
#[derive(Default)]
pub struct DeployStore {
    deploys: RwLock<HashMap<DeployHash, PendingDeploy>>,
}

impl DeployStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, deploy: PendingDeploy) -> DeployHash {
        let hash = match &deploy {
            PendingDeploy::Unsigned(d) => d.hash(),
            PendingDeploy::Signed(s) => s.hash(),
        };
        self.deploys.write().await.insert(hash, deploy);
        hash
    }

    pub async fn take(&self, hash: &DeployHash) -> Option<PendingDeploy> {
        self.deploys.write().await.remove(hash)
    }

    pub async fn get(&self, hash: &DeployHash) -> Option<PendingDeploy> {
        self.deploys.read().await.get(hash).cloned()
    }

    pub async fn len(&self) -> usize {
        self.deploys.read().await.len()
    }

    /// Drop deploys whose TTL has passed; returns how many were removed
    pub async fn prune_expired(&self, now_ms: u64) -> usize {
        let mut deploys = self.deploys.write().await;
        let before = deploys.len();
        deploys.retain(|_, deploy| deploy.expires_at() > now_ms);
        before - deploys.len()
    }
}
