//! The app identity the quota/balance validator operates over. The broader
//! credential-issuing scheme that mints these ids is out of scope here (see
//! the crate-level docs); this module only models the shape the ledger needs
//! to read back, following the split the teacher draws between `user` (the
//! owning identity) and `auth` (what it's allowed to do).

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(pub Uuid);

/// An app-scoped identity known to the ledger.
#[derive(Debug, Clone, Copy)]
pub struct App {
    pub id: AppId,
    /// Whether this app's spendable balance is computed from its own rows
    /// rather than the node's global balance.
    pub isolated: bool,
}

/// Read access to app records. Implemented by the embedder's persistence layer
/// (the `app`/permission tables are outside this crate's ledger schema); a
/// fake is provided for tests.
#[async_trait]
pub trait AppStore: Send + Sync {
    async fn get(&self, id: AppId) -> Option<App>;
}
