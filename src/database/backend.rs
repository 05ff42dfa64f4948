//! Connection backend seam.
//!
//! The failover layer only needs three things from a database client: build
//! a reusable handle for a descriptor, run a trivial round trip (either on a
//! throwaway connection or through an existing handle), and release a
//! handle. Production uses [`PgBackend`](super::PgBackend); tests substitute
//! scripted fakes.

use crate::endpoint::EndpointDescriptor;
use crate::error::WarehouseResult;
use async_trait::async_trait;

#[async_trait]
pub trait ConnectionBackend: Send + Sync + 'static {
    /// Opened, reusable connection factory bound to one endpoint
    type Handle: Send + Sync + 'static;

    /// Build a new handle for `endpoint`
    async fn open(&self, endpoint: &EndpointDescriptor) -> WarehouseResult<Self::Handle>;

    /// Open a dedicated connection, run a trivial statement, and close it.
    ///
    /// Implementations must release the connection when the returned future
    /// is dropped before completion.
    async fn ping_endpoint(&self, endpoint: &EndpointDescriptor) -> WarehouseResult<()>;

    /// Run a trivial statement through an existing handle
    async fn ping_handle(&self, handle: &Self::Handle) -> WarehouseResult<()>;

    /// Release the handle's resources; later use of the handle fails
    async fn close(&self, handle: &Self::Handle);
}
