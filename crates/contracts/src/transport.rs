//! Transport trait - network layer used by the collect dispatcher
//!
//! Only the interface lives here; retry policy belongs to the implementation.

use crate::ContractError;

/// Byte transport to a collection endpoint
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Endpoint description (used for logging/metrics)
    fn endpoint(&self) -> &str;

    /// Send one serialized batch
    ///
    /// # Errors
    /// Returns transport error (should include context)
    async fn send(&self, body: &[u8]) -> Result<(), ContractError>;
}
