pub mod connection;
pub mod presence;
pub mod router;

pub use presence::{ConnectionHandle, PresenceRegistry};
pub use router::DeliveryRouter;
