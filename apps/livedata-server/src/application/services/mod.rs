//! Application Services
//!
//! The two control-plane services: the persistent-subscription
//! reconciliation loop and the combining-server façade.

mod combining;
mod persistent;

pub use combining::{CombiningServer, RoutingFn};
pub use persistent::{ManagerConfig, ManagerError, PersistentSubscriptionManager};
