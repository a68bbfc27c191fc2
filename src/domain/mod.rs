pub mod model;
pub mod repository;
pub mod service;

pub use repository::{Clock, IdentityProvider, MessageStore, SnapshotSubscription, UserDirectory};
pub use service::{PendingQueue, Reconciler, RoomSelector, ViewProjector};
