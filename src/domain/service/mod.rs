pub mod local_id;
pub mod pending_queue;
pub mod reconciler;
pub mod room_selector;
pub mod view_projector;

pub use local_id::LocalIdAllocator;
pub use pending_queue::PendingQueue;
pub use reconciler::{
    ConfirmationLedger, DEFAULT_LEDGER_RETENTION_MS, MatchWindows, ReconcileOutcome, Reconciler,
};
pub use room_selector::{RoomSelector, room_id_for};
pub use view_projector::ViewProjector;
