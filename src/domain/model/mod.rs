pub mod display;
pub mod message;
pub mod room;

pub use display::DisplayEntry;
pub use message::{
    ConfirmedMessage, LocalId, Message, OptimisticMessage, OptimisticPatch, OutgoingMessage,
    PendingStatus, SenderIdentity, StoreId,
};
pub use room::{RoomDescriptor, RoomId, RoomKind, RoomTarget, UserProfile};
