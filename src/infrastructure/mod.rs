//! 基础设施层：存储、身份、时钟的内存实现

pub mod clock;
pub mod identity;
pub mod memory_store;

pub use clock::{ManualClock, SystemClock};
pub use identity::{InMemoryUserDirectory, StaticIdentityProvider};
pub use memory_store::InMemoryMessageStore;
