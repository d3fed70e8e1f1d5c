pub mod disconnected;
pub mod error;
pub mod factory;
pub mod memory;
pub mod postgrest;
pub mod traits;

pub use disconnected::DisconnectedRemote;
pub use error::RemoteError;
pub use factory::RemoteFactory;
pub use memory::MemoryRemote;
pub use postgrest::PostgrestRemote;
pub use traits::{Order, RemoteStore};
