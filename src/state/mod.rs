pub mod reconciler;
pub mod store;

pub use reconciler::{Reconciler, RefreshTasks};
pub use store::{CachedError, ErrorKind, SessionSnapshot, SessionStore, StoreUpdate};
