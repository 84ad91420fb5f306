//! Lock aliases.
//!
//! Everything in Rebar that needs a synchronous lock goes through these, so the
//! backing implementation can be swapped in one place.

/// A synchronous mutex. Never hold one across an `.await`.
pub type SyncMutex<T> = parking_lot::Mutex<T>;
/// Guard returned by [`SyncMutex::lock`].
pub type SyncMutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;
/// A synchronous read-write lock.
pub type SyncRwLock<T> = parking_lot::RwLock<T>;
