//! Thread-safety markers for bridge traits.
//!
//! Bridge implementations are shared across async tasks behind `Arc`, so every
//! trait in this crate requires `Send + Sync` through these aliases. Keeping the
//! bound in one place lets a single-threaded host relax it later without
//! touching each trait.

/// Marker applied to every bridge trait object.
pub trait PlatformSendSync: Send + Sync {}

impl<T> PlatformSendSync for T where T: Send + Sync {}

/// Marker for values handed between tasks, such as change streams.
pub trait PlatformSend: Send {}

impl<T> PlatformSend for T where T: Send {}
