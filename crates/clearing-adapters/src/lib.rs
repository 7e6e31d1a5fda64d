//! Reference collaborators for the obligation clearing core.

#![deny(unsafe_code)]

pub mod authority;
pub mod fees;
pub mod honoring;
pub mod mirror;
pub mod storage;

pub use authority::{InMemoryClearingAuthority, JournalEntry};
pub use fees::{FeeSchedule, FeeScheduleConfig};
pub use honoring::{AlwaysFailHonoringAdapter, MockAchHonoringAdapter};
pub use mirror::{InMemoryNarrativeMirror, TracingNarrativeMirror};
pub use storage::{MirrorStorageConfig, PostgresNarrativeMirror};
