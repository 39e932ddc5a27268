//! Shared types and capabilities for the pcap-relay pipeline.
//!
//! Every worker crate in this workspace depends on `relay-core` for the
//! same three things: a way to talk to the filesystem that can be swapped
//! for a test double, a way to observe a single process-wide shutdown
//! signal, and the handful of value types (`FileStateRecord`,
//! `GatheredEntryData`, `TailerEvent`, `ParsedLine`) that flow between
//! components.

pub mod destination;
pub mod fs;
pub mod logging;
pub mod queue;
pub mod shutdown;
pub mod types;

pub use destination::{resolve_destination, DestinationError};
pub use fs::{DirEntry, FileSystem, FsError, StdFileSystem};
pub use queue::BoundedQueue;
pub use shutdown::ShutdownFlag;
pub use types::{
    FileStateRecord, GatheredEntryData, ParseError, ParsedLine, TailerEvent,
};
