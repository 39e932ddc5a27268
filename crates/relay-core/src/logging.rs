//! Structured logging helpers shared by every pipeline component.
//!
//! Mirrors the component-scoped macro family used elsewhere in this
//! workspace: each macro just tacks a `component = "..."` field onto a
//! `tracing` call so operators can filter the combined daemon log by
//! subsystem without every call site having to remember the field name.

/// Component identifiers for log filtering.
pub struct Component;

impl Component {
    pub const SCANNER: &'static str = "SCANNER";
    pub const TAILER: &'static str = "TAILER";
    pub const MOVER: &'static str = "MOVER";
    pub const UPLOADER: &'static str = "UPLOADER";
    pub const PURGER: &'static str = "PURGER";
    pub const SUPERVISOR: &'static str = "SUPERVISOR";
    pub const FS: &'static str = "FS";
}

#[macro_export]
macro_rules! log_scanner_info {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::info!(component = "SCANNER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_scanner_warn {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::warn!(component = "SCANNER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_tailer_info {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::info!(component = "TAILER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_tailer_warn {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::warn!(component = "TAILER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_mover_warn {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::warn!(component = "MOVER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_uploader_info {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::info!(component = "UPLOADER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_uploader_warn {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::warn!(component = "UPLOADER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_purger_info {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::info!(component = "PURGER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_purger_warn {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::warn!(component = "PURGER", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_fs_warn {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::warn!(component = "FS", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_supervisor_info {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::info!(component = "SUPERVISOR", $($($fields)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_supervisor_critical {
    ($msg:literal $(, $($fields:tt)*)?) => {
        tracing::error!(component = "SUPERVISOR", $($($fields)*,)? $msg)
    };
}
