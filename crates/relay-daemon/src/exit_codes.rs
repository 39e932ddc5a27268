//! A subset of the BSD sysexits.h codes, matching what service managers
//! expect when deciding whether to restart the process.

pub const OK: i32 = 0;
pub const USAGE: i32 = 64;
pub const PLATFORM_UNAVAILABLE: i32 = 69;
pub const SOFTWARE: i32 = 70;
pub const OS_ERROR: i32 = 71;
pub const TEMP_FAIL: i32 = 75;
pub const CONFIG: i32 = 78;
