//! Standard exit codes (BSD sysexits.h compatible)

/// Successful termination
pub const OK: i32 = 0;

/// Command line usage error
pub const USAGE: i32 = 64;

/// Data format error (broken tree, bad stored record)
pub const DATAERR: i32 = 65;

/// Cannot open input (tree source returned nothing)
pub const NOINPUT: i32 = 66;

/// Service unavailable
pub const UNAVAILABLE: i32 = 69;

/// Internal software error
pub const SOFTWARE: i32 = 70;

/// Input/output error
pub const IOERR: i32 = 74;

/// Temporary failure; re-running may succeed
pub const TEMPFAIL: i32 = 75;

/// Permission denied (authentication failed)
pub const NOPERM: i32 = 77;

/// Configuration error
pub const CONFIG: i32 = 78;
