pub mod config;
pub mod error;
pub mod phone;
pub mod model;
pub mod security;
pub mod storage;
pub mod identity;
pub mod policy;
pub mod roster;
pub mod ingest;
pub mod server;

// Debug printing helper: expands to eprintln! in test and debug builds.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
