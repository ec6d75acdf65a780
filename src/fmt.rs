//! Logging shims.
//!
//! With the `defmt` feature every macro forwards to `defmt`. Host unit tests
//! print to stdout instead, and any other build drops the message while still
//! evaluating (borrowing) its arguments.
#![allow(unused_macros)]

macro_rules! log_with {
    ($level:ident, $tag:literal, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(all(test, not(feature = "defmt")))]
            ::std::println!(concat!($tag, " ", $s) $(, $x)*);
            #[cfg(not(any(test, feature = "defmt")))]
            let _ = ($( & $x, )*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => { log_with!(trace, "[TRACE]", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log_with!(debug, "[DEBUG]", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { log_with!(info, "[INFO]", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log_with!(warn, "[WARN]", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { log_with!(error, "[ERROR]", $($arg)*) };
}
