//! Logging through the `log` facade.
//!
//! The wrappers themselves log sparingly (thread creation, kernel start) at
//! debug level.  What backs the facade depends on the port: the hosted port
//! writes to the host's standard error, and anywhere else `set_logger` is a
//! no-op so the calls compile away to the facade's defaults.

cfg_if::cfg_if! {
    if #[cfg(feature = "hosted")] {
        mod impl_stderr;
        pub use impl_stderr::set_logger;
    } else {
        use log::SetLoggerError;

        /// No backend is available; install nothing.
        pub fn set_logger() -> Result<(), SetLoggerError> {
            Ok(())
        }
    }
}
