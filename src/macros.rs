//! Small conditional-compilation helpers, in the same spirit as mio's
//! `cfg_os_poll!`/`cfg_net!` family in `src/macros.rs`.

/// Emitted only when the `log` feature is enabled; a silent no-op
/// otherwise, so call sites never need a `#[cfg]`.
macro_rules! ptk_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    };
}

macro_rules! ptk_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
    };
}
