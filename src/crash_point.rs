//! Crash injection for exercising recovery
//!
//! With a rate of `N` (0 = disabled), the cleanup thread crashes with
//! probability `1/N` each time it observes a committed entry, before applying
//! it. This exists only to drive the recovery path under test.
//!
//! Two crash modes are available:
//!
//! - [`CrashMode::Exit`] terminates the process immediately, without any
//!   cleanup, the way a real fault would.
//! - [`CrashMode::Halt`] stops the cleanup thread dead: no further apply, no
//!   checkpoint, no flag clearing. The process keeps running, which lets a
//!   single test drop the log and recover it as if the process had died.

use rand::Rng;
use serde::Deserialize;

/// What happens when an injected crash fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashMode {
    /// Terminate the process
    #[default]
    Exit,
    /// Stop the cleanup thread without touching the log
    Halt,
}

impl CrashMode {
    /// Parse a mode name (`exit`, `halt`)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "exit" => Some(Self::Exit),
            "halt" => Some(Self::Halt),
            _ => None,
        }
    }
}

/// Decides when the cleanup thread crashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrashInjector {
    rate: u32,
    mode: CrashMode,
}

impl CrashInjector {
    /// Crash with probability `1/rate`; a rate of 0 never crashes
    pub const fn new(rate: u32, mode: CrashMode) -> Self {
        Self { rate, mode }
    }

    /// An injector that never fires
    pub const fn disabled() -> Self {
        Self {
            rate: 0,
            mode: CrashMode::Exit,
        }
    }

    /// Whether crash injection is active
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.rate != 0
    }

    /// The configured rate
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// The configured mode
    pub fn mode(&self) -> CrashMode {
        self.mode
    }

    /// Roll the dice. Returns true when a crash should happen now.
    #[inline]
    pub fn should_crash(&self) -> bool {
        self.rate != 0 && rand::thread_rng().gen_range(0..self.rate) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_fires() {
        let injector = CrashInjector::disabled();
        assert!(!injector.is_enabled());
        assert!((0..1000).all(|_| !injector.should_crash()));
    }

    #[test]
    fn test_rate_one_always_fires() {
        let injector = CrashInjector::new(1, CrashMode::Halt);
        assert!(injector.is_enabled());
        assert!((0..100).all(|_| injector.should_crash()));
    }

    #[test]
    fn test_rate_is_roughly_respected() {
        let injector = CrashInjector::new(4, CrashMode::Halt);
        let fired = (0..10_000).filter(|_| injector.should_crash()).count();
        assert!(fired > 1_500 && fired < 3_500, "fired {fired} times");
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(CrashMode::parse("exit"), Some(CrashMode::Exit));
        assert_eq!(CrashMode::parse("HALT"), Some(CrashMode::Halt));
        assert_eq!(CrashMode::parse("abort"), None);
    }
}
