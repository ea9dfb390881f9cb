use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};

use anstream::eprintln;
use owo_colors::OwoColorize;
use rustc_hash::FxHashSet;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Messages already shown by [`warn_user_once!`].
static SHOWN: LazyLock<Mutex<FxHashSet<String>>> = LazyLock::new(Mutex::default);

/// Enable user-facing warnings.
pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Disable user-facing warnings.
pub fn disable() {
    ENABLED.store(false, Ordering::Relaxed);
}

pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn show(message: &str) {
    eprintln!("{}{} {}", "warning".yellow().bold(), ":".bold(), message.bold());
}

#[doc(hidden)]
pub fn warn(message: fmt::Arguments<'_>) {
    if enabled() {
        show(&message.to_string());
    }
}

/// Returns whether the message was shown, i.e. warnings are enabled and it is new.
#[doc(hidden)]
pub fn warn_once(message: fmt::Arguments<'_>) -> bool {
    if !enabled() {
        return false;
    }
    let message = message.to_string();
    let Ok(mut shown) = SHOWN.lock() else {
        return false;
    };
    if !shown.insert(message.clone()) {
        return false;
    }
    drop(shown);
    show(&message);
    true
}

/// Warn a user, if warnings are enabled.
#[macro_export]
macro_rules! warn_user {
    ($($arg:tt)*) => {
        $crate::warn(format_args!($($arg)*))
    };
}

/// Warn a user once, if warnings are enabled, with uniqueness determined by the content of the
/// message.
#[macro_export]
macro_rules! warn_user_once {
    ($($arg:tt)*) => {{
        let _ = $crate::warn_once(format_args!($($arg)*));
    }};
}
