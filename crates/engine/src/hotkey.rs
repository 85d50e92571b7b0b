// Hotkey glue.
//
// Registration lives in the shell (an external global-shortcut provider);
// the engine only consumes press/release callbacks.

/// One half of a push-to-hold gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    Pressed,
    Released,
}

/// Platform-conventional default binding for the shell to register.
#[cfg(target_os = "macos")]
pub const DEFAULT_SHORTCUT: &str = "Cmd+Shift+R";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_SHORTCUT: &str = "Ctrl+Shift+R";
