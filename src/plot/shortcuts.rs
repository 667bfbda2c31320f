//! Handles keyboard shortcuts for the plot window.
use eframe::egui;

/// Represents an action triggered by a keyboard shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    /// Ctrl+O: stop live plotting and pick a file
    OpenFile,
    /// Ctrl+R: rescale once
    Rescale,
    /// Ctrl+A: rescale whenever new data arrives
    ToggleAutoRescale,
    /// Ctrl+L: live plotting on/off
    ToggleLive,
}

impl ShortcutAction {
    /// Key combination shown in tooltips
    pub fn hint(self) -> &'static str {
        match self {
            ShortcutAction::OpenFile => "Ctrl+O",
            ShortcutAction::Rescale => "Ctrl+R",
            ShortcutAction::ToggleAutoRescale => "Ctrl+A",
            ShortcutAction::ToggleLive => "Ctrl+L",
        }
    }
}

const BINDINGS: [(egui::Key, ShortcutAction); 4] = [
    (egui::Key::O, ShortcutAction::OpenFile),
    (egui::Key::R, ShortcutAction::Rescale),
    (egui::Key::A, ShortcutAction::ToggleAutoRescale),
    (egui::Key::L, ShortcutAction::ToggleLive),
];

/// Handles keyboard shortcuts and returns the actions triggered this frame.
pub fn handle_shortcuts(ctx: &egui::Context) -> Vec<ShortcutAction> {
    ctx.input(|i| {
        if !i.modifiers.ctrl {
            return Vec::new();
        }
        BINDINGS
            .iter()
            .filter(|(key, _)| i.key_pressed(*key))
            .map(|(_, action)| *action)
            .collect()
    })
}
