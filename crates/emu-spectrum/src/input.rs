//! Controller state consumed by the machine.
//!
//! The front end describes what is held down as a set of logical button
//! names plus analog values. The machine only reads it:
//!
//! - `"Key <name>"` presses a key on the matrix, named as in
//!   [`KEY_NAMES`](crate::keyboard::KEY_NAMES): `"Key A"`, `"Key Enter"`,
//!   `"Key Sym"`.
//! - `"P1 Up"`, `"P1 Down"`, `"P1 Left"`, `"P1 Right"` and `"P1 Button"`
//!   drive the Kempston interface, if fitted.
//!
//! Unknown names are ignored.

use std::collections::{BTreeMap, BTreeSet};

use crate::keyboard::{KeyboardMatrix, key_position};
use crate::peripherals::kempston;

/// Pressed buttons and analog values for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pressed: BTreeSet<String>,
    analog: BTreeMap<String, f32>,
}

impl ControllerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`press`](Self::press).
    #[must_use]
    pub fn with(mut self, button: &str) -> Self {
        self.press(button);
        self
    }

    pub fn press(&mut self, button: &str) {
        self.pressed.insert(button.to_string());
    }

    pub fn release(&mut self, button: &str) {
        self.pressed.remove(button);
    }

    pub fn set(&mut self, button: &str, pressed: bool) {
        if pressed {
            self.press(button);
        } else {
            self.release(button);
        }
    }

    #[must_use]
    pub fn is_pressed(&self, button: &str) -> bool {
        self.pressed.contains(button)
    }

    /// Pressed buttons in name order.
    pub fn pressed(&self) -> impl Iterator<Item = &str> {
        self.pressed.iter().map(String::as_str)
    }

    pub fn set_analog(&mut self, control: &str, value: f32) {
        self.analog.insert(control.to_string(), value);
    }

    /// Analog value, 0.0 if never set.
    #[must_use]
    pub fn analog(&self, control: &str) -> f32 {
        self.analog.get(control).copied().unwrap_or(0.0)
    }

    pub fn analogs(&self) -> impl Iterator<Item = (&str, f32)> {
        self.analog.iter().map(|(name, &value)| (name.as_str(), value))
    }

    /// Keyboard matrix implied by the `"Key <name>"` buttons.
    #[must_use]
    pub fn keyboard(&self) -> KeyboardMatrix {
        let mut matrix = KeyboardMatrix::new();
        for (row, bit) in self
            .pressed()
            .filter_map(|button| button.strip_prefix("Key "))
            .filter_map(key_position)
        {
            matrix.set_key(row, bit, true);
        }
        matrix
    }

    /// Kempston port bits implied by the `"P1 ..."` buttons.
    #[must_use]
    pub fn kempston(&self) -> u8 {
        [
            ("P1 Right", kempston::RIGHT),
            ("P1 Left", kempston::LEFT),
            ("P1 Down", kempston::DOWN),
            ("P1 Up", kempston::UP),
            ("P1 Button", kempston::FIRE),
        ]
        .into_iter()
        .filter(|(button, _)| self.is_pressed(button))
        .fold(0, |bits, (_, bit)| bits | bit)
    }
}
