//! Autofire and sticky buttons.
//!
//! An [`AutofireController`] sits between the front end's controller state
//! and the machine. Each sticky button has a cyclic pattern; the pattern's
//! current value is XORed into the button, so a held button is released on
//! the pattern's "on" frames. Analog patterns replace the source value.
//!
//! Patterns step once per frame. A pattern that skips lag frames holds its
//! position on frames where the game never polled its input.

use std::collections::BTreeMap;

use crate::input::ControllerState;

/// A cyclic sequence of per-frame values.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern<T> {
    values: Vec<T>,
    index: usize,
    skips_lag: bool,
}

impl<T: Copy + Default> Pattern<T> {
    /// An empty `values` acts as a single default value.
    #[must_use]
    pub fn new(values: Vec<T>, skips_lag: bool) -> Self {
        let values = if values.is_empty() { vec![T::default()] } else { values };
        Self {
            values,
            index: 0,
            skips_lag,
        }
    }

    /// Value for the current frame.
    #[must_use]
    pub fn peek(&self) -> T {
        self.values[self.index]
    }

    /// Step to the next frame's value.
    pub fn advance(&mut self, lagged: bool) {
        if lagged && self.skips_lag {
            return;
        }
        self.index = (self.index + 1) % self.values.len();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn skips_lag(&self) -> bool {
        self.skips_lag
    }
}

pub type AutofirePattern = Pattern<bool>;
pub type AnalogPattern = Pattern<f32>;

impl Pattern<bool> {
    /// `on` frames pressed, then `off` frames released.
    #[must_use]
    pub fn alternating(on: usize, off: usize, skips_lag: bool) -> Self {
        let values = std::iter::repeat_n(true, on).chain(std::iter::repeat_n(false, off)).collect();
        Self::new(values, skips_lag)
    }
}

impl Pattern<f32> {
    /// `value` for `on` frames, then zero for `off` frames.
    #[must_use]
    pub fn pulse(value: f32, on: usize, off: usize, skips_lag: bool) -> Self {
        let values = std::iter::repeat_n(value, on).chain(std::iter::repeat_n(0.0, off)).collect();
        Self::new(values, skips_lag)
    }
}

/// Sticky patterns per button name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutofireController {
    buttons: BTreeMap<String, AutofirePattern>,
    analogs: BTreeMap<String, AnalogPattern>,
}

impl AutofireController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pattern(&mut self, button: &str, pattern: AutofirePattern) {
        self.buttons.insert(button.to_string(), pattern);
    }

    pub fn set_analog_pattern(&mut self, control: &str, pattern: AnalogPattern) {
        self.analogs.insert(control.to_string(), pattern);
    }

    /// Drop any pattern on `name`.
    pub fn unset(&mut self, name: &str) {
        self.buttons.remove(name);
        self.analogs.remove(name);
    }

    pub fn clear(&mut self) {
        self.buttons.clear();
        self.analogs.clear();
    }

    #[must_use]
    pub fn is_sticky(&self, name: &str) -> bool {
        self.buttons.contains_key(name) || self.analogs.contains_key(name)
    }

    /// Sticky buttons in name order.
    pub fn sticky_buttons(&self) -> impl Iterator<Item = &str> {
        self.buttons.keys().map(String::as_str)
    }

    /// Is the pattern, rather than the source, pressing `button` this frame?
    #[must_use]
    pub fn in_effect(&self, button: &str, source: &ControllerState) -> bool {
        self.buttons.contains_key(button) && !source.is_pressed(button)
    }

    /// State the machine sees this frame.
    #[must_use]
    pub fn apply(&self, source: &ControllerState) -> ControllerState {
        let mut state = source.clone();
        for (button, pattern) in &self.buttons {
            state.set(button, source.is_pressed(button) ^ pattern.peek());
        }
        for (control, pattern) in &self.analogs {
            state.set_analog(control, pattern.peek());
        }
        state
    }

    /// Step every pattern once, at the end of a frame.
    pub fn advance(&mut self, lagged: bool) {
        for pattern in self.buttons.values_mut() {
            pattern.advance(lagged);
        }
        for pattern in self.analogs.values_mut() {
            pattern.advance(lagged);
        }
    }
}
