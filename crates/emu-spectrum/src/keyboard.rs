//! ZX Spectrum keyboard matrix.
//!
//! Eight half-rows of five keys, scanned through the ULA port. Each cleared
//! bit of the port's high byte (A8-A15) drives one half-row; the pressed
//! keys on the driven rows pull their column lines low.
//!
//! | Addr bit | Row | Keys (bit 0-4)     |
//! |----------|-----|--------------------|
//! | A8       | 0   | Shift, Z, X, C, V  |
//! | A9       | 1   | A, S, D, F, G      |
//! | A10      | 2   | Q, W, E, R, T      |
//! | A11      | 3   | 1, 2, 3, 4, 5      |
//! | A12      | 4   | 0, 9, 8, 7, 6      |
//! | A13      | 5   | P, O, I, U, Y      |
//! | A14      | 6   | Enter, L, K, J, H  |
//! | A15      | 7   | Space, Sym, M, N, B|

/// Key names by matrix position, as used in `"Key <name>"` buttons.
pub const KEY_NAMES: [[&str; 5]; 8] = [
    ["Shift", "Z", "X", "C", "V"],
    ["A", "S", "D", "F", "G"],
    ["Q", "W", "E", "R", "T"],
    ["1", "2", "3", "4", "5"],
    ["0", "9", "8", "7", "6"],
    ["P", "O", "I", "U", "Y"],
    ["Enter", "L", "K", "J", "H"],
    ["Space", "Sym", "M", "N", "B"],
];

/// Matrix position of a named key.
#[must_use]
pub fn key_position(name: &str) -> Option<(usize, u8)> {
    KEY_NAMES.iter().enumerate().find_map(|(row, keys)| {
        keys.iter()
            .position(|&key| key.eq_ignore_ascii_case(name))
            .and_then(|bit| u8::try_from(bit).ok())
            .map(|bit| (row, bit))
    })
}

/// Pressed keys, one byte per half-row, bit set = pressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardMatrix {
    rows: [u8; 8],
}

impl KeyboardMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a key. Out-of-range positions are ignored.
    pub fn set_key(&mut self, row: usize, bit: u8, pressed: bool) {
        let Some(keys) = self.rows.get_mut(row) else {
            return;
        };
        if bit < 5 {
            if pressed {
                *keys |= 1 << bit;
            } else {
                *keys &= !(1 << bit);
            }
        }
    }

    pub fn release_all(&mut self) {
        self.rows = [0; 8];
    }

    #[must_use]
    pub fn rows(&self) -> [u8; 8] {
        self.rows
    }

    /// Replace the whole matrix. Bits above 4 are dropped.
    pub fn set_rows(&mut self, rows: [u8; 8]) {
        self.rows = rows.map(|keys| keys & 0x1F);
    }

    /// Columns pulled low when scanning with `addr_high`, bit set = low.
    ///
    /// Three keys on the corners of a rectangle connect a fourth row to a
    /// driven column through the switches, so the scan spreads through
    /// every row that shares a pressed column with a driven row.
    #[must_use]
    pub fn scan(&self, addr_high: u8) -> u8 {
        let columns_of = |rows: u8| {
            self.rows
                .iter()
                .enumerate()
                .filter(|&(row, _)| rows & (1 << row) != 0)
                .fold(0, |acc, (_, &keys)| acc | keys)
        };
        let mut driven = !addr_high;
        loop {
            let columns = columns_of(driven);
            let reached = self
                .rows
                .iter()
                .enumerate()
                .filter(|&(_, &keys)| keys & columns != 0)
                .fold(driven, |acc, (row, _)| acc | (1 << row));
            if reached == driven {
                return columns;
            }
            driven = reached;
        }
    }
}
