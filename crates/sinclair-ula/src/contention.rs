//! Precomputed per-frame contention and floating-bus tables.
//!
//! Both tables are indexed by frame cycle. They are built once per timing
//! model and never change afterwards, so machines share them through an
//! `Arc`.

use crate::timing::{FETCH_CYCLES_PER_LINE, SCREEN_LINES, UlaTiming};

/// Cycles between the start of a contended fetch group and the ULA driving
/// its first byte onto the data bus.
const FETCH_LAG: u32 = 2;

/// Offset of the attribute area within the screen bank.
const ATTRIBUTE_BASE: u16 = 0x1800;

/// Bytes of screen memory (bitmap plus attributes).
pub const SCREEN_BYTES: u16 = 0x1B00;

/// Offset within the screen bank of the bitmap byte for pixel row `y`,
/// character column `col`.
///
/// Layout: `0 Y7 Y6 Y2 Y1 Y0 Y5 Y4 Y3 X4 X3 X2 X1 X0`.
#[must_use]
pub fn bitmap_offset(y: u8, col: u8) -> u16 {
    let y = u16::from(y);
    ((y & 0xC0) << 5) | ((y & 0x07) << 8) | ((y & 0x38) << 2) | u16::from(col & 0x1F)
}

/// Offset within the screen bank of the attribute byte covering pixel row
/// `y`, character column `col`.
#[must_use]
pub fn attribute_offset(y: u8, col: u8) -> u16 {
    ATTRIBUTE_BASE | (u16::from(y / 8) << 5) | u16::from(col & 0x1F)
}

/// Per-cycle memory delays and floating-bus addresses for one frame.
#[derive(Debug, PartialEq, Eq)]
pub struct ContentionTable {
    delays: Box<[u8]>,
    /// Screen-bank offset the ULA is fetching at each cycle, if any.
    floating: Box<[Option<u16>]>,
}

impl ContentionTable {
    #[must_use]
    pub fn build(timing: &UlaTiming) -> Self {
        let len = timing.frame_cycles as usize;
        let mut delays = vec![0u8; len];
        let mut floating = vec![None; len];

        for line in 0..SCREEN_LINES {
            let start = timing.screen_line_start(line);
            for t in 0..FETCH_CYCLES_PER_LINE {
                delays[(start + t) as usize] = timing.pattern[(t % 8) as usize];
            }

            let y = line as u8;
            for group in 0..FETCH_CYCLES_PER_LINE / 8 {
                let col = (group * 2) as u8;
                let fetches = [
                    bitmap_offset(y, col),
                    attribute_offset(y, col),
                    bitmap_offset(y, col + 1),
                    attribute_offset(y, col + 1),
                ];
                let base = start + FETCH_LAG + group * 8;
                for (phase, offset) in (0u32..).zip(fetches) {
                    floating[(base + phase) as usize] = Some(offset);
                }
            }
        }

        Self {
            delays: delays.into_boxed_slice(),
            floating: floating.into_boxed_slice(),
        }
    }

    /// Number of cycles covered: one frame.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.delays.len() as u32
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Wait states for a contended access at `cycle`. Cycles past the end of
    /// the frame wrap into the next one.
    #[must_use]
    pub fn delay(&self, cycle: u32) -> u8 {
        if self.delays.is_empty() {
            return 0;
        }
        self.delays[cycle as usize % self.delays.len()]
    }

    /// Screen-bank offset on the data bus at `cycle`, or `None` while the ULA
    /// is idle.
    #[must_use]
    pub fn floating(&self, cycle: u32) -> Option<u16> {
        self.floating.get(cycle as usize).copied().flatten()
    }
}
