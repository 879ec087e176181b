//! Sinclair ULA timing model.
//!
//! The ULA owns the frame clock. It raises INT at the start of every frame,
//! holds the border latch, and steals cycles from the CPU while it fetches
//! the display. Rendering is left to whoever reads screen memory; this crate
//! only answers timing questions.
//!
//! # Frame layout (48K)
//!
//! - 224 T-states per line, 312 lines, 69,888 T-states per frame
//! - INT held for the first 32 T-states
//! - screen fetch on lines 64-255, T-states 0-127 of each line, starting at
//!   frame cycle 14,335
//!
//! The 128K and +3 stretch the line to 228 T-states and drop a line. Per-model
//! figures live in [`UlaTiming`].
//!
//! # Contention
//!
//! During the fetch window, an access to contended memory waits according to
//! an 8-cycle pattern (`6,5,4,3,2,1,0,0` on Sinclair machines). The delays
//! and the floating-bus addresses are precomputed per frame cycle in a
//! [`ContentionTable`].

#![allow(clippy::cast_possible_truncation)]

mod contention;
mod timing;

use std::sync::Arc;

use emu_core::{Observable, SaveState, SectionReader, SectionWriter, SnapshotError, Tickable, Value};
use log::trace;

pub use contention::{ContentionTable, SCREEN_BYTES, attribute_offset, bitmap_offset};
pub use timing::{FETCH_CYCLES_PER_LINE, SCREEN_LINES, UlaTiming};

/// Sinclair ULA frame clock and bus arbiter.
#[derive(Debug, Clone)]
pub struct Ula {
    timing: UlaTiming,
    table: Arc<ContentionTable>,
    /// T-state within the current frame.
    frame_cycle: u32,
    /// Completed frames.
    frame_count: u64,
    /// Frame complete flag, auto-clears on read.
    frame_complete: bool,
    /// Current border colour (0-7).
    border: u8,
}

impl Ula {
    #[must_use]
    pub fn new(timing: UlaTiming) -> Self {
        Self::with_table(timing, Arc::new(ContentionTable::build(&timing)))
    }

    /// A ULA sharing an already-built table. `table` must come from `timing`.
    #[must_use]
    pub fn with_table(timing: UlaTiming, table: Arc<ContentionTable>) -> Self {
        Self {
            timing,
            table,
            frame_cycle: 0,
            frame_count: 0,
            frame_complete: false,
            border: 7, // White border on power-up
        }
    }

    #[must_use]
    pub fn timing(&self) -> &UlaTiming {
        &self.timing
    }

    #[must_use]
    pub fn table(&self) -> &Arc<ContentionTable> {
        &self.table
    }

    /// T-state within the current frame.
    #[must_use]
    pub fn frame_cycle(&self) -> u32 {
        self.frame_cycle
    }

    /// Frames completed since power-on.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Current scanline (0-based, line 0 starts with INT).
    #[must_use]
    pub fn line(&self) -> u32 {
        self.frame_cycle / self.timing.cycles_per_line
    }

    /// T-state within the current scanline.
    #[must_use]
    pub fn line_cycle(&self) -> u32 {
        self.frame_cycle % self.timing.cycles_per_line
    }

    /// Is the INT signal currently asserted?
    #[must_use]
    pub fn int_active(&self) -> bool {
        self.frame_cycle < self.timing.int_length
    }

    /// Advance the frame clock. Returns the number of frame boundaries
    /// crossed.
    pub fn advance(&mut self, cycles: u32) -> u32 {
        let total = self.frame_cycle + cycles;
        let wraps = total / self.timing.frame_cycles;
        self.frame_cycle = total % self.timing.frame_cycles;
        if wraps > 0 {
            self.frame_count += u64::from(wraps);
            self.frame_complete = true;
            trace!("frame {} complete", self.frame_count);
        }
        wraps
    }

    /// Has a frame completed? Auto-clears on read.
    pub fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    /// Wait states for a contended memory access now.
    #[must_use]
    pub fn memory_delay(&self) -> u8 {
        self.table.delay(self.frame_cycle)
    }

    /// Wait states for a port access now.
    ///
    /// `high_contended` is true when the port's high byte, taken as an
    /// address, falls in a contended window. Four cases:
    ///
    /// | High byte contended | Even (ULA) port | Pattern          |
    /// |---------------------|-----------------|------------------|
    /// | No                  | No              | N:4              |
    /// | No                  | Yes             | N:1, C:3         |
    /// | Yes                 | Yes             | C:1, C:3         |
    /// | Yes                 | No              | C:1, C:1, C:1, C:1 |
    ///
    /// "C:n" applies the contention at the cycle reached so far, then moves
    /// on n cycles.
    #[must_use]
    pub fn io_delay(&self, port: u16, high_contended: bool) -> u32 {
        if !self.timing.io_contention {
            return 0;
        }
        let at = |offset: u32| u32::from(self.table.delay(self.frame_cycle + offset));
        let ula_port = port & 0x0001 == 0;
        match (high_contended, ula_port) {
            (false, false) => 0,
            (false, true) => at(1),
            (true, true) => {
                let first = at(0);
                first + at(1 + first)
            }
            (true, false) => (0..4).fold(0, |total, step| total + at(step + total)),
        }
    }

    /// Screen-bank offset of the byte the ULA drove onto the data bus on the
    /// previous cycle. `None` when the bus was idle or the model has no
    /// floating bus.
    #[must_use]
    pub fn floating_offset(&self) -> Option<u16> {
        if !self.timing.floating_bus {
            return None;
        }
        self.table.floating(self.frame_cycle.checked_sub(1)?)
    }

    /// Current border colour index (0-7).
    #[must_use]
    pub fn border(&self) -> u8 {
        self.border
    }

    /// Set border colour (from an even port write).
    pub fn set_border(&mut self, colour: u8) {
        self.border = colour & 0x07;
    }

    /// Position the frame clock (for testing).
    #[doc(hidden)]
    pub fn set_frame_cycle(&mut self, cycle: u32) {
        self.frame_cycle = cycle % self.timing.frame_cycles;
    }
}

impl Tickable for Ula {
    fn tick(&mut self) {
        self.advance(1);
    }
}

const ULA_QUERY_PATHS: &[&str] = &[
    "frame_cycle",
    "frame_count",
    "line",
    "line_cycle",
    "border",
    "int",
    "contention",
];

impl Observable for Ula {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "frame_cycle" => Some(self.frame_cycle.into()),
            "frame_count" => Some(self.frame_count.into()),
            "line" => Some(self.line().into()),
            "line_cycle" => Some(self.line_cycle().into()),
            "border" => Some(self.border.into()),
            "int" => Some(self.int_active().into()),
            "contention" => Some(self.memory_delay().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        ULA_QUERY_PATHS
    }
}

impl SaveState for Ula {
    fn save_state(&self, out: &mut SectionWriter) {
        out.str("timing", self.timing.name);
        out.u32("frame_cycle", self.frame_cycle);
        out.u64("frame_count", self.frame_count);
        out.bool("frame_complete", self.frame_complete);
        out.u8("border", self.border);
    }

    fn load_state(&mut self, input: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        if input.str("timing")? != self.timing.name {
            return Err(input.invalid("timing"));
        }
        let frame_cycle = input.u32("frame_cycle")?;
        if frame_cycle >= self.timing.frame_cycles {
            return Err(input.invalid("frame_cycle"));
        }
        let frame_count = input.u64("frame_count")?;
        let frame_complete = input.bool("frame_complete")?;
        let border = input.u8("border")?;
        if border > 7 {
            return Err(input.invalid("border"));
        }
        self.frame_cycle = frame_cycle;
        self.frame_count = frame_count;
        self.frame_complete = frame_complete;
        self.border = border;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::{StateReader, StateWriter};

    fn ula_at(cycle: u32) -> Ula {
        let mut ula = Ula::new(UlaTiming::SINCLAIR_48K);
        ula.set_frame_cycle(cycle);
        ula
    }

    #[test]
    fn frame_wraps_and_counts() {
        let mut ula = Ula::new(UlaTiming::SINCLAIR_48K);
        assert_eq!(ula.advance(69_887), 0);
        assert!(!ula.take_frame_complete());
        assert_eq!(ula.advance(1), 1);
        assert_eq!(ula.frame_cycle(), 0);
        assert_eq!(ula.frame_count(), 1);
        assert!(ula.take_frame_complete());
        assert!(!ula.take_frame_complete(), "take_frame_complete should auto-clear");
    }

    #[test]
    fn advance_carries_stall_into_next_frame() {
        let mut ula = ula_at(69_885);
        assert_eq!(ula.advance(6), 1);
        assert_eq!(ula.frame_cycle(), 3);
    }

    #[test]
    fn int_timing() {
        let mut ula = Ula::new(UlaTiming::SINCLAIR_48K);
        for _ in 0..32 {
            assert!(ula.int_active());
            ula.tick();
        }
        assert!(!ula.int_active());

        let mut ula = Ula::new(UlaTiming::SINCLAIR_128K);
        ula.advance(35);
        assert!(ula.int_active());
        ula.tick();
        assert!(!ula.int_active());
    }

    #[test]
    fn line_position() {
        let ula = ula_at(64 * 224 + 10);
        assert_eq!(ula.line(), 64);
        assert_eq!(ula.line_cycle(), 10);
    }

    #[test]
    fn border_colour() {
        let mut ula = Ula::new(UlaTiming::SINCLAIR_48K);
        assert_eq!(ula.border(), 7);

        ula.set_border(2);
        assert_eq!(ula.border(), 2);

        ula.set_border(0xFF);
        assert_eq!(ula.border(), 7);
    }

    // === Contention tests ===

    #[test]
    fn memory_delay_in_screen_area() {
        assert_eq!(ula_at(14_335).memory_delay(), 6);
        assert_eq!(ula_at(14_336).memory_delay(), 5);
        assert_eq!(ula_at(14_341).memory_delay(), 0);
        assert_eq!(ula_at(14_342).memory_delay(), 0);
        assert_eq!(ula_at(14_343).memory_delay(), 6);
    }

    #[test]
    fn memory_delay_outside_screen_area() {
        assert_eq!(ula_at(0).memory_delay(), 0);
        assert_eq!(ula_at(14_335 + 130).memory_delay(), 0);
        assert_eq!(ula_at(256 * 224).memory_delay(), 0);
    }

    #[test]
    fn io_contention_no_contended_no_ula() {
        assert_eq!(ula_at(14_335).io_delay(0x01FF, false), 0);
    }

    #[test]
    fn io_contention_no_contended_ula() {
        // N:1, C:3 -> contention one cycle in
        assert_eq!(ula_at(14_335).io_delay(0x00FE, false), 5);
    }

    #[test]
    fn io_contention_contended_ula() {
        // C:1, C:3 -> 6 at the start, then pattern[(1+6)%8] = 0
        assert_eq!(ula_at(14_335).io_delay(0x40FE, true), 6);
    }

    #[test]
    fn io_contention_contended_not_ula() {
        // d0 = 6, d1 at +7 = 0, d2 at +8 = 6, d3 at +15 = 0
        assert_eq!(ula_at(14_335).io_delay(0x40FF, true), 12);
    }

    #[test]
    fn io_contention_outside_screen() {
        let ula = ula_at(0);
        assert_eq!(ula.io_delay(0x40FE, true), 0);
        assert_eq!(ula.io_delay(0x40FF, true), 0);
        assert_eq!(ula.io_delay(0x00FE, false), 0);
    }

    #[test]
    fn plus3_has_no_io_contention() {
        let mut ula = Ula::new(UlaTiming::AMSTRAD_PLUS3);
        ula.set_frame_cycle(14_363);
        assert_eq!(ula.memory_delay(), 7);
        assert_eq!(ula.io_delay(0x40FF, true), 0);
    }

    // === Floating bus tests ===

    #[test]
    fn floating_bus_reads_previous_cycle() {
        let ula = ula_at(14_338);
        assert_eq!(ula.floating_offset(), Some(0x0000));
        let ula = ula_at(14_339);
        assert_eq!(ula.floating_offset(), Some(0x1800));
    }

    #[test]
    fn floating_bus_idle_outside_display() {
        assert_eq!(ula_at(0).floating_offset(), None);
        assert_eq!(ula_at(100).floating_offset(), None);
        assert_eq!(ula_at(14_338 + 4).floating_offset(), None);
    }

    #[test]
    fn plus3_has_no_floating_bus() {
        let mut ula = Ula::new(UlaTiming::AMSTRAD_PLUS3);
        ula.set_frame_cycle(14_364);
        assert_eq!(ula.floating_offset(), None);
    }

    #[test]
    fn clones_share_the_table() {
        let ula = Ula::new(UlaTiming::SINCLAIR_48K);
        let copy = ula.clone();
        assert!(Arc::ptr_eq(ula.table(), copy.table()));
    }

    #[test]
    fn save_state_round_trip() {
        let mut ula = ula_at(12_345);
        ula.set_border(3);
        let mut writer = StateWriter::new(*b"TEST", 1);
        writer.component("ula", &ula);
        let data = writer.finish();

        let mut restored = Ula::new(UlaTiming::SINCLAIR_48K);
        let mut reader = StateReader::new(&data, *b"TEST", 1).expect("header");
        reader.component("ula", &mut restored).expect("ula section");
        reader.finish().expect("no trailing data");
        assert_eq!(restored.frame_cycle(), 12_345);
        assert_eq!(restored.border(), 3);

        let mut other = Ula::new(UlaTiming::SINCLAIR_128K);
        let mut reader = StateReader::new(&data, *b"TEST", 1).expect("header");
        assert!(reader.component("ula", &mut other).is_err());
    }
}
