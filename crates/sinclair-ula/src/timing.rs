//! Per-model ULA timing constants.

/// Active display lines.
pub const SCREEN_LINES: u32 = 192;

/// T-states per line during which the ULA fetches screen data.
pub const FETCH_CYCLES_PER_LINE: u32 = 128;

/// Video timing for one ULA variant.
///
/// All figures are CPU T-states. Frame cycle 0 is the start of the INT pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlaTiming {
    pub name: &'static str,
    /// T-states per frame.
    pub frame_cycles: u32,
    /// T-states per scanline.
    pub cycles_per_line: u32,
    /// Frame cycle of the first contended access on the first screen line.
    pub first_contended: u32,
    /// Length of the INT pulse.
    pub int_length: u32,
    /// Delay added to an access at each cycle of an 8-cycle fetch group.
    pub pattern: [u8; 8],
    /// Whether port accesses are contended.
    pub io_contention: bool,
    /// Whether unclaimed port reads see the ULA's screen fetches.
    pub floating_bus: bool,
}

impl UlaTiming {
    /// 16K and 48K Spectrum.
    pub const SINCLAIR_48K: Self = Self {
        name: "48k",
        frame_cycles: 69_888,
        cycles_per_line: 224,
        first_contended: 14_335,
        int_length: 32,
        pattern: [6, 5, 4, 3, 2, 1, 0, 0],
        io_contention: true,
        floating_bus: true,
    };

    /// 128K and grey +2.
    pub const SINCLAIR_128K: Self = Self {
        name: "128k",
        frame_cycles: 70_908,
        cycles_per_line: 228,
        first_contended: 14_361,
        int_length: 36,
        pattern: [6, 5, 4, 3, 2, 1, 0, 0],
        io_contention: true,
        floating_bus: true,
    };

    /// +2A and +3 gate array. Contention only on memory cycles, and the
    /// data bus is pulled up on idle port reads.
    pub const AMSTRAD_PLUS3: Self = Self {
        name: "plus3",
        frame_cycles: 70_908,
        cycles_per_line: 228,
        first_contended: 14_361,
        int_length: 32,
        pattern: [1, 0, 7, 6, 5, 4, 3, 2],
        io_contention: false,
        floating_bus: false,
    };

    /// Scanlines per frame.
    #[must_use]
    pub const fn lines_per_frame(&self) -> u32 {
        self.frame_cycles / self.cycles_per_line
    }

    /// Frame cycle at which line `line` of the display area starts fetching.
    #[must_use]
    pub const fn screen_line_start(&self, line: u32) -> u32 {
        self.first_contended + line * self.cycles_per_line
    }
}
