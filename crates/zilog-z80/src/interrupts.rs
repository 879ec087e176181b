//! Interrupt controller.
//!
//! Tracks which source lines are asserted and walks the
//! `Idle -> Pending -> Dispatching -> Idle` state machine. The sequencer asks
//! for a request at opcode boundaries and consults the checkpoint inside the
//! entry sequence; everything else is line bookkeeping.

use emu_core::{SaveState, SectionReader, SectionWriter, SnapshotError};
use log::trace;

/// Index into the controller's source list. Lower index wins.
pub type SourceId = usize;

/// Source list position of the NMI in [`InterruptController::standard`].
pub const NMI: SourceId = 0;
/// Source list position of INT in [`InterruptController::standard`].
pub const INT: SourceId = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    /// Gated by IFF1.
    Maskable,
    NonMaskable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Requests for as long as the line is held.
    Level,
    /// Latches on assertion; the latch clears when the request is accepted.
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSource {
    pub name: &'static str,
    pub kind: InterruptKind,
    pub trigger: Trigger,
}

impl InterruptSource {
    #[must_use]
    pub const fn new(name: &'static str, kind: InterruptKind, trigger: Trigger) -> Self {
        Self { name, kind, trigger }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Pending(SourceId),
    Dispatching(SourceId),
}

#[derive(Debug, Clone)]
pub struct InterruptController {
    sources: Vec<InterruptSource>,
    /// One bit per source: line held (level) or latched (edge).
    lines: u32,
    /// Mirror of the CPU's IFF1.
    master_enable: bool,
    state: ControllerState,
    /// Set when the in-flight request is cancelled before its checkpoint.
    withdrawn: bool,
}

impl InterruptController {
    /// Up to 32 sources, in priority order.
    #[must_use]
    pub fn new(sources: Vec<InterruptSource>) -> Self {
        let mut sources = sources;
        sources.truncate(32);
        Self {
            sources,
            lines: 0,
            master_enable: false,
            state: ControllerState::Idle,
            withdrawn: false,
        }
    }

    /// The Z80's two pins: edge-triggered NMI ahead of level-triggered INT.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            InterruptSource::new("nmi", InterruptKind::NonMaskable, Trigger::Edge),
            InterruptSource::new("int", InterruptKind::Maskable, Trigger::Level),
        ])
    }

    #[must_use]
    pub fn sources(&self) -> &[InterruptSource] {
        &self.sources
    }

    #[must_use]
    pub fn source_id(&self, name: &str) -> Option<SourceId> {
        self.sources.iter().position(|s| s.name == name)
    }

    #[must_use]
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub const fn master_enable(&self) -> bool {
        self.master_enable
    }

    #[must_use]
    pub fn is_asserted(&self, source: SourceId) -> bool {
        source < self.sources.len() && self.lines & (1 << source) != 0
    }

    /// True once the in-flight request has been cancelled.
    #[must_use]
    pub const fn is_withdrawn(&self) -> bool {
        self.withdrawn
    }

    /// Assert a source line. Unknown ids are ignored.
    pub fn raise(&mut self, source: SourceId) {
        if source < self.sources.len() {
            self.lines |= 1 << source;
            self.refresh();
        }
    }

    /// De-assert a line. A request the CPU has already accepted is unaffected.
    pub fn lower(&mut self, source: SourceId) {
        if source < self.sources.len() {
            self.lines &= !(1 << source);
            self.refresh();
        }
    }

    /// De-assert a line and withdraw the request if it is being dispatched.
    pub fn cancel(&mut self, source: SourceId) {
        if source >= self.sources.len() {
            return;
        }
        self.lines &= !(1 << source);
        if self.state == ControllerState::Dispatching(source) && !self.withdrawn {
            trace!("interrupt {} withdrawn during dispatch", self.sources[source].name);
            self.withdrawn = true;
        }
        self.refresh();
    }

    /// Follow the CPU's IFF1.
    pub fn set_master_enable(&mut self, enabled: bool) {
        self.master_enable = enabled;
        self.refresh();
    }

    /// Re-evaluate `Idle`/`Pending` from the lines and the master enable.
    /// A dispatch in progress is left alone.
    pub fn refresh(&mut self) {
        if matches!(self.state, ControllerState::Dispatching(_)) {
            return;
        }
        let winner = self.sources.iter().enumerate().position(|(id, source)| {
            self.lines & (1 << id) != 0
                && (source.kind == InterruptKind::NonMaskable || self.master_enable)
        });
        self.state = winner.map_or(ControllerState::Idle, ControllerState::Pending);
    }

    /// Accept the pending request, if any. Edge latches clear here.
    pub fn begin_dispatch(&mut self) -> Option<(SourceId, InterruptKind)> {
        let ControllerState::Pending(id) = self.state else {
            return None;
        };
        let source = self.sources[id];
        if source.trigger == Trigger::Edge {
            self.lines &= !(1 << id);
        }
        self.state = ControllerState::Dispatching(id);
        self.withdrawn = false;
        trace!("interrupt {} accepted", source.name);
        Some((id, source.kind))
    }

    /// Checkpoint inside the entry sequence: true if the request still stands.
    #[must_use]
    pub const fn checkpoint(&self) -> bool {
        !self.withdrawn
    }

    /// The entry sequence has finished.
    pub fn complete(&mut self) {
        self.state = ControllerState::Idle;
        self.withdrawn = false;
        self.refresh();
    }

    /// CPU reset: abandon any dispatch and mask. Lines stay as their drivers
    /// left them.
    pub fn reset(&mut self) {
        self.master_enable = false;
        self.state = ControllerState::Idle;
        self.withdrawn = false;
        self.refresh();
    }
}

impl SaveState for InterruptController {
    fn save_state(&self, out: &mut SectionWriter) {
        let (tag, source) = match self.state {
            ControllerState::Idle => (0, 0),
            ControllerState::Pending(id) => (1, id),
            ControllerState::Dispatching(id) => (2, id),
        };
        out.u32("lines", self.lines);
        out.bool("master_enable", self.master_enable);
        out.u8("state", tag);
        out.u8("source", source as u8);
        out.bool("withdrawn", self.withdrawn);
    }

    fn load_state(&mut self, input: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        let lines = input.u32("lines")?;
        let master_enable = input.bool("master_enable")?;
        let tag = input.u8("state")?;
        let source = usize::from(input.u8("source")?);
        let withdrawn = input.bool("withdrawn")?;

        let known = u32::try_from(self.sources.len())
            .ok()
            .and_then(|n| 1u32.checked_shl(n))
            .map_or(u32::MAX, |bit| bit - 1);
        if lines & !known != 0 {
            return Err(input.invalid("lines"));
        }
        if tag != 0 && source >= self.sources.len() {
            return Err(input.invalid("source"));
        }
        self.state = match tag {
            0 => ControllerState::Idle,
            1 => ControllerState::Pending(source),
            2 => ControllerState::Dispatching(source),
            _ => return Err(input.invalid("state")),
        };
        self.lines = lines;
        self.master_enable = master_enable;
        self.withdrawn = withdrawn;
        Ok(())
    }
}
