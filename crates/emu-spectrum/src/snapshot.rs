//! Machine snapshot file.
//!
//! Layout: the header (`ZXES`, version) then these sections, in this order:
//!
//! | Section      | Contents                                        |
//! |--------------|-------------------------------------------------|
//! | `machine`    | model, CPU variant, board and Kempston fitting  |
//! | `cpu`        | registers plus the in-flight program and cursor |
//! | `interrupts` | line levels and dispatch state                  |
//! | `ula`        | frame clock and border                          |
//! | `memory`     | RAM and paging latches                          |
//! | `ports`      | bus clock and port device state                 |
//! | `board`      | board registers (empty with no board)           |
//!
//! A snapshot restores only onto a machine built from the same
//! configuration; anything else is a [`SnapshotError::MachineMismatch`].

use std::fmt;

use emu_core::{SaveState, SectionReader, SectionWriter, SnapshotError, StateReader, StateWriter};
use zilog_z80::Z80;

use crate::bus::SpectrumBus;
use crate::config::MachineConfig;

pub const MAGIC: [u8; 4] = *b"ZXES";
pub const VERSION: u8 = 1;

/// Section names in file order.
pub const SECTIONS: [&str; 7] = ["machine", "cpu", "interrupts", "ula", "memory", "ports", "board"];

/// What a snapshot was taken on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MachineIdentity {
    model: String,
    cpu: String,
    board: String,
    kempston: bool,
}

impl MachineIdentity {
    fn of(config: &MachineConfig) -> Self {
        Self {
            model: config.model.name().to_string(),
            cpu: config.cpu_variant.name().to_string(),
            board: config.board_name().to_string(),
            kempston: config.kempston,
        }
    }

    fn save(&self, out: &mut SectionWriter) {
        out.str("model", &self.model);
        out.str("cpu", &self.cpu);
        out.str("board", &self.board);
        out.bool("kempston", self.kempston);
    }

    fn load(src: &mut SectionReader<'_>) -> Result<Self, SnapshotError> {
        Ok(Self {
            model: src.str("model")?.to_string(),
            cpu: src.str("cpu")?.to_string(),
            board: src.str("board")?.to_string(),
            kempston: src.bool("kempston")?,
        })
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} CPU, board {}", self.model, self.cpu, self.board)?;
        if self.kempston {
            f.write_str(", Kempston")?;
        }
        f.write_str(")")
    }
}

/// Serialise the whole machine.
pub(crate) fn save(config: &MachineConfig, cpu: &Z80, bus: &SpectrumBus) -> Vec<u8> {
    let mut writer = StateWriter::new(MAGIC, VERSION);
    writer.section("machine", |out| MachineIdentity::of(config).save(out));
    writer.component("cpu", cpu);
    writer.component("interrupts", cpu.interrupts());
    writer.component("ula", &bus.ula);
    writer.component("memory", &bus.devices.paging);
    writer.section("ports", |out| bus.save_ports(out));
    writer.section("board", |out| {
        if let Some(board) = bus.board() {
            board.save_state(out);
        }
    });
    writer.finish()
}

/// Load a snapshot into `cpu` and `bus`. On error they are left partly
/// written; callers load into copies.
pub(crate) fn load(
    data: &[u8],
    config: &MachineConfig,
    cpu: &mut Z80,
    bus: &mut SpectrumBus,
) -> Result<(), SnapshotError> {
    let mut reader = StateReader::new(data, MAGIC, VERSION)?;

    let mut section = reader.section("machine")?;
    let found = MachineIdentity::load(&mut section)?;
    section.finish()?;
    let expected = MachineIdentity::of(config);
    if found != expected {
        return Err(SnapshotError::MachineMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }

    reader.component("cpu", cpu)?;
    reader.component("interrupts", cpu.interrupts_mut())?;
    reader.component("ula", &mut bus.ula)?;
    reader.component("memory", &mut bus.devices.paging)?;

    let mut section = reader.section("ports")?;
    bus.load_ports(&mut section)?;
    section.finish()?;

    let mut section = reader.section("board")?;
    if let Some(board) = &mut bus.devices.board {
        board.load_state(&mut section)?;
    }
    section.finish()?;

    reader.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoardConfig, SpectrumModel};

    fn parts(config: &MachineConfig) -> (Z80, SpectrumBus) {
        (
            Z80::with_variant(config.cpu_variant),
            SpectrumBus::new(config).expect("valid config"),
        )
    }

    fn config_48k() -> MachineConfig {
        MachineConfig::new(SpectrumModel::Spectrum48K, vec![0; 0x4000])
    }

    /// Section names as they appear in an image.
    fn section_names(data: &[u8]) -> Vec<String> {
        let mut names = Vec::new();
        let mut pos = 5;
        while pos < data.len() {
            let len = usize::from(data[pos]);
            names.push(String::from_utf8(data[pos + 1..pos + 1 + len].to_vec()).expect("utf-8"));
            pos += 1 + len;
            let blob = u32::from_le_bytes(data[pos..pos + 4].try_into().expect("length")) as usize;
            pos += 4 + blob;
        }
        names
    }

    #[test]
    fn sections_in_fixed_order() {
        let config = config_48k();
        let (cpu, bus) = parts(&config);
        let data = save(&config, &cpu, &bus);
        assert_eq!(&data[..4], b"ZXES");
        assert_eq!(data[4], VERSION);
        assert_eq!(section_names(&data), SECTIONS);
    }

    #[test]
    fn round_trip_into_fresh_machine() {
        let config = config_48k();
        let (cpu, mut bus) = parts(&config);
        bus.devices.paging.load_ram_bank(0, &[1, 2, 3]).expect("bank");
        bus.ula.set_border(4);
        let data = save(&config, &cpu, &bus);

        let (mut cpu2, mut bus2) = parts(&config);
        load(&data, &config, &mut cpu2, &mut bus2).expect("restore");
        assert_eq!(bus2.peek(0x4001), 2);
        assert_eq!(bus2.ula.border(), 4);
        assert_eq!(save(&config, &cpu2, &bus2), data);
    }

    #[test]
    fn other_model_is_a_mismatch() {
        let config = config_48k();
        let (cpu, bus) = parts(&config);
        let data = save(&config, &cpu, &bus);

        let other = MachineConfig::new(SpectrumModel::Spectrum16K, vec![0; 0x4000]);
        let (mut cpu2, mut bus2) = parts(&other);
        let err = load(&data, &other, &mut cpu2, &mut bus2).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::MachineMismatch {
                expected: "16k (nmos CPU, board none)".to_string(),
                found: "48k (nmos CPU, board none)".to_string(),
            }
        );
    }

    #[test]
    fn board_fitting_is_part_of_the_identity() {
        let config = config_48k();
        let (cpu, bus) = parts(&config);
        let data = save(&config, &cpu, &bus);

        let with_board = config_48k()
            .with_kempston(true)
            .with_board(BoardConfig::xor_protection(vec![0; 0x4000]));
        let (mut cpu2, mut bus2) = parts(&with_board);
        let err = load(&data, &with_board, &mut cpu2, &mut bus2).unwrap_err();
        assert!(matches!(err, SnapshotError::MachineMismatch { .. }));
        assert!(err.to_string().contains("xor-protection"));
    }

    #[test]
    fn bad_header() {
        let config = config_48k();
        let (mut cpu, mut bus) = parts(&config);
        assert_eq!(load(b"ZX", &config, &mut cpu, &mut bus), Err(SnapshotError::Truncated));
        assert_eq!(load(b"ABCD\x01", &config, &mut cpu, &mut bus), Err(SnapshotError::BadMagic));
        assert_eq!(
            load(b"ZXES\x09", &config, &mut cpu, &mut bus),
            Err(SnapshotError::Version { expected: VERSION, found: 9 })
        );
    }
}
