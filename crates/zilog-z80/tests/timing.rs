//! T-state costs checked against the documented Z80 timing table.
//!
//! Each row runs one instruction from a boundary to the next unprefixed
//! boundary and counts ticks.

use emu_core::{Cpu, Observable, SimpleBus, Value};
use serde::Deserialize;
use zilog_z80::Z80;

const TABLE: &str = r#"[
    { "name": "NOP",             "bytes": "00",          "t": 4 },
    { "name": "LD BC,nn",        "bytes": "01 34 12",    "t": 10 },
    { "name": "LD A,n",          "bytes": "3E 42",       "t": 7 },
    { "name": "INC HL",          "bytes": "23",          "t": 6 },
    { "name": "ADD HL,BC",       "bytes": "09",          "t": 11 },
    { "name": "LD (HL),n",       "bytes": "36 AA",       "t": 10 },
    { "name": "INC (HL)",        "bytes": "34",          "t": 11 },
    { "name": "LD (nn),A",       "bytes": "32 00 90",    "t": 13 },
    { "name": "LD HL,(nn)",      "bytes": "2A 00 90",    "t": 16 },
    { "name": "JR e",            "bytes": "18 02",       "t": 12 },
    { "name": "JR NZ taken",     "bytes": "20 02",       "t": 12, "f": 0 },
    { "name": "JR NZ not taken", "bytes": "20 02",       "t": 7,  "f": 64 },
    { "name": "DJNZ taken",      "bytes": "10 FE",       "t": 13, "bc": 512 },
    { "name": "DJNZ not taken",  "bytes": "10 FE",       "t": 8,  "bc": 256 },
    { "name": "JP nn",           "bytes": "C3 00 50",    "t": 10 },
    { "name": "JP Z not taken",  "bytes": "CA 00 50",    "t": 10, "f": 0 },
    { "name": "CALL nn",         "bytes": "CD 00 50",    "t": 17 },
    { "name": "CALL NZ taken",   "bytes": "C4 00 50",    "t": 17, "f": 0 },
    { "name": "CALL NZ skipped", "bytes": "C4 00 50",    "t": 10, "f": 64 },
    { "name": "RET",             "bytes": "C9",          "t": 10 },
    { "name": "RET Z taken",     "bytes": "C8",          "t": 11, "f": 64 },
    { "name": "RET Z skipped",   "bytes": "C8",          "t": 5,  "f": 0 },
    { "name": "PUSH BC",         "bytes": "C5",          "t": 11 },
    { "name": "POP BC",          "bytes": "C1",          "t": 10 },
    { "name": "RST 38",          "bytes": "FF",          "t": 11 },
    { "name": "EX (SP),HL",      "bytes": "E3",          "t": 19 },
    { "name": "LD SP,HL",        "bytes": "F9",          "t": 6 },
    { "name": "OUT (n),A",       "bytes": "D3 FE",       "t": 11 },
    { "name": "IN A,(n)",        "bytes": "DB FE",       "t": 11 },
    { "name": "HALT",            "bytes": "76",          "t": 4 },
    { "name": "RLC B",           "bytes": "CB 00",       "t": 8 },
    { "name": "BIT 0,(HL)",      "bytes": "CB 46",       "t": 12 },
    { "name": "SET 0,(HL)",      "bytes": "CB C6",       "t": 15 },
    { "name": "LD IX,nn",        "bytes": "DD 21 00 00", "t": 14 },
    { "name": "LD A,(IX+d)",     "bytes": "DD 7E 05",    "t": 19 },
    { "name": "LD (IX+d),n",     "bytes": "DD 36 05 AA", "t": 19 },
    { "name": "INC (IX+d)",      "bytes": "DD 34 05",    "t": 23 },
    { "name": "ADD IX,BC",       "bytes": "DD 09",       "t": 15 },
    { "name": "PUSH IX",         "bytes": "DD E5",       "t": 15 },
    { "name": "EX (SP),IY",      "bytes": "FD E3",       "t": 23 },
    { "name": "JP (IX)",         "bytes": "DD E9",       "t": 8 },
    { "name": "LD A,IXH",        "bytes": "DD 7C",       "t": 8 },
    { "name": "DD NOP",          "bytes": "DD 00",       "t": 8 },
    { "name": "BIT 0,(IX+d)",    "bytes": "DD CB 05 46", "t": 20 },
    { "name": "RLC (IX+d)",      "bytes": "DD CB 05 06", "t": 23 },
    { "name": "SET 1,(IY+d)",    "bytes": "FD CB 05 CE", "t": 23 },
    { "name": "IN B,(C)",        "bytes": "ED 40",       "t": 12 },
    { "name": "OUT (C),B",       "bytes": "ED 41",       "t": 12 },
    { "name": "SBC HL,BC",       "bytes": "ED 42",       "t": 15 },
    { "name": "LD (nn),BC",      "bytes": "ED 43 00 90", "t": 20 },
    { "name": "LD SP,(nn)",      "bytes": "ED 7B 00 90", "t": 20 },
    { "name": "NEG",             "bytes": "ED 44",       "t": 8 },
    { "name": "RETN",            "bytes": "ED 45",       "t": 14 },
    { "name": "IM 1",            "bytes": "ED 56",       "t": 8 },
    { "name": "LD A,I",          "bytes": "ED 57",       "t": 9 },
    { "name": "RLD",             "bytes": "ED 6F",       "t": 18 },
    { "name": "LDI",             "bytes": "ED A0",       "t": 16 },
    { "name": "LDIR repeating",  "bytes": "ED B0",       "t": 21, "bc": 2 },
    { "name": "LDIR last",       "bytes": "ED B0",       "t": 16, "bc": 1 },
    { "name": "CPIR repeating",  "bytes": "ED B1",       "t": 21, "bc": 2 },
    { "name": "INI",             "bytes": "ED A2",       "t": 16 },
    { "name": "OTIR repeating",  "bytes": "ED B3",       "t": 21, "bc": 512 },
    { "name": "OTIR last",       "bytes": "ED B3",       "t": 16, "bc": 256 },
    { "name": "ED undefined",    "bytes": "ED 00",       "t": 8 }
]"#;

#[derive(Deserialize)]
struct Row {
    name: String,
    bytes: String,
    t: u64,
    #[serde(default)]
    f: u8,
    #[serde(default = "default_bc")]
    bc: u16,
}

fn default_bc() -> u16 {
    0x0002
}

fn parse_bytes(text: &str) -> Vec<u8> {
    text.split_whitespace()
        .map(|b| u8::from_str_radix(b, 16).expect("hex byte"))
        .collect()
}

/// Ticks from the start of the instruction to the next unprefixed boundary.
fn measure(row: &Row) -> u64 {
    let mut bus = SimpleBus::new();
    bus.load(0x4000, &parse_bytes(&row.bytes));

    let mut cpu = Z80::new();
    {
        let regs = cpu.regs_mut();
        regs.pc = 0x4000;
        regs.sp = 0xF000;
        regs.set_hl(0x9000);
        regs.set_de(0xA000);
        regs.set_bc(row.bc);
        regs.ix = 0x9100;
        regs.iy = 0x9200;
        regs.f = row.f;
    }

    let mut ticks = 0;
    loop {
        cpu.tick(&mut bus);
        ticks += 1;
        let unprefixed = cpu.query("table") == Some(Value::from("main"));
        if cpu.at_boundary() && unprefixed {
            return ticks;
        }
        assert!(ticks < 100, "{} never finished", row.name);
    }
}

#[test]
fn documented_timings() {
    let rows: Vec<Row> = serde_json::from_str(TABLE).expect("timing table parses");
    let failures: Vec<String> = rows
        .iter()
        .filter_map(|row| {
            let got = measure(row);
            (got != row.t).then(|| format!("{}: got {got}, want {}", row.name, row.t))
        })
        .collect();
    assert!(failures.is_empty(), "timing mismatches:\n{}", failures.join("\n"));
}
