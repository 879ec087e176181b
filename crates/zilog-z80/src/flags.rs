//! Z80 flag register bits.

/// Sign flag (bit 7).
pub const SF: u8 = 0b1000_0000;

/// Zero flag (bit 6).
pub const ZF: u8 = 0b0100_0000;

/// Undocumented copy of result bit 5.
pub const YF: u8 = 0b0010_0000;

/// Half-carry flag (bit 4).
pub const HF: u8 = 0b0001_0000;

/// Undocumented copy of result bit 3.
pub const XF: u8 = 0b0000_1000;

/// Parity/overflow flag (bit 2).
pub const PF: u8 = 0b0000_0100;

/// Add/subtract flag (bit 1).
pub const NF: u8 = 0b0000_0010;

/// Carry flag (bit 0).
pub const CF: u8 = 0b0000_0001;

/// True if `value` has an even number of set bits.
#[must_use]
pub const fn parity(value: u8) -> bool {
    value.count_ones().is_multiple_of(2)
}

/// Sign, zero and the two undocumented bits for a result byte.
#[must_use]
pub const fn sz53(value: u8) -> u8 {
    let mut f = value & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// `sz53` plus parity in P/V.
#[must_use]
pub const fn sz53p(value: u8) -> u8 {
    let f = sz53(value);
    if parity(value) { f | PF } else { f }
}

/// `flag` if `cond` holds, otherwise 0.
#[must_use]
pub const fn flag_if(cond: bool, flag: u8) -> u8 {
    if cond { flag } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sz53p_of_zero_sets_zero_and_parity() {
        assert_eq!(sz53p(0), ZF | PF);
    }

    #[test]
    fn sz53_copies_undocumented_bits() {
        assert_eq!(sz53(0xA8), SF | YF | XF);
        assert_eq!(sz53(0x01), 0);
    }
}
