//! ALU operations for the Z80.
//!
//! Everything here is a pure function of its operands and the incoming flag
//! byte. The sequencer decides where results land.

#![allow(clippy::verbose_bit_mask)] // Clearer to read mask comparisons.

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, flag_if, parity, sz53, sz53p};
use crate::microcode::{AccOp, AluOp, ShiftOp};

/// Result of an ALU operation with flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

/// Add two bytes with optional carry.
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let wide = u16::from(a) + u16::from(b) + u16::from(c);
    let value = wide as u8;
    let flags = sz53(value)
        | flag_if((a & 0x0F) + (b & 0x0F) + c > 0x0F, HF)
        | flag_if((a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0, PF)
        | flag_if(wide > 0xFF, CF);
    AluResult { value, flags }
}

/// Subtract with optional borrow.
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let flags = NF
        | sz53(value)
        | flag_if((a & 0x0F) < (b & 0x0F) + c, HF)
        | flag_if((a ^ b) & 0x80 != 0 && (b ^ value) & 0x80 == 0, PF)
        | flag_if(u16::from(a) < u16::from(b) + u16::from(c), CF);
    AluResult { value, flags }
}

/// Compare: flags of `a - b`, but X/Y come from the operand and A is kept.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let diff = sub8(a, b, false);
    AluResult {
        value: a,
        flags: (diff.flags & !(XF | YF)) | (b & (XF | YF)),
    }
}

/// One of the eight accumulator operations selected by an opcode's y field.
#[must_use]
pub fn alu8(op: AluOp, a: u8, b: u8, f: u8) -> AluResult {
    let carry = f & CF != 0;
    match op {
        AluOp::Add => add8(a, b, false),
        AluOp::Adc => add8(a, b, carry),
        AluOp::Sub => sub8(a, b, false),
        AluOp::Sbc => sub8(a, b, carry),
        AluOp::And => {
            let value = a & b;
            AluResult { value, flags: sz53p(value) | HF }
        }
        AluOp::Xor => {
            let value = a ^ b;
            AluResult { value, flags: sz53p(value) }
        }
        AluOp::Or => {
            let value = a | b;
            AluResult { value, flags: sz53p(value) }
        }
        AluOp::Cp => cp8(a, b),
    }
}

/// `INC r`: carry is preserved.
#[must_use]
pub fn inc8(v: u8, f: u8) -> AluResult {
    let value = v.wrapping_add(1);
    let flags = (f & CF) | sz53(value) | flag_if(v & 0x0F == 0x0F, HF) | flag_if(v == 0x7F, PF);
    AluResult { value, flags }
}

/// `DEC r`: carry is preserved.
#[must_use]
pub fn dec8(v: u8, f: u8) -> AluResult {
    let value = v.wrapping_sub(1);
    let flags = (f & CF) | NF | sz53(value) | flag_if(v & 0x0F == 0, HF) | flag_if(v == 0x80, PF);
    AluResult { value, flags }
}

/// CB-prefixed rotates and shifts. These set S, Z and P/V from the result.
#[must_use]
pub fn shift(op: ShiftOp, v: u8, f: u8) -> AluResult {
    let old_carry = f & CF;
    let (value, carry) = match op {
        ShiftOp::Rlc => (v.rotate_left(1), v >> 7),
        ShiftOp::Rrc => (v.rotate_right(1), v & 1),
        ShiftOp::Rl => ((v << 1) | old_carry, v >> 7),
        ShiftOp::Rr => ((v >> 1) | (old_carry << 7), v & 1),
        ShiftOp::Sla => (v << 1, v >> 7),
        ShiftOp::Sra => ((v >> 1) | (v & 0x80), v & 1),
        ShiftOp::Sll => ((v << 1) | 1, v >> 7),
        ShiftOp::Srl => (v >> 1, v & 1),
    };
    AluResult {
        value,
        flags: sz53p(value) | carry,
    }
}

/// `BIT n`. `xy` supplies the undocumented X/Y bits: the operand itself for
/// registers, the high byte of MEMPTR for memory forms.
#[must_use]
pub fn bit(n: u8, v: u8, xy: u8, f: u8) -> u8 {
    let tested = v & (1 << n);
    (f & CF) | HF | (xy & (XF | YF)) | flag_if(tested == 0, ZF | PF) | (tested & SF)
}

/// Single-byte accumulator operations: `RLCA`..`CCF` plus `NEG`.
#[must_use]
pub fn acc(op: AccOp, a: u8, f: u8) -> AluResult {
    let keep = f & (SF | ZF | PF);
    let rotated = |value: u8, carry: u8| AluResult {
        value,
        flags: keep | (value & (XF | YF)) | carry,
    };
    match op {
        AccOp::Rlca => rotated(a.rotate_left(1), a >> 7),
        AccOp::Rrca => rotated(a.rotate_right(1), a & 1),
        AccOp::Rla => rotated((a << 1) | (f & CF), a >> 7),
        AccOp::Rra => rotated((a >> 1) | ((f & CF) << 7), a & 1),
        AccOp::Daa => daa(a, f),
        AccOp::Cpl => {
            let value = !a;
            AluResult {
                value,
                flags: (f & (SF | ZF | PF | CF)) | HF | NF | (value & (XF | YF)),
            }
        }
        AccOp::Scf => AluResult {
            value: a,
            flags: keep | (a & (XF | YF)) | CF,
        },
        AccOp::Ccf => AluResult {
            value: a,
            flags: keep | (a & (XF | YF)) | if f & CF != 0 { HF } else { CF },
        },
        AccOp::Neg => sub8(0, a, false),
    }
}

/// Decimal adjust after an addition or subtraction.
#[must_use]
pub fn daa(a: u8, f: u8) -> AluResult {
    let mut correction = 0;
    let mut carry = f & CF;
    if f & HF != 0 || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry != 0 || a > 0x99 {
        correction |= 0x60;
        carry = CF;
    }
    let (value, half) = if f & NF != 0 {
        (a.wrapping_sub(correction), f & HF != 0 && a & 0x0F < 6)
    } else {
        (a.wrapping_add(correction), a & 0x0F > 9)
    };
    AluResult {
        value,
        flags: sz53p(value) | carry | (f & NF) | flag_if(half, HF),
    }
}

/// `ADD rr,rr`: S, Z and P/V are preserved.
#[must_use]
pub fn add16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let wide = u32::from(a) + u32::from(b);
    let value = wide as u16;
    let flags = (f & (SF | ZF | PF))
        | ((value >> 8) as u8 & (XF | YF))
        | flag_if((a ^ b ^ value) & 0x1000 != 0, HF)
        | flag_if(wide > 0xFFFF, CF);
    (value, flags)
}

/// `ADC HL,rr`
#[must_use]
pub fn adc16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let wide = u32::from(a) + u32::from(b) + u32::from(f & CF);
    let value = wide as u16;
    let flags = wide_flags(value)
        | half16(a, b, value)
        | flag_if((a ^ !b) & (a ^ value) & 0x8000 != 0, PF)
        | flag_if(wide > 0xFFFF, CF);
    (value, flags)
}

/// `SBC HL,rr`
#[must_use]
pub fn sbc16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let borrow = u32::from(f & CF);
    let value = a.wrapping_sub(b).wrapping_sub(borrow as u16);
    let flags = NF
        | wide_flags(value)
        | half16(a, b, value)
        | flag_if((a ^ b) & (a ^ value) & 0x8000 != 0, PF)
        | flag_if(u32::from(a) < u32::from(b) + borrow, CF);
    (value, flags)
}

fn wide_flags(value: u16) -> u8 {
    let hi = (value >> 8) as u8;
    (hi & (SF | XF | YF)) | flag_if(value == 0, ZF)
}

fn half16(a: u16, b: u16, value: u16) -> u8 {
    flag_if((a ^ b ^ value) & 0x1000 != 0, HF)
}

/// `LDI`/`LDD` flags. `value` is the byte transferred, `bc` the count after
/// decrement.
#[must_use]
pub fn ldi_flags(f: u8, a: u8, value: u8, bc: u16) -> u8 {
    let n = a.wrapping_add(value);
    (f & (SF | ZF | CF)) | (n & XF) | ((n << 4) & YF) | flag_if(bc != 0, PF)
}

/// `CPI`/`CPD` flags.
#[must_use]
pub fn cpi_flags(f: u8, a: u8, value: u8, bc: u16) -> u8 {
    let diff = a.wrapping_sub(value);
    let half = (a ^ value ^ diff) & HF;
    let n = diff.wrapping_sub(u8::from(half != 0));
    (f & CF)
        | NF
        | (sz53(diff) & (SF | ZF))
        | half
        | (n & XF)
        | ((n << 4) & YF)
        | flag_if(bc != 0, PF)
}

/// `INI`/`OUTI` family flags. `b` is the counter after decrement; `k` is the
/// transferred byte plus the adjusted C (input) or L (output).
#[must_use]
pub fn io_block_flags(b: u8, value: u8, k: u16) -> u8 {
    sz53(b)
        | flag_if(value & 0x80 != 0, NF)
        | flag_if(k > 0xFF, HF | CF)
        | flag_if(parity((k as u8 & 7) ^ b), PF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_overflow_and_half_carry() {
        let r = add8(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags, SF | HF | PF);
    }

    #[test]
    fn sub_borrow_sets_carry() {
        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.flags & (CF | NF | HF), CF | NF | HF);
    }

    #[test]
    fn compare_takes_undocumented_bits_from_operand() {
        let r = cp8(0x00, 0x28);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags & (XF | YF), XF | YF);
    }

    #[test]
    fn inc_keeps_carry() {
        let r = inc8(0xFF, CF);
        assert_eq!(r.value, 0);
        assert_eq!(r.flags, CF | ZF | HF);
    }

    #[test]
    fn daa_after_bcd_add() {
        let sum = add8(0x15, 0x27, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x42);
    }

    #[test]
    fn rl_through_carry() {
        let r = shift(ShiftOp::Rl, 0x80, CF);
        assert_eq!(r.value, 0x01);
        assert_eq!(r.flags & CF, CF);
    }

    #[test]
    fn bit_7_sets_sign() {
        assert_eq!(bit(7, 0x80, 0, 0) & (SF | ZF), SF);
        assert_eq!(bit(0, 0x80, 0, 0) & (ZF | PF), ZF | PF);
    }

    #[test]
    fn sbc16_zero_result() {
        let (v, f) = sbc16(0x1000, 0x0FFF, CF);
        assert_eq!(v, 0);
        assert_eq!(f & (ZF | NF | CF), ZF | NF);
    }

    #[test]
    fn neg_of_0x80_overflows() {
        let r = acc(AccOp::Neg, 0x80, 0);
        assert_eq!(r.value, 0x80);
        assert_ne!(r.flags & PF, 0);
    }
}
