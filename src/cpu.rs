//! Implementation of the core CPU ([Sharp LR35902](https://en.wikipedia.org/wiki/Game_Boy)) logic for the Game Boy.
//!
//! Does not include the instruction set implementation, only the core
//! CPU logic and the CPU struct definition.
//!
//! Most of the core CPU logic is implemented in the [`Cpu::step`] method.

use gbcore_common::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::{
    debugln,
    inst::{dispatch_base, dispatch_extended},
    interrupts::InterruptKind,
    mmu::Mmu,
};

pub const PREFIX: u8 = 0xcb;

pub struct Cpu {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,

    zero: bool,
    sub: bool,
    half_carry: bool,
    carry: bool,

    ime: bool,
    /// Counts down to zero after EI; IME is set the instant it reaches
    /// zero. -1 means no switch is pending.
    ei_delay: i8,

    halted: bool,
    /// Set by a STOP with no speed switch armed; cleared only by a
    /// pending Joypad interrupt, unlike HALT which wakes for any.
    stopped: bool,
    /// T-cycles remaining before a committed speed switch's CPU stall
    /// ends.
    stop_cycles: u32,

    /// Reference to the MMU (Memory Management Unit) used for every
    /// memory bus access.
    pub mmu: Mmu,

    /// Reference to the PC of the instruction currently executing,
    /// kept for error reporting and debugging.
    pub ppc: u16,

    /// T-cycles observed by a bus primitive but not yet published to
    /// the cycle sink.
    pending: u16,
    /// T-cycles published so far during the in-progress step() call.
    step_cycles: u16,
}

impl Cpu {
    pub fn new(mmu: Mmu) -> Self {
        Self {
            a: 0x00,
            b: 0x00,
            c: 0x00,
            d: 0x00,
            e: 0x00,
            h: 0x00,
            l: 0x00,
            sp: 0xfffe,
            pc: 0x0100,
            zero: false,
            sub: false,
            half_carry: false,
            carry: false,
            ime: false,
            ei_delay: -1,
            halted: false,
            stopped: false,
            stop_cycles: 0,
            mmu,
            ppc: 0x0100,
            pending: 0,
            step_cycles: 0,
        }
    }

    pub fn reset(&mut self) {
        self.a = 0x00;
        self.b = 0x00;
        self.c = 0x00;
        self.d = 0x00;
        self.e = 0x00;
        self.h = 0x00;
        self.l = 0x00;
        self.sp = 0xfffe;
        self.pc = 0x0100;
        self.zero = false;
        self.sub = false;
        self.half_carry = false;
        self.carry = false;
        self.ime = false;
        self.ei_delay = -1;
        self.halted = false;
        self.stopped = false;
        self.stop_cycles = 0;
        self.ppc = 0x0100;
        self.pending = 0;
        self.step_cycles = 0;
    }

    /// Executes exactly one observable operation: servicing a pending
    /// interrupt, running one instruction, or idling one M-cycle while
    /// halted or mid speed-switch-stall. Returns the T-cycles consumed,
    /// always a multiple of 4, matching the sum of cycles this call
    /// published to the bus.
    pub fn step(&mut self) -> Result<u16, Error> {
        self.step_cycles = 0;
        self.pending = 0;

        if self.ei_delay > 0 {
            self.ei_delay -= 1;
            if self.ei_delay == 0 {
                self.ime = true;
            }
        }

        let pending_int = self.mmu.interrupts().pending();

        if self.halted && pending_int.is_some() {
            self.halted = false;
        }
        if self.stopped && pending_int == Some(InterruptKind::Joypad) {
            self.stopped = false;
        }

        if self.ime {
            if let Some(kind) = pending_int {
                self.service_interrupt(kind);
                return Ok(self.step_cycles);
            }
        }

        if self.halted || self.stopped {
            self.cycle_no_access();
            self.flush();
            return Ok(self.step_cycles);
        }

        if self.stop_cycles > 0 {
            self.stop_cycles = self.stop_cycles.saturating_sub(4);
            self.cycle_no_access();
            self.flush();
            return Ok(self.step_cycles);
        }

        self.ppc = self.pc;
        let opcode = self.cycle_read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        let result = if opcode == PREFIX {
            let opcode = self.cycle_read(self.pc);
            self.pc = self.pc.wrapping_add(1);
            dispatch_extended(self, opcode)
        } else {
            dispatch_base(self, opcode)
        };
        result?;

        self.flush();
        Ok(self.step_cycles)
    }

    fn service_interrupt(&mut self, kind: InterruptKind) {
        debugln!(
            "Servicing {:?} interrupt handler (0x{:04x})",
            kind,
            kind.vector()
        );

        self.ime = false;
        self.mmu.interrupts().acknowledge(kind);

        self.cycle_no_access();
        self.cycle_no_access();

        let pc = self.pc;
        self.sp = self.sp.wrapping_sub(1);
        self.cycle_write(self.sp, (pc >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.cycle_write(self.sp, pc as u8);

        self.pc = kind.vector();
        self.cycle_no_access();

        self.flush();
    }

    /// Publishes any cycles a prior bus primitive marked pending to
    /// the cycle sink, so devices observe the access at the correct
    /// T-cycle boundary rather than all at once at the end of the
    /// instruction.
    fn flush(&mut self) {
        if self.pending > 0 {
            self.mmu.advance(self.pending);
            self.step_cycles += self.pending;
            self.pending = 0;
        }
    }

    pub fn cycle_read(&mut self, addr: u16) -> u8 {
        self.flush();
        let value = self.mmu.read(addr);
        self.pending = 4;
        value
    }

    pub fn cycle_write(&mut self, addr: u16, value: u8) {
        self.flush();
        self.mmu.write(addr, value);
        self.pending = 4;
    }

    pub fn cycle_no_access(&mut self) {
        self.flush();
        self.pending = 4;
    }

    #[inline(always)]
    pub fn mmu(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    #[inline(always)]
    pub fn mmu_i(&self) -> &Mmu {
        &self.mmu
    }

    #[inline(always)]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[inline(always)]
    pub fn ime(&self) -> bool {
        self.ime
    }

    #[inline(always)]
    pub fn set_ime(&mut self, value: bool) {
        self.ime = value;
    }

    #[inline(always)]
    pub fn enable_int_delayed(&mut self) {
        self.ei_delay = 1;
    }

    #[inline(always)]
    pub fn disable_int(&mut self) {
        self.ime = false;
        self.ei_delay = -1;
    }

    #[inline(always)]
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// STOP: if a KEY1 speed switch is armed, commits it and stalls the
    /// CPU for the hardware-documented settle time; otherwise halts
    /// until a Joypad interrupt specifically.
    pub fn stop(&mut self) {
        if self.mmu.switching() {
            self.mmu.switch_speed();
            self.stop_cycles = 8_200;
        } else {
            self.stopped = true;
        }
    }

    #[inline(always)]
    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f() as u16
    }

    #[inline(always)]
    pub fn set_af(&mut self, value: u16) {
        self.a = (value >> 8) as u8;
        self.set_f(value as u8);
    }

    #[inline(always)]
    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    #[inline(always)]
    pub fn set_bc(&mut self, value: u16) {
        self.b = (value >> 8) as u8;
        self.c = value as u8;
    }

    #[inline(always)]
    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    #[inline(always)]
    pub fn set_de(&mut self, value: u16) {
        self.d = (value >> 8) as u8;
        self.e = value as u8;
    }

    #[inline(always)]
    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    #[inline(always)]
    pub fn set_hl(&mut self, value: u16) {
        self.h = (value >> 8) as u8;
        self.l = value as u8;
    }

    /// F's low nibble is always zero; only bits 7/6/5/4 are meaningful.
    #[inline(always)]
    pub fn f(&self) -> u8 {
        (if self.zero { 0x80 } else { 0 })
            | (if self.sub { 0x40 } else { 0 })
            | (if self.half_carry { 0x20 } else { 0 })
            | (if self.carry { 0x10 } else { 0 })
    }

    #[inline(always)]
    pub fn set_f(&mut self, value: u8) {
        self.zero = value & 0x80 != 0;
        self.sub = value & 0x40 != 0;
        self.half_carry = value & 0x20 != 0;
        self.carry = value & 0x10 != 0;
    }

    #[inline(always)]
    pub fn zero(&self) -> bool {
        self.zero
    }

    #[inline(always)]
    pub fn set_zero(&mut self, value: bool) {
        self.zero = value;
    }

    #[inline(always)]
    pub fn sub(&self) -> bool {
        self.sub
    }

    #[inline(always)]
    pub fn set_sub(&mut self, value: bool) {
        self.sub = value;
    }

    #[inline(always)]
    pub fn half_carry(&self) -> bool {
        self.half_carry
    }

    #[inline(always)]
    pub fn set_half_carry(&mut self, value: bool) {
        self.half_carry = value;
    }

    #[inline(always)]
    pub fn carry(&self) -> bool {
        self.carry
    }

    #[inline(always)]
    pub fn set_carry(&mut self, value: bool) {
        self.carry = value;
    }

    /// Reads the byte at PC through the cycle-accurate bus and
    /// advances PC, for instructions with an immediate operand.
    #[inline(always)]
    pub fn read_u8(&mut self) -> u8 {
        let byte = self.cycle_read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    #[inline(always)]
    pub fn read_u16(&mut self) -> u16 {
        let low = self.read_u8();
        let high = self.read_u8();
        low as u16 | ((high as u16) << 8)
    }

    #[inline(always)]
    pub fn push_byte(&mut self, byte: u8) {
        self.sp = self.sp.wrapping_sub(1);
        self.cycle_write(self.sp, byte);
    }

    #[inline(always)]
    pub fn push_word(&mut self, word: u16) {
        self.push_byte((word >> 8) as u8);
        self.push_byte(word as u8);
    }

    #[inline(always)]
    pub fn pop_byte(&mut self) -> u8 {
        let byte = self.cycle_read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        byte
    }

    #[inline(always)]
    pub fn pop_word(&mut self) -> u16 {
        self.pop_byte() as u16 | ((self.pop_byte() as u16) << 8)
    }

    pub fn description(&self) -> String {
        format!(
            "[PC=0x{:04x} SP=0x{:04x}] [A=0x{:02x} B=0x{:02x} C=0x{:02x} D=0x{:02x} E=0x{:02x} H=0x{:02x} L=0x{:02x} F=0x{:02x}]",
            self.pc, self.sp, self.a, self.b, self.c, self.d, self.e, self.h, self.l, self.f()
        )
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new(Mmu::default())
    }
}

impl Display for Cpu {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::Cpu;

    #[test]
    fn test_initial_state_matches_documented_post_boot_values() {
        let cpu = Cpu::default();
        assert_eq!(cpu.af(), 0x0000);
        assert_eq!(cpu.bc(), 0x0000);
        assert_eq!(cpu.de(), 0x0000);
        assert_eq!(cpu.hl(), 0x0000);
        assert_eq!(cpu.sp, 0xfffe);
        assert_eq!(cpu.pc, 0x0100);
        assert!(!cpu.ime());
    }

    #[test]
    fn test_nop_consumes_four_cycles_and_advances_pc() {
        let mut cpu = Cpu::default();
        cpu.mmu.write(0x0100, 0x00);
        let cycles = cpu.step().unwrap();
        assert_eq!(cycles, 4);
        assert_eq!(cpu.pc, 0x0101);
    }

    #[test]
    fn test_ld_a_d8_consumes_eight_cycles() {
        let mut cpu = Cpu::default();
        cpu.mmu.write(0x0100, 0x3e);
        cpu.mmu.write(0x0101, 0x42);
        let cycles = cpu.step().unwrap();
        assert_eq!(cycles, 8);
        assert_eq!(cpu.a, 0x42);
        assert_eq!(cpu.pc, 0x0102);
    }

    #[test]
    fn test_inc_dec_round_trip_preserves_carry() {
        let mut cpu = Cpu::default();
        cpu.a = 0x0f;
        cpu.set_carry(true);
        cpu.mmu.write(0x0100, 0x3c); // INC A
        cpu.mmu.write(0x0101, 0x3d); // DEC A
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.a, 0x0f);
        assert!(cpu.carry());
    }

    #[test]
    fn test_unknown_opcode_reports_error_with_pc() {
        let mut cpu = Cpu::default();
        cpu.mmu.write(0x0100, 0xd3);
        let err = cpu.step().unwrap_err();
        match err {
            gbcore_common::error::Error::UnknownOpcode(opcode, pc) => {
                assert_eq!(opcode, 0xd3);
                assert_eq!(pc, 0x0100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ei_takes_effect_after_exactly_one_instruction() {
        let mut cpu = Cpu::default();
        cpu.mmu.write(0x0100, 0xfb); // EI
        cpu.mmu.write(0x0101, 0x00); // NOP
        cpu.step().unwrap();
        assert!(!cpu.ime());
        cpu.step().unwrap();
        assert!(cpu.ime());
    }

    #[test]
    fn test_halt_wakes_on_any_pending_interrupt_even_with_ime_off() {
        let mut cpu = Cpu::default();
        cpu.mmu.write(0x0100, 0x76); // HALT
        cpu.mmu.write(0x0101, 0x00); // NOP
        cpu.step().unwrap();
        assert!(cpu.halted());
        cpu.mmu
            .interrupts()
            .write_ie(crate::interrupts::InterruptKind::Timer.mask());
        cpu.mmu
            .interrupts()
            .request(crate::interrupts::InterruptKind::Timer);
        cpu.step().unwrap();
        assert!(!cpu.halted());
    }
}
