//! MMU: the single read/write surface every other component is wired
//! behind, and [`Mmu::advance`], the concrete cycle sink that turns a
//! CPU-published T-cycle count into ticks for the timer, serial,
//! OAM-DMA, and PPU.

use crate::{
    consts::{IE_ADDR, IF_ADDR, KEY0_ADDR, KEY1_ADDR, SVBK_ADDR},
    dma::Dma,
    gb::{GameBoyMode, GameBoySpeed},
    interrupts::Interrupts,
    pad::Pad,
    ppu::Ppu,
    rom::Cartridge,
    serial::Serial,
    timer::Timer,
    warnln,
};

pub const RAM_SIZE_DMG: usize = 8192;
pub const RAM_SIZE_CGB: usize = 32768;

pub trait BusComponent {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);

    fn read_many(&self, addr: u16, count: usize) -> Vec<u8> {
        (0..count)
            .map(|offset| self.read(addr + offset as u16))
            .collect()
    }

    fn write_many(&mut self, addr: u16, values: &[u8]) {
        for (offset, &value) in values.iter().enumerate() {
            self.write(addr + offset as u16, value);
        }
    }
}

pub struct Mmu {
    interrupts: Interrupts,
    ppu: Ppu,
    dma: Dma,
    pad: Pad,
    timer: Timer,
    serial: Serial,
    rom: Cartridge,

    /// Working RAM: 8 KB on DMG, 32 KB (8 banks of 4 KB) on CGB, laid
    /// out bank-major so an echo read at `addr & 0x1fff` always hits
    /// the physical bank-0/bank-1 pair regardless of the SVBK-selected
    /// bank, matching real hardware's echo wiring.
    ram: Vec<u8>,
    ram_bank: u8,
    ram_offset: u16,

    /// 0xFF4C: CGB compatibility flag, 0x04 for a DMG-only cartridge
    /// booted on CGB hardware.
    key0: u8,
    /// True between a KEY1 speed-switch arm and the STOP that consumes it.
    switching: bool,
    speed: GameBoySpeed,

    mode: GameBoyMode,
}

impl Mmu {
    pub fn new(mode: GameBoyMode) -> Self {
        let ram_size = if mode == GameBoyMode::Cgb { RAM_SIZE_CGB } else { RAM_SIZE_DMG };
        Self {
            interrupts: Interrupts::new(),
            ppu: Ppu::new(mode),
            dma: Dma::new(),
            pad: Pad::new(),
            timer: Timer::new(),
            serial: Serial::new(),
            rom: Cartridge::new(),
            ram: vec![0x00; ram_size],
            ram_bank: 0x1,
            ram_offset: 0x1000,
            key0: 0x0,
            switching: false,
            speed: GameBoySpeed::Normal,
            mode,
        }
    }

    pub fn reset(&mut self) {
        let mode = self.mode;
        let ram_size = self.ram.len();
        self.interrupts.reset();
        self.ppu.reset();
        self.dma.reset();
        self.pad.reset();
        self.timer.reset();
        self.serial.reset();
        self.rom = Cartridge::new();
        self.ram = vec![0x00; ram_size];
        self.ram_bank = 0x1;
        self.ram_offset = 0x1000;
        self.key0 = 0x0;
        self.switching = false;
        self.speed = GameBoySpeed::Normal;
        let _ = mode;
    }

    /// Advances every cycle-driven device by `cycles` real CPU
    /// T-cycles. In CGB double speed, the PPU and timer run at a fixed
    /// rate relative to wall-clock time and so only see half as many
    /// ticks per CPU-published cycle; DMA and serial transfer timing
    /// are unaffected by the CPU speed switch.
    pub fn advance(&mut self, cycles: u16) {
        let scaled = if self.speed == GameBoySpeed::Double { cycles / 2 } else { cycles };

        self.timer.tick(scaled, &mut self.interrupts);
        self.serial.tick(cycles, &mut self.interrupts);
        self.ppu.clock(scaled, &mut self.interrupts);

        if let Some((first, count)) = self.dma.tick(cycles) {
            let source_page = self.dma.source_page();
            for offset in 0..count {
                let index = first + offset;
                let value = self.read_bus(((source_page as u16) << 8) | index as u16);
                self.ppu.write(0xfe00 + index as u16, value);
            }
        }
    }

    pub fn switch_speed(&mut self) {
        self.speed = self.speed.switch();
        self.switching = false;
    }

    pub fn speed(&self) -> GameBoySpeed {
        self.speed
    }

    /// Whether a KEY1 speed switch is armed, waiting for the next STOP
    /// instruction to commit it.
    pub fn switching(&self) -> bool {
        self.switching
    }

    pub fn set_speed(&mut self, value: GameBoySpeed) {
        self.speed = value;
    }

    pub fn interrupts(&mut self) -> &mut Interrupts {
        &mut self.interrupts
    }

    pub fn interrupts_i(&self) -> &Interrupts {
        &self.interrupts
    }

    pub fn ppu(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn ppu_i(&self) -> &Ppu {
        &self.ppu
    }

    pub fn dma_i(&self) -> &Dma {
        &self.dma
    }

    pub fn pad(&mut self) -> &mut Pad {
        &mut self.pad
    }

    pub fn key_press(&mut self, key: crate::pad::PadKey) {
        self.pad.key_press(key, &mut self.interrupts);
    }

    pub fn timer_i(&self) -> &Timer {
        &self.timer
    }

    pub fn serial_i(&self) -> &Serial {
        &self.serial
    }

    pub fn rom(&mut self) -> &mut Cartridge {
        &mut self.rom
    }

    pub fn rom_i(&self) -> &Cartridge {
        &self.rom
    }

    pub fn set_rom(&mut self, rom: Cartridge) {
        self.rom = rom;
    }

    pub fn mode(&self) -> GameBoyMode {
        self.mode
    }

    pub fn set_mode(&mut self, value: GameBoyMode) {
        self.mode = value;
    }

    /// Bus read as seen by the CPU: gated to HRAM-and-own-registers
    /// while OAM-DMA is active, matching the open-bus behavior real
    /// hardware shows for any other region during the transfer.
    pub fn read(&self, addr: u16) -> u8 {
        if self.dma.active() && !(0xff80..=0xfffe).contains(&addr) {
            return 0xff;
        }
        self.read_bus(addr)
    }

    /// Bus read bypassing the DMA gate, used internally to source the
    /// bytes the DMA transfer itself copies into OAM.
    fn read_bus(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7fff => self.rom.read(addr),
            0x8000..=0x9fff => self.ppu.read(addr),
            0xa000..=0xbfff => self.rom.read(addr),
            0xc000..=0xcfff => self.ram[(addr & 0x0fff) as usize],
            0xd000..=0xdfff => self.ram[(self.ram_offset + (addr & 0x0fff)) as usize],
            0xe000..=0xfdff => self.ram[(addr & 0x1fff) as usize],
            0xfe00..=0xfe9f => self.ppu.read(addr),
            0xfea0..=0xfeff => 0xff,
            0xff00 => self.pad.read(addr),
            0xff01..=0xff02 => self.serial.read(addr),
            0xff04..=0xff07 => self.timer.read(addr),
            IF_ADDR => self.interrupts.read_if(),
            // audio (APU) is an external collaborator this core doesn't model
            0xff10..=0xff26 | 0xff30..=0xff3f => 0xff,
            0xff40..=0xff45 | 0xff47..=0xff4b => self.ppu.read(addr),
            0xff46 => self.dma.read(addr),
            KEY0_ADDR => self.key0,
            KEY1_ADDR => (self.switching as u8) | ((self.speed as u8) << 7) | 0x7e,
            0xff4f => self.ppu.read(addr),
            // infrared port: out of scope, reads as disconnected
            0xff56 => 0xff,
            0xff68..=0xff6b => self.ppu.read(addr),
            0xff6c => self.ppu.read(addr),
            SVBK_ADDR => (self.ram_bank & 0x07) | 0xf8,
            0xff80..=0xfffe => self.ppu.read(addr),
            IE_ADDR => self.interrupts.read_ie(),
            addr => {
                warnln!("Reading from unknown location 0x{:04x}", addr);
                0xff
            }
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        if self.dma.active() && !(0xff80..=0xfffe).contains(&addr) {
            return;
        }
        match addr {
            0x0000..=0x7fff => self.rom.write(addr, value),
            0x8000..=0x9fff => self.ppu.write(addr, value),
            0xa000..=0xbfff => self.rom.write(addr, value),
            0xc000..=0xcfff => self.ram[(addr & 0x0fff) as usize] = value,
            0xd000..=0xdfff => self.ram[(self.ram_offset + (addr & 0x0fff)) as usize] = value,
            0xe000..=0xfdff => self.ram[(addr & 0x1fff) as usize] = value,
            0xfe00..=0xfe9f => self.ppu.write(addr, value),
            0xfea0..=0xfeff => (),
            0xff00 => self.pad.write(addr, value),
            0xff01..=0xff02 => self.serial.write(addr, value),
            0xff04..=0xff07 => self.timer.write(addr, value),
            IF_ADDR => self.interrupts.write_if(value),
            0xff10..=0xff26 | 0xff30..=0xff3f => (),
            0xff40..=0xff45 | 0xff47..=0xff4b => self.ppu.write(addr, value),
            0xff46 => self.dma.write(addr, value),
            KEY0_ADDR => {
                self.key0 = value;
                if value == 0x04 {
                    self.ppu.set_dmg_compat(true);
                }
            }
            KEY1_ADDR => self.switching = value & 0x01 != 0,
            0xff4f => self.ppu.write(addr, value),
            0xff56 => (),
            0xff68..=0xff6b => self.ppu.write(addr, value),
            0xff6c => self.ppu.write(addr, value),
            SVBK_ADDR => {
                let mut ram_bank = value & 0x07;
                if ram_bank == 0x0 {
                    ram_bank = 0x1;
                }
                self.ram_bank = ram_bank;
                self.ram_offset = self.ram_bank as u16 * 0x1000;
            }
            0xff80..=0xfffe => self.ppu.write(addr, value),
            IE_ADDR => self.interrupts.write_ie(value),
            addr => warnln!("Writing to unknown location 0x{:04x}", addr),
        }
    }

    pub fn read_many(&self, addr: u16, count: u16) -> Vec<u8> {
        (0..count).map(|offset| self.read(addr + offset)).collect()
    }

    pub fn write_many(&mut self, addr: u16, data: &[u8]) {
        for (offset, &value) in data.iter().enumerate() {
            self.write(addr + offset as u16, value);
        }
    }

    pub fn write_ram(&mut self, addr: u16, buffer: &[u8]) {
        self.ram[addr as usize..addr as usize + buffer.len()].copy_from_slice(buffer);
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new(GameBoyMode::Dmg)
    }
}

#[cfg(test)]
mod tests {
    use super::Mmu;
    use crate::consts::IE_ADDR;

    #[test]
    fn test_wram_echo_mirrors_bank_zero_and_one() {
        let mut mmu = Mmu::default();
        mmu.write(0xc012, 0x42);
        assert_eq!(mmu.read(0xe012), 0x42);
    }

    #[test]
    fn test_hram_readable_during_dma() {
        let mut mmu = Mmu::default();
        mmu.write(0xff80, 0x99);
        mmu.write(0xff46, 0xc1);
        assert_eq!(mmu.read(0xff80), 0x99);
    }

    #[test]
    fn test_non_hram_reads_as_open_bus_during_dma() {
        let mut mmu = Mmu::default();
        mmu.write(0xc000, 0x55);
        mmu.write(0xff46, 0xc1);
        assert_eq!(mmu.read(0xc000), 0xff);
    }

    #[test]
    fn test_dma_copies_bytes_into_oam_over_several_advances() {
        let mut mmu = Mmu::default();
        mmu.write(0xc000, 0xab);
        mmu.write(0xff46, 0xc0); // source page 0xc0 -> 0xc000
        for _ in 0..(super::super::dma::TOTAL_CYCLES / 4) {
            mmu.advance(4);
        }
        assert!(!mmu.dma_i().active());
        assert_eq!(mmu.ppu_i().read(0xfe00), 0xab);
    }

    #[test]
    fn test_ie_register_round_trips() {
        let mut mmu = Mmu::default();
        mmu.write(IE_ADDR, 0x1f);
        assert_eq!(mmu.read(IE_ADDR), 0x1f);
    }
}
