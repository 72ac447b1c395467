//! Cartridge (ROM) parsing and the MBC (Memory Bank Controller) dispatch
//! table.

use gbcore_common::error::Error;
use std::{
    cmp::max,
    fmt::{self, Display, Formatter},
};

use crate::{debugln, mmu::BusComponent, panic_gb, warnln};

pub const ROM_BANK_SIZE: usize = 16384;
pub const RAM_BANK_SIZE: usize = 8192;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MbcType {
    NoMbc = 0x00,
    Mbc1 = 0x01,
    Mbc3 = 0x03,
    Mbc5 = 0x04,
    Unknown = 0x07,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RomType {
    RomOnly = 0x00,
    Mbc1 = 0x01,
    Mbc1Ram = 0x02,
    Mbc1RamBattery = 0x03,
    RomRam = 0x08,
    RomRamBattery = 0x09,
    Mbc3TimerBattery = 0x0f,
    Mbc3TimerRamBattery = 0x10,
    Mbc3 = 0x11,
    Mbc3Ram = 0x12,
    Mbc3RamBattery = 0x13,
    Mbc5 = 0x19,
    Mbc5Ram = 0x1a,
    Mbc5RamBattery = 0x1b,
    Mbc5Rumble = 0x1c,
    Mbc5RumbleRam = 0x1d,
    Mbc5RumbleRamBattery = 0x1e,
    Unknown = 0xef,
}

impl RomType {
    pub fn description(&self) -> &'static str {
        match self {
            RomType::RomOnly => "ROM Only",
            RomType::Mbc1 => "MBC1",
            RomType::Mbc1Ram => "MBC1 + RAM",
            RomType::Mbc1RamBattery => "MBC1 + RAM + Battery",
            RomType::RomRam => "ROM + RAM",
            RomType::RomRamBattery => "ROM + RAM + BATTERY",
            RomType::Mbc3TimerBattery => "MBC3 + TIMER + BATTERY",
            RomType::Mbc3TimerRamBattery => "MBC3 + TIMER + RAM + BATTERY",
            RomType::Mbc3 => "MBC3",
            RomType::Mbc3Ram => "MBC3 + RAM",
            RomType::Mbc3RamBattery => "MBC3 + RAM + BATTERY",
            RomType::Mbc5 => "MBC5",
            RomType::Mbc5Ram => "MBC5 + RAM",
            RomType::Mbc5RamBattery => "MBC5 + RAM + BATTERY",
            RomType::Mbc5Rumble => "MBC5 + RUMBLE",
            RomType::Mbc5RumbleRam => "MBC5 + RUMBLE + RAM",
            RomType::Mbc5RumbleRamBattery => "MBC5 + RUMBLE + RAM + BATTERY",
            RomType::Unknown => "Unknown",
        }
    }

    pub fn mbc_type(&self) -> MbcType {
        match self {
            RomType::RomOnly | RomType::RomRam | RomType::RomRamBattery => MbcType::NoMbc,
            RomType::Mbc1 | RomType::Mbc1Ram | RomType::Mbc1RamBattery => MbcType::Mbc1,
            RomType::Mbc3
            | RomType::Mbc3Ram
            | RomType::Mbc3RamBattery
            | RomType::Mbc3TimerBattery
            | RomType::Mbc3TimerRamBattery => MbcType::Mbc3,
            RomType::Mbc5
            | RomType::Mbc5Ram
            | RomType::Mbc5RamBattery
            | RomType::Mbc5Rumble
            | RomType::Mbc5RumbleRam
            | RomType::Mbc5RumbleRamBattery => MbcType::Mbc5,
            RomType::Unknown => MbcType::Unknown,
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self,
            RomType::Mbc1RamBattery
                | RomType::RomRamBattery
                | RomType::Mbc3TimerBattery
                | RomType::Mbc3TimerRamBattery
                | RomType::Mbc3RamBattery
                | RomType::Mbc5RamBattery
                | RomType::Mbc5RumbleRamBattery
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self, RomType::Mbc3TimerBattery | RomType::Mbc3TimerRamBattery)
    }
}

impl Display for RomType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RomSize {
    Size32K,
    Size64K,
    Size128K,
    Size256K,
    Size512K,
    Size1M,
    Size2M,
    Size4M,
    Size8M,
    SizeUnknown,
}

impl RomSize {
    pub fn description(&self) -> &'static str {
        match self {
            RomSize::Size32K => "32 KB",
            RomSize::Size64K => "64 KB",
            RomSize::Size128K => "128 KB",
            RomSize::Size256K => "256 KB",
            RomSize::Size512K => "512 KB",
            RomSize::Size1M => "1 MB",
            RomSize::Size2M => "2 MB",
            RomSize::Size4M => "4 MB",
            RomSize::Size8M => "8 MB",
            RomSize::SizeUnknown => "Unknown",
        }
    }

    pub fn rom_banks(&self) -> u16 {
        match self {
            RomSize::Size32K => 2,
            RomSize::Size64K => 4,
            RomSize::Size128K => 8,
            RomSize::Size256K => 16,
            RomSize::Size512K => 32,
            RomSize::Size1M => 64,
            RomSize::Size2M => 128,
            RomSize::Size4M => 256,
            RomSize::Size8M => 512,
            RomSize::SizeUnknown => 0,
        }
    }
}

impl Display for RomSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RamSize {
    NoRam,
    Unused,
    Size8K,
    Size16K,
    Size32K,
    Size64K,
    Size128K,
    SizeUnknown,
}

impl RamSize {
    pub fn description(&self) -> &'static str {
        match self {
            RamSize::NoRam => "No RAM",
            RamSize::Unused => "Unused",
            RamSize::Size8K => "8 KB",
            RamSize::Size16K => "16 KB",
            RamSize::Size32K => "32 KB",
            RamSize::Size128K => "128 KB",
            RamSize::Size64K => "64 KB",
            RamSize::SizeUnknown => "Unknown",
        }
    }

    pub fn ram_banks(&self) -> u16 {
        match self {
            RamSize::NoRam => 0,
            RamSize::Unused => 0,
            RamSize::Size8K => 1,
            RamSize::Size16K => 2,
            RamSize::Size32K => 4,
            RamSize::Size64K => 8,
            RamSize::Size128K => 16,
            RamSize::SizeUnknown => 0,
        }
    }
}

impl Display for RamSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CgbMode {
    NoCgb = 0x00,
    CgbCompatible = 0x80,
    CgbOnly = 0xc0,
}

impl CgbMode {
    pub fn description(&self) -> &'static str {
        match self {
            CgbMode::NoCgb => "No CGB support",
            CgbMode::CgbCompatible => "CGB backwards compatible",
            CgbMode::CgbOnly => "CGB only",
        }
    }
}

impl Display for CgbMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// MBC3's real-time-clock registers, addressed via the RAM-bank-select
/// register (0x4000-0x5FFF) taking a value of 0x08-0x0C instead of a
/// bank index, and snapshotted by the 0x00-then-0x01 latch sequence
/// written to 0x6000-0x7FFF. Tick rate and persistence across power
/// cycles are out of scope here; only the register and latch protocol
/// a cartridge's software can observe is modeled.
#[derive(Clone, Copy, Default)]
struct Rtc {
    seconds: u8,
    minutes: u8,
    hours: u8,
    day_low: u8,
    day_high: u8,
    latched_seconds: u8,
    latched_minutes: u8,
    latched_hours: u8,
    latched_day_low: u8,
    latched_day_high: u8,
    /// Last value written to the 0x6000-0x7FFF latch-select register,
    /// so a 0x00 -> 0x01 transition can be detected.
    last_latch_write: u8,
}

impl Rtc {
    fn latch(&mut self, value: u8) {
        if self.last_latch_write == 0x00 && value == 0x01 {
            self.latched_seconds = self.seconds;
            self.latched_minutes = self.minutes;
            self.latched_hours = self.hours;
            self.latched_day_low = self.day_low;
            self.latched_day_high = self.day_high;
        }
        self.last_latch_write = value;
    }

    fn read(&self, register: u8) -> u8 {
        match register {
            0x08 => self.latched_seconds,
            0x09 => self.latched_minutes,
            0x0a => self.latched_hours,
            0x0b => self.latched_day_low,
            0x0c => self.latched_day_high,
            _ => 0xff,
        }
    }

    fn write(&mut self, register: u8, value: u8) {
        match register {
            0x08 => self.seconds = value,
            0x09 => self.minutes = value,
            0x0a => self.hours = value,
            0x0b => self.day_low = value,
            0x0c => self.day_high = value,
            _ => (),
        }
    }
}

/// Structure that defines the ROM and ROM contents of a Game Boy
/// cartridge, addressing the specifics of the MBCs (Memory Bank
/// Controllers) this core supports.
#[derive(Clone)]
pub struct Cartridge {
    /// The complete data of the ROM cartridge, should include the
    /// complete set of ROM banks.
    rom_data: Vec<u8>,

    /// The base RAM used to store cartridge RAM / save data.
    ram_data: Vec<u8>,

    /// The MBC (Memory Bank Controller) in charge of ROM and RAM
    /// access for the current cartridge.
    mbc: &'static Mbc,

    /// The number of ROM banks (of 16KB) available to the current
    /// cartridge, computed once at load time.
    rom_bank_count: u16,

    /// The number of RAM banks (of 8KB) available to the current
    /// cartridge, computed once at load time.
    ram_bank_count: u16,

    /// The offset address to the ROM bank (#1+) currently switched in.
    rom_offset: usize,

    /// The offset address to the ERAM bank currently switched in.
    ram_offset: usize,

    /// Raw value last written to the 0x4000-0x5FFF bank-select
    /// register. For MBC3 a value of 0x08-0x0C selects an RTC
    /// register instead of a RAM bank; for MBC1 this is always the
    /// raw 2-bit register regardless of banking mode.
    bank_select: u8,

    /// MBC1 banking-mode flag (0 = ROM banking mode, the default; 1 =
    /// RAM banking mode), selected by a write to 0x6000-0x7FFF.
    mbc1_mode: u8,

    /// MBC1's raw 5-bit value last written to 0x2000-0x3FFF, before
    /// being combined with `bank_select`'s upper 2 bits on cartridges
    /// over 512 KiB (> 32 banks).
    mbc1_bank_low: u8,

    /// If RAM access is enabled, guards memory access to avoid
    /// corruption.
    ram_enabled: bool,

    /// The final offset of the last non-zero byte of the title, so a
    /// safe UTF-8 conversion can be done without dragging in CGB flag
    /// bytes that overlap the title field's tail.
    title_offset: usize,

    /// MBC3's real-time-clock state; inert for every other MBC.
    rtc: Rtc,
}

impl Cartridge {
    pub fn new() -> Self {
        Self {
            rom_data: vec![],
            ram_data: vec![],
            mbc: &NO_MBC,
            rom_bank_count: 0,
            ram_bank_count: 0,
            rom_offset: 0x4000,
            ram_offset: 0x0000,
            bank_select: 0,
            mbc1_mode: 0,
            mbc1_bank_low: 0,
            ram_enabled: false,
            title_offset: 0x0143,
            rtc: Rtc::default(),
        }
    }

    pub fn from_data(data: &[u8]) -> Result<Self, Error> {
        let mut cartridge = Cartridge::new();
        cartridge.set_data(data)?;
        Ok(cartridge)
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            // 0x0000-0x7FFF: 16 KiB ROM bank 00 & 16 KiB ROM Bank 01-NN
            0x0000..=0x7fff => (self.mbc.read_rom)(self, addr),
            // 0xA000-0xBFFF: 8 KiB External RAM
            0xa000..=0xbfff => (self.mbc.read_ram)(self, addr),
            _ => {
                debugln!("Reading from unknown Cartridge control 0x{:04x}", addr);
                0x00
            }
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x7fff => (self.mbc.write_rom)(self, addr, value),
            0xa000..=0xbfff => (self.mbc.write_ram)(self, addr, value),
            _ => debugln!("Writing to unknown Cartridge address 0x{:04x}", addr),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn data(&self) -> &Vec<u8> {
        &self.rom_data
    }

    pub fn get_bank(&self, index: u8) -> &[u8] {
        let start = index as usize * ROM_BANK_SIZE;
        let end = (index + 1) as usize * ROM_BANK_SIZE;
        &self.rom_data[start..end]
    }

    pub fn mbc(&self) -> Result<&'static Mbc, Error> {
        Ok(match self.rom_type() {
            RomType::RomOnly | RomType::RomRam | RomType::RomRamBattery => &NO_MBC,
            RomType::Mbc1 | RomType::Mbc1Ram | RomType::Mbc1RamBattery => &MBC1,
            RomType::Mbc3TimerBattery
            | RomType::Mbc3TimerRamBattery
            | RomType::Mbc3
            | RomType::Mbc3Ram
            | RomType::Mbc3RamBattery => &MBC3,
            RomType::Mbc5
            | RomType::Mbc5Ram
            | RomType::Mbc5RamBattery
            | RomType::Mbc5Rumble
            | RomType::Mbc5RumbleRam
            | RomType::Mbc5RumbleRamBattery => &MBC5,
            RomType::Unknown => return Err(Error::InvalidCartridge),
        })
    }

    pub fn ram_enabled(&self) -> bool {
        self.ram_enabled
    }

    pub fn ram_bank(&self) -> u8 {
        (self.ram_offset / RAM_BANK_SIZE) as u8
    }

    pub fn set_ram_bank(&mut self, ram_bank: u8) {
        self.ram_offset = ram_bank as usize * RAM_BANK_SIZE;
    }

    pub fn rom_bank(&self) -> u16 {
        (self.rom_offset / ROM_BANK_SIZE) as u16
    }

    pub fn set_rom_bank(&mut self, rom_bank: u16) {
        self.rom_offset = rom_bank as usize * ROM_BANK_SIZE;
    }

    fn set_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.ensure_data(data)?;
        self.rom_data = data.to_vec();
        self.rom_offset = 0x4000;
        self.ram_offset = 0x0000;
        if !self.valid_checksum() {
            return Err(Error::InvalidCartridge);
        }
        self.mbc = self.mbc()?;
        self.rom_bank_count = self.rom_size().rom_banks();
        self.ram_bank_count = self.ram_size().ram_banks();
        self.set_title_offset();
        self.allocate_ram();
        self.set_rom_bank(1);
        self.set_ram_bank(0);
        Ok(())
    }

    pub fn set_title_offset(&mut self) {
        if self.rom_data.len() < 0x0143 {
            return;
        }
        let mut offset: usize = 0;
        for byte in &self.rom_data[0x0134..=0x0143] {
            if *byte == 0u8 {
                break;
            }

            // ignore the final title byte(s) when they're actually the
            // CGB compatibility flag rather than part of the title
            if offset > 14
                && (*byte == CgbMode::CgbCompatible as u8 || *byte == CgbMode::CgbOnly as u8)
            {
                break;
            }

            offset += 1;
        }
        self.title_offset = 0x0134 + offset;
    }

    fn allocate_ram(&mut self) {
        let ram_banks = max(self.ram_size().ram_banks(), 1);
        self.ram_data = vec![0u8; ram_banks as usize * RAM_BANK_SIZE];
    }

    /// Ensures the data provided is a plausibly valid Game Boy ROM
    /// image: at least one 16KB bank pair and a whole number of banks.
    fn ensure_data(&self, data: &[u8]) -> Result<(), Error> {
        if data.len() < 0x7fff {
            return Err(Error::RomSize);
        }
        if data.len() % ROM_BANK_SIZE != 0 {
            return Err(Error::RomSize);
        }
        Ok(())
    }
}

impl Cartridge {
    pub fn title(&self) -> String {
        String::from(
            std::str::from_utf8(&self.rom_data[0x0134..self.title_offset])
                .unwrap_or("")
                .trim(),
        )
    }

    pub fn cgb_flag(&self) -> CgbMode {
        match self.rom_data[0x0143] {
            0x80 => CgbMode::CgbCompatible,
            0xc0 => CgbMode::CgbOnly,
            _ => CgbMode::NoCgb,
        }
    }

    pub fn is_cgb(&self) -> bool {
        matches!(self.cgb_flag(), CgbMode::CgbCompatible | CgbMode::CgbOnly)
    }

    pub fn rom_type(&self) -> RomType {
        if self.rom_data.len() < 0x0147 {
            return RomType::Unknown;
        }
        match self.rom_data[0x0147] {
            0x00 => RomType::RomOnly,
            0x01 => RomType::Mbc1,
            0x02 => RomType::Mbc1Ram,
            0x03 => RomType::Mbc1RamBattery,
            0x08 => RomType::RomRam,
            0x09 => RomType::RomRamBattery,
            0x0f => RomType::Mbc3TimerBattery,
            0x10 => RomType::Mbc3TimerRamBattery,
            0x11 => RomType::Mbc3,
            0x12 => RomType::Mbc3Ram,
            0x13 => RomType::Mbc3RamBattery,
            0x19 => RomType::Mbc5,
            0x1a => RomType::Mbc5Ram,
            0x1b => RomType::Mbc5RamBattery,
            0x1c => RomType::Mbc5Rumble,
            0x1d => RomType::Mbc5RumbleRam,
            0x1e => RomType::Mbc5RumbleRamBattery,
            _ => RomType::Unknown,
        }
    }

    pub fn rom_size(&self) -> RomSize {
        if self.rom_data.len() < 0x0148 {
            return RomSize::SizeUnknown;
        }
        match self.rom_data[0x0148] {
            0x00 => RomSize::Size32K,
            0x01 => RomSize::Size64K,
            0x02 => RomSize::Size128K,
            0x03 => RomSize::Size256K,
            0x04 => RomSize::Size512K,
            0x05 => RomSize::Size1M,
            0x06 => RomSize::Size2M,
            0x07 => RomSize::Size4M,
            0x08 => RomSize::Size8M,
            _ => RomSize::SizeUnknown,
        }
    }

    pub fn ram_size(&self) -> RamSize {
        if self.rom_data.len() < 0x0149 {
            return RamSize::SizeUnknown;
        }
        match self.rom_data[0x0149] {
            0x00 => RamSize::NoRam,
            0x01 => RamSize::Unused,
            0x02 => RamSize::Size8K,
            0x03 => RamSize::Size32K,
            0x04 => RamSize::Size128K,
            0x05 => RamSize::Size64K,
            _ => RamSize::SizeUnknown,
        }
    }

    pub fn has_battery(&self) -> bool {
        self.rom_type().has_battery()
    }

    pub fn rom_data_eager(&self) -> Vec<u8> {
        self.rom_data.clone()
    }

    pub fn ram_data_eager(&self) -> Vec<u8> {
        self.ram_data.clone()
    }

    pub fn set_ram_data(&mut self, data: &[u8]) {
        self.ram_data = data.to_vec();
    }

    pub fn checksum(&self) -> u8 {
        let mut sum: u8 = 0;
        for i in 0x0134..=0x014c {
            sum = sum.wrapping_sub(self.rom_data[i]).wrapping_sub(1);
        }
        sum
    }

    pub fn valid_checksum(&self) -> bool {
        self.rom_data[0x014d] == self.checksum()
    }

    pub fn description(&self, column_length: usize) -> String {
        let title_l = format!("{:width$}", "Title", width = column_length);
        let type_l = format!("{:width$}", "Type", width = column_length);
        let rom_size_l = format!("{:width$}", "ROM Size", width = column_length);
        let ram_size_l = format!("{:width$}", "RAM Size", width = column_length);
        let cgb_l = format!("{:width$}", "CGB Mode", width = column_length);
        format!(
            "{}  {}\n{}  {}\n{}  {}\n{}  {}\n{}  {}",
            title_l,
            self.title(),
            type_l,
            self.rom_type(),
            rom_size_l,
            self.rom_size(),
            ram_size_l,
            self.ram_size(),
            cgb_l,
            self.cgb_flag()
        )
    }
}

impl Cartridge {
    pub fn rom_data(&self) -> &Vec<u8> {
        &self.rom_data
    }

    pub fn ram_data(&self) -> &Vec<u8> {
        &self.ram_data
    }

    pub fn ram_data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.ram_data
    }
}

impl BusComponent for Cartridge {
    fn read(&self, addr: u16) -> u8 {
        self.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.write(addr, value);
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Cartridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description(9))
    }
}

/// Tagged-dispatch table for a Memory Bank Controller: a static set of
/// function pointers the cartridge's `read`/`write` forward to, rather
/// than a trait object, so each MBC stays free of per-access
/// indirection.
pub struct Mbc {
    pub name: &'static str,
    pub read_rom: fn(rom: &Cartridge, addr: u16) -> u8,
    pub write_rom: fn(rom: &mut Cartridge, addr: u16, value: u8),
    pub read_ram: fn(rom: &Cartridge, addr: u16) -> u8,
    pub write_ram: fn(rom: &mut Cartridge, addr: u16, value: u8),
}

pub static NO_MBC: Mbc = Mbc {
    name: "No MBC",
    read_rom: |rom: &Cartridge, addr: u16| -> u8 { rom.rom_data[addr as usize] },
    write_rom: |_rom: &mut Cartridge, addr: u16, _value: u8| {
        match addr {
            // some cartridges write here regardless of having no MBC,
            // harmless to ignore
            0x2000 => (),
            _ => panic_gb!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
        };
    },
    read_ram: |rom: &Cartridge, addr: u16| -> u8 { rom.ram_data[(addr - 0xa000) as usize] },
    write_ram: |rom: &mut Cartridge, addr: u16, value: u8| {
        rom.ram_data[(addr - 0xa000) as usize] = value;
    },
};

/// Recomputes the switched-in ROM bank from MBC1's low 5-bit register
/// and, on cartridges with more than 32 banks (> 512 KiB), the 2-bit
/// `bank_select` register feeding bank bits 6:5. Called whenever either
/// register or the banking-mode flag changes.
fn mbc1_apply_rom_bank(rom: &mut Cartridge) {
    let mut low = rom.mbc1_bank_low;
    if low == 0 {
        low = 1;
    }
    let mut rom_bank = low as u16;
    if rom.rom_bank_count > 32 {
        rom_bank |= (rom.bank_select as u16) << 5;
    }
    rom_bank &= rom.rom_bank_count * 2 - 1;
    rom.set_rom_bank(rom_bank);
}

/// Applies `bank_select` as the RAM bank, used only while in RAM
/// banking mode (mode 1).
fn mbc1_apply_ram_bank(rom: &mut Cartridge) {
    let ram_bank = rom.bank_select;
    if (ram_bank as u16) < rom.ram_bank_count {
        rom.set_ram_bank(ram_bank);
    } else {
        rom.set_ram_bank(0);
    }
}

pub static MBC1: Mbc = Mbc {
    name: "MBC1",
    read_rom: |rom: &Cartridge, addr: u16| -> u8 {
        match addr {
            // in RAM banking mode, large (> 512 KiB) cartridges also
            // steer the fixed 0x0000-0x3FFF window by bank_select's
            // upper bits instead of always reading physical bank 0
            0x0000..=0x3fff => {
                if rom.mbc1_mode == 1 && rom.rom_bank_count > 32 {
                    let bank = (rom.bank_select as usize) << 5;
                    *rom
                        .rom_data
                        .get(bank * ROM_BANK_SIZE + addr as usize)
                        .unwrap_or(&0x0)
                } else {
                    rom.rom_data[addr as usize]
                }
            }
            0x4000..=0x7fff => *rom
                .rom_data
                .get(rom.rom_offset + (addr - 0x4000) as usize)
                .unwrap_or(&0x0),
            _ => {
                warnln!("Reading from unknown Cartridge ROM location 0x{:04x}", addr);
                0xff
            }
        }
    },
    write_rom: |rom: &mut Cartridge, addr: u16, value: u8| match addr {
        // 0x0000-0x1FFF - RAM enabled flag
        0x0000..=0x1fff => rom.ram_enabled = (value & 0x0f) == 0x0a,
        // 0x2000-0x3FFF - ROM bank selection, 5 lower bits
        0x2000..=0x3fff => {
            rom.mbc1_bank_low = value & 0x1f;
            mbc1_apply_rom_bank(rom);
        }
        // 0x4000-0x5FFF - 2-bit register: ROM bank bits 6:5 in mode 0,
        // RAM bank in mode 1
        0x4000..=0x5fff => {
            rom.bank_select = value & 0x03;
            if rom.mbc1_mode == 0 {
                mbc1_apply_rom_bank(rom);
            } else {
                mbc1_apply_ram_bank(rom);
            }
        }
        // 0x6000-0x7FFF - banking mode selection
        0x6000..=0x7fff => {
            rom.mbc1_mode = value & 0x01;
            if rom.mbc1_mode == 0 {
                rom.set_ram_bank(0);
                mbc1_apply_rom_bank(rom);
            } else {
                mbc1_apply_ram_bank(rom);
            }
        }
        _ => warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
    },
    read_ram: |rom: &Cartridge, addr: u16| -> u8 {
        if !rom.ram_enabled {
            return 0xff;
        }
        rom.ram_data[rom.ram_offset + (addr - 0xa000) as usize]
    },
    write_ram: |rom: &mut Cartridge, addr: u16, value: u8| {
        if !rom.ram_enabled {
            warnln!("Attempt to write to ERAM while write protect is active");
            return;
        }
        rom.ram_data[rom.ram_offset + (addr - 0xa000) as usize] = value;
    },
};

pub static MBC3: Mbc = Mbc {
    name: "MBC3",
    read_rom: |rom: &Cartridge, addr: u16| -> u8 {
        match addr {
            0x0000..=0x3fff => rom.rom_data[addr as usize],
            0x4000..=0x7fff => *rom
                .rom_data
                .get(rom.rom_offset + (addr - 0x4000) as usize)
                .unwrap_or(&0x0),
            _ => {
                warnln!("Reading from unknown Cartridge ROM location 0x{:04x}", addr);
                0xff
            }
        }
    },
    write_rom: |rom: &mut Cartridge, addr: u16, value: u8| match addr {
        // 0x0000-0x1FFF - RAM and RTC enabled flag
        0x0000..=0x1fff => rom.ram_enabled = (value & 0x0f) == 0x0a,
        // 0x2000-0x3FFF - ROM bank selection, 7 bits, 0 maps to 1
        0x2000..=0x3fff => {
            let mut rom_bank = value as u16 & 0x7f;
            rom_bank &= rom.rom_bank_count * 2 - 1;
            if rom_bank == 0 {
                rom_bank = 1;
            }
            rom.set_rom_bank(rom_bank);
        }
        // 0x4000-0x5FFF - RAM bank (0x00-0x03) or RTC register (0x08-0x0C)
        0x4000..=0x5fff => {
            rom.bank_select = value;
            if value <= 0x03 && (value as u16) < rom.ram_bank_count {
                rom.set_ram_bank(value);
            }
        }
        // 0x6000-0x7FFF - RTC latch, a 0x00 -> 0x01 write copies the
        // live registers into the latched set read back by the CPU
        0x6000..=0x7fff => rom.rtc.latch(value),
        _ => warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
    },
    read_ram: |rom: &Cartridge, addr: u16| -> u8 {
        if rom.bank_select >= 0x08 {
            return rom.rtc.read(rom.bank_select);
        }
        if !rom.ram_enabled {
            return 0xff;
        }
        rom.ram_data[rom.ram_offset + (addr - 0xa000) as usize]
    },
    write_ram: |rom: &mut Cartridge, addr: u16, value: u8| {
        if rom.bank_select >= 0x08 {
            rom.rtc.write(rom.bank_select, value);
            return;
        }
        if !rom.ram_enabled {
            warnln!("Attempt to write to ERAM while write protect is active");
            return;
        }
        rom.ram_data[rom.ram_offset + (addr - 0xa000) as usize] = value;
    },
};

pub static MBC5: Mbc = Mbc {
    name: "MBC5",
    read_rom: |rom: &Cartridge, addr: u16| -> u8 {
        match addr {
            0x0000..=0x3fff => rom.rom_data[addr as usize],
            0x4000..=0x7fff => *rom
                .rom_data
                .get(rom.rom_offset + (addr - 0x4000) as usize)
                .unwrap_or(&0x0),
            _ => {
                warnln!("Reading from unknown Cartridge ROM location 0x{:04x}", addr);
                0xff
            }
        }
    },
    write_rom: |rom: &mut Cartridge, addr: u16, value: u8| match addr {
        // 0x0000-0x1FFF - RAM enabled flag
        0x0000..=0x1fff => rom.ram_enabled = (value & 0x0f) == 0x0a,
        // 0x2000-0x2FFF - ROM bank selection, 8 lower bits
        0x2000..=0x2fff => rom.set_rom_bank(value as u16),
        // 0x3000-0x3FFF - ROM bank selection, 9th bit
        0x3000..=0x3fff => {
            let rom_bank = (rom.rom_bank() & 0x00ff) + (((value & 0x01) as u16) << 8);
            rom.set_rom_bank(rom_bank);
        }
        // 0x4000-0x5FFF - RAM bank selection; rumble games reuse bit 3
        // for the motor instead of an 8th RAM bank, not modeled here
        0x4000..=0x5fff => {
            let ram_bank = value & 0x0f;
            if ram_bank as u16 >= rom.ram_bank_count {
                return;
            }
            rom.set_ram_bank(ram_bank);
        }
        _ => warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
    },
    read_ram: |rom: &Cartridge, addr: u16| -> u8 {
        if !rom.ram_enabled {
            return 0xff;
        }
        rom.ram_data[rom.ram_offset + (addr - 0xa000) as usize]
    },
    write_ram: |rom: &mut Cartridge, addr: u16, value: u8| {
        if !rom.ram_enabled {
            warnln!("Attempt to write to ERAM while write protect is active");
            return;
        }
        rom.ram_data[rom.ram_offset + (addr - 0xa000) as usize] = value;
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    fn set_checksum(data: &mut [u8]) {
        let mut sum: u8 = 0;
        for byte in &data[0x0134..=0x014c] {
            sum = sum.wrapping_sub(*byte).wrapping_sub(1);
        }
        data[0x014d] = sum;
    }

    fn blank_rom(rom_type: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
        let mut data = vec![0u8; ROM_BANK_SIZE * 4];
        data[0x0134] = b'T';
        data[0x0147] = rom_type;
        data[0x0148] = rom_size;
        data[0x0149] = ram_size;
        set_checksum(&mut data);
        data
    }

    #[test]
    fn test_rom_only_selects_no_mbc() {
        let cartridge = Cartridge::from_data(&blank_rom(0x00, 0x00, 0x00)).unwrap();
        assert_eq!(cartridge.mbc().unwrap().name, "No MBC");
    }

    #[test]
    fn test_title_stops_at_nul() {
        let mut data = blank_rom(0x00, 0x00, 0x00);
        data[0x0134..0x0138].copy_from_slice(b"HI\0\0");
        set_checksum(&mut data);
        let cartridge = Cartridge::from_data(&data).unwrap();
        assert_eq!(cartridge.title(), "HI");
    }

    #[test]
    fn test_invalid_checksum_is_rejected() {
        let mut data = blank_rom(0x00, 0x00, 0x00);
        data[0x014d] ^= 0xff;
        assert_eq!(Cartridge::from_data(&data), Err(Error::InvalidCartridge));
    }

    #[test]
    fn test_unrecognized_cartridge_type_is_rejected() {
        let data = blank_rom(0xfe, 0x00, 0x00); // not a defined RomType byte
        assert_eq!(Cartridge::from_data(&data), Err(Error::InvalidCartridge));
    }

    #[test]
    fn test_mbc1_large_rom_mode_1_banks_in_upper_bits() {
        // 64 banks (1 MB), needs bank_select to feed ROM bits 6:5
        let mut data = vec![0u8; ROM_BANK_SIZE * 64];
        data[0x0134] = b'T';
        data[0x0147] = 0x01; // MBC1
        data[0x0148] = 0x05; // 1 MB / 64 banks
        data[0x0149] = 0x00;
        set_checksum(&mut data);
        let mut cartridge = Cartridge::from_data(&data).unwrap();

        cartridge.write(0x2000, 0x01); // low 5 bits
        cartridge.write(0x4000, 0x02); // upper 2 bits
        cartridge.write(0x6000, 0x01); // mode 1
        assert_eq!(cartridge.rom_bank(), (0x02 << 5) | 0x01);
    }

    #[test]
    fn test_mbc3_rtc_latch_round_trip() {
        let data = blank_rom(0x0f, 0x00, 0x00);
        let mut cartridge = Cartridge::from_data(&data).unwrap();
        cartridge.write(0x0000, 0x0a); // enable RAM/RTC
        cartridge.write(0x4000, 0x08); // select seconds register
        cartridge.write(0xa000, 42); // live seconds register
        assert_eq!(cartridge.read(0xa000), 0); // not yet latched

        cartridge.write(0x6000, 0x00);
        cartridge.write(0x6000, 0x01); // latch edge
        assert_eq!(cartridge.read(0xa000), 42);
    }

    #[test]
    fn test_mbc1_rom_bank_zero_maps_to_one() {
        let data = blank_rom(0x01, 0x01, 0x00); // 4 banks
        let mut cartridge = Cartridge::from_data(&data).unwrap();
        cartridge.write(0x2000, 0x00);
        assert_eq!(cartridge.rom_bank(), 1);
    }
}
