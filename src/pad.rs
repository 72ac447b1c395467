//! Joypad register (0xFF00): two 4-bit input groups (direction, action)
//! multiplexed onto one nibble by the upper two bits of a write.

use crate::{
    consts::P1_ADDR,
    interrupts::{InterruptKind, Interrupts},
    mmu::BusComponent,
};

pub struct Pad {
    down: bool,
    up: bool,
    left: bool,
    right: bool,
    start: bool,
    select: bool,
    b: bool,
    a: bool,
    selection: PadSelection,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PadSelection {
    Action,
    Direction,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PadKey {
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
    A,
    B,
}

impl Pad {
    pub fn new() -> Self {
        Self {
            down: false,
            up: false,
            left: false,
            right: false,
            start: false,
            select: false,
            b: false,
            a: false,
            selection: PadSelection::Action,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            P1_ADDR => {
                let mut value = match self.selection {
                    PadSelection::Action => {
                        (if self.a { 0x00 } else { 0x01 })
                            | (if self.b { 0x00 } else { 0x02 })
                            | (if self.select { 0x00 } else { 0x04 })
                            | (if self.start { 0x00 } else { 0x08 })
                    }
                    PadSelection::Direction => {
                        (if self.right { 0x00 } else { 0x01 })
                            | (if self.left { 0x00 } else { 0x02 })
                            | (if self.up { 0x00 } else { 0x04 })
                            | (if self.down { 0x00 } else { 0x08 })
                    }
                };
                value |= match self.selection {
                    PadSelection::Direction => 0x10,
                    PadSelection::Action => 0x20,
                };
                value
            }
            _ => 0xff,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        if addr == P1_ADDR {
            self.selection = if value & 0x10 == 0x00 {
                PadSelection::Direction
            } else {
                PadSelection::Action
            };
        }
    }

    /// Requests a Joypad interrupt on the high-to-low transition of any
    /// line belonging to the currently-selected group, matching real
    /// hardware's edge-triggered wiring.
    pub fn key_press(&mut self, key: PadKey, interrupts: &mut Interrupts) {
        let relevant = matches!(
            (self.selection, key),
            (PadSelection::Direction, PadKey::Up)
                | (PadSelection::Direction, PadKey::Down)
                | (PadSelection::Direction, PadKey::Left)
                | (PadSelection::Direction, PadKey::Right)
                | (PadSelection::Action, PadKey::Start)
                | (PadSelection::Action, PadKey::Select)
                | (PadSelection::Action, PadKey::A)
                | (PadSelection::Action, PadKey::B)
        );
        let was_pressed = self.is_pressed(key);
        self.set_pressed(key, true);
        if relevant && !was_pressed {
            interrupts.request(InterruptKind::Joypad);
        }
    }

    pub fn key_lift(&mut self, key: PadKey) {
        self.set_pressed(key, false);
    }

    fn is_pressed(&self, key: PadKey) -> bool {
        match key {
            PadKey::Up => self.up,
            PadKey::Down => self.down,
            PadKey::Left => self.left,
            PadKey::Right => self.right,
            PadKey::Start => self.start,
            PadKey::Select => self.select,
            PadKey::A => self.a,
            PadKey::B => self.b,
        }
    }

    fn set_pressed(&mut self, key: PadKey, pressed: bool) {
        match key {
            PadKey::Up => self.up = pressed,
            PadKey::Down => self.down = pressed,
            PadKey::Left => self.left = pressed,
            PadKey::Right => self.right = pressed,
            PadKey::Start => self.start = pressed,
            PadKey::Select => self.select = pressed,
            PadKey::A => self.a = pressed,
            PadKey::B => self.b = pressed,
        }
    }
}

impl Default for Pad {
    fn default() -> Self {
        Self::new()
    }
}

impl BusComponent for Pad {
    fn read(&self, addr: u16) -> u8 {
        self.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.write(addr, value);
    }
}

#[cfg(test)]
mod tests {
    use super::{Pad, PadKey};
    use crate::consts::P1_ADDR;
    use crate::interrupts::{InterruptKind, Interrupts};

    #[test]
    fn test_no_keys_pressed_reads_all_high() {
        let pad = Pad::new();
        assert_eq!(pad.read(P1_ADDR) & 0x0f, 0x0f);
    }

    #[test]
    fn test_selection_switches_nibble() {
        let mut pad = Pad::new();
        let mut interrupts = Interrupts::new();
        pad.key_press(PadKey::A, &mut interrupts);
        pad.write(P1_ADDR, 0x10); // select action
        assert_eq!(pad.read(P1_ADDR) & 0x01, 0x00);
        pad.write(P1_ADDR, 0x20); // select direction
        assert_eq!(pad.read(P1_ADDR) & 0x01, 0x01);
    }

    #[test]
    fn test_key_press_requests_joypad_interrupt_once() {
        let mut pad = Pad::new();
        let mut interrupts = Interrupts::new();
        interrupts.write_ie(InterruptKind::Joypad.mask());
        pad.write(P1_ADDR, 0x10); // select action group
        pad.key_press(PadKey::A, &mut interrupts);
        assert!(interrupts.has_pending());
        interrupts.acknowledge(InterruptKind::Joypad);
        pad.key_press(PadKey::A, &mut interrupts); // already pressed, no new edge
        assert!(!interrupts.has_pending());
    }
}
