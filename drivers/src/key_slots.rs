/*++

Licensed under the Apache-2.0 license.

File Name:

    key_slots.rs

Abstract:

    File contains the key slot index type and the slot-policy facade over the
    AES engine's key loading interface.

--*/

use ctrboot_registers::{aes as regs, Bus};

use crate::aes::Aes;
use crate::counter::WordFormat;

/// Key component selector for a slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyComponent {
    Normal,
    X,
    Y,
}

impl KeyComponent {
    pub(crate) const fn fifo_offset(self) -> u32 {
        match self {
            KeyComponent::Normal => regs::KEYFIFO,
            KeyComponent::X => regs::KEYXFIFO,
            KeyComponent::Y => regs::KEYYFIFO,
        }
    }
}

/// A validated key slot index (0-0x3F). Slots 0-3 hold the legacy key
/// domain and are never written by this subsystem.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KeySlot(u8);

impl KeySlot {
    pub const COUNT: u8 = 0x40;

    pub const fn new(index: u8) -> Option<KeySlot> {
        if index < Self::COUNT {
            Some(KeySlot(index))
        } else {
            None
        }
    }

    /// Like [`KeySlot::new`], for const contexts; an out-of-range index
    /// fails at compile time.
    pub const fn new_const(index: u8) -> KeySlot {
        assert!(index < Self::COUNT);
        KeySlot(index)
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    pub const fn is_protected(self) -> bool {
        self.0 <= 3
    }
}

/// Stateless facade over [`Aes`] key loading. Its one contract is that
/// writes targeting protected slots are dropped as no-ops instead of
/// miswriting engine state.
pub struct KeySlots<'a, TBus: Bus> {
    aes: &'a mut Aes<TBus>,
}

impl<'a, TBus: Bus> KeySlots<'a, TBus> {
    pub fn new(aes: &'a mut Aes<TBus>) -> Self {
        Self { aes }
    }

    /// Loads one 128-bit key component. Silently ignored for protected
    /// slots.
    pub fn set_key(&mut self, slot: KeySlot, component: KeyComponent, key: &[u8; 16], fmt: WordFormat) {
        if slot.is_protected() {
            return;
        }
        self.aes.set_key(slot, component, key, fmt);
    }

    /// Activates a slot for subsequent transforms.
    pub fn select(&mut self, slot: KeySlot) {
        self.aes.select_slot(slot);
    }
}
