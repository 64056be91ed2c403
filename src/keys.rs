//! The eleven well-known unlock keys (§6).
//!
//! These are the manufacturer/OEM master keys the i1Display3 firmware
//! accepts, reproduced from the public calibration tooling this driver
//! family interoperates with. `auto_unlock` (§4.1) walks this catalog in
//! order.

/// An unlock challenge-response key: an ordered pair of 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockKey {
    pub name: &'static str,
    pub k0: u32,
    pub k1: u32,
}

/// The eleven catalog keys, in the order `auto_unlock` tries them.
pub const KEY_CATALOG: [UnlockKey; 11] = [
    UnlockKey { name: "Retail", k0: 0xe962_2e9f, k1: 0x8d63_e133 },
    UnlockKey { name: "Munki", k0: 0xe01e_6e0a, k1: 0x2574_62de },
    UnlockKey { name: "OEM", k0: 0xcaa6_2b2c, k1: 0x3081_5b61 },
    UnlockKey { name: "NEC", k0: 0xa911_9479, k1: 0x5b16_8761 },
    UnlockKey { name: "Quato", k0: 0x160e_b6ae, k1: 0x1444_0e70 },
    UnlockKey { name: "HP", k0: 0x291e_41d7, k1: 0x5193_7bdd },
    UnlockKey { name: "Wacom", k0: 0x1abf_ae03, k1: 0xf25a_c8e8 },
    UnlockKey { name: "TPA", k0: 0x828c_43e9, k1: 0xcbb8_a8ed },
    UnlockKey { name: "Barco", k0: 0xe8d1_a980, k1: 0xd146_f7ad },
    UnlockKey { name: "Crysta", k0: 0x171a_e295, k1: 0x2e5c_7664 },
    UnlockKey { name: "Viewsonic", k0: 0x64d8_c546, k1: 0x4b24_b4a7 },
];
