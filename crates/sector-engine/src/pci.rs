//! PCI modulo audit
//!
//! LTE cells whose PCIs share `pci mod 3` place their reference signals on
//! the same subcarriers (RS collision); cells sharing `pci mod 6` collide on
//! the primary synchronization signal shift (PSS). Grouping sites by the
//! modulo lets an engineer eyeball neighbouring sectors of the same color.
//! Only the group id is computed here.

use crate::{Result, SectorError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit modulus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PciModulo {
    /// `pci mod 3`, reference-signal audit
    Rs,
    /// `pci mod 6`, synchronization-signal audit
    Pss,
}

impl PciModulo {
    pub fn value(self) -> u32 {
        match self {
            PciModulo::Rs => 3,
            PciModulo::Pss => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PciModulo::Rs => "RS",
            PciModulo::Pss => "PSS",
        }
    }

    /// Attribute name exporters use for the group value, e.g. `Mod_3`
    pub fn field_name(self) -> String {
        format!("Mod_{}", self.value())
    }

    /// Every group id for this modulus, ascending
    pub fn groups(self) -> impl Iterator<Item = PciGroup> {
        (0..self.value() as u8).map(PciGroup)
    }
}

impl TryFrom<u32> for PciModulo {
    type Error = SectorError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            3 => Ok(PciModulo::Rs),
            6 => Ok(PciModulo::Pss),
            other => Err(SectorError::InvalidModulo(other)),
        }
    }
}

impl From<PciModulo> for u32 {
    fn from(m: PciModulo) -> u32 {
        m.value()
    }
}

impl fmt::Display for PciModulo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod {} ({})", self.value(), self.label())
    }
}

/// Interference group id in `[0, modulo)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PciGroup(u8);

impl PciGroup {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn id(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PciGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group for `pci` under a validated modulus
pub fn classify_with(pci: i64, modulo: PciModulo) -> Result<PciGroup> {
    if pci < 0 {
        return Err(SectorError::NegativePci(pci));
    }
    Ok(PciGroup((pci % modulo.value() as i64) as u8))
}

/// `pci mod modulo`; fails for a modulo other than 3 or 6, or a negative PCI
pub fn classify(pci: i64, modulo: u32) -> Result<PciGroup> {
    classify_with(pci, PciModulo::try_from(modulo)?)
}
