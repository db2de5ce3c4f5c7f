pub mod admin;
pub mod events;
pub mod query;
pub mod read_model;
pub mod ws;

pub use events::{ChainEvent, EventKey, EventKind, EventPayload};
pub use query::{
    ActivitiesQuery, ActivityOrderBy, DepositOrderBy, DepositsQuery, OrderDirection, PageLimits,
    TransferOrderBy, TransfersQuery,
};
pub use read_model::{
    ActivityKind, Connection, DepositSummary, DepositView, Page, TransferStatus, TransferSummary,
    TransferView, UserActivityView,
};

use alloy_primitives::U256;
use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(CompactString);

        impl $name {
            pub fn new(id: impl Into<CompactString>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(
    /// Opaque deposit identifier, compared exactly.
    DepositId
);
opaque_id!(
    /// Opaque transfer identifier, compared exactly.
    TransferId
);

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// An account or token address, normalized to lower case on construction.
///
/// Every way of obtaining an `Address` (constructor, `FromStr`, serde) goes
/// through the same normalization, so equality is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(CompactString);

impl Address {
    pub fn new(raw: &str) -> Self {
        Self(CompactString::from(raw.trim().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let address = Address::new(&raw);
        if address.is_empty() {
            return Err(serde::de::Error::custom("address must not be empty"));
        }
        Ok(address)
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A token amount in base units.
///
/// Backed by a 256-bit unsigned integer and carried on the wire as a
/// decimal-integer string. Arithmetic is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(U256);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("amount must be a non-empty decimal integer")]
    NotDecimal,
    #[error("amount does not fit in 256 bits")]
    Overflow,
}

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    pub fn from_u128(value: u128) -> Self {
        Self(U256::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn into_inner(self) -> U256 {
        self.0
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::NotDecimal);
        }
        U256::from_str_radix(s, 10)
            .map(Amount)
            .map_err(|_| AmountParseError::Overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
