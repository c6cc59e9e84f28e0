//! Strongly-typed identifiers used across the engine.
//!
//! Shop, product and variant references are opaque strings owned by the
//! upstream commerce platform; they are never parsed beyond a blank check.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a shop (the tenant boundary, e.g. `acme.myshopify.com`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopId(String);

/// Upstream product reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductRef(String);

/// Upstream variant reference. Absent on an item key means "default variant".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantRef(String);

macro_rules! impl_ref_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a reference received from a trusted source.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: blank", $name)));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

impl_ref_newtype!(ShopId, "ShopId");
impl_ref_newtype!(ProductRef, "ProductRef");
impl_ref_newtype!(VariantRef, "VariantRef");

/// Identifier of an audit entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(Uuid);

impl AuditEntryId {
    /// Uses UUIDv7 so identifiers sort by creation time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_shop_id_is_rejected() {
        let err = "   ".parse::<ShopId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.contains("ShopId")));
    }

    #[test]
    fn parsing_trims_whitespace() {
        let shop: ShopId = " acme.myshopify.com ".parse().unwrap();
        assert_eq!(shop.as_str(), "acme.myshopify.com");
    }

    #[test]
    fn refs_serialize_transparently() {
        let variant = VariantRef::new("4411");
        assert_eq!(serde_json::to_string(&variant).unwrap(), "\"4411\"");
    }
}
