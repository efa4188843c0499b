//! # Core Identifiers
//!
//! ## Clusters
//!
//! - **Ledger**: `UnitId`, `Address`
//! - **Messaging**: `DeviceAddress`
//!
//! All three are opaque strings handed to us by the wallet runtime. Units are
//! content-addressed (base64 hashes), addresses are checksummed base32 strings,
//! device addresses identify a paired chat peer.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw identifier text.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper, returning the raw identifier.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of an immutable ledger unit. Polls are identified by the
    /// unit that defined them.
    UnitId
);

string_id!(
    /// A wallet address on the ledger (vote author, output owner, attestor).
    Address
);

string_id!(
    /// Address of a paired chat device. Unrelated to ledger addresses.
    DeviceAddress
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_raw_value() {
        let unit = UnitId::new("pecgjVXpD+UaVA1Tf0WBtdleC4vtWh/EtaghX/u/vEU=");
        assert_eq!(
            unit.to_string(),
            "pecgjVXpD+UaVA1Tf0WBtdleC4vtWh/EtaghX/u/vEU="
        );
    }

    #[test]
    fn test_serde_transparent() {
        let device = DeviceAddress::from("0DEVICE");
        let json = serde_json::to_string(&device).unwrap();
        assert_eq!(json, "\"0DEVICE\"");

        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, device);
    }

    #[test]
    fn test_ordering_follows_text() {
        let mut addresses = vec![Address::from("B"), Address::from("A")];
        addresses.sort();
        assert_eq!(addresses[0].as_str(), "A");
    }
}
