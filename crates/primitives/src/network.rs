//! Stellar network selection.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Issuer of TFT on the Stellar public network.
pub const TFT_ISSUER_PRODUCTION: &str = "GBOVQKJYHXRR3DX6NOX2RRYFRCUMSADGDESTDNBDS6CDVLGVESRTAC47";

/// Issuer of TFT on the Stellar test network.
pub const TFT_ISSUER_TESTNET: &str = "GA47YZA3PKFUZMPLQ3B5F2E3CJIB57TGGU7SPCQT2WAEYKN766PWIMB3";

/// The Stellar network the vault lives on.
///
/// The horizon endpoint, the network passphrase and the TFT issuer are all a function of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StellarNetwork {
    /// The Stellar test network.
    Testnet,

    /// The Stellar public network.
    Production,
}

impl StellarNetwork {
    /// Returns the default Horizon endpoint of this network.
    pub const fn horizon_url(&self) -> &'static str {
        match self {
            StellarNetwork::Testnet => "https://horizon-testnet.stellar.org",
            StellarNetwork::Production => "https://horizon.stellar.org",
        }
    }

    /// Returns the passphrase used to compute transaction hashes on this network.
    pub const fn passphrase(&self) -> &'static str {
        match self {
            StellarNetwork::Testnet => "Test SDF Network ; September 2015",
            StellarNetwork::Production => "Public Global Stellar Network ; September 2015",
        }
    }

    /// Returns the issuer of the TFT asset on this network.
    pub const fn tft_issuer(&self) -> &'static str {
        match self {
            StellarNetwork::Testnet => TFT_ISSUER_TESTNET,
            StellarNetwork::Production => TFT_ISSUER_PRODUCTION,
        }
    }
}

impl fmt::Display for StellarNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StellarNetwork::Testnet => write!(f, "testnet"),
            StellarNetwork::Production => write!(f, "production"),
        }
    }
}

impl FromStr for StellarNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "testnet" => Ok(Self::Testnet),
            "production" => Ok(Self::Production),
            other => Err(format!("invalid stellar network: {other}")),
        }
    }
}
