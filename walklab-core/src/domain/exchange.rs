//! Futures exchanges and the vendor market-code table.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A futures exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Exchange {
    /// Zhengzhou Commodity Exchange.
    Czce,
    /// Dalian Commodity Exchange.
    Dce,
    /// Shanghai Futures Exchange.
    Shfe,
    /// Guangzhou Futures Exchange.
    Gfex,
    /// China Financial Futures Exchange.
    Cffex,
    /// Shanghai International Energy Exchange.
    Ine,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown exchange code '{0}'")]
pub struct ExchangeParseError(pub String);

impl Exchange {
    pub const ALL: [Exchange; 6] = [
        Exchange::Czce,
        Exchange::Dce,
        Exchange::Shfe,
        Exchange::Gfex,
        Exchange::Cffex,
        Exchange::Ine,
    ];

    /// Exchange code as used in `SYMBOL.EXCHANGE` identifiers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Czce => "CZCE",
            Self::Dce => "DCE",
            Self::Shfe => "SHFE",
            Self::Gfex => "GFEX",
            Self::Cffex => "CFFEX",
            Self::Ine => "INE",
        }
    }

    /// Local timezone in which session times are quoted.
    pub fn timezone(&self) -> Tz {
        chrono_tz::Asia::Shanghai
    }

    /// Map a vendor export market code (the numeric file-name prefix) to an exchange.
    ///
    /// Only the four codes the vendor uses for commodity futures are known.
    pub fn from_market_code(code: &str) -> Option<Self> {
        match code {
            "28" => Some(Self::Czce),
            "29" => Some(Self::Dce),
            "30" => Some(Self::Shfe),
            "66" => Some(Self::Gfex),
            _ => None,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Exchange {
    type Err = ExchangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|e| e.code() == upper)
            .ok_or_else(|| ExchangeParseError(s.to_string()))
    }
}
