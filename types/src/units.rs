use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Amount in the ledger's smallest unit.
pub type Wei = u128;

/// Decimals between ether and wei.
pub const ETHER_DECIMALS: u32 = 18;

/// Wei in one ether.
pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("too many fractional digits (max 18): {0}")]
    TooPrecise(String),
    #[error("amount overflows: {0}")]
    Overflow(String),
}

/// Convert a decimal ether string (`"1"`, `"0.1"`, `"2.50"`) into wei.
pub fn parse_ether(value: &str) -> Result<Wei, AmountError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AmountError::Empty);
    }
    if value.starts_with('-') {
        return Err(AmountError::Negative(value.to_string()));
    }
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::Invalid(value.to_string()));
    }
    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(whole) || !is_digits(fraction) {
        return Err(AmountError::Invalid(value.to_string()));
    }
    if fraction.len() > ETHER_DECIMALS as usize {
        return Err(AmountError::TooPrecise(value.to_string()));
    }

    let overflow = || AmountError::Overflow(value.to_string());
    let whole: Wei = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut fraction_wei: Wei = 0;
    if !fraction.is_empty() {
        let scale = 10u128.pow(ETHER_DECIMALS - fraction.len() as u32);
        fraction_wei = fraction.parse::<Wei>().map_err(|_| overflow())? * scale;
    }
    whole
        .checked_mul(WEI_PER_ETHER)
        .and_then(|wei| wei.checked_add(fraction_wei))
        .ok_or_else(overflow)
}

/// Render wei as a decimal ether string without trailing zeros (`1100000000000000000` -> `"1.1"`).
pub fn format_ether(wei: Wei) -> String {
    let whole = wei / WEI_PER_ETHER;
    let fraction = wei % WEI_PER_ETHER;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:018}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Ether amount accepted from user input, stored as wei.
///
/// Deserializes from either a decimal string (`"0.1"`) or a JSON number (`0.1`);
/// serializes back as a decimal string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ether(pub Wei);

impl Ether {
    pub fn wei(self) -> Wei {
        self.0
    }
}

impl FromStr for Ether {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_ether(s).map(Ether)
    }
}

impl fmt::Display for Ether {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_ether(self.0))
    }
}

impl Serialize for Ether {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_ether(self.0))
    }
}

impl<'de> Deserialize<'de> for Ether {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(u64),
            Float(f64),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Integer(value) => value.to_string(),
            Raw::Float(value) => value.to_string(),
        };
        parse_ether(&text).map(Ether).map_err(de::Error::custom)
    }
}

/// A 20-byte ledger account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be 20 bytes of hex: {0}")]
    Length(String),
    #[error("address is not hex: {0}")]
    Hex(String),
}

impl Address {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address whose trailing eight bytes hold `value` (big endian).
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 40 {
            return Err(AddressError::Length(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError::Hex(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_ether() {
        assert_eq!(parse_ether("1").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_ether("1.0").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_ether("0.1").unwrap(), WEI_PER_ETHER / 10);
        assert_eq!(parse_ether(".5").unwrap(), WEI_PER_ETHER / 2);
        assert_eq!(parse_ether("2.").unwrap(), 2 * WEI_PER_ETHER);
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), 1);
    }

    #[test]
    fn rejects_malformed_ether() {
        assert_eq!(parse_ether(""), Err(AmountError::Empty));
        assert!(matches!(parse_ether("-1"), Err(AmountError::Negative(_))));
        assert!(matches!(parse_ether("1e18"), Err(AmountError::Invalid(_))));
        assert!(matches!(parse_ether("."), Err(AmountError::Invalid(_))));
        assert!(matches!(parse_ether("1.2.3"), Err(AmountError::Invalid(_))));
        assert!(matches!(
            parse_ether("0.0000000000000000001"),
            Err(AmountError::TooPrecise(_))
        ));
        assert!(matches!(
            parse_ether("999999999999999999999999"),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn formats_ether_without_trailing_zeros() {
        assert_eq!(format_ether(0), "0");
        assert_eq!(format_ether(WEI_PER_ETHER), "1");
        assert_eq!(format_ether(WEI_PER_ETHER + WEI_PER_ETHER / 10), "1.1");
        assert_eq!(format_ether(1), "0.000000000000000001");
    }

    #[test]
    fn ether_accepts_strings_and_numbers() {
        let from_text: Ether = serde_json::from_str("\"0.1\"").unwrap();
        let from_float: Ether = serde_json::from_str("0.1").unwrap();
        let from_int: Ether = serde_json::from_str("3").unwrap();
        assert_eq!(from_text, Ether(WEI_PER_ETHER / 10));
        assert_eq!(from_float, from_text);
        assert_eq!(from_int, Ether(3 * WEI_PER_ETHER));
        assert_eq!(serde_json::to_string(&from_text).unwrap(), "\"0.1\"");
        assert!(serde_json::from_str::<Ether>("-1").is_err());
    }

    #[test]
    fn address_round_trips_through_hex() {
        let text = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
        let address: Address = text.parse().unwrap();
        assert_eq!(address.to_string(), text);
        let upper: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
        assert_eq!(upper, address);
        assert_eq!(
            Address::from_low_u64(7).to_string(),
            "0x0000000000000000000000000000000000000007"
        );
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(matches!("0x1234".parse::<Address>(), Err(AddressError::Length(_))));
        assert!(matches!(
            "0xzzbdb2315678afecb367f032d93f642f64180aa3".parse::<Address>(),
            Err(AddressError::Hex(_))
        ));
    }
}
