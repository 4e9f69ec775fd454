use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::EngineError;

/// Canonical ISO-like currency code (three uppercase ASCII letters).
///
/// Every money map in the engine is keyed by `CurrencyCode`, never by the free
/// text typed in forms. Free text goes through [`canonicalize`] first.
///
/// ```rust
/// use engine::{CurrencyCode, canonicalize};
///
/// assert_eq!(canonicalize("U$D"), CurrencyCode::USD);
/// assert_eq!(canonicalize(""), CurrencyCode::ARS);
/// assert_eq!(canonicalize("eur").code(), "EUR");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub const ARS: CurrencyCode = CurrencyCode(*b"ARS");
    pub const USD: CurrencyCode = CurrencyCode(*b"USD");
    pub const EUR: CurrencyCode = CurrencyCode(*b"EUR");
    pub const BRL: CurrencyCode = CurrencyCode(*b"BRL");
    pub const UYU: CurrencyCode = CurrencyCode(*b"UYU");
    pub const CLP: CurrencyCode = CurrencyCode(*b"CLP");

    /// Currency used when the input carries no usable currency.
    pub const DEFAULT: CurrencyCode = CurrencyCode::ARS;

    /// Canonical currency code.
    #[must_use]
    pub fn code(&self) -> &str {
        // Only ASCII uppercase letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("ARS")
    }

    fn from_iso(value: &str) -> Option<Self> {
        let bytes = value.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return None;
        }
        Some(CurrencyCode([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        CurrencyCode::DEFAULT
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.code())
    }
}

/// Strict parse used for stored rows: exactly three ASCII letters.
impl TryFrom<&str> for CurrencyCode {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        CurrencyCode::from_iso(value.trim()).ok_or_else(|| {
            EngineError::InvalidInput(format!("invalid currency code: {value:?}"))
        })
    }
}

impl FromStr for CurrencyCode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurrencyCode::try_from(s)
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CurrencyCode::try_from(raw.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Symbols and localized shorthand seen in receipts, uppercased and without
/// spaces or dots.
const ALIASES: &[(&str, CurrencyCode)] = &[
    ("$", CurrencyCode::ARS),
    ("AR$", CurrencyCode::ARS),
    ("ARS$", CurrencyCode::ARS),
    ("$AR", CurrencyCode::ARS),
    ("PESO", CurrencyCode::ARS),
    ("PESOS", CurrencyCode::ARS),
    ("U$D", CurrencyCode::USD),
    ("U$S", CurrencyCode::USD),
    ("US$", CurrencyCode::USD),
    ("USD$", CurrencyCode::USD),
    ("U$", CurrencyCode::USD),
    ("DOLAR", CurrencyCode::USD),
    ("DOLARES", CurrencyCode::USD),
    ("DÓLAR", CurrencyCode::USD),
    ("DÓLARES", CurrencyCode::USD),
    ("€", CurrencyCode::EUR),
    ("EURO", CurrencyCode::EUR),
    ("EUROS", CurrencyCode::EUR),
    ("R$", CurrencyCode::BRL),
    ("REAL", CurrencyCode::BRL),
    ("REAIS", CurrencyCode::BRL),
    ("$U", CurrencyCode::UYU),
    ("UY$", CurrencyCode::UYU),
    ("CLP$", CurrencyCode::CLP),
];

/// Maps free-text currency input to its canonical code.
///
/// - Known symbols/aliases (`$`, `AR$`, `U$D`, `US$`, `u$s`, `€`, `R$`, ...)
///   map to their ISO code, case-insensitively.
/// - Any other three-letter alphabetic input is taken as an ISO code.
/// - Empty or unrecognized input yields [`CurrencyCode::DEFAULT`] (`ARS`).
#[must_use]
pub fn canonicalize(raw: &str) -> CurrencyCode {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .flat_map(char::to_uppercase)
        .collect();
    if compact.is_empty() {
        return CurrencyCode::DEFAULT;
    }
    if let Some((_, code)) = ALIASES.iter().find(|(alias, _)| *alias == compact) {
        return *code;
    }
    CurrencyCode::from_iso(&compact).unwrap_or(CurrencyCode::DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_aliases_map_to_usd() {
        for raw in ["U$D", "US$", "u$s", "usd", " U$S ", "u.s.$", "Dólares"] {
            assert_eq!(canonicalize(raw), CurrencyCode::USD, "{raw}");
        }
    }

    #[test]
    fn empty_or_unknown_defaults_to_ars() {
        assert_eq!(canonicalize(""), CurrencyCode::ARS);
        assert_eq!(canonicalize("   "), CurrencyCode::ARS);
        assert_eq!(canonicalize("¥¥"), CurrencyCode::ARS);
        assert_eq!(canonicalize("monopoly money"), CurrencyCode::ARS);
        assert_eq!(canonicalize("$"), CurrencyCode::ARS);
    }

    #[test]
    fn iso_codes_pass_through_uppercased() {
        assert_eq!(canonicalize("gbp").code(), "GBP");
        assert_eq!(canonicalize("R$"), CurrencyCode::BRL);
    }

    #[test]
    fn strict_parse_rejects_aliases() {
        assert!(CurrencyCode::try_from("U$D").is_err());
        assert!(CurrencyCode::try_from("").is_err());
        assert_eq!(CurrencyCode::try_from("usd").unwrap(), CurrencyCode::USD);
    }

    #[test]
    fn serde_uses_plain_code() {
        let json = serde_json::to_string(&CurrencyCode::USD).unwrap();
        assert_eq!(json, "\"USD\"");
        let back: CurrencyCode = serde_json::from_str("\"ars\"").unwrap();
        assert_eq!(back, CurrencyCode::ARS);
    }
}
