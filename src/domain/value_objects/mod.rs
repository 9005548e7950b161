//! Value Objects for the data-bundle storefront

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const TRACKING_CODE_LEN: usize = 6;

/// Short public identifier customers quote to check an order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingCode(String);

impl TrackingCode {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, TrackingCodeError> {
        let value = value.as_ref().trim();
        if value.len() != TRACKING_CODE_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TrackingCodeError::Malformed(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Draws a fresh code. Uniqueness is the caller's job.
    pub fn generate() -> Self {
        let low = 10u32.pow(TRACKING_CODE_LEN as u32 - 1);
        let high = 10u32.pow(TRACKING_CODE_LEN as u32);
        Self(rand::thread_rng().gen_range(low..high).to_string())
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for TrackingCode {
    type Error = TrackingCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(value) }
}

impl From<TrackingCode> for String {
    fn from(code: TrackingCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingCodeError {
    #[error("tracking code must be 6 digits, got {0:?}")]
    Malformed(String),
}

/// Mobile-money number the bundle is loaded onto.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact(String);

impl CustomerContact {
    pub fn new(value: impl AsRef<str>) -> Result<Self, ContactError> {
        let value = value.as_ref().trim();
        let digits = value.strip_prefix('+').unwrap_or(value);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ContactError::NotNumeric);
        }
        if !(10..=15).contains(&digits.len()) { return Err(ContactError::BadLength(digits.len())); }
        Ok(Self(value.to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CustomerContact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    #[error("contact number must contain only digits")]
    NotNumeric,
    #[error("contact number must have 10 to 15 digits, got {0}")]
    BadLength(usize),
}

/// Catalog identifier of a data package.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef(String);

impl PackageRef {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Money value object. Amounts are decimal major units; the gateway speaks minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn ghs(amount: Decimal) -> Self { Self::new(amount, "GHS") }
    pub fn from_minor_units(minor: i64, currency: &str) -> Self { Self::new(Decimal::new(minor, 2), currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }

    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        let minor = self.amount * Decimal::ONE_HUNDRED;
        if !minor.fract().is_zero() { return Err(MoneyError::FractionalMinorUnit(self.amount)); }
        minor.to_i64().ok_or(MoneyError::OutOfRange(self.amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {:.2}", self.currency, self.amount) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("{0} is not a whole number of minor units")]
    FractionalMinorUnit(Decimal),
    #[error("{0} does not fit in minor units")]
    OutOfRange(Decimal),
}
