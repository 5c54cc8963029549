//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Money value object.
///
/// Fixed-point so that summing line items never drifts. Travels over JSON as a
/// plain number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// Largest amount a `NUMERIC(12, 2)` column holds: 9,999,999,999.99.
    pub const MAX: Money = Money(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(MoneyError::Negative); }
        let amount = amount.round_dp(2);
        if amount > Self::MAX.0 { return Err(MoneyError::OutOfRange); }
        Ok(Self(amount))
    }
    pub fn amount(&self) -> Decimal { self.0 }

    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(other.0).filter(|v| *v <= Self::MAX.0).map(Money).ok_or(MoneyError::OutOfRange)
    }

    pub fn checked_mul(&self, qty: Quantity) -> Result<Money, MoneyError> {
        self.0.checked_mul(Decimal::from(qty.value())).filter(|v| *v <= Self::MAX.0).map(Money).ok_or(MoneyError::OutOfRange)
    }

    /// Sum of `amounts`, failing once the running total leaves the range.
    pub fn total(amounts: impl IntoIterator<Item = Money>) -> Result<Money, MoneyError> {
        amounts.into_iter().try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl FromStr for Money {
    type Err = MoneyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim()).map_err(|_| MoneyError::Malformed)?;
        Self::new(amount)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let amount = rust_decimal::serde::float::deserialize(d)?;
        Money::new(amount).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("amount must not be negative")]
    Negative,
    #[error("amount is not a decimal number")]
    Malformed,
    #[error("amount exceeds 9999999999.99")]
    OutOfRange,
}

/// Quantity of a single product on a cart line or order item. Always at least
/// one and never more than an `INTEGER` column holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);
    pub const MAX: u32 = i32::MAX as u32;

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > Self::MAX { return Err(QuantityError::OutOfRange); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn checked_add(&self, other: Quantity) -> Result<Self, QuantityError> {
        self.0.checked_add(other.0).ok_or(QuantityError::OutOfRange).and_then(Self::new)
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let v = u32::try_from(value).map_err(|_| QuantityError::OutOfRange)?;
        Self::new(v)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(d)?;
        Quantity::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
    #[error("quantity out of range")]
    OutOfRange,
}

/// Star rating attached to a review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then(|| Self(value as u8))
    }
    pub fn value(&self) -> u8 { self.0 }
}

/// Caller role as yielded by the identity provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Customer,
    Manager,
    Admin,
}

impl Role {
    pub fn is_staff(&self) -> bool { matches!(self, Role::Manager | Role::Admin) }
    pub fn as_str(&self) -> &'static str {
        match self { Role::Customer => "CUSTOMER", Role::Manager => "MANAGER", Role::Admin => "ADMIN" }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(Role::Customer),
            "MANAGER" => Ok(Role::Manager),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Product category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Electronics,
    Clothing,
    Food,
    Books,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "ELECTRONICS",
            Category::Clothing => "CLOTHING",
            Category::Food => "FOOD",
            Category::Books => "BOOKS",
            Category::Other => "OTHER",
        }
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ELECTRONICS" => Ok(Category::Electronics),
            "CLOTHING" => Ok(Category::Clothing),
            "FOOD" => Ok(Category::Food),
            "BOOKS" => Ok(Category::Books),
            "OTHER" => Ok(Category::Other),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized value `{0}`")]
pub struct UnknownVariant(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_rejects_negative() {
        assert_eq!(Money::new(Decimal::new(-1, 2)), Err(MoneyError::Negative));
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_money_sum_is_exact() {
        let cents: Money = "0.10".parse().unwrap();
        let total = Money::total(std::iter::repeat(cents).take(3)).unwrap();
        assert_eq!(total.amount(), Decimal::new(30, 2));
        assert_eq!(total.to_string(), "0.30");
    }

    #[test]
    fn test_money_is_bounded() {
        assert_eq!(Money::MAX.to_string(), "9999999999.99");
        assert_eq!("9999999999.99".parse::<Money>(), Ok(Money::MAX));
        assert_eq!("10000000000".parse::<Money>(), Err(MoneyError::OutOfRange));
        assert!(serde_json::from_str::<Money>("100000000000000000000").is_err());

        let price: Money = "9999999999.99".parse().unwrap();
        let qty = Quantity::new(Quantity::MAX).unwrap();
        assert_eq!(price.checked_mul(qty), Err(MoneyError::OutOfRange));
        assert_eq!(price.checked_add("0.01".parse().unwrap()), Err(MoneyError::OutOfRange));
        assert_eq!(Money::total([price, price]), Err(MoneyError::OutOfRange));
        assert_eq!("2.50".parse::<Money>().unwrap().checked_mul(Quantity::new(4).unwrap()).unwrap().to_string(), "10.00");
    }

    #[test]
    fn test_money_json_is_a_number() {
        let m: Money = "19.99".parse().unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "19.99");
        let back: Money = serde_json::from_str("19.99").unwrap();
        assert_eq!(back, m);
        assert!(serde_json::from_str::<Money>("-1.5").is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::try_from(-3), Err(QuantityError::OutOfRange));
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("4").unwrap().value(), 4);
        assert!(serde_json::from_str::<Quantity>("4000000000").is_err());
        assert_eq!(Quantity::new(Quantity::MAX).map(|q| q.value()), Ok(2_147_483_647));
    }

    #[test]
    fn test_quantity_merge_is_capped() {
        let big = Quantity::new(Quantity::MAX).unwrap();
        assert_eq!(big.checked_add(Quantity::ONE), Err(QuantityError::OutOfRange));
        assert_eq!(Quantity::new(2).unwrap().checked_add(Quantity::ONE).map(|q| q.value()), Ok(3));
    }

    #[test]
    fn test_rating_range() {
        assert!(Rating::new(0).is_none());
        assert!(Rating::new(6).is_none());
        assert_eq!(Rating::new(5).map(|r| r.value()), Some(5));
    }

    #[test]
    fn test_role_and_category_parse() {
        assert_eq!("MANAGER".parse::<Role>().unwrap(), Role::Manager);
        assert!("manager".parse::<Role>().is_err());
        assert!(Role::Admin.is_staff());
        assert!(!Role::Customer.is_staff());
        assert_eq!("BOOKS".parse::<Category>().unwrap(), Category::Books);
    }
}
