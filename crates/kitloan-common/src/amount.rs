//! Amounts in minor currency units

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Amount in the platform's minor currency unit
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);

    /// Create a new [`Amount`] from minor units
    pub fn new(minor: u64) -> Self {
        Self(minor)
    }

    /// Amount in minor units
    pub fn as_minor(&self) -> u64 {
        self.0
    }

    /// Checked addition, returns [`Error::AmountOverflow`] on overflow
    pub fn checked_add(self, other: Amount) -> Result<Amount, Error> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }

    /// Checked subtraction, returns [`Error::AmountOverflow`] on underflow
    pub fn checked_sub(self, other: Amount) -> Result<Amount, Error> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }

    /// Try to sum a series of amounts, erroring on overflow
    pub fn try_sum<I>(iter: I) -> Result<Amount, Error>
    where
        I: IntoIterator<Item = Amount>,
    {
        iter.into_iter()
            .try_fold(Amount::ZERO, |acc, x| acc.checked_add(x))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_sum() {
        let amounts = vec![Amount::new(1), Amount::new(2), Amount::new(3)];
        assert_eq!(Amount::try_sum(amounts).unwrap(), Amount::new(6));
    }

    #[test]
    fn test_try_sum_overflow() {
        let amounts = vec![Amount::new(u64::MAX), Amount::new(1)];
        assert!(Amount::try_sum(amounts).is_err());
    }

    #[test]
    fn test_checked_sub_underflow() {
        assert!(Amount::new(1).checked_sub(Amount::new(2)).is_err());
    }
}
