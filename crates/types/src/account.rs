use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of characters in an account name.
pub const ACCOUNT_NAME_MAX_LEN: usize = 12;

/// Errors that can occur when parsing an account name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountNameError {
    #[error("account name must not be empty")]
    Empty,
    #[error("account name must be at most {max} characters, got {actual}")]
    TooLong { max: usize, actual: usize },
    #[error("account name contains invalid character {0:?} (allowed: a-z, 1-5, '.')")]
    InvalidCharacter(char),
    #[error("account name must not end with '.'")]
    TrailingDot,
}

/// Ledger account identity.
///
/// The host ledger authenticates callers by account name; the registry only
/// ever compares names for equality. Names are 1 to 12 characters drawn from
/// `a-z`, `1-5` and `.`, and may not end in a dot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    /// Parse and validate an account name.
    pub fn new(name: impl Into<String>) -> Result<Self, AccountNameError> {
        let name = name.into();
        validate_account_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Check a candidate account name against the ledger naming rule.
pub fn validate_account_name(name: &str) -> Result<(), AccountNameError> {
    if name.is_empty() {
        return Err(AccountNameError::Empty);
    }

    let len = name.chars().count();
    if len > ACCOUNT_NAME_MAX_LEN {
        return Err(AccountNameError::TooLong {
            max: ACCOUNT_NAME_MAX_LEN,
            actual: len,
        });
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '1'..='5' | '.'))
    {
        return Err(AccountNameError::InvalidCharacter(bad));
    }

    if name.ends_with('.') {
        return Err(AccountNameError::TrailingDot);
    }

    Ok(())
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountName {
    type Err = AccountNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountName {
    type Error = AccountNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.0
    }
}
