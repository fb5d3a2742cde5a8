use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;

/// Reserved identifier of the SYSTEM wallet.
pub const SYSTEM_WALLET: &str = "system";

/// `SmolStr` identifier for a wallet - an account holding balances in units.
///
/// Wallets live in a flat namespace owned by the ledger. The reserved
/// [`SYSTEM_WALLET`] represents the mint/sink for issuance and redemption and is the only
/// wallet exempt from per-unit balance bounds.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct WalletId(SmolStr);

impl WalletId {
    /// Construct a new [`Self`] from the provided `Into<SmolStr>`.
    pub fn new<S>(id: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(id.into())
    }

    /// Construct the reserved SYSTEM wallet identifier.
    pub fn system() -> Self {
        Self(SmolStr::new_static(SYSTEM_WALLET))
    }

    /// Return true if [`Self`] is the reserved SYSTEM wallet.
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_WALLET
    }

    /// Return the wallet `SmolStr` identifier of [`Self`].
    pub fn name(&self) -> &SmolStr {
        &self.0
    }
}

impl From<&str> for WalletId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SmolStr> for WalletId {
    fn from(value: SmolStr) -> Self {
        Self::new(value)
    }
}

impl From<String> for WalletId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for WalletId {
    fn borrow(&self) -> &str {
        self.0.borrow()
    }
}

impl AsRef<str> for WalletId {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}
