//! User accounts: credential storage and token accounting
//!
//! One durable record per username holds both the password digest and the
//! token balance, so registration initializes both with a single write and
//! neither half can exist without the other. `CredentialStore` and
//! `TokenLedger` are thin facades over the shared `UserStore`; every
//! balance mutation runs as a conditional update inside one lock
//! acquisition, which is what makes `charge_one` race-free.
//!
//! Account flow:
//! 1. Client registers → Argon2 digest stored, balance set to the
//!    configured starting value
//! 2. Each successful classification → `TokenLedger::charge_one`
//! 3. Admin refill → `TokenLedger::credit`

pub mod credentials;
pub mod error;
pub mod ledger;
pub mod store;

pub use credentials::CredentialStore;
pub use error::{AuthError, LedgerError, StoreError};
pub use ledger::TokenLedger;
pub use store::{UserRecord, UserStore};
