//! Storage ports: durable token and crash records.
//!
//! Both records are loaded once at startup and written atomically on every
//! mutation. Nothing else the bridge knows about is persisted.

use std::future::Future;
use std::sync::Arc;

use capbridge_domain::crash::CrashWindow;
use capbridge_domain::error::BridgeError;
use capbridge_domain::token::TokenRecord;

/// Persistence for the single [`TokenRecord`].
pub trait TokenRepository: Send + Sync {
    /// Load the stored record, if any.
    fn load(&self) -> impl Future<Output = Result<Option<TokenRecord>, BridgeError>> + Send;

    /// Replace the stored record.
    fn save(&self, record: TokenRecord) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Remove the stored record.
    fn clear(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: TokenRepository> TokenRepository for Arc<T> {
    fn load(&self) -> impl Future<Output = Result<Option<TokenRecord>, BridgeError>> + Send {
        (**self).load()
    }

    fn save(&self, record: TokenRecord) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).save(record)
    }

    fn clear(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).clear()
    }
}

/// Persistence for the rolling [`CrashWindow`].
pub trait CrashRepository: Send + Sync {
    /// Load every stored entry, oldest first.
    fn load(&self) -> impl Future<Output = Result<CrashWindow, BridgeError>> + Send;

    /// Replace all stored entries with `window`.
    fn save(&self, window: CrashWindow) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: CrashRepository> CrashRepository for Arc<T> {
    fn load(&self) -> impl Future<Output = Result<CrashWindow, BridgeError>> + Send {
        (**self).load()
    }

    fn save(&self, window: CrashWindow) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).save(window)
    }
}
