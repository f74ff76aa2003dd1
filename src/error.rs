use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{OpportunityStatus, TradingPair, VenueId};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Domain invariant violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid trading pair '{input}': {reason}")]
    InvalidPair { input: String, reason: &'static str },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: OpportunityStatus,
        to: OpportunityStatus,
    },
}

/// Errors raised by exchange clients and the venue factory.
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("venue {venue} is not connected")]
    NotConnected { venue: VenueId },

    #[error("connection to {venue} failed: {reason}")]
    Connection { venue: VenueId, reason: String },

    #[error("venue {venue} does not support streaming order books")]
    StreamingUnsupported { venue: VenueId },

    #[error("unsupported venue kind '{kind}' for {venue}")]
    UnsupportedVenue { venue: VenueId, kind: String },

    #[error("no client registered for venue {0}")]
    UnknownVenue(VenueId),

    #[error("no order book for {pair} on {venue}")]
    NoBook { venue: VenueId, pair: TradingPair },

    #[error("order rejected by {venue}: {reason}")]
    OrderRejected { venue: VenueId, reason: String },
}

/// Paper ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: {currency} on {venue} requires {required}, available {available}")]
    InsufficientBalance {
        venue: VenueId,
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("invalid order: {0}")]
    InvalidOrder(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
