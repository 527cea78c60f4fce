//! Pump.fun Feed Types
//!
//! Wire types for the PumpPortal WebSocket feed and their conversion into
//! domain token events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TokenCreationEvent;

/// Maximum accepted payload size in bytes
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Length of a decoded Solana public key
const PUBKEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum FeedParseError {
    #[error("Empty message")]
    Empty,
    #[error("Message too large: {0} bytes")]
    TooLarge(usize),
    #[error("JSON parse error at line {line}, column {column}: {message}")]
    Json {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("Invalid mint address: {0}")]
    InvalidMint(String),
}

/// Token creation message as sent by the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTokenMessage {
    pub mint: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub bonding_curve_key: String,
    #[serde(default)]
    pub initial_buy: f64,
    #[serde(default)]
    pub market_cap_sol: f64,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub sol_amount: f64,
    #[serde(default)]
    pub trader_public_key: String,
    #[serde(default)]
    pub tx_type: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub v_sol_in_bonding_curve: f64,
    #[serde(default)]
    pub v_tokens_in_bonding_curve: f64,
}

impl NewTokenMessage {
    /// Validate the mint and stamp the observation time.
    pub fn into_event(
        self,
        observed_at: DateTime<Utc>,
    ) -> Result<TokenCreationEvent, FeedParseError> {
        validate_mint(&self.mint)?;

        Ok(TokenCreationEvent {
            mint: self.mint,
            name: self.name,
            symbol: self.symbol,
            bonding_curve_key: self.bonding_curve_key,
            v_sol_in_bonding_curve: self.v_sol_in_bonding_curve,
            v_tokens_in_bonding_curve: self.v_tokens_in_bonding_curve,
            initial_buy: self.initial_buy,
            market_cap_sol: self.market_cap_sol,
            sol_amount: self.sol_amount,
            signature: self.signature,
            trader_public_key: self.trader_public_key,
            tx_type: self.tx_type,
            uri: self.uri,
            created_at: observed_at,
        })
    }
}

/// WebSocket subscription message
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeMessage {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl SubscribeMessage {
    /// Subscribe to new token launches
    pub fn new_token() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Any message the feed may send
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    NewToken(NewTokenMessage),
    /// Subscription acknowledgement
    Confirmation { message: String },
    /// Server-side error
    Error {
        #[serde(alias = "error")]
        errors: serde_json::Value,
    },
}

/// Parse one raw text frame from the feed.
pub fn parse_feed_message(raw: &str) -> Result<FeedMessage, FeedParseError> {
    if raw.len() > MAX_MESSAGE_SIZE {
        return Err(FeedParseError::TooLarge(raw.len()));
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FeedParseError::Empty);
    }

    serde_json::from_str(trimmed).map_err(|e| FeedParseError::Json {
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })
}

fn validate_mint(mint: &str) -> Result<(), FeedParseError> {
    match bs58::decode(mint).into_vec() {
        Ok(bytes) if bytes.len() == PUBKEY_LEN => Ok(()),
        _ => Err(FeedParseError::InvalidMint(mint.to_string())),
    }
}
