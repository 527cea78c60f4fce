//! Jupiter Adapter
//!
//! Implementation of the QuoteProvider port for the Jupiter DEX aggregator.
//! Each price check asks for a quote to swap a small SOL amount into the
//! token and derives the SOL price per token from the route amounts.

mod client;
mod quote;

pub use client::{JupiterClient, JupiterConfig, DEFAULT_SLIPPAGE_BPS};
pub use quote::{QuoteRequest, QuoteResponse, RoutePlanStep, SwapInfo};
