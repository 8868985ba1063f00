//! Aimchat is a terminal chat client for language models served behind
//! metered payment gateways (AIM nodes).
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation session and the protocol client: token
//!   acquisition against the payment gateway, stream channel negotiation,
//!   frame decoding, and the recovery paths between them.
//! - [`api`] defines the wire payloads (token envelope, stream frames,
//!   models/manifest responses) and the model catalog resolver.
//! - [`cli`] parses arguments and runs the interactive chat loop and the
//!   model listing command.
//! - [`utils`] holds URL construction and transcript logging helpers.
//!
//! Wallet signing is deliberately outside this crate: the session talks to
//! a [`core::gateway::PaymentGateway`] capability, and deployments with
//! real payment enforcement plug in their own implementation.

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
