//! Integration tests for sigx-bot.
//!
//! These tests drive the assembled application end to end:
//! - Queue lifecycle through workers
//! - Risk gate admission and the breaker
//! - Brokerage failure and crash recovery

pub mod common;
