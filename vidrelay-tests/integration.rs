//! Integration tests for vidrelay
//!
//! These tests run the real router, resolver, relay and forwarder against
//! mock upstream servers bound to ephemeral local ports.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/download_flow.rs"]
mod download_flow;
#[path = "integration/proxy_flow.rs"]
mod proxy_flow;
#[path = "integration/resolver_contract.rs"]
mod resolver_contract;
