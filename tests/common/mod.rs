//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sage_gateway::config::HomeAssistantConfig;
use sage_gateway::{Capabilities, Directive, InterceptionNode, Result, ServiceCaller};
use secrecy::SecretString;
use tokio::sync::mpsc;

/// Test bearer token
pub const TEST_TOKEN: &str = "test-token";

/// Service caller that forwards every directive to a channel
pub struct RecordingCaller(mpsc::UnboundedSender<Directive>);

#[async_trait]
impl ServiceCaller for RecordingCaller {
    async fn call_service(&self, directive: &Directive) -> Result<()> {
        self.0.send(directive.clone()).ok();
        Ok(())
    }
}

/// Build a node with the built-in capability table and a recording backend
#[must_use]
pub fn recording_node() -> (Arc<InterceptionNode>, mpsc::UnboundedReceiver<Directive>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let node = InterceptionNode::new(
        Arc::new(Capabilities::builtin()),
        Arc::new(RecordingCaller(tx)),
    )
    .unwrap();
    (Arc::new(node), rx)
}

/// Backend config pointing at a mock server
#[must_use]
pub fn ha_config(url: &str, timeout: Duration) -> HomeAssistantConfig {
    HomeAssistantConfig {
        url: url.to_string(),
        token: SecretString::from(TEST_TOKEN.to_string()),
        timeout,
    }
}
