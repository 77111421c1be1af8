//! Authorization and fire-and-forget execution of directives
//!
//! The dispatcher is the only path from an extracted directive to a side
//! effect. Every directive is checked against the capability table first;
//! authorized ones are handed to a [`ServiceCaller`] on a detached task so the
//! speech path never waits on the automation backend.

mod home_assistant;

pub use home_assistant::HomeAssistantClient;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::capabilities::Capabilities;
use crate::directive::Directive;
use crate::{Error, Result};

/// Backend capable of executing one directive
#[async_trait]
pub trait ServiceCaller: Send + Sync {
    /// Execute the directive's service call
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, timeout or a non-success status
    async fn call_service(&self, directive: &Directive) -> Result<()>;
}

/// Validates directives and launches their service calls
#[derive(Clone)]
pub struct Dispatcher {
    capabilities: Arc<Capabilities>,
    caller: Arc<dyn ServiceCaller>,
}

impl Dispatcher {
    /// Create a dispatcher over a capability table and backend
    #[must_use]
    pub fn new(capabilities: Arc<Capabilities>, caller: Arc<dyn ServiceCaller>) -> Self {
        Self {
            capabilities,
            caller,
        }
    }

    /// Check a directive against the capability table
    ///
    /// Rejections are logged as warnings.
    #[must_use]
    pub fn authorize(&self, directive: &Directive) -> bool {
        let allowed = self
            .capabilities
            .is_allowed(&directive.domain, &directive.service);

        if !allowed {
            tracing::warn!(
                domain = %directive.domain,
                service = %directive.service,
                target = ?directive.target,
                "service not allowed, directive rejected"
            );
        }

        allowed
    }

    /// Authorize and execute a directive, waiting for the result
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` for directives outside the capability
    /// table, otherwise whatever the backend call returns
    pub async fn dispatch(&self, directive: &Directive) -> Result<()> {
        if !self.authorize(directive) {
            return Err(Error::Unauthorized {
                domain: directive.domain.clone(),
                service: directive.service.clone(),
            });
        }

        self.caller.call_service(directive).await
    }

    /// Authorize a directive and run it on a detached task
    ///
    /// Returns `None` when the directive is rejected. Failures inside the
    /// task are logged and never propagated. Dropping the handle does not
    /// cancel the call.
    pub fn spawn(&self, directive: Directive) -> Option<JoinHandle<()>> {
        if !self.authorize(&directive) {
            return None;
        }

        tracing::info!(%directive, parameters = ?directive.parameters, "executing directive");

        let caller = Arc::clone(&self.caller);
        Some(tokio::spawn(async move {
            match caller.call_service(&directive).await {
                Ok(()) => tracing::info!(%directive, "service call succeeded"),
                Err(e) => tracing::error!(%directive, error = %e, "service call failed"),
            }
        }))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
