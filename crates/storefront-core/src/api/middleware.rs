//! Ordered request middleware.
//!
//! Every request sent through [`ApiClient`](super::ApiClient) walks the
//! installed stages in install order before reaching the network. A stage
//! may adjust the request, inspect the response, or call `next` more than
//! once to replay the request.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use tracing::debug;

use super::ApiError;

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable identifier. A chain holds at most one stage per name.
    fn name(&self) -> &'static str;

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError>;
}

/// The remainder of the chain after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    client: &'a Client,
    stages: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(client: &'a Client, stages: &'a [Arc<dyn Middleware>]) -> Self {
        Self { client, stages }
    }

    pub async fn run(self, request: Request) -> Result<Response, ApiError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(
                        request,
                        Next {
                            client: self.client,
                            stages: rest,
                        },
                    )
                    .await
            }
            None => Ok(self.client.execute(request).await?),
        }
    }
}

/// Shared, append-only list of stages.
/// Clone is cheap and every clone sees the same stages.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Arc<RwLock<Vec<Arc<dyn Middleware>>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage unless one with the same name is already installed.
    /// Returns whether the stage was added.
    pub fn install(&self, stage: Arc<dyn Middleware>) -> bool {
        let mut stages = match self.stages.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if stages.iter().any(|s| s.name() == stage.name()) {
            debug!(stage = stage.name(), "Middleware already installed");
            return false;
        }
        debug!(stage = stage.name(), position = stages.len(), "Installing middleware");
        stages.push(stage);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().iter().any(|s| s.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.snapshot().iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current stages so no lock is held across a request
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        match self.stages.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Middleware for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError> {
            next.run(request).await
        }
    }

    #[test]
    fn test_install_is_idempotent_by_name() {
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());

        assert!(chain.install(Arc::new(Named("refresh"))));
        assert!(chain.install(Arc::new(Named("bearer"))));
        assert!(!chain.install(Arc::new(Named("refresh"))));
        assert!(!chain.install(Arc::new(Named("bearer"))));

        assert_eq!(chain.names(), vec!["refresh", "bearer"]);
        assert!(chain.contains("bearer"));
        assert!(!chain.contains("logging"));
    }

    #[test]
    fn test_clones_share_stages() {
        let chain = MiddlewareChain::new();
        let other = chain.clone();
        chain.install(Arc::new(Named("bearer")));
        assert_eq!(other.len(), 1);
    }
}
