//! Builder for composing single-key [`Admitter`] layers (spec §4.I).
//!
//! # Middleware ordering convention
//!
//! Layers are stored outermost-first and applied in reverse during
//! [`AdmitterBuilder::build`], mirroring the onion composition used
//! throughout this codebase's middleware stacks:
//!
//! ```text
//! builder.layer(A).layer(B)
//! Storage: [B, A]            (outermost first: last added wins the outer spot)
//! Applied:  Terminal -> A -> B
//! Result:   B(A(Terminal))
//! ```
//!
//! This builder only composes genuinely single-key layers (currently just
//! [`crate::tenant::TenantGateMiddleware`]); the multi-key components
//! ([`crate::multi_level::MultiLevelLimiter`], [`crate::quota::MultiQuota`])
//! have their own bespoke APIs and are wired directly by
//! [`crate::admission::AdmissionMiddleware`] instead.

use std::sync::Arc;

use gateway_core::middleware::ValidationContext;
use gateway_core::{Admitter, AlwaysAdmit, GatewayError, MiddlewareDescriptor};
use gateway_types::{MiddlewareLayer, MiddlewareStack};

/// Composes single-key [`Admitter`] layers into one built chain.
pub struct AdmitterBuilder {
    /// Layers in outermost-first order.
    layers: Vec<MiddlewareDescriptor>,
}

impl Default for AdmitterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmitterBuilder {
    /// An empty builder; [`Self::build`] on this yields [`AlwaysAdmit`].
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a layer at the outermost position.
    #[must_use]
    pub fn layer<M: gateway_core::Middleware + 'static>(mut self, middleware: M) -> Self {
        self.layers.insert(0, MiddlewareDescriptor::new(middleware));
        self
    }

    /// Export the current stack for inspection/serialization.
    #[must_use]
    pub fn to_stack(&self) -> MiddlewareStack {
        let mut stack = MiddlewareStack::new();
        for desc in &self.layers {
            stack.push_inner(MiddlewareLayer::new(desc.name(), desc.middleware().config_json()));
        }
        stack
    }

    /// Validate every layer's position/dependency requirements.
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidMiddlewareStack` if any layer's
    /// [`gateway_core::Middleware::validate`] fails.
    pub fn validate(&self) -> Result<(), GatewayError> {
        for (idx, desc) in self.layers.iter().enumerate().rev() {
            let ctx = ValidationContext::new(&self.layers, idx);
            desc.middleware().validate(&ctx)?;
        }
        Ok(())
    }

    /// Validate and apply every layer, innermost to outermost, around the
    /// [`AlwaysAdmit`] terminal.
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidMiddlewareStack` per [`Self::validate`].
    pub fn build(self) -> Result<Arc<dyn Admitter>, GatewayError> {
        self.validate()?;
        let mut acc: Arc<dyn Admitter> = Arc::new(AlwaysAdmit);
        for desc in self.layers.into_iter().rev() {
            acc = desc.into_middleware().apply(acc);
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{TenantDirectory, TenantGateMiddleware};
    use async_trait::async_trait;
    use gateway_types::{Key, Level, PlanLevel, TenantRecord, TenantStatus};

    struct FixedDirectory(TenantRecord);

    #[async_trait]
    impl TenantDirectory for FixedDirectory {
        async fn lookup(&self, tenant_id: &str) -> Result<Option<TenantRecord>, GatewayError> {
            if tenant_id == self.0.id {
                Ok(Some(self.0.clone()))
            } else {
                Ok(None)
            }
        }
    }

    #[tokio::test]
    async fn empty_builder_always_admits() {
        let admitter = AdmitterBuilder::new().build().unwrap();
        admitter.admit(&Key::plain(Level::Global, "anyone")).await.unwrap();
    }

    #[tokio::test]
    async fn single_layer_stack_round_trips_to_stack() {
        let directory = Arc::new(FixedDirectory(TenantRecord {
            id: "acme".into(),
            plan: PlanLevel::Pro,
            status: TenantStatus::Active,
            trial_ends_at: None,
            subscription_ends_at: None,
        }));
        let builder = AdmitterBuilder::new().layer(TenantGateMiddleware::new(directory, None));
        let stack = builder.to_stack();
        assert_eq!(stack.layers.len(), 1);
        assert_eq!(stack.layers[0].name, "tenant_gate");

        let admitter = builder.build().unwrap();
        admitter.admit(&Key::plain(Level::Global, "acme")).await.unwrap();
    }
}
