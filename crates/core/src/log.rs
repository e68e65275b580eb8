//! Warning routing and promotion.
//!
//! Spec §7 groups operator-visible warnings into seven categories (memory,
//! tensors, trans, esrs, cacheops, debug, other), each individually
//! promotable to a hard error via configuration. This module centralizes
//! that policy so call sites just call [`WarnSink::warn`] instead of
//! re-checking the promotion table themselves — the same shape as the
//! teacher's scattered `tracing::warn!` call sites, but made table-driven
//! the way spec §9 recommends for the ESR dispatch.

use crate::common::CoreError;
use crate::config::WarnPromotion;

/// Routes a warning to `tracing` or promotes it to a hard error, per configuration.
#[derive(Debug, Clone, Copy)]
pub struct WarnSink {
    promotion: WarnPromotion,
}

impl WarnSink {
    /// Builds a sink from the configured promotion table.
    pub fn new(promotion: WarnPromotion) -> Self {
        Self { promotion }
    }

    /// Emits a warning in the `memory` category (ESR/region access faults).
    pub fn memory(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.route("memory", self.promotion.memory, message)
    }

    /// Emits a warning in the `tensors` category (cacheop/tensor errors).
    pub fn tensors(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.route("tensors", self.promotion.tensors, message)
    }

    /// Emits a warning in the `trans` category (MMU translation failures).
    pub fn trans(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.route("trans", self.promotion.trans, message)
    }

    /// Emits a warning in the `esrs` category (ESR policing).
    pub fn esrs(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.route("esrs", self.promotion.esrs, message)
    }

    /// Emits a warning in the `cacheops` category (D-cache/SCP cacheops).
    pub fn cacheops(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.route("cacheops", self.promotion.cacheops, message)
    }

    /// Emits a warning in the `debug` category (debug module).
    pub fn debug(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.route("debug", self.promotion.debug, message)
    }

    /// Emits a warning in the `other` category.
    pub fn other(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.route("other", self.promotion.other, message)
    }

    fn route(
        &self,
        category: &'static str,
        hard: bool,
        message: impl Into<String>,
    ) -> Result<(), CoreError> {
        let message = message.into();
        if hard {
            Err(CoreError::Promoted { category, message })
        } else {
            tracing::warn!(category, "{message}");
            Ok(())
        }
    }
}
