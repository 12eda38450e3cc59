use std::time::Duration;

use tracing::{debug, info};

use super::{MethodInvokerFilter, Rejection};
use crate::dispatcher::{RequestContext, Response};
use crate::resource::MethodDescriptor;

/// Logs every handler invocation with its status and latency.
pub struct TracingFilter;

impl MethodInvokerFilter for TracingFilter {
    fn before(&self, ctx: &RequestContext, method: &MethodDescriptor) -> Result<(), Rejection> {
        debug!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            handler = %method.name(),
            "invoking handler"
        );
        Ok(())
    }

    fn after(
        &self,
        ctx: &RequestContext,
        method: &MethodDescriptor,
        response: &mut Response,
        latency: Duration,
    ) -> Result<(), Rejection> {
        info!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            handler = %method.name(),
            status = response.status,
            latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
            "handler complete"
        );
        Ok(())
    }
}
