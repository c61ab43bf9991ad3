//! Filter chain execution.
//!
//! The chain is positioned at a filter index. Running it from an index scans forward for the
//! first filter whose pattern matches the request; that filter's pipeline runs and the filter
//! is invoked with a [`Next`] positioned right after it. Nothing else happens automatically:
//! the chain only moves on when the filter runs `next`, so a filter halts the chain simply by
//! returning. Once no filter remains, the chain completes into handler dispatch.

use crate::dispatch::Dispatcher;
use crate::handler::FilterHandler;
use crate::pipeline::Pipeline;
use crate::request::RequestContext;
use crate::response::ResponseContext;
use crate::router::Rule;
use crate::router::matcher::MatchMode;
use futures::future::BoxFuture;
use std::sync::Arc;

pub(crate) type FilterRule = Rule<Arc<dyn FilterHandler>>;

pub(crate) struct FilterChain {
    filters: Vec<FilterRule>,
    pipeline: Pipeline,
    dispatcher: Dispatcher,
}

/// Continuation handle given to a filter.
///
/// Consumed by [`Next::run`], so a filter can continue the chain at most once.
pub struct Next<'a> {
    chain: &'a FilterChain,
    index: usize,
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish_non_exhaustive()
    }
}

impl Next<'_> {
    /// Continues with the remaining filters, then handler dispatch.
    pub async fn run(self, req: &mut RequestContext, resp: &mut ResponseContext) {
        self.chain.run(self.index, req, resp).await;
    }
}

impl FilterChain {
    pub(crate) fn new(filters: Vec<FilterRule>, pipeline: Pipeline, dispatcher: Dispatcher) -> Self {
        Self { filters, pipeline, dispatcher }
    }

    pub(crate) fn start<'a>(&'a self, req: &'a mut RequestContext, resp: &'a mut ResponseContext) -> BoxFuture<'a, ()> {
        self.run(0, req, resp)
    }

    fn run<'a>(&'a self, from: usize, req: &'a mut RequestContext, resp: &'a mut ResponseContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut index = from;
            while let Some(rule) = self.filters.get(index) {
                index += 1;
                let Some(params) = rule.matches(req.path_and_query(), MatchMode::Filter) else {
                    continue;
                };
                req.merge_params(params);

                if self.pipeline.prepare(rule.options(), req, resp).await {
                    let next = Next { chain: self, index };
                    self.pipeline.run_filter(rule.handler().as_ref(), req, resp, next).await;
                }
                return;
            }

            self.dispatcher.dispatch(&self.pipeline, req, resp).await;
        })
    }
}
