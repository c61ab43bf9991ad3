use crate::handler::Handler;
use crate::pipeline::Pipeline;
use crate::request::RequestContext;
use crate::response::ResponseContext;
use crate::router::Rule;
use crate::router::matcher::MatchMode;
use crate::static_files::StaticFiles;
use tracing::trace;

pub(crate) type HandlerRule = Rule<Handler>;

/// First-match-wins handler lookup with static file fallback.
pub(crate) struct Dispatcher {
    handlers: Vec<HandlerRule>,
    statics: StaticFiles,
}

impl Dispatcher {
    pub(crate) fn new(handlers: Vec<HandlerRule>, statics: StaticFiles) -> Self {
        Self { handlers, statics }
    }

    /// Runs the first handler whose pattern strictly matches. The match is final, a failing
    /// handler is not followed by another candidate.
    pub(crate) async fn dispatch(&self, pipeline: &Pipeline, req: &mut RequestContext, resp: &mut ResponseContext) {
        let matched = self
            .handlers
            .iter()
            .find_map(|rule| rule.matches(req.path_and_query(), MatchMode::Handler).map(|params| (rule, params)));

        let Some((rule, params)) = matched else {
            trace!(path = %req.path(), "no handler, serving static");
            self.statics.serve(req, resp).await;
            return;
        };
        req.merge_params(params);

        match rule.handler() {
            Handler::Function(handler) => {
                if pipeline.prepare(rule.options(), req, resp).await {
                    pipeline.run_handler(handler.as_ref(), req, resp).await;
                }
            }
            Handler::Content(content) => resp.send(content.clone()),
            Handler::File(path) => self.statics.serve_path(path, req, resp).await,
        }
    }
}
