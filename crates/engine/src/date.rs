//! HTTP `Date` header value management service.
//!
//! Formatting an HTTP date on every response is wasteful; [`DateService`] keeps the
//! formatted value in an [`ArcSwap`] and refreshes it from a background task.

use arc_swap::ArcSwapOption;
use http::HeaderValue;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

const UPDATE_INTERVAL: Duration = Duration::from_millis(800);

pub(crate) struct DateService {
    current: Arc<ArcSwapOption<HeaderValue>>,
    handle: Option<JoinHandle<()>>,
}

impl DateService {
    /// Starts the refresh task when called within a Tokio runtime. Without one the value is
    /// formatted on each access.
    pub(crate) fn new() -> Self {
        let current = Arc::new(ArcSwapOption::from(format_now().map(Arc::new)));

        let handle = tokio::runtime::Handle::try_current().ok().map(|runtime| {
            let current = Arc::clone(&current);
            runtime.spawn(async move {
                loop {
                    tokio::time::sleep(UPDATE_INTERVAL).await;
                    current.store(format_now().map(Arc::new));
                }
            })
        });

        Self { current, handle }
    }

    pub(crate) fn http_date(&self) -> Option<HeaderValue> {
        if self.handle.is_none() {
            return format_now();
        }
        self.current.load().as_deref().cloned()
    }
}

fn format_now() -> Option<HeaderValue> {
    HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())).ok()
}

/// Stops the refresh task with the service.
impl Drop for DateService {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DateService;

    #[tokio::test]
    async fn provides_parsable_date() {
        let service = DateService::new();
        let value = service.http_date().unwrap();
        assert!(httpdate::parse_http_date(value.to_str().unwrap()).is_ok());
    }

    #[test]
    fn works_without_runtime() {
        let service = DateService::new();
        assert!(service.http_date().is_some());
    }
}
