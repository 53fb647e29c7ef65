use polld_core::PollHandle;

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub poller: PollHandle,
}

impl AppState {
    pub fn new(poller: PollHandle) -> Self {
        Self { poller }
    }
}
