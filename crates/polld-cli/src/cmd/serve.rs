use crate::context::Context;
use anyhow::Context as _;
use polld_core::{PollHandle, PolldError};
use std::time::Duration;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, port: Option<u16>, interval: Option<u64>) -> anyhow::Result<()> {
    let control = &ctx.config.control;
    let port = port.unwrap_or(control.port);
    let interval = match interval {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => ctx.config.poll_interval(),
    };

    for w in ctx.config.validate() {
        warn!(level = ?w.level, "{}", w.message);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let addr = format!("{}:{port}", control.bind);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind control API on {addr}"))?;
        let actual = listener.local_addr()?;

        let poller = ctx.spawn_poller()?;
        println!("account-polld control API → http://{actual}  (PID {})", std::process::id());

        let ticker = interval.map(|every| {
            info!(seconds = every.as_secs(), "periodic polling enabled");
            tokio::spawn(poll_every(poller.clone(), every))
        });

        let result = tokio::select! {
            res = polld_server::serve_on(poller.clone(), listener) => res,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                Ok(())
            }
        };

        if let Some(t) = ticker {
            t.abort();
        }
        let _ = poller.shutdown().await;
        result
    })
}

/// Request a poll on every tick. Requests overlapping a running cycle follow
/// the poller's queue rules like any other request.
async fn poll_every(poller: PollHandle, every: Duration) {
    let mut ticks = tokio::time::interval(every);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticks.tick().await;
        match poller.request_poll().await {
            Ok(accepted) => debug!(cycle = accepted.cycle(), "periodic poll requested"),
            Err(PolldError::OverlappingPollRequest) => {
                debug!("periodic poll skipped: previous cycles still pending")
            }
            Err(e) => {
                warn!(error = %e, "periodic polling stopped");
                return;
            }
        }
    }
}
