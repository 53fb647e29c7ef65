use crate::context::Context;
use crate::output::{print_json, print_table};
use polld_core::orchestrator::CycleSummary;
use polld_core::PollSignal;

// ---------------------------------------------------------------------------
// poll
// ---------------------------------------------------------------------------

/// Run one cycle in-process and print what it did.
pub fn run(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let signal = rt.block_on(async {
        let poller = ctx.spawn_poller()?;
        let signal = poller.poll_and_wait().await?;
        let _ = poller.shutdown().await;
        Ok::<_, anyhow::Error>(signal)
    })?;

    let (outcome, summary) = match &signal {
        PollSignal::Done(s) => ("done", s),
        PollSignal::Cancelled(s) => ("cancelled", s),
    };

    if json {
        let mut value = serde_json::to_value(summary)?;
        value["outcome"] = serde_json::json!(outcome);
        print_json(&value)?;
    } else {
        print_summary(outcome, summary);
    }
    Ok(())
}

fn print_summary(outcome: &str, summary: &CycleSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!(
        "Cycle {} {outcome} in {}ms",
        summary.id,
        elapsed.num_milliseconds()
    );
    println!();
    let c = &summary.counters;
    let rows = [
        ("scanned", c.scanned),
        ("skipped", c.skipped),
        ("dispatched", c.dispatched),
        ("succeeded", c.succeeded),
        ("auth failures", c.auth_failures),
        ("errors", c.errors),
        ("pushed", c.pushed),
        ("push failures", c.push_failures),
    ]
    .into_iter()
    .map(|(k, v)| vec![k.to_string(), v.to_string()])
    .collect();
    print_table(&["COUNTER", "VALUE"], rows);
}
