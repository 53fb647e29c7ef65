use crate::context::Context;
use crate::output::{print_json, print_table, yes_no};
use polld_core::watcher::AccountWatcher;
use polld_core::PluginManifest;

// ---------------------------------------------------------------------------
// accounts
// ---------------------------------------------------------------------------

/// List the work items a poll cycle would see, with the plugin each one
/// resolves to.
pub fn run(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let registry = ctx.registry()?;
    let manifest = PluginManifest::load(&ctx.manifest_path()?);

    let rt = tokio::runtime::Runtime::new()?;
    let items = rt.block_on(AccountWatcher::new(registry).collect());

    if json {
        let values: Vec<_> = items
            .iter()
            .map(|d| {
                serde_json::json!({
                    "account": d.account_id,
                    "service": d.service_id,
                    "plugin": d.plugin_id,
                    "hasAuth": d.has_auth(),
                    "matched": manifest.lookup(&d.plugin_id).is_some(),
                })
            })
            .collect();
        return print_json(&values);
    }

    if items.is_empty() {
        println!("No enabled accounts.");
        return Ok(());
    }

    let rows = items
        .iter()
        .map(|d| {
            vec![
                d.account_id.to_string(),
                d.service_id.clone(),
                d.plugin_id.clone(),
                yes_no(d.has_auth()),
                yes_no(manifest.lookup(&d.plugin_id).is_some()),
            ]
        })
        .collect();
    print_table(&["ACCOUNT", "SERVICE", "PLUGIN", "AUTH", "MATCHED"], rows);
    Ok(())
}
