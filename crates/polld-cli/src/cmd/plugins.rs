use crate::context::Context;
use crate::output::{print_json, print_table, yes_no};
use anyhow::Context as _;
use polld_core::PluginManifest;

// ---------------------------------------------------------------------------
// plugins
// ---------------------------------------------------------------------------

/// List manifest entries. Unlike a poll cycle, a broken manifest is reported
/// as an error here.
pub fn run(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let path = ctx.manifest_path()?;
    let manifest = if path.exists() {
        PluginManifest::try_load(&path).context("plugin manifest is unusable")?
    } else {
        PluginManifest::empty()
    };

    if json {
        let entries: Vec<_> = manifest
            .entries()
            .map(|e| {
                serde_json::json!({
                    "plugin": e.plugin_id,
                    "appId": e.app_id,
                    "exec": e.exec,
                    "args": e.args,
                    "profile": e.profile,
                    "needsAuthenticationData": e.needs_authentication_data,
                })
            })
            .collect();
        return print_json(&entries);
    }

    if manifest.is_empty() {
        println!("No plugins in {}.", path.display());
        return Ok(());
    }

    let rows = manifest
        .entries()
        .map(|e| {
            vec![
                e.plugin_id.clone(),
                e.app_id.clone(),
                e.exec.display().to_string(),
                e.profile.clone(),
                yes_no(e.needs_authentication_data),
            ]
        })
        .collect();
    print_table(&["PLUGIN", "APP ID", "EXEC", "PROFILE", "AUTH"], rows);
    Ok(())
}
