use poise::serenity_prelude as serenity;
use std::sync::Arc;

use crate::{
    discord::{Context, Data, Error},
    extensions::{Descriptor, ExtensionError, LoadContext},
};

/// Shutdown the bot.
#[poise::command(slash_command, prefix_command, check = "crate::checks::is_bot_admin")]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    log::info!("Shutdown requested by '{}'", ctx.author().tag());
    let reply = ctx.data().tr(ctx, "shutdown.bye", &[]).await;
    ctx.say(reply).await?;

    ctx.serenity_context()
        .set_presence(None, serenity::OnlineStatus::Offline);
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}

/// Manage the loaded extensions.
#[poise::command(
    slash_command,
    prefix_command,
    check = "crate::checks::is_bot_admin",
    subcommands("list", "load", "unload")
)]
pub async fn extension(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// List loaded and available extensions.
#[poise::command(slash_command, prefix_command, check = "crate::checks::is_bot_admin")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let loaded = data.extensions.loaded().await;
    let available = unloaded(&data.descriptors, &loaded);

    let mut response = serenity::MessageBuilder::new();
    response.push_bold_line(data.tr(ctx, "extensions.loaded-title", &[]).await);
    for name in &loaded {
        response.push_line(data.extensions.display_name_with_icon(name).await);
    }
    if loaded.is_empty() {
        response.push_italic_line(data.tr(ctx, "extensions.none", &[]).await);
    }

    response.push_bold_line(data.tr(ctx, "extensions.available-title", &[]).await);
    for descriptor in &available {
        response.push_line(format!("{} ({})", descriptor.name, descriptor.kind));
    }
    if available.is_empty() {
        response.push_italic_line(data.tr(ctx, "extensions.none", &[]).await);
    }

    let failed = data.extensions.failed().await;
    if !failed.is_empty() {
        response.push_bold_line(data.tr(ctx, "extensions.failed-title", &[]).await);
        for name in &failed {
            response.push_line(name);
        }
    }

    ctx.say(response.build()).await?;
    Ok(())
}

/// Load an extension.
#[poise::command(slash_command, prefix_command, check = "crate::checks::is_bot_admin")]
pub async fn load(
    ctx: Context<'_>,
    #[description = "name of the extension"] name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let load_ctx = data.load_context(
        Arc::clone(&ctx.serenity_context().http),
        ctx.framework().shard_manager(),
    );
    let result = load_extension(data, &name, &load_ctx).await;
    let reply = outcome(ctx, data, &name, result, "extensions.loaded").await;
    ctx.say(reply).await?;
    Ok(())
}

/// Unload an extension.
#[poise::command(slash_command, prefix_command, check = "crate::checks::is_bot_admin")]
pub async fn unload(
    ctx: Context<'_>,
    #[description = "name of the extension"] name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let display = data.extensions.display_name_with_icon(&name).await;
    let result = data.extensions.remove(&name).await;
    let reply = outcome(ctx, data, &display, result, "extensions.unloaded").await;
    ctx.say(reply).await?;
    Ok(())
}

/// Descriptors of the extensions that are not loaded.
fn unloaded<'a>(descriptors: &'a [Descriptor], loaded: &[String]) -> Vec<&'a Descriptor> {
    descriptors
        .iter()
        .filter(|descriptor| !loaded.contains(&descriptor.name))
        .collect()
}

async fn load_extension(
    data: &Data,
    name: &str,
    load_ctx: &LoadContext,
) -> Result<(), Option<ExtensionError>> {
    let descriptor = data
        .descriptors
        .iter()
        .find(|descriptor| descriptor.name == name)
        .ok_or(None)?;
    let ext = data
        .catalog
        .get(descriptor.kind, &descriptor.name)
        .ok_or_else(|| {
            Some(ExtensionError::Unknown {
                kind: descriptor.kind,
                name: descriptor.name.clone(),
            })
        })?;
    data.extensions
        .add(ext, load_ctx)
        .await
        .map_err(Some)
}

/// Reply to a load or unload. `Err(None)` means no such extension exists.
async fn outcome<E: Into<Option<ExtensionError>>>(
    ctx: Context<'_>,
    data: &Data,
    name: &str,
    result: Result<(), E>,
    success: &str,
) -> String {
    let extension = ("extension", name.to_string());
    let result: Result<(), Option<ExtensionError>> = result.map_err(Into::into);
    match result {
        Ok(()) => data.tr(ctx, success, &[extension]).await,
        Err(None) => data.tr(ctx, "extensions.not-found", &[extension]).await,
        Err(Some(ExtensionError::AlreadyLoaded(_))) => {
            data.tr(ctx, "extensions.already-loaded", &[extension]).await
        }
        Err(Some(ExtensionError::NotLoaded(_))) => {
            data.tr(ctx, "extensions.not-loaded", &[extension]).await
        }
        Err(Some(e)) => {
            log::error!("{}", e);
            data.tr(
                ctx,
                "extensions.failed",
                &[extension, ("error", e.to_string())],
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ExtensionKind;
    use std::path::PathBuf;

    fn descriptor(kind: ExtensionKind, name: &str) -> Descriptor {
        Descriptor {
            kind,
            name: name.to_string(),
            path: PathBuf::from(kind.section()).join(name),
        }
    }

    #[test]
    fn lists_what_is_left_to_load() {
        let descriptors = vec![
            descriptor(ExtensionKind::Builtin, "language"),
            descriptor(ExtensionKind::Builtin, "server_config"),
            descriptor(ExtensionKind::Plugin, "modlogs"),
        ];
        let loaded = vec!["server_config".to_string()];

        let names: Vec<_> = unloaded(&descriptors, &loaded)
            .into_iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["language", "modlogs"]);
    }
}
