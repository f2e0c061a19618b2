use poise::serenity_prelude as serenity;

use crate::discord::{Context, Error};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const EMBED_COLOUR: u32 = 0x2F3136;

/// Explains what this bot is about.
#[poise::command(slash_command, prefix_command)]
pub async fn about(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();

    let mut extensions = serenity::MessageBuilder::new();
    for ext in data.extensions.in_load_order().await {
        extensions.push_line(format!(
            "{} {} `v{}`",
            ext.icon(),
            ext.display_name(),
            ext.version()
        ));
    }
    let extensions = match extensions.build() {
        list if list.is_empty() => data.tr(ctx, "about.no-extensions", &[]).await,
        list => list,
    };

    let embed = serenity::CreateEmbed::new()
        .title(format!("Lantern Bot v{}", VERSION))
        .description(data.tr(ctx, "about.description", &[]).await)
        .field(data.tr(ctx, "about.extensions", &[]).await, extensions, false)
        .colour(EMBED_COLOUR)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Copyright © {} Lantern Contributors",
            chrono::Utc::now().format("%Y")
        )));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
