use poise::serenity_prelude as serenity;

use crate::discord::{Context, Error};

const ADMIN_ROLES: &str = "admin_roles";

/// Checks whether the user is one of the bot admins.
pub async fn is_bot_admin(ctx: Context<'_>) -> Result<bool, Error> {
    if ctx.data().settings.core.is_bot_admin(ctx.author().id.get()) {
        Ok(true)
    } else {
        refuse(ctx, "checks.bot-admin").await
    }
}

/// Checks whether the user administrates the guild: administrator
/// permission, bot admin or one of the guild's admin roles. Always passes
/// in direct messages.
pub async fn is_admin(ctx: Context<'_>) -> Result<bool, Error> {
    let guild = match ctx.guild_id() {
        Some(guild) => guild.get(),
        None => return Ok(true),
    };
    if ctx.data().settings.core.is_bot_admin(ctx.author().id.get()) {
        return Ok(true);
    }

    let member = match ctx.author_member().await {
        Some(member) => member.into_owned(),
        None => return refuse(ctx, "checks.admin").await,
    };
    if permissions(ctx, &member).administrator() {
        return Ok(true);
    }

    let admin_roles = ctx
        .data()
        .guild_configs
        .lock()
        .await
        .get(guild)
        .await?
        .ids(ADMIN_ROLES)
        .unwrap_or_default();
    if has_any_role(&member.roles, &admin_roles) {
        Ok(true)
    } else {
        refuse(ctx, "checks.admin").await
    }
}

/// Checks whether the user can manage the guild.
pub async fn is_server_manager(ctx: Context<'_>) -> Result<bool, Error> {
    has_permission(ctx, serenity::Permissions::MANAGE_GUILD, "checks.server-manager").await
}

/// Checks whether the user can manage roles.
pub async fn is_roles_manager(ctx: Context<'_>) -> Result<bool, Error> {
    has_permission(ctx, serenity::Permissions::MANAGE_ROLES, "checks.roles-manager").await
}

async fn has_permission(
    ctx: Context<'_>,
    required: serenity::Permissions,
    refusal: &str,
) -> Result<bool, Error> {
    if ctx.guild_id().is_none() {
        return Ok(true);
    }
    let bot_admin = ctx.data().settings.core.is_bot_admin(ctx.author().id.get());
    let granted = match ctx.author_member().await {
        Some(member) => permissions(ctx, &member),
        None => serenity::Permissions::empty(),
    };
    if grants(bot_admin, granted, required) {
        Ok(true)
    } else {
        refuse(ctx, refusal).await
    }
}

/// Permissions of a member, as sent with an interaction or computed from the
/// cached guild.
fn permissions(ctx: Context<'_>, member: &serenity::Member) -> serenity::Permissions {
    if let Some(permissions) = member.permissions {
        return permissions;
    }
    ctx.guild()
        .map(|guild| guild.member_permissions(member))
        .unwrap_or_else(serenity::Permissions::empty)
}

/// Bot admins and guild administrators pass every permission check.
fn grants(bot_admin: bool, granted: serenity::Permissions, required: serenity::Permissions) -> bool {
    bot_admin || granted.administrator() || granted.contains(required)
}

fn has_any_role(member_roles: &[serenity::RoleId], roles: &[u64]) -> bool {
    member_roles.iter().any(|role| roles.contains(&role.get()))
}

async fn refuse(ctx: Context<'_>, key: &str) -> Result<bool, Error> {
    let reply = ctx.data().tr(ctx, key, &[]).await;
    ctx.say(reply).await?;
    Ok(false)
}
