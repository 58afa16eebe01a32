use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::{audio::PlaybackNotice, ui::embeds};

/// Envía los avisos del núcleo al último canal de texto usado en cada guild.
///
/// Runs until the manager's notice channel closes.
pub async fn forward_notices(
    http: Arc<Http>,
    mut notices: broadcast::Receiver<PlaybackNotice>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
    idle_after: Duration,
) {
    info!("📣 Reenvío de avisos iniciado");

    loop {
        match notices.recv().await {
            Ok(notice) => {
                let guild_id = notice.guild_id();
                let Some(channel_id) = channels.get(&guild_id).map(|c| *c) else {
                    debug!("Aviso sin canal de texto conocido en guild {}", guild_id);
                    continue;
                };

                if let Err(e) = send_notice(&http, channel_id, &notice, idle_after).await {
                    error!("Error al enviar aviso en guild {}: {:?}", guild_id, e);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Se descartaron {} avisos atrasados", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    info!("📣 Reenvío de avisos terminado");
}

async fn send_notice(
    http: &Arc<Http>,
    channel_id: ChannelId,
    notice: &PlaybackNotice,
    idle_after: Duration,
) -> Result<()> {
    let embed = embeds::create_notice_embed(notice, idle_after);
    channel_id
        .send_message(http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}
