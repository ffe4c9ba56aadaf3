//! Channel factory/registration helpers.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;

use super::{ChannelManager, DiscordChannel, TelegramChannel};

/// Register every enabled channel in `config` with the manager.
///
/// Channels enabled without a token are skipped with a warning.
/// Returns the number of registered channels.
pub fn register_configured_channels(manager: &ChannelManager, config: &Config) -> usize {
    let bus = manager.bus();

    // Discord
    if let Some(ref discord_config) = config.channels.discord {
        if discord_config.enabled {
            if discord_config.token.trim().is_empty() {
                warn!("Discord channel enabled but token is empty");
            } else {
                manager.register(Arc::new(DiscordChannel::new(
                    discord_config.clone(),
                    Arc::clone(&bus),
                )));
                info!("Registered Discord channel");
            }
        }
    }

    // Telegram
    if let Some(ref telegram_config) = config.channels.telegram {
        if telegram_config.enabled {
            if telegram_config.token.trim().is_empty() {
                warn!("Telegram channel enabled but token is empty");
            } else {
                match TelegramChannel::new(telegram_config.clone(), Arc::clone(&bus)) {
                    Ok(channel) => {
                        manager.register(Arc::new(channel));
                        info!("Registered Telegram channel");
                    }
                    Err(e) => error!("Failed to create Telegram channel: {}", e),
                }
            }
        }
    }

    manager.channel_count()
}
