//! Channels listing command handler.

use clawgate::config::Config;

/// One configured platform as shown by `clawgate channels`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ChannelRow {
    pub name: &'static str,
    pub configured: bool,
    pub enabled: bool,
    pub has_token: bool,
    pub allowlist: usize,
}

impl std::fmt::Display for ChannelRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.configured {
            return write!(f, "  {:<10} not configured", self.name);
        }
        let state = if self.enabled { "enabled" } else { "disabled" };
        let token = if self.has_token { "token set" } else { "no token" };
        let access = if self.allowlist == 0 {
            "open to everyone".to_string()
        } else {
            format!("{} allowed sender(s)", self.allowlist)
        };
        write!(f, "  {:<10} {:<9} {:<9} {}", self.name, state, token, access)
    }
}

pub(crate) fn channel_rows(config: &Config) -> Vec<ChannelRow> {
    let discord = config.channels.discord.as_ref();
    let telegram = config.channels.telegram.as_ref();
    vec![
        ChannelRow {
            name: "discord",
            configured: discord.is_some(),
            enabled: discord.is_some_and(|c| c.enabled),
            has_token: discord.is_some_and(|c| !c.token.trim().is_empty()),
            allowlist: discord.map_or(0, |c| c.allow_from.len()),
        },
        ChannelRow {
            name: "telegram",
            configured: telegram.is_some(),
            enabled: telegram.is_some_and(|c| c.enabled),
            has_token: telegram.is_some_and(|c| !c.token.trim().is_empty()),
            allowlist: telegram.map_or(0, |c| c.allow_from.len()),
        },
    ]
}

/// List configured channels.
pub(crate) fn cmd_channels(config: &Config) {
    println!("Channels:");
    for row in channel_rows(config) {
        println!("{}", row);
    }
}
