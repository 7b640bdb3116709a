//! REST routes and their rate limit grouping
//!
//! Rate limits are scoped per route template and, where present, per major
//! parameter: the channel, server, or webhook id in the path. Minor
//! parameters such as message ids share one budget across all their values.

use concord_core::Snowflake;
use reqwest::Method;
use std::fmt;
use std::time::Duration;

/// A REST endpoint with its path parameters
///
/// The HTTP method is not part of the route; one route covers every verb
/// that applies to its path. Paths follow the platform's wire format, so
/// server-scoped endpoints live under `/guilds`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestRoute {
    /// `GET /gateway`
    Gateway,
    /// `GET /gateway/bot`
    GatewayBot,
    /// `/channels/{channel_id}`
    Channel { channel_id: Snowflake },
    /// `/channels/{channel_id}/messages`
    ChannelMessages { channel_id: Snowflake },
    /// `/channels/{channel_id}/messages/{message_id}`
    ChannelMessage {
        channel_id: Snowflake,
        message_id: Snowflake,
    },
    /// `POST /channels/{channel_id}/messages/bulk-delete`
    MessagesBulkDelete { channel_id: Snowflake },
    /// `POST /channels/{channel_id}/typing`
    ChannelTyping { channel_id: Snowflake },
    /// `/channels/{channel_id}/pins`
    ChannelPins { channel_id: Snowflake },
    /// `/channels/{channel_id}/invites`
    ChannelInvites { channel_id: Snowflake },
    /// `/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me`
    ///
    /// The emoji must already be percent-encoded.
    OwnReaction {
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: String,
    },
    /// `/guilds/{server_id}`
    Server { server_id: Snowflake },
    /// `/guilds/{server_id}/channels`
    ServerChannels { server_id: Snowflake },
    /// `/guilds/{server_id}/members/{user_id}`
    ServerMember {
        server_id: Snowflake,
        user_id: Snowflake,
    },
    /// `/guilds/{server_id}/roles`
    ServerRoles { server_id: Snowflake },
    /// `/guilds/{server_id}/bans`
    ServerBans { server_id: Snowflake },
    /// `GET /users/{user_id}`
    User { user_id: Snowflake },
    /// `/users/@me`
    CurrentUser,
    /// `POST /users/@me/channels`
    CurrentUserChannels,
    /// `/invites/{code}`
    Invite { code: String },
    /// `/webhooks/{webhook_id}`
    Webhook { webhook_id: Snowflake },
}

impl RestRoute {
    /// Concrete path with parameters substituted, without the API base
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Gateway => "/gateway".to_string(),
            Self::GatewayBot => "/gateway/bot".to_string(),
            Self::Channel { channel_id } => format!("/channels/{channel_id}"),
            Self::ChannelMessages { channel_id } => {
                format!("/channels/{channel_id}/messages")
            }
            Self::ChannelMessage {
                channel_id,
                message_id,
            } => format!("/channels/{channel_id}/messages/{message_id}"),
            Self::MessagesBulkDelete { channel_id } => {
                format!("/channels/{channel_id}/messages/bulk-delete")
            }
            Self::ChannelTyping { channel_id } => format!("/channels/{channel_id}/typing"),
            Self::ChannelPins { channel_id } => format!("/channels/{channel_id}/pins"),
            Self::ChannelInvites { channel_id } => format!("/channels/{channel_id}/invites"),
            Self::OwnReaction {
                channel_id,
                message_id,
                emoji,
            } => format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"),
            Self::Server { server_id } => format!("/guilds/{server_id}"),
            Self::ServerChannels { server_id } => format!("/guilds/{server_id}/channels"),
            Self::ServerMember { server_id, user_id } => {
                format!("/guilds/{server_id}/members/{user_id}")
            }
            Self::ServerRoles { server_id } => format!("/guilds/{server_id}/roles"),
            Self::ServerBans { server_id } => format!("/guilds/{server_id}/bans"),
            Self::User { user_id } => format!("/users/{user_id}"),
            Self::CurrentUser => "/users/@me".to_string(),
            Self::CurrentUserChannels => "/users/@me/channels".to_string(),
            Self::Invite { code } => format!("/invites/{code}"),
            Self::Webhook { webhook_id } => format!("/webhooks/{webhook_id}"),
        }
    }

    /// Path template with placeholder names, used for rate limit grouping
    #[must_use]
    pub fn template(&self) -> &'static str {
        match self {
            Self::Gateway => "/gateway",
            Self::GatewayBot => "/gateway/bot",
            Self::Channel { .. } => "/channels/{channel_id}",
            Self::ChannelMessages { .. } => "/channels/{channel_id}/messages",
            Self::ChannelMessage { .. } => "/channels/{channel_id}/messages/{message_id}",
            Self::MessagesBulkDelete { .. } => "/channels/{channel_id}/messages/bulk-delete",
            Self::ChannelTyping { .. } => "/channels/{channel_id}/typing",
            Self::ChannelPins { .. } => "/channels/{channel_id}/pins",
            Self::ChannelInvites { .. } => "/channels/{channel_id}/invites",
            Self::OwnReaction { .. } => {
                "/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"
            }
            Self::Server { .. } => "/guilds/{server_id}",
            Self::ServerChannels { .. } => "/guilds/{server_id}/channels",
            Self::ServerMember { .. } => "/guilds/{server_id}/members/{user_id}",
            Self::ServerRoles { .. } => "/guilds/{server_id}/roles",
            Self::ServerBans { .. } => "/guilds/{server_id}/bans",
            Self::User { .. } => "/users/{user_id}",
            Self::CurrentUser => "/users/@me",
            Self::CurrentUserChannels => "/users/@me/channels",
            Self::Invite { .. } => "/invites/{code}",
            Self::Webhook { .. } => "/webhooks/{webhook_id}",
        }
    }

    /// The id whose value partitions this route's rate limit, if any
    #[must_use]
    pub fn major_parameter(&self) -> Option<Snowflake> {
        match self {
            Self::Channel { channel_id }
            | Self::ChannelMessages { channel_id }
            | Self::ChannelMessage { channel_id, .. }
            | Self::MessagesBulkDelete { channel_id }
            | Self::ChannelTyping { channel_id }
            | Self::ChannelPins { channel_id }
            | Self::ChannelInvites { channel_id }
            | Self::OwnReaction { channel_id, .. } => Some(*channel_id),
            Self::Server { server_id }
            | Self::ServerChannels { server_id }
            | Self::ServerMember { server_id, .. }
            | Self::ServerRoles { server_id }
            | Self::ServerBans { server_id } => Some(*server_id),
            Self::Webhook { webhook_id } => Some(*webhook_id),
            Self::Gateway
            | Self::GatewayBot
            | Self::User { .. }
            | Self::CurrentUser
            | Self::CurrentUserChannels
            | Self::Invite { .. } => None,
        }
    }

    /// Fixed pacing interval for routes whose responses carry no usable
    /// rate limit headers
    ///
    /// Reaction endpoints are the known case; the server enforces roughly
    /// one change per 250ms without advertising it.
    #[must_use]
    pub fn ratelimit_override(&self) -> Option<Duration> {
        match self {
            Self::OwnReaction { .. } => Some(Duration::from_millis(250)),
            _ => None,
        }
    }
}

impl fmt::Display for RestRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Rate limit queue key: method, route template, major parameter value
///
/// Two requests share a waiting queue exactly when their keys are equal.
/// The server may later reveal that several keys map to one bucket; the
/// limiter merges them when that happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: Method,
    pub template: &'static str,
    pub major: Option<Snowflake>,
}

impl RouteKey {
    #[must_use]
    pub fn new(method: Method, route: &RestRoute) -> Self {
        Self {
            method,
            template: route.template(),
            major: route.major_parameter(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.major {
            Some(major) => write!(f, "{} {} (major {})", self.method, self.template, major),
            None => write!(f, "{} {}", self.method, self.template),
        }
    }
}
