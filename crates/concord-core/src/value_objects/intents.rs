//! Gateway intents bitfield
//!
//! Intents select which event groups the platform streams to a session.
//! They are sent as an integer in the IDENTIFY payload.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Gateway subscription flags
    ///
    /// Privileged intents must be enabled for the bot account on the
    /// platform side before they can be requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        /// Server create/update/delete and role/channel structure events
        const GUILDS                   = 1 << 0;
        /// Member join/update/leave events (privileged)
        const GUILD_MEMBERS            = 1 << 1;
        /// Ban and moderation events
        const GUILD_MODERATION         = 1 << 2;
        /// Custom emoji updates
        const GUILD_EMOJIS             = 1 << 3;
        /// Integration updates
        const GUILD_INTEGRATIONS       = 1 << 4;
        /// Webhook updates
        const GUILD_WEBHOOKS           = 1 << 5;
        /// Invite create/delete events
        const GUILD_INVITES            = 1 << 6;
        /// Voice state updates
        const GUILD_VOICE_STATES       = 1 << 7;
        /// Presence updates (privileged)
        const GUILD_PRESENCES          = 1 << 8;
        /// Messages sent in servers
        const GUILD_MESSAGES           = 1 << 9;
        /// Reactions on server messages
        const GUILD_MESSAGE_REACTIONS  = 1 << 10;
        /// Typing indicators in servers
        const GUILD_MESSAGE_TYPING     = 1 << 11;
        /// Direct messages
        const DIRECT_MESSAGES          = 1 << 12;
        /// Reactions on direct messages
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Typing indicators in direct messages
        const DIRECT_MESSAGE_TYPING    = 1 << 14;
        /// Message content in message payloads (privileged)
        const MESSAGE_CONTENT          = 1 << 15;
    }
}

impl Intents {
    /// All intents that do not require platform-side approval
    #[must_use]
    pub fn non_privileged() -> Self {
        Self::all() & !Self::privileged_set()
    }

    /// The set of privileged intents
    #[must_use]
    pub fn privileged_set() -> Self {
        Self::GUILD_MEMBERS | Self::GUILD_PRESENCES | Self::MESSAGE_CONTENT
    }

    /// Check whether this set contains any privileged intent
    #[must_use]
    pub fn contains_privileged(&self) -> bool {
        self.intersects(Self::privileged_set())
    }

    /// Parse from string representation (decimal number)
    pub fn parse(s: &str) -> Result<Self, std::num::ParseIntError> {
        s.parse::<u64>().map(Intents::from_bits_truncate)
    }
}

impl Default for Intents {
    fn default() -> Self {
        Intents::non_privileged()
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// Serialize as a plain integer; the IDENTIFY payload carries intents numerically
impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

// Deserialize from string or number
impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct IntentsVisitor;

        impl Visitor<'_> for IntentsVisitor {
            type Value = Intents;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing intent bits")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Intents, E>
            where
                E: de::Error,
            {
                Ok(Intents::from_bits_truncate(value as u64))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Intents, E>
            where
                E: de::Error,
            {
                Ok(Intents::from_bits_truncate(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Intents, E>
            where
                E: de::Error,
            {
                value
                    .parse::<u64>()
                    .map(Intents::from_bits_truncate)
                    .map_err(|_| de::Error::custom("invalid intents string"))
            }
        }

        deserializer.deserialize_any(IntentsVisitor)
    }
}

impl From<u64> for Intents {
    fn from(bits: u64) -> Self {
        Intents::from_bits_truncate(bits)
    }
}

impl From<Intents> for u64 {
    fn from(intents: Intents) -> Self {
        intents.bits()
    }
}
