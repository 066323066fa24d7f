//! Broker channel names.
//!
//! A channel is carried on the wire as the payload of a frame. Names are
//! compared byte-for-byte; a name starting with [`QUEUE_PREFIX`] marks a
//! worker queue, where each message goes to exactly one subscriber instead
//! of all of them.
//!
//! # Example
//!
//! ```rust
//! use bowwire_core::Channel;
//!
//! let channel = Channel::new("/queue/redis_io_services").unwrap();
//! assert!(channel.is_queue());
//! assert_eq!(channel.as_bytes(), b"/queue/redis_io_services");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix that marks a channel as a worker queue.
pub const QUEUE_PREFIX: &str = "/queue";

/// Channel that publish-only peers subscribe to.
pub const NULL_CHANNEL: &str = "/null";

/// Longest accepted channel name, in bytes.
pub const MAX_CHANNEL_LEN: usize = 1024;

/// Errors produced when a channel name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The name is empty.
    #[error("channel name is empty")]
    Empty,

    /// The name is longer than [`MAX_CHANNEL_LEN`].
    #[error("channel name too long: {len} bytes (max: {max})")]
    TooLong { len: usize, max: usize },

    /// The name is not valid UTF-8.
    #[error("channel name is not valid UTF-8")]
    InvalidUtf8,

    /// The name contains whitespace or a control character.
    #[error("channel name contains invalid character {ch:?} at byte {index}")]
    InvalidChar { ch: char, index: usize },
}

/// A validated channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel(String);

impl Channel {
    /// Creates a channel from a name, validating it.
    pub fn new(name: impl Into<String>) -> Result<Self, ChannelError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Creates a channel from the raw payload of a frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChannelError> {
        let name = std::str::from_utf8(bytes).map_err(|_| ChannelError::InvalidUtf8)?;
        Self::new(name)
    }

    /// The channel used by peers that only publish.
    pub fn null() -> Self {
        Self(NULL_CHANNEL.to_string())
    }

    /// Returns true if this channel is a worker queue.
    pub fn is_queue(&self) -> bool {
        self.0.starts_with(QUEUE_PREFIX)
    }

    /// Returns true if this is the null channel.
    pub fn is_null(&self) -> bool {
        self.0 == NULL_CHANNEL
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

fn validate(name: &str) -> Result<(), ChannelError> {
    if name.is_empty() {
        return Err(ChannelError::Empty);
    }
    if name.len() > MAX_CHANNEL_LEN {
        return Err(ChannelError::TooLong {
            len: name.len(),
            max: MAX_CHANNEL_LEN,
        });
    }
    if let Some((index, ch)) = name
        .char_indices()
        .find(|(_, c)| c.is_whitespace() || c.is_control())
    {
        return Err(ChannelError::InvalidChar { ch, index });
    }
    Ok(())
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Channel {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl std::str::FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<[u8]> for Channel {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_channel_detected() {
        assert!(Channel::new("/queue/x").unwrap().is_queue());
        assert!(Channel::new("/queue").unwrap().is_queue());
        assert!(!Channel::new("saskan_concept").unwrap().is_queue());
        assert!(!Channel::new("/null").unwrap().is_queue());
    }

    #[test]
    fn null_channel() {
        let null = Channel::null();
        assert!(null.is_null());
        assert_eq!(null.as_str(), NULL_CHANNEL);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Channel::new(""), Err(ChannelError::Empty));
    }

    #[test]
    fn rejects_whitespace() {
        assert_eq!(
            Channel::new("/queue/a b"),
            Err(ChannelError::InvalidChar { ch: ' ', index: 8 })
        );
        assert!(matches!(
            Channel::new("chan\n"),
            Err(ChannelError::InvalidChar { ch: '\n', .. })
        ));
    }

    #[test]
    fn rejects_too_long() {
        let name = "x".repeat(MAX_CHANNEL_LEN + 1);
        assert!(matches!(
            Channel::new(name),
            Err(ChannelError::TooLong { .. })
        ));
    }

    #[test]
    fn from_bytes_rejects_invalid_utf8() {
        assert_eq!(
            Channel::from_bytes(&[0xff, 0xfe]),
            Err(ChannelError::InvalidUtf8)
        );
        assert_eq!(
            Channel::from_bytes(b"/queue/x").unwrap().as_str(),
            "/queue/x"
        );
    }

    #[test]
    fn serde_validates() {
        let channel: Channel = serde_json::from_str("\"/queue/x\"").unwrap();
        assert_eq!(channel.as_str(), "/queue/x");
        assert_eq!(serde_json::to_string(&channel).unwrap(), "\"/queue/x\"");

        let bad: Result<Channel, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn parse_and_display() {
        let channel: Channel = "/queue/redis_io".parse().unwrap();
        assert_eq!(channel.to_string(), "/queue/redis_io");
    }
}
