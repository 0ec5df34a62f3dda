//! Mesh messages as seen by the Safety Guard
//!
//! A message is consumed once by the guard and never mutated. Transport
//! framing is handled by the bridge; only the text and its envelope reach here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::GuardError;

/// Which way a message travels relative to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from a peer (radio receive or relay forwarding)
    Inbound,
    /// About to be sent by this node
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl FromStr for Direction {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbound" | "in" | "rx" => Ok(Direction::Inbound),
            "outbound" | "out" | "tx" => Ok(Direction::Outbound),
            other => Err(GuardError::InvalidMessage(format!(
                "malformed direction '{}'",
                other
            ))),
        }
    }
}

/// Languages with dedicated pattern tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Spanish,
    English,
    Portuguese,
}

impl Language {
    /// Every supported language, in evaluation order
    pub const ALL: [Language; 3] = [Language::Spanish, Language::English, Language::Portuguese];

    /// ISO 639-1 tag
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Spanish => "es",
            Language::English => "en",
            Language::Portuguese => "pt",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "es" | "spanish" | "espanol" | "español" => Ok(Language::Spanish),
            "en" | "english" => Ok(Language::English),
            "pt" | "portuguese" | "portugues" | "português" => Ok(Language::Portuguese),
            other => Err(GuardError::InvalidMessage(format!(
                "unsupported language '{}'",
                other
            ))),
        }
    }
}

/// A message entering or leaving the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Mesh node identifier of the sender
    pub sender_id: String,
    /// Inbound or outbound
    pub direction: Direction,
    /// Raw message text
    pub text: String,
    /// Declared language, if the sender provided one
    pub language_hint: Option<Language>,
    /// When the message was received or queued for sending
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message builder
    pub fn builder(sender_id: &str, text: &str) -> MessageBuilder {
        MessageBuilder::new(sender_id, text)
    }

    /// Reject messages that must never enter the pipeline
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.sender_id.trim().is_empty() {
            return Err(GuardError::InvalidMessage("empty sender id".to_string()));
        }
        Ok(())
    }
}

/// Builder for messages
pub struct MessageBuilder {
    sender_id: String,
    text: String,
    direction: Direction,
    language_hint: Option<Language>,
    timestamp: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    pub fn new(sender_id: &str, text: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            direction: Direction::Inbound,
            language_hint: None,
            timestamp: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn outbound(self) -> Self {
        self.direction(Direction::Outbound)
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language_hint = Some(language);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> Result<Message, GuardError> {
        let message = Message {
            sender_id: self.sender_id,
            direction: self.direction,
            text: self.text,
            language_hint: self.language_hint,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        message.validate()?;
        Ok(message)
    }
}
