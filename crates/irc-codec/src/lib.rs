//! Codec for the Twitch chat dialect of IRCv3: tagged message lines and the
//! `emotes` tag value.
//!
//! Parsing is lossless: a well-formed line that is not mutated serializes back
//! to the exact input bytes, which is what lets the proxy forward unmodified
//! traffic untouched.

mod emote_tag;
mod message;

pub use emote_tag::{EmoteTag, EmoteTagError};
pub use message::{Message, ParseError, Prefix};
