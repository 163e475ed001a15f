//! Third-party emote catalogs.
//!
//! Fetches BetterTTV, FrankerFaceZ, and 7TV emotes and indexes them per
//! channel so chat words can be resolved to emote images.

mod bttv;
mod ffz;
mod http;
mod provider;
mod seventv;
mod store;
mod types;

pub use bttv::BttvProvider;
pub use ffz::FfzProvider;
pub use http::ProviderError;
pub use provider::{default_providers, Provider};
pub use seventv::SevenTvProvider;
pub use store::{EmoteStore, StoreError};
pub use types::{BttvEmote, Emote, FfzEmote, FfzUrls, ImageSize, SevenTvEmote};
