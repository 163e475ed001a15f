use serde::Deserialize;

const BTTV_CDN_URL: &str = "https://cdn.betterttv.net/emote";
const SEVENTV_CDN_URL: &str = "https://cdn.7tv.app/emote";

/// The three emote scales Twitch clients request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSize {
    Small,
    Medium,
    Large,
}

impl ImageSize {
    pub const ALL: [ImageSize; 3] = [ImageSize::Small, ImageSize::Medium, ImageSize::Large];

    /// Scale label used by the BTTV CDN (and by our cache file keys).
    pub fn bttv_label(self) -> &'static str {
        match self {
            ImageSize::Small => "1x",
            ImageSize::Medium => "2x",
            ImageSize::Large => "3x",
        }
    }

    /// Size key used by the FFZ and 7TV APIs.
    pub fn ffz_label(self) -> &'static str {
        match self {
            ImageSize::Small => "1",
            ImageSize::Medium => "2",
            ImageSize::Large => "4",
        }
    }

    /// Square pixel size of the rendered emote.
    pub fn pixels(self) -> u32 {
        match self {
            ImageSize::Small => 28,
            ImageSize::Medium => 56,
            ImageSize::Large => 112,
        }
    }

    /// Parse the scale segment of an emoticon CDN URL.
    pub fn from_cdn_label(label: &str) -> Option<ImageSize> {
        match label {
            "1.0" => Some(ImageSize::Small),
            "2.0" => Some(ImageSize::Medium),
            "3.0" => Some(ImageSize::Large),
            _ => None,
        }
    }

    /// Keys to try against a provider's size-indexed URL table, most
    /// preferred first.
    fn fallback_labels(self) -> [&'static str; 3] {
        match self {
            ImageSize::Small => ["1", "2", "4"],
            ImageSize::Medium => ["2", "1", "4"],
            ImageSize::Large => ["4", "2", "1"],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BttvEmote {
    pub id: String,
    pub code: String,
    #[serde(rename = "imageType")]
    pub image_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FfzUrls {
    #[serde(rename = "1")]
    pub one: Option<String>,
    #[serde(rename = "2")]
    pub two: Option<String>,
    #[serde(rename = "4")]
    pub four: Option<String>,
}

impl FfzUrls {
    fn get(&self, label: &str) -> Option<&str> {
        let url = match label {
            "1" => &self.one,
            "2" => &self.two,
            "4" => &self.four,
            _ => &None,
        };
        url.as_deref().filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FfzEmote {
    pub id: u64,
    pub name: String,
    pub urls: FfzUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SevenTvEmote {
    pub id: String,
    pub name: String,
    pub mime: String,
    /// `[label, url]` pairs, labels `"1"` through `"4"`.
    #[serde(default)]
    pub urls: Vec<(String, String)>,
}

impl SevenTvEmote {
    fn url_for_label(&self, label: &str) -> Option<&str> {
        self.urls
            .iter()
            .find(|(l, url)| l == label && !url.is_empty())
            .map(|(_, url)| url.as_str())
    }
}

/// A third-party emote from any provider.
///
/// One variant per provider; the accessors hide how each provider encodes
/// names, mime types, and CDN URLs.
#[derive(Debug, Clone)]
pub enum Emote {
    Bttv(BttvEmote),
    Ffz(FfzEmote),
    SevenTv(SevenTvEmote),
}

impl Emote {
    /// Single-letter provider code used in synthesized emote ids and cache keys.
    pub fn provider_code(&self) -> char {
        match self {
            Emote::Bttv(_) => 'b',
            Emote::Ffz(_) => 'f',
            Emote::SevenTv(_) => 's',
        }
    }

    /// Identifier within the provider's realm.
    pub fn id(&self) -> String {
        match self {
            Emote::Bttv(e) => e.id.clone(),
            Emote::Ffz(e) => e.id.to_string(),
            Emote::SevenTv(e) => e.id.clone(),
        }
    }

    /// The name people type into chat.
    pub fn name(&self) -> &str {
        match self {
            Emote::Bttv(e) => &e.code,
            Emote::Ffz(e) => &e.name,
            Emote::SevenTv(e) => &e.name,
        }
    }

    /// Normalized image type: `png`, `gif`, `webp`, ...
    pub fn image_type(&self) -> &str {
        match self {
            Emote::Bttv(e) => &e.image_type,
            // FFZ only serves stills
            Emote::Ffz(_) => "png",
            Emote::SevenTv(e) => e.mime.strip_prefix("image/").unwrap_or(&e.mime),
        }
    }

    pub fn is_gif(&self) -> bool {
        self.image_type() == "gif"
    }

    /// The upstream CDN URL for a size, applying each provider's fallback
    /// order when it doesn't serve every scale.
    pub fn url(&self, size: ImageSize) -> String {
        match self {
            Emote::Bttv(e) => format!("{BTTV_CDN_URL}/{}/{}", e.id, size.bttv_label()),
            Emote::Ffz(e) => {
                let picked = size
                    .fallback_labels()
                    .iter()
                    .find_map(|label| e.urls.get(label))
                    .unwrap_or_default();
                // FFZ URLs come without a scheme
                format!("https:{picked}")
            }
            Emote::SevenTv(e) => size
                .fallback_labels()
                .iter()
                .find_map(|label| e.url_for_label(label))
                .map(str::to_owned)
                .unwrap_or_else(|| {
                    format!("{SEVENTV_CDN_URL}/{}/{}x", e.id, size.fallback_labels()[0])
                }),
        }
    }
}
