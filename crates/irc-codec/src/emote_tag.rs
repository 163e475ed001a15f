use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EmoteTagError {
    #[error("emote entry {0:?} has no index list")]
    MissingIndexes(String),
    #[error("malformed index pair {0:?}")]
    BadIndexPair(String),
}

/// The `emotes` message tag: emote id to character ranges over the message
/// body, e.g. `25:0-4,12-16/1902:6-10`.
///
/// Ranges are rune offsets, inclusive on both ends. Iteration order follows
/// insertion so an untouched tag serializes back to its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmoteTag {
    emotes: IndexMap<String, Vec<(usize, usize)>>,
}

impl EmoteTag {
    /// Parse a tag value. An empty value is an empty tag.
    pub fn parse(value: &str) -> Result<EmoteTag, EmoteTagError> {
        let mut emotes = IndexMap::new();
        if value.is_empty() {
            return Ok(EmoteTag { emotes });
        }
        for part in value.split('/') {
            let (id, raw_pairs) = part
                .split_once(':')
                .ok_or_else(|| EmoteTagError::MissingIndexes(part.to_owned()))?;
            let mut pairs = Vec::new();
            for raw in raw_pairs.split(',') {
                let pair = raw
                    .split_once('-')
                    .and_then(|(a, b)| Some((a.parse().ok()?, b.parse().ok()?)))
                    .ok_or_else(|| EmoteTagError::BadIndexPair(raw.to_owned()))?;
                pairs.push(pair);
            }
            emotes.insert(id.to_owned(), pairs);
        }
        Ok(EmoteTag { emotes })
    }

    /// Append a range for an emote id, creating the entry if needed.
    pub fn add(&mut self, emote_id: &str, range: (usize, usize)) {
        self.emotes.entry(emote_id.to_owned()).or_default().push(range);
    }

    pub fn is_empty(&self) -> bool {
        self.emotes.is_empty()
    }

    pub fn ranges(&self, emote_id: &str) -> Option<&[(usize, usize)]> {
        self.emotes.get(emote_id).map(Vec::as_slice)
    }
}

impl fmt::Display for EmoteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, pairs)) in self.emotes.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(id)?;
            f.write_str(":")?;
            for (j, (start, end)) in pairs.iter().enumerate() {
                if j > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}
