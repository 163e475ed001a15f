use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line has no command")]
    MissingCommand,
}

/// Message source, `nick[!user][@host]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub name: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    fn parse(raw: &str) -> Prefix {
        let (main, host) = match raw.split_once('@') {
            Some((main, host)) => (main, Some(host.to_owned())),
            None => (raw, None),
        };
        let (name, user) = match main.split_once('!') {
            Some((name, user)) => (name, Some(user.to_owned())),
            None => (main, None),
        };
        Prefix {
            name: name.to_owned(),
            user,
            host,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

/// A single IRCv3 tagged message.
///
/// Tags keep their wire order (`IndexMap`), and `has_trailing` remembers
/// whether the final parameter was written with a `:` so that short trailings
/// like `:hi` survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub tags: IndexMap<String, String>,
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
    pub has_trailing: bool,
}

impl Message {
    /// Parse one CRLF-terminated line (the CRLF itself is optional).
    pub fn parse(line: &str) -> Result<Message, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut rest = line;
        let mut tags = IndexMap::new();
        if let Some(after) = rest.strip_prefix('@') {
            let (raw_tags, remainder) = split_token(after)?;
            for item in raw_tags.split(';') {
                match item.split_once('=') {
                    Some((key, value)) => tags.insert(key.to_owned(), unescape_tag_value(value)),
                    None => tags.insert(item.to_owned(), String::new()),
                };
            }
            rest = remainder;
        }

        let mut prefix = None;
        if let Some(after) = rest.strip_prefix(':') {
            let (raw_prefix, remainder) = split_token(after)?;
            prefix = Some(Prefix::parse(raw_prefix));
            rest = remainder;
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, rest)) => (command, rest),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        let mut has_trailing = false;
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                has_trailing = true;
                break;
            }
            match rest.split_once(' ') {
                Some((param, remainder)) => {
                    params.push(param.to_owned());
                    rest = remainder;
                }
                None => {
                    params.push(rest.to_owned());
                    break;
                }
            }
        }

        Ok(Message {
            tags,
            prefix,
            command: command.to_owned(),
            params,
            has_trailing,
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Set a tag value, keeping the tag's position if it already exists.
    pub fn set_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_owned(), value.to_owned());
    }

    /// The trailing parameter, i.e. the message body of PRIVMSG and friends.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_str("@")?;
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                f.write_str(key)?;
                if !value.is_empty() {
                    write!(f, "={}", escape_tag_value(value))?;
                }
            }
            f.write_str(" ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let as_trailing = i == last
                && (self.has_trailing
                    || param.contains(' ')
                    || param.starts_with(':')
                    || param.is_empty());
            if as_trailing {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

fn split_token(s: &str) -> Result<(&str, &str), ParseError> {
    // tags and prefixes must be followed by at least a command
    s.split_once(' ').ok_or(ParseError::MissingCommand)
}

fn unescape_tag_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            // unknown escape: keep the escaped character itself
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' => out.push_str("\\s"),
            ';' => out.push_str("\\:"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}
