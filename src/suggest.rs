//! Keyword completion for the filter input.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Host,
    Port,
    Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyword {
    pub keyword: &'static str,
    pub kind: KeywordKind,
    pub description: &'static str,
    /// Text that replaces the word being typed.
    pub template: &'static str,
    pub examples: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub keyword: &'static Keyword,
    /// The whole input with the last word completed.
    pub full_text: String,
}

pub const KEYWORDS: &[Keyword] = &[
    Keyword {
        keyword: "src",
        kind: KeywordKind::Host,
        description: "Source address",
        template: "src host ",
        examples: &["192.168.1.1", "10.0.0.1"],
    },
    Keyword {
        keyword: "dst",
        kind: KeywordKind::Host,
        description: "Destination address",
        template: "dst host ",
        examples: &["192.168.1.1", "10.0.0.1"],
    },
    Keyword {
        keyword: "host",
        kind: KeywordKind::Host,
        description: "Source or destination host",
        template: "host ",
        examples: &["192.168.1.1"],
    },
    Keyword {
        keyword: "port",
        kind: KeywordKind::Port,
        description: "Port number",
        template: "port ",
        examples: &["80", "443", "22"],
    },
    Keyword {
        keyword: "proto",
        kind: KeywordKind::Protocol,
        description: "Protocol",
        template: "proto ",
        examples: &["tcp", "udp", "icmp"],
    },
    Keyword {
        keyword: "tcp",
        kind: KeywordKind::Protocol,
        description: "TCP protocol",
        template: "tcp",
        examples: &[],
    },
    Keyword {
        keyword: "udp",
        kind: KeywordKind::Protocol,
        description: "UDP protocol",
        template: "udp",
        examples: &[],
    },
];

/// Completes the last space-separated word of `text` against [`KEYWORDS`].
/// A trailing space means there is nothing to complete.
pub fn suggest(text: &str) -> Vec<Suggestion> {
    let last = text.rsplit(' ').next().unwrap_or_default();
    if last.is_empty() {
        return Vec::new();
    }
    let needle = last.to_lowercase();
    let prefix = &text[..text.len() - last.len()];

    KEYWORDS
        .iter()
        .filter(|k| k.keyword.starts_with(&needle))
        .map(|k| Suggestion {
            keyword: k,
            full_text: format!(
                "{prefix}{}{}",
                k.template,
                k.examples.first().copied().unwrap_or_default()
            ),
        })
        .collect()
}
