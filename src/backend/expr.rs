//! tcpdump-style capture filter expressions.
//!
//! Supported: `ip`, `ip6`, `tcp`, `udp`, `icmp`, `icmp6`, `proto NAME`,
//! `[src|dst] host ADDR`, `[tcp|udp] [src|dst] port N`, combined with
//! `and`/`&&`, `or`/`||`, `not`/`!` and parentheses. Juxtaposed terms are an
//! implicit `and`. An empty expression matches everything.

use crate::packet::{IPAddress, IpVersion, Packet, Protocol};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Any,
    Version(IpVersion),
    Protocol(Protocol),
    Host(Direction, IPAddress),
    Port(Direction, Option<Protocol>, u16),
    Not(Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Src,
    Dst,
    Either,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid filter syntax at offset {offset}: {message}")]
pub struct FilterSyntaxError {
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    offset: usize,
}

type Parsed<'a> = Result<(FilterExpr, &'a [Token]), FilterSyntaxError>;

impl FilterExpr {
    pub fn parse(input: &str) -> Result<Self, FilterSyntaxError> {
        let tokens = tokenize(input);
        if tokens.is_empty() {
            return Ok(FilterExpr::Any);
        }
        let (expr, rest) = parse_or(&tokens, input.len())?;
        match rest.first() {
            None => Ok(expr),
            Some(token) => Err(syntax_error(token.offset, format!("unexpected '{}'", token.text))),
        }
    }

    pub fn matches(&self, packet: &Packet) -> bool {
        match self {
            FilterExpr::Any => true,
            FilterExpr::Version(version) => packet
                .network
                .as_ref()
                .is_some_and(|net| net.version == *version),
            FilterExpr::Protocol(protocol) => packet.protocol() == Some(*protocol),
            FilterExpr::Host(direction, addr) => packet
                .endpoints()
                .is_some_and(|(src, dst)| direction.matches(&src, &dst, addr)),
            FilterExpr::Port(direction, protocol, port) => {
                let Some(transport) = &packet.transport else {
                    return false;
                };
                if protocol.is_some_and(|p| p != transport.protocol()) {
                    return false;
                }
                transport
                    .ports()
                    .is_some_and(|(src, dst)| direction.matches(&src, &dst, port))
            }
            FilterExpr::Not(inner) => !inner.matches(packet),
            FilterExpr::And(a, b) => a.matches(packet) && b.matches(packet),
            FilterExpr::Or(a, b) => a.matches(packet) || b.matches(packet),
        }
    }
}

impl Direction {
    fn matches<T: PartialEq>(&self, src: &T, dst: &T, wanted: &T) -> bool {
        match self {
            Direction::Src => src == wanted,
            Direction::Dst => dst == wanted,
            Direction::Either => src == wanted || dst == wanted,
        }
    }
}

fn syntax_error(offset: usize, message: impl Into<String>) -> FilterSyntaxError {
    FilterSyntaxError {
        offset,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '(' || ch == ')' {
            tokens.push(Token {
                text: ch.to_string(),
                offset,
            });
            chars.next();
            continue;
        }
        if ch == '!' {
            tokens.push(Token {
                text: "!".to_string(),
                offset,
            });
            chars.next();
            continue;
        }
        let mut word = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '!' {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token { text: word, offset });
    }
    tokens
}

fn is_word(token: Option<&Token>, words: &[&str]) -> bool {
    token.is_some_and(|t| words.iter().any(|w| t.text.eq_ignore_ascii_case(w)))
}

fn parse_or(tokens: &[Token], end: usize) -> Parsed<'_> {
    let (mut left, mut rest) = parse_and(tokens, end)?;
    while is_word(rest.first(), &["or", "||"]) {
        let (right, r) = parse_and(&rest[1..], end)?;
        left = FilterExpr::Or(Box::new(left), Box::new(right));
        rest = r;
    }
    Ok((left, rest))
}

fn parse_and(tokens: &[Token], end: usize) -> Parsed<'_> {
    let (mut left, mut rest) = parse_not(tokens, end)?;
    loop {
        let next = if is_word(rest.first(), &["and", "&&"]) {
            &rest[1..]
        } else if rest.first().is_some() && !is_word(rest.first(), &["or", "||", ")"]) {
            rest
        } else {
            break;
        };
        let (right, r) = parse_not(next, end)?;
        left = FilterExpr::And(Box::new(left), Box::new(right));
        rest = r;
    }
    Ok((left, rest))
}

fn parse_not(tokens: &[Token], end: usize) -> Parsed<'_> {
    if is_word(tokens.first(), &["not", "!"]) {
        let (expr, rest) = parse_not(&tokens[1..], end)?;
        return Ok((FilterExpr::Not(Box::new(expr)), rest));
    }
    parse_atom(tokens, end)
}

fn parse_atom(tokens: &[Token], end: usize) -> Parsed<'_> {
    let Some(token) = tokens.first() else {
        return Err(syntax_error(end, "unexpected end of expression"));
    };

    if token.text == "(" {
        let (expr, rest) = parse_or(&tokens[1..], end)?;
        return match rest.first() {
            Some(close) if close.text == ")" => Ok((expr, &rest[1..])),
            Some(other) => Err(syntax_error(other.offset, format!("expected ')' but found '{}'", other.text))),
            None => Err(syntax_error(end, "missing ')'")),
        };
    }

    let word = token.text.to_ascii_lowercase();
    match word.as_str() {
        "ip" => Ok((FilterExpr::Version(IpVersion::V4), &tokens[1..])),
        "ip6" => Ok((FilterExpr::Version(IpVersion::V6), &tokens[1..])),
        "icmp" => Ok((FilterExpr::Protocol(Protocol::ICMP), &tokens[1..])),
        "icmp6" => Ok((FilterExpr::Protocol(Protocol::ICMPV6), &tokens[1..])),
        "tcp" | "udp" => {
            let protocol = if word == "tcp" { Protocol::TCP } else { Protocol::UDP };
            let rest = &tokens[1..];
            if is_word(rest.first(), &["port"])
                || (is_word(rest.first(), &["src", "dst"]) && is_word(rest.get(1), &["port"]))
            {
                parse_qualified(rest, Some(protocol), end)
            } else {
                Ok((FilterExpr::Protocol(protocol), rest))
            }
        }
        "proto" => {
            let Some(name) = tokens.get(1) else {
                return Err(syntax_error(end, "'proto' needs a protocol name"));
            };
            let expr = match name.text.to_ascii_lowercase().as_str() {
                "tcp" => FilterExpr::Protocol(Protocol::TCP),
                "udp" => FilterExpr::Protocol(Protocol::UDP),
                "icmp" => FilterExpr::Protocol(Protocol::ICMP),
                "icmp6" => FilterExpr::Protocol(Protocol::ICMPV6),
                other => {
                    return Err(syntax_error(name.offset, format!("unknown protocol '{other}'")));
                }
            };
            Ok((expr, &tokens[2..]))
        }
        "src" | "dst" | "host" | "port" => parse_qualified(tokens, None, end),
        _ => Err(syntax_error(token.offset, format!("unknown primitive '{}'", token.text))),
    }
}

/// `[src|dst] (host ADDR | port N | ADDR)`
fn parse_qualified(tokens: &[Token], protocol: Option<Protocol>, end: usize) -> Parsed<'_> {
    let (direction, rest) = match tokens.first() {
        Some(t) if t.text.eq_ignore_ascii_case("src") => (Direction::Src, &tokens[1..]),
        Some(t) if t.text.eq_ignore_ascii_case("dst") => (Direction::Dst, &tokens[1..]),
        _ => (Direction::Either, tokens),
    };

    let Some(kind) = rest.first() else {
        return Err(syntax_error(end, "expected 'host' or 'port'"));
    };

    if kind.text.eq_ignore_ascii_case("port") {
        let Some(value) = rest.get(1) else {
            return Err(syntax_error(end, "'port' needs a port number"));
        };
        let port = value
            .text
            .parse::<u16>()
            .map_err(|_| syntax_error(value.offset, format!("invalid port '{}'", value.text)))?;
        return Ok((FilterExpr::Port(direction, protocol, port), &rest[2..]));
    }

    let (value, rest) = if kind.text.eq_ignore_ascii_case("host") {
        match rest.get(1) {
            Some(value) => (value, &rest[2..]),
            None => return Err(syntax_error(end, "'host' needs an address")),
        }
    } else if direction != Direction::Either {
        // `src 10.0.0.1` is shorthand for `src host 10.0.0.1`
        (kind, &rest[1..])
    } else {
        return Err(syntax_error(kind.offset, format!("expected 'host' or 'port' but found '{}'", kind.text)));
    };

    let addr = value
        .text
        .parse::<IPAddress>()
        .map_err(|_| syntax_error(value.offset, format!("invalid address '{}'", value.text)))?;
    Ok((FilterExpr::Host(direction, addr), rest))
}
