//! Parser for `iptables -S` rule dumps
//!
//! Each line is split on single spaces and walked by a two-state machine:
//! either waiting for a flag, or waiting for the value of a flag we care
//! about. Flags we don't know are skipped; their value token, if any, is
//! then seen as another unknown flag and skipped too.

use tracing::{debug, warn};

use crate::error::{FleetError, Result};
use crate::rule::{Rule, OWNERSHIP_COMMENT};

/// Fields recovered from one rule line. Missing fields stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRule {
    pub chain: String,
    pub protocol: String,
    pub source: String,
    pub dst_port: Option<u16>,
    pub comment: String,
    pub target: String,
}

impl ParsedRule {
    pub fn is_managed(&self) -> bool {
        self.comment == OWNERSHIP_COMMENT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Flag,
    Chain,
    Protocol,
    Source,
    DstPort,
    Comment,
    CommentTail,
    Target,
}

fn flag(token: &str) -> Expect {
    match token {
        "-A" | "--append" => Expect::Chain,
        "-p" | "--protocol" => Expect::Protocol,
        "-s" | "--source" => Expect::Source,
        "--dport" | "--destination-port" => Expect::DstPort,
        "--comment" => Expect::Comment,
        "-j" | "--jump" => Expect::Target,
        _ => Expect::Flag,
    }
}

/// Parse a single dump line.
///
/// Only a non-numeric destination port is an error. A quoted comment may
/// span several tokens; they are re-joined with single spaces and the quotes
/// are dropped once the closing quote is seen.
pub fn parse_line(line: &str) -> Result<ParsedRule> {
    let mut result = ParsedRule::default();
    let mut comment_parts: Vec<&str> = Vec::new();
    let mut state = Expect::Flag;

    for token in line.split(' ') {
        state = match state {
            Expect::Flag => flag(token),
            Expect::Chain => {
                result.chain = token.to_string();
                Expect::Flag
            }
            Expect::Protocol => {
                result.protocol = token.to_string();
                Expect::Flag
            }
            Expect::Source => {
                result.source = token.to_string();
                Expect::Flag
            }
            Expect::DstPort => {
                let port = token.parse::<u16>().map_err(|source| FleetError::PortParse {
                    line: line.to_string(),
                    token: token.to_string(),
                    source,
                })?;
                result.dst_port = Some(port);
                Expect::Flag
            }
            Expect::Comment => match token.strip_prefix('"') {
                Some(rest) if rest.ends_with('"') => {
                    result.comment = rest.trim_end_matches('"').to_string();
                    Expect::Flag
                }
                Some(_) => {
                    comment_parts.push(token);
                    Expect::CommentTail
                }
                None => {
                    result.comment = token.to_string();
                    Expect::Flag
                }
            },
            Expect::CommentTail => match token.strip_suffix('"') {
                Some(last) => {
                    comment_parts.push(last);
                    let joined = comment_parts.join(" ");
                    result.comment = joined.strip_prefix('"').unwrap_or(&joined).to_string();
                    comment_parts.clear();
                    Expect::Flag
                }
                None => {
                    comment_parts.push(token);
                    Expect::CommentTail
                }
            },
            Expect::Target => {
                result.target = token.to_string();
                Expect::Flag
            }
        };
    }

    // unterminated quote: keep the raw text, opening quote included
    if state == Expect::CommentTail {
        result.comment = comment_parts.join(" ");
    }
    result.comment = result.comment.trim().to_string();

    Ok(result)
}

/// Rules owned by this tool in a raw dump.
///
/// Lines without the ownership comment are dropped silently, however well
/// formed. Any malformed destination port fails the whole batch.
pub fn parse_managed<S: AsRef<str>>(raw_lines: &[S]) -> Result<Vec<Rule>> {
    let mut result = Vec::new();

    for raw in raw_lines {
        let raw = raw.as_ref().trim_end();
        let parsed = parse_line(raw)?;

        if !parsed.is_managed() {
            continue;
        }

        match (parsed.source.as_str(), parsed.dst_port) {
            ("", _) | (_, None) => {
                warn!("Ignoring managed rule without source or port: {raw}");
            }
            (source, Some(port)) => {
                debug!("Managed rule: port {port} from {source}");
                result.push(Rule::new(source, port));
            }
        }
    }

    Ok(result)
}
