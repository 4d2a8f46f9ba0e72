//! Format-preserving hosts file grammar.
//!
//! Every physical line becomes a [`LineRecord`]: blank, comment, or an
//! address-to-hostnames mapping. Lines keep their original text and line
//! terminator so that `serialize(&parse(text)?) == text` for any accepted
//! input. A mapping only re-renders from its fields once it has been edited.

use std::net::IpAddr;

use crate::domain::parse_ip;
use crate::error::{HostsError, Result};

/// Terminator that followed a line in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    /// Last line of a file with no trailing newline
    None,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::None => "",
        }
    }
}

/// One `ip hostname...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    address: String,
    ip: IpAddr,
    hostnames: Vec<String>,
    comment: Option<String>,
    /// Original text, dropped once the entry is edited.
    raw: Option<String>,
}

impl MappingEntry {
    /// New entry rendered as `ip<TAB>hostname`.
    pub fn new(ip: IpAddr, hostname: impl Into<String>) -> Self {
        Self {
            address: ip.to_string(),
            ip,
            hostnames: vec![hostname.into()],
            comment: None,
            raw: None,
        }
    }

    /// Address token as written (may carry an IPv6 zone suffix).
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    /// Trailing comment including its leading `#`.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Whether this line maps `hostname` to `ip`. A trailing root dot and
    /// ASCII case are ignored.
    pub fn contains(&self, ip: &IpAddr, hostname: &str) -> bool {
        self.ip == *ip && self.hostnames.iter().any(|h| same_host(h, hostname))
    }

    /// Remove `hostname`; returns false when it was not on this line.
    pub fn remove_hostname(&mut self, hostname: &str) -> bool {
        let Some(pos) = self.hostnames.iter().position(|h| same_host(h, hostname)) else {
            return false;
        };
        self.hostnames.remove(pos);
        self.raw = None;
        true
    }

    fn write_to(&self, out: &mut String) {
        if let Some(raw) = &self.raw {
            out.push_str(raw);
            return;
        }
        out.push_str(&self.address);
        out.push('\t');
        out.push_str(&self.hostnames.join(" "));
        if let Some(comment) = &self.comment {
            out.push(' ');
            out.push_str(comment);
        }
    }
}

/// A single physical line of a hosts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRecord {
    /// Empty or whitespace-only line
    Blank { text: String, ending: LineEnding },
    /// Line whose first non-whitespace character is `#`
    Comment { text: String, ending: LineEnding },
    Mapping {
        entry: MappingEntry,
        ending: LineEnding,
    },
}

impl LineRecord {
    pub fn ending(&self) -> LineEnding {
        match self {
            LineRecord::Blank { ending, .. }
            | LineRecord::Comment { ending, .. }
            | LineRecord::Mapping { ending, .. } => *ending,
        }
    }

    pub fn set_ending(&mut self, new: LineEnding) {
        match self {
            LineRecord::Blank { ending, .. }
            | LineRecord::Comment { ending, .. }
            | LineRecord::Mapping { ending, .. } => *ending = new,
        }
    }

    pub fn as_mapping(&self) -> Option<&MappingEntry> {
        match self {
            LineRecord::Mapping { entry, .. } => Some(entry),
            _ => None,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            LineRecord::Blank { text, .. } | LineRecord::Comment { text, .. } => {
                out.push_str(text)
            }
            LineRecord::Mapping { entry, .. } => entry.write_to(out),
        }
        out.push_str(self.ending().as_str());
    }
}

fn same_host(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Parse hosts file text into line records.
pub fn parse(text: &str) -> Result<Vec<LineRecord>> {
    let mut records = Vec::new();
    for (idx, chunk) in text.split_inclusive('\n').enumerate() {
        let (body, ending) = if let Some(body) = chunk.strip_suffix("\r\n") {
            (body, LineEnding::CrLf)
        } else if let Some(body) = chunk.strip_suffix('\n') {
            (body, LineEnding::Lf)
        } else {
            (chunk, LineEnding::None)
        };
        records.push(parse_line(idx + 1, body, ending)?);
    }
    Ok(records)
}

fn parse_line(line_no: usize, body: &str, ending: LineEnding) -> Result<LineRecord> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(LineRecord::Blank {
            text: body.to_string(),
            ending,
        });
    }
    if trimmed.starts_with('#') {
        return Ok(LineRecord::Comment {
            text: body.to_string(),
            ending,
        });
    }

    let (fields, comment) = match trimmed.find('#') {
        Some(pos) => (&trimmed[..pos], Some(trimmed[pos..].to_string())),
        None => (trimmed, None),
    };
    let mut tokens = fields.split_whitespace();
    // Non-empty and not starting with '#', so there is at least one token.
    let address = tokens.next().unwrap_or_default();
    let ip = parse_ip(address)
        .ok_or_else(|| HostsError::parse(line_no, body, "expected an IP address"))?;
    let hostnames: Vec<String> = tokens.map(String::from).collect();
    if hostnames.is_empty() {
        return Err(HostsError::parse(
            line_no,
            body,
            "mapping has no hostname",
        ));
    }

    Ok(LineRecord::Mapping {
        entry: MappingEntry {
            address: address.to_string(),
            ip,
            hostnames,
            comment,
            raw: Some(body.to_string()),
        },
        ending,
    })
}

/// Render records back to text; exact inverse of [`parse`] for unedited records.
pub fn serialize(records: &[LineRecord]) -> String {
    let mut out = String::new();
    for record in records {
        record.write_to(&mut out);
    }
    out
}

/// Line ending used by most of the document, defaulting to `\n`.
pub fn dominant_ending(records: &[LineRecord]) -> LineEnding {
    let crlf = records
        .iter()
        .filter(|r| r.ending() == LineEnding::CrLf)
        .count();
    let lf = records.iter().filter(|r| r.ending() == LineEnding::Lf).count();
    if crlf > lf {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    }
}
