// SPDX-License-Identifier: Apache-2.0

//! Loopback URL parsing and rewriting.

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// A parsed `http://{loopback-host}[:port]` URL. `None` for anything else
/// (non-http scheme, non-loopback host, or unparseable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackUrl {
    pub scheme: String,
    pub port: u16,
    pub rest: String,
}

pub fn parse_loopback(url: &str) -> Option<LoopbackUrl> {
    let (scheme, remainder) = url.split_once("://")?;
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let (authority, rest) = match remainder.find('/') {
        Some(i) => (&remainder[..i], remainder[i..].to_string()),
        None => (remainder, String::new()),
    };

    let (host, port_str) = if let Some(stripped) = authority.strip_prefix('[') {
        let end = stripped.find(']')?;
        let host = &stripped[..end];
        let after = &stripped[end + 1..];
        let port = after.strip_prefix(':').unwrap_or("");
        (host, port)
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (h, p),
            None => (authority, ""),
        }
    };

    if !LOOPBACK_HOSTS.contains(&host) {
        return None;
    }

    let default_port = if scheme == "https" { 443 } else { 80 };
    let port = if port_str.is_empty() {
        default_port
    } else {
        port_str.parse().ok()?
    };

    Some(LoopbackUrl {
        scheme: scheme.to_string(),
        port,
        rest,
    })
}

/// If `url` is loopback, rewrite it to point at `gateway:bridge_port`;
/// otherwise return it unchanged.
pub fn rewrite_for_host_gateway(url: &str, gateway: &str, bridge_port: u16) -> String {
    match parse_loopback(url) {
        Some(parsed) => format!("{}://{}:{}{}", parsed.scheme, gateway, bridge_port, parsed.rest),
        None => url.to_string(),
    }
}
