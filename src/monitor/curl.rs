//! Just enough of curl's command line to replay a request copied from browser dev tools.

use crate::errors::{PrinterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Flags that never take a value, so the token after them is left alone.
const SWITCHES: &[&str] = &[
    "-s", "-S", "-k", "-L", "-v", "-i", "-I", "-g", "-G", "--silent", "--show-error",
    "--insecure", "--location", "--verbose", "--include", "--head", "--compressed",
    "--globoff",
];

/// Headers browsers add when copying a request that must not be replayed.
const DROPPED_HEADERS: &[&str] = &["X-Client-Ip", "X-Client-Mac"];

pub fn parse_curl(command: &str) -> Result<ParsedRequest> {
    let joined = command.replace("\\\r\n", " ").replace("\\\n", " ");
    let tokens = tokenize(&joined)?;

    let mut req = ParsedRequest {
        url: String::new(),
        method: "GET".to_string(),
        headers: BTreeMap::new(),
        body: String::new(),
    };

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        let value = tokens.get(i + 1).map(String::as_str);

        match (token, value) {
            ("-X" | "--request", Some(v)) => {
                req.method = v.to_uppercase();
                i += 1;
            }
            ("-H" | "--header", Some(v)) => {
                if let Some((key, val)) = v.split_once(':') {
                    let val = val.trim().trim_matches(|c| c == '"' || c == '\'');
                    req.headers.insert(key.trim().to_string(), val.to_string());
                }
                i += 1;
            }
            ("-b" | "--cookie", Some(v)) => {
                let cookie = v.trim_matches(|c| c == '"' || c == '\'');
                req.headers
                    .entry("Cookie".to_string())
                    .and_modify(|existing| {
                        existing.push_str("; ");
                        existing.push_str(cookie);
                    })
                    .or_insert_with(|| cookie.to_string());
                i += 1;
            }
            ("-d" | "--data" | "--data-raw" | "--data-binary", Some(v)) => {
                req.method = "POST".to_string();
                req.body = v.trim_matches(|c| c == '"' || c == '\'').to_string();
                default_content_type(&mut req, "application/json");
                i += 1;
            }
            ("--data-urlencode", Some(v)) => {
                req.method = "POST".to_string();
                append_body(&mut req, &urlencode_pair(v));
                default_content_type(&mut req, "application/x-www-form-urlencoded");
                i += 1;
            }
            ("-F" | "--form", Some(v)) => {
                req.method = "POST".to_string();
                append_body(&mut req, v);
                default_content_type(&mut req, "multipart/form-data");
                i += 1;
            }
            (flag, next) if flag.starts_with('-') => {
                let short_with_value = !flag.starts_with("--") && flag.len() == 2;
                let takes_value = (short_with_value || flag.starts_with("--"))
                    && !SWITCHES.contains(&flag);
                if takes_value && next.map_or(false, |n| !n.starts_with('-') && !is_url(n)) {
                    i += 1;
                }
            }
            (other, _) => {
                let unquoted = other.trim_matches(|c| c == '"' || c == '\'');
                if is_url(unquoted) {
                    req.url = unquoted.to_string();
                }
            }
        }
        i += 1;
    }

    for header in DROPPED_HEADERS {
        req.headers.remove(*header);
    }

    if req.url.is_empty() {
        return Err(PrinterError::Monitor("no URL found in curl command".to_string()));
    }
    Ok(req)
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn default_content_type(req: &mut ParsedRequest, value: &str) {
    req.headers
        .entry("Content-Type".to_string())
        .or_insert_with(|| value.to_string());
}

fn append_body(req: &mut ParsedRequest, part: &str) {
    if !req.body.is_empty() {
        req.body.push('&');
    }
    req.body.push_str(part);
}

/// `name=value` encodes only the value, as curl does; a bare value is encoded whole.
fn urlencode_pair(data: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    match data.split_once('=') {
        Some((name, value)) if !name.is_empty() => format!("{}={}", name, encode(value)),
        Some((_, value)) => encode(value),
        None => encode(data),
    }
}

/// Whitespace-separated tokens; quotes group and are removed, backslash escapes one char.
fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            current.push(c);
            in_token = true;
            escape_next = false;
            continue;
        }

        match (c, quote) {
            ('\\', _) => escape_next = true,
            ('\'' | '"', None) => {
                quote = Some(c);
                in_token = true;
            }
            (c, Some(q)) if c == q => quote = None,
            (c, None) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (c, _) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(PrinterError::Monitor("unclosed quote in command".to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
