//! Text-framed application message grammar riding on top of [`crate::rdt`]:
//! a header line, `CRLF`, zero or more body lines each `CRLF`-terminated,
//! and a trailing blank `CRLF` closing the message.

use crate::error::CodecError;

/// One client-to-server message: header fields plus the method-specific body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub host_id: String,
    pub host_ip: String,
    pub method: ClientMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMethod {
    Ident,
    Inform(Vec<(String, u64)>),
    Query { substring: String, host: Option<String> },
    Remove(Vec<(String, u64)>),
    Exit,
}

impl ClientMethod {
    fn name(&self) -> &'static str {
        match self {
            ClientMethod::Ident => "IDENT",
            ClientMethod::Inform(_) => "INFORM",
            ClientMethod::Query { .. } => "QUERY",
            ClientMethod::Remove(_) => "REMOVE",
            ClientMethod::Exit => "EXIT",
        }
    }
}

impl ClientMessage {
    pub fn encode(&self) -> String {
        let body = match &self.method {
            ClientMethod::Ident | ClientMethod::Exit => String::new(),
            ClientMethod::Inform(entries) | ClientMethod::Remove(entries) => {
                encode_entries(entries)
            }
            ClientMethod::Query { substring, host } => {
                format!("{} {}\r\n", substring, host.as_deref().unwrap_or(""))
            }
        };
        format!(
            "{} {} {}\r\n{}\r\n",
            self.method.name(),
            self.host_id,
            self.host_ip,
            body
        )
    }
}

fn encode_entries(entries: &[(String, u64)]) -> String {
    entries
        .iter()
        .map(|(name, size)| format!("{name} {size}\r\n"))
        .collect()
}

/// Parsed header line, common to both message directions, before the body
/// has been interpreted for a specific method/status.
struct Header<'a> {
    first: &'a str,
    second: &'a str,
    third: &'a str,
}

/// Splits a raw message on `CRLF`, drops empty lines, and returns the header
/// line's three whitespace-separated tokens plus the remaining body lines.
fn split_header_and_body(text: &str) -> Result<(Header<'_>, Vec<&str>), CodecError> {
    let mut lines = text.split("\r\n").filter(|l| !l.is_empty());
    let header_line = lines.next().ok_or(CodecError::MissingHeader)?;
    let tokens: Vec<&str> = header_line.split(' ').collect();
    if tokens.len() < 3 {
        return Err(CodecError::ShortHeader(tokens.len(), 3));
    }
    Ok((
        Header {
            first: tokens[0],
            second: tokens[1],
            third: tokens[2],
        },
        lines.collect(),
    ))
}

/// Rejoins all but the last whitespace token as the name, parses the last
/// token as the size. Used for `INFORM`/`REMOVE` body lines.
fn parse_entry(line: &str) -> Result<(String, u64), CodecError> {
    let mut tokens: Vec<&str> = line.split(' ').collect();
    let size_tok = tokens
        .pop()
        .ok_or_else(|| CodecError::MissingSize(line.to_string()))?;
    if tokens.is_empty() {
        return Err(CodecError::MissingSize(line.to_string()));
    }
    let filesize = size_tok
        .parse()
        .map_err(|_| CodecError::BadSize(size_tok.to_string()))?;
    Ok((tokens.join(" "), filesize))
}

fn parse_entries(lines: &[&str]) -> Result<Vec<(String, u64)>, CodecError> {
    lines.iter().map(|line| parse_entry(line)).collect()
}

/// Decodes a client message header plus method-specific body. Kept separate
/// from the server-side 400-reply path (`crate::server`) so a message with a
/// known, well-formed header but an unparseable or unknown-method body can
/// still be answered with `400 ERROR <method> ...` instead of being dropped.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, CodecError> {
    let (header, body) = split_header_and_body(text)?;
    let method = match header.first {
        "IDENT" => ClientMethod::Ident,
        "INFORM" => ClientMethod::Inform(parse_entries(&body)?),
        "QUERY" => {
            let line = body.first().ok_or(CodecError::MissingQueryLine)?;
            let mut tokens: Vec<&str> = line.split(' ').collect();
            let host_tok = tokens.pop().ok_or(CodecError::MissingQueryLine)?;
            let host = if host_tok.is_empty() {
                None
            } else {
                Some(host_tok.to_string())
            };
            ClientMethod::Query {
                substring: tokens.join(" "),
                host,
            }
        }
        "REMOVE" => ClientMethod::Remove(parse_entries(&body)?),
        "EXIT" => ClientMethod::Exit,
        other => return Err(CodecError::UnknownMethod(other.to_string())),
    };
    Ok(ClientMessage {
        host_id: header.second.to_string(),
        host_ip: header.third.to_string(),
        method,
    })
}

/// One server-to-client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    IdentOk {
        host_id: String,
    },
    Ok {
        method: String,
        count: u64,
    },
    Error {
        method: String,
        error_msg: String,
    },
    QueryResponse {
        /// `(host_id, host_ip, filename, filesize)` per match.
        results: Vec<(String, String, String, u64)>,
    },
}

impl ServerMessage {
    pub fn encode(&self) -> String {
        let (code, phrase, body) = match self {
            ServerMessage::IdentOk { host_id } => {
                ("202", "IDENTOK", format!("IDENT {host_id}\r\n"))
            }
            ServerMessage::Ok { method, count } => ("200", "OK", format!("{method} {count}\r\n")),
            ServerMessage::Error { method, error_msg } => {
                ("400", "ERROR", format!("{method} {error_msg}\r\n"))
            }
            ServerMessage::QueryResponse { results } => (
                "800",
                "QUERYRESPONSE",
                results
                    .iter()
                    .map(|(host_id, host_ip, filename, filesize)| {
                        format!("{host_id} {host_ip}\r\n{filename} {filesize}\r\n")
                    })
                    .collect(),
            ),
        };
        format!("{code} {phrase}\r\n{body}\r\n")
    }
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    let mut lines = text.split("\r\n").filter(|l| !l.is_empty());
    let header_line = lines.next().ok_or(CodecError::MissingHeader)?;
    let status = header_line
        .split(' ')
        .next()
        .ok_or(CodecError::MissingHeader)?;
    let body: Vec<&str> = lines.collect();

    match status {
        "202" => {
            let line = body.first().ok_or(CodecError::MissingHeader)?;
            let host_id = line
                .splitn(2, ' ')
                .nth(1)
                .ok_or(CodecError::MissingHeader)?
                .to_string();
            Ok(ServerMessage::IdentOk { host_id })
        }
        "200" => {
            let line = body.first().ok_or(CodecError::MissingHeader)?;
            let mut parts = line.splitn(2, ' ');
            let method = parts.next().unwrap_or("").to_string();
            let count = parts
                .next()
                .ok_or_else(|| CodecError::MissingSize(line.to_string()))?
                .parse()
                .map_err(|_| CodecError::BadSize(line.to_string()))?;
            Ok(ServerMessage::Ok { method, count })
        }
        "400" => {
            let line = body.first().ok_or(CodecError::MissingHeader)?;
            let mut parts = line.splitn(2, ' ');
            let method = parts.next().unwrap_or("").to_string();
            let error_msg = parts.next().unwrap_or("").to_string();
            Ok(ServerMessage::Error { method, error_msg })
        }
        "800" => {
            let mut results = Vec::new();
            let mut lines = body.iter();
            while let (Some(pair_line), Some(file_line)) = (lines.next(), lines.next()) {
                let mut pair = pair_line.splitn(2, ' ');
                let host_id = pair.next().unwrap_or("").to_string();
                let host_ip = pair.next().unwrap_or("").to_string();
                let (filename, filesize) = parse_entry(file_line)?;
                results.push((host_id, host_ip, filename, filesize));
            }
            Ok(ServerMessage::QueryResponse { results })
        }
        other => Err(CodecError::UnknownStatus(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_round_trips() {
        let msg = ClientMessage {
            host_id: "alpha1234".into(),
            host_ip: "10.0.0.1".into(),
            method: ClientMethod::Ident,
        };
        let encoded = msg.encode();
        assert_eq!(encoded, "IDENT alpha1234 10.0.0.1\r\n\r\n");
        let decoded = decode_client_message(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn inform_round_trips_and_preserves_filenames_with_spaces() {
        let msg = ClientMessage {
            host_id: "alpha1234".into(),
            host_ip: "10.0.0.1".into(),
            method: ClientMethod::Inform(vec![
                ("song a.mp3".to_string(), 1000),
                ("b.mp3".to_string(), 2000),
            ]),
        };
        let encoded = msg.encode();
        assert_eq!(
            encoded,
            "INFORM alpha1234 10.0.0.1\r\nsong a.mp3 1000\r\nb.mp3 2000\r\n\r\n"
        );
        let decoded = decode_client_message(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn query_without_host_filter_round_trips_to_none() {
        let msg = ClientMessage {
            host_id: "alpha1234".into(),
            host_ip: "10.0.0.1".into(),
            method: ClientMethod::Query {
                substring: "song".into(),
                host: None,
            },
        };
        let decoded = decode_client_message(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn query_with_host_filter_round_trips() {
        let msg = ClientMessage {
            host_id: "alpha1234".into(),
            host_ip: "10.0.0.1".into(),
            method: ClientMethod::Query {
                substring: "song".into(),
                host: Some("beta9999".into()),
            },
        };
        let decoded = decode_client_message(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = decode_client_message("BOGUS alpha1234 10.0.0.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, CodecError::UnknownMethod(m) if m == "BOGUS"));
    }

    #[test]
    fn short_header_is_rejected() {
        let err = decode_client_message("IDENT alpha1234\r\n\r\n").unwrap_err();
        assert!(matches!(err, CodecError::ShortHeader(2, 3)));
    }

    #[test]
    fn identok_round_trips() {
        let msg = ServerMessage::IdentOk {
            host_id: "alpha1234".into(),
        };
        let encoded = msg.encode();
        assert_eq!(encoded, "202 IDENTOK\r\nIDENT alpha1234\r\n\r\n");
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn queryresponse_round_trips_with_multiple_pairs() {
        let msg = ServerMessage::QueryResponse {
            results: vec![
                (
                    "alpha1234".into(),
                    "10.0.0.1".into(),
                    "song a.mp3".into(),
                    1000,
                ),
                ("beta9999".into(), "10.0.0.2".into(), "b.mp3".into(), 2000),
            ],
        };
        let encoded = msg.encode();
        let decoded = decode_server_message(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn empty_queryresponse_round_trips() {
        let msg = ServerMessage::QueryResponse { results: vec![] };
        let encoded = msg.encode();
        assert_eq!(encoded, "800 QUERYRESPONSE\r\n\r\n");
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn error_round_trips() {
        let msg = ServerMessage::Error {
            method: "QUERY".into(),
            error_msg: "no results".into(),
        };
        assert_eq!(decode_server_message(&msg.encode()).unwrap(), msg);
    }
}
