//! Wire parser and renderer
//!
//! Consumes the token-delimited wire form and produces a structured
//! envelope. Each frame is
//! `<|start|> HEADER <|message|> BODY TERMINATOR` with
//! `TERMINATOR ∈ { <|end|>, <|call|>, <|return|> }`. The header is
//! `role [ <|channel|> channel [ to=recipient ] ] [ <|constrain|> contentType ]`.
//!
//! Token matching is ordinal and case-sensitive.

use serde_json::Value;

use crate::error::{EngineError, ParseErrorKind};
use crate::types::{Channel, ContentType, Envelope, Message, Termination};

pub const TOK_START: &str = "<|start|>";
pub const TOK_MESSAGE: &str = "<|message|>";
pub const TOK_CHANNEL: &str = "<|channel|>";
pub const TOK_CONSTRAIN: &str = "<|constrain|>";
pub const TOK_END: &str = "<|end|>";
pub const TOK_CALL: &str = "<|call|>";
pub const TOK_RETURN: &str = "<|return|>";

fn parse_err(kind: ParseErrorKind, message: impl Into<String>) -> EngineError {
    EngineError::Parse {
        kind,
        message: message.into(),
    }
}

/// Parse wire text into an envelope of structured messages.
pub fn parse_envelope(input: &str) -> Result<Envelope, EngineError> {
    let mut messages = Vec::new();
    let mut pos = 0;
    while let Some(offset) = input[pos..].find(TOK_START) {
        let header_start = pos + offset + TOK_START.len();
        let (message, next) = parse_frame(input, header_start)?;
        messages.push(message);
        pos = next;
    }
    Ok(Envelope::new(messages))
}

/// Parse one frame starting right after `<|start|>`; returns the message
/// and the scan position past the frame terminator.
fn parse_frame(input: &str, header_start: usize) -> Result<(Message, usize), EngineError> {
    let message_offset = input[header_start..].find(TOK_MESSAGE).ok_or_else(|| {
        parse_err(
            ParseErrorKind::MissingMessageToken,
            "frame is missing <|message|>",
        )
    })?;
    let header = &input[header_start..header_start + message_offset];
    let body_start = header_start + message_offset + TOK_MESSAGE.len();

    let (body_len, termination, token_len) = find_terminator(&input[body_start..])?;
    let raw_body = &input[body_start..body_start + body_len];
    let next = body_start + body_len + token_len;

    let header = parse_header(header)?;
    let message = resolve_message(header, termination, raw_body)?;
    Ok((message, next))
}

/// Locate the earliest terminator token in the remaining input.
fn find_terminator(rest: &str) -> Result<(usize, Termination, usize), EngineError> {
    let candidates = [
        (TOK_END, Termination::End),
        (TOK_CALL, Termination::Call),
        (TOK_RETURN, Termination::Return),
    ];
    let mut best: Option<(usize, Termination, usize)> = None;
    for (token, termination) in candidates {
        if let Some(offset) = rest.find(token) {
            if best.map_or(true, |(current, _, _)| offset < current) {
                best = Some((offset, termination, token.len()));
            }
        }
    }
    best.ok_or_else(|| {
        parse_err(
            ParseErrorKind::MissingTerminator,
            "frame body is missing a terminator token",
        )
    })
}

struct Header {
    role: String,
    channel: Option<Channel>,
    recipient: Option<String>,
    content_type: Option<ContentType>,
}

fn parse_header(header: &str) -> Result<Header, EngineError> {
    let (before_constrain, content_type) = match header.find(TOK_CONSTRAIN) {
        Some(index) => {
            let declared = header[index + TOK_CONSTRAIN.len()..]
                .split_whitespace()
                .next()
                .unwrap_or("");
            (&header[..index], ContentType::parse(declared))
        }
        None => (header, None),
    };

    let (role_text, channel, recipient) = match before_constrain.find(TOK_CHANNEL) {
        Some(index) => {
            let mut channel = None;
            let mut recipient = None;
            for word in before_constrain[index + TOK_CHANNEL.len()..].split_whitespace() {
                if let Some(bound) = word.strip_prefix("to=") {
                    recipient = Some(bound.to_string());
                } else if channel.is_none() {
                    channel = Channel::parse(word);
                }
            }
            (&before_constrain[..index], channel, recipient)
        }
        None => (before_constrain, None, None),
    };

    let role = role_text.trim();
    if role.is_empty() {
        return Err(parse_err(ParseErrorKind::EmptyRole, "frame role is empty"));
    }

    Ok(Header {
        role: role.to_string(),
        channel,
        recipient,
        content_type,
    })
}

/// Apply channel defaulting, content-type inference, body decoding, and
/// termination propagation rules to one parsed frame.
fn resolve_message(
    header: Header,
    termination: Termination,
    raw_body: &str,
) -> Result<Message, EngineError> {
    let body = raw_body.trim_matches(|c| c == '\r' || c == '\n');
    let is_assistant = header.role.trim().eq_ignore_ascii_case("assistant");

    // assistant frames with no declared channel default to final, unless
    // the body is a tool call
    let channel = match header.channel {
        Some(channel) => Some(channel),
        None if is_assistant => Some(if termination == Termination::Call {
            Channel::Commentary
        } else {
            Channel::Final
        }),
        None => None,
    };

    let commentary = is_assistant && channel == Some(Channel::Commentary);
    let content_type = header
        .content_type
        .unwrap_or_else(|| infer_content_type(commentary, termination, body));

    let content = match content_type {
        ContentType::Json | ContentType::HarmonyScript => serde_json::from_str(body)
            .map_err(|err| {
                parse_err(
                    ParseErrorKind::InvalidJson,
                    format!("invalid JSON body: {}", err),
                )
            })?,
        ContentType::Text => Value::String(body.to_string()),
    };

    Ok(Message {
        role: header.role,
        channel,
        recipient: header.recipient,
        content_type: Some(content_type),
        termination: commentary.then_some(termination),
        content,
    })
}

/// Infer a content type when `<|constrain|>` is absent.
fn infer_content_type(commentary: bool, termination: Termination, body: &str) -> ContentType {
    if !commentary {
        return ContentType::Text;
    }
    match termination {
        Termination::Call | Termination::Return => ContentType::Json,
        Termination::End => {
            let trimmed = body.trim_start();
            if trimmed.starts_with('{') && body.contains("\"steps\"") {
                ContentType::HarmonyScript
            } else if trimmed.starts_with('{') {
                ContentType::Json
            } else {
                ContentType::Text
            }
        }
    }
}

/// Render an envelope back to its wire form.
///
/// Always emits `<|constrain|>` when the content type is known, so
/// rendering a canonicalized envelope and parsing it back is exact.
pub fn render_envelope(envelope: &Envelope) -> String {
    let mut out = String::new();
    for message in &envelope.messages {
        out.push_str(TOK_START);
        out.push_str(&message.role);
        if let Some(channel) = message.channel {
            out.push(' ');
            out.push_str(TOK_CHANNEL);
            out.push_str(channel.as_str());
            if let Some(recipient) = &message.recipient {
                out.push_str(" to=");
                out.push_str(recipient);
            }
        }
        if let Some(content_type) = message.content_type {
            out.push(' ');
            out.push_str(TOK_CONSTRAIN);
            out.push_str(content_type.as_str());
        }
        out.push_str(TOK_MESSAGE);
        match (&message.content, message.content_type) {
            (Value::String(text), Some(ContentType::Text) | None) => out.push_str(text),
            (value, _) => out.push_str(&value.to_string()),
        }
        out.push_str(match message.termination {
            Some(Termination::Call) => TOK_CALL,
            Some(Termination::Return) => TOK_RETURN,
            _ => TOK_END,
        });
        out.push('\n');
    }
    out
}
