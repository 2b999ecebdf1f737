//! Classification of inbound pushes
//!
//! A push is a flat field map. Field presence decides the kind:
//! - `serverStart` => a new round, optionally with `roundID`
//! - `announce_channel` naming admin, mentor or ban => an announcement whose
//!   `announce` body is further split into tickets, urgent pings and plain
//!   messages
//! - anything else is unclassified and dropped by the listener

use byond_topic_core::TopicResponse;
use serde::Serialize;

/// Separator between a ticket's title and its description
pub const TICKET_DELIMITER: &str = "): ";

/// Marker the game uses to request an urgent ping
pub const URGENT_MARKER: &str = "@here";

/// What a push is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    RoundStart,
    AdminTicket,
    AdminAnnounce,
    MentorAnnounce,
    BanAnnounce,
    Unclassified,
}

/// Ticket split into its header and text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    /// e.g. `(Admin Ticket)`
    pub title: String,
    /// Description with HTML entities decoded
    pub description: String,
}

/// A classified push, ready for a notification sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundEvent {
    pub kind: EventKind,
    pub body: String,
    pub round_id: Option<String>,
    /// Needs urgent attention
    pub urgent: bool,
    pub ticket: Option<Ticket>,
    /// Mention to fire with this event; `None` when suppressed or not urgent
    pub mention: Option<String>,
    /// Target channel identifier, when one is configured for the kind
    pub channel: Option<String>,
}

impl RoundEvent {
    fn new(kind: EventKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
            round_id: None,
            urgent: false,
            ticket: None,
            mention: None,
            channel: None,
        }
    }
}

/// Classify an authenticated push
pub fn classify(fields: &TopicResponse) -> RoundEvent {
    if fields.contains("serverStart") {
        let body = fields
            .get("announce")
            .filter(|text| !text.is_empty())
            .unwrap_or("A new round is starting");
        let mut event = RoundEvent::new(EventKind::RoundStart, body);
        event.round_id = fields
            .get("roundID")
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        return event;
    }

    let body = fields.get("announce").unwrap_or_default();
    let Some(kind) = fields.get("announce_channel").and_then(announce_kind) else {
        return RoundEvent::new(EventKind::Unclassified, body);
    };

    if body.contains("Ticket") {
        let ticket = split_ticket(body);
        let kind = if kind == EventKind::AdminAnnounce {
            EventKind::AdminTicket
        } else {
            kind
        };
        let mut event = RoundEvent::new(kind, body);
        event.ticket = Some(ticket);
        event
    } else if body.contains(URGENT_MARKER) {
        let mut event = RoundEvent::new(kind, body.replace(URGENT_MARKER, "").trim());
        event.urgent = true;
        event
    } else {
        RoundEvent::new(kind, body)
    }
}

fn announce_kind(channel: &str) -> Option<EventKind> {
    let channel = channel.to_ascii_lowercase();
    if channel.contains("admin") {
        Some(EventKind::AdminAnnounce)
    } else if channel.contains("mentor") {
        Some(EventKind::MentorAnnounce)
    } else if channel.contains("ban") {
        Some(EventKind::BanAnnounce)
    } else {
        None
    }
}

fn split_ticket(body: &str) -> Ticket {
    match body.split_once(TICKET_DELIMITER) {
        Some((title, description)) => Ticket {
            title: format!("{})", title),
            description: unescape_html(description),
        },
        None => Ticket {
            title: body.to_string(),
            description: String::new(),
        },
    }
}

/// Decode HTML entities (`&amp;`, `&#39;`, `&#x27;`, ...).
///
/// Covers what BYOND's `html_encode` emits (`&lt;`, `&gt;`, `&amp;`,
/// `&quot;`, `&#39;`) plus `&apos;`, `&nbsp;` and any numeric reference.
/// Other named entities and unterminated ones are left as-is.
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byond_topic_core::parse_query_string;

    fn push(fields: &[(&str, &str)]) -> TopicResponse {
        fields.iter().copied().collect()
    }

    #[test]
    fn test_round_start() {
        let event = classify(&parse_query_string("?key=s3cret&serverStart&roundID=42"));
        assert_eq!(event.kind, EventKind::RoundStart);
        assert_eq!(event.round_id.as_deref(), Some("42"));
        assert!(!event.urgent);
    }

    #[test]
    fn test_round_start_without_id() {
        let event = classify(&push(&[("serverStart", "")]));
        assert_eq!(event.kind, EventKind::RoundStart);
        assert_eq!(event.round_id, None);
    }

    #[test]
    fn test_admin_ticket() {
        let event = classify(&push(&[
            ("announce_channel", "admin"),
            ("announce", "(Admin Ticket): Player reports a bug"),
        ]));
        assert_eq!(event.kind, EventKind::AdminTicket);
        assert_eq!(
            event.ticket,
            Some(Ticket {
                title: "(Admin Ticket)".into(),
                description: "Player reports a bug".into(),
            })
        );
    }

    #[test]
    fn test_ticket_description_is_unescaped() {
        let event = classify(&push(&[
            ("announce_channel", "admin"),
            (
                "announce",
                "(Ticket #3): I can&#39;t open &lt;airlock&gt; &amp; door",
            ),
        ]));
        let ticket = event.ticket.unwrap();
        assert_eq!(ticket.title, "(Ticket #3)");
        assert_eq!(ticket.description, "I can't open <airlock> & door");
    }

    #[test]
    fn test_mentor_ticket_keeps_mentor_kind() {
        let event = classify(&push(&[
            ("announce_channel", "mentor"),
            ("announce", "(Mentor Ticket): How do I build a wall"),
        ]));
        assert_eq!(event.kind, EventKind::MentorAnnounce);
        assert!(event.ticket.is_some());
    }

    #[test]
    fn test_urgent_announce() {
        let event = classify(&push(&[
            ("announce_channel", "admin"),
            ("announce", "@here No admins online"),
        ]));
        assert_eq!(event.kind, EventKind::AdminAnnounce);
        assert!(event.urgent);
        assert_eq!(event.body, "No admins online");
        assert_eq!(event.mention, None);
    }

    #[test]
    fn test_plain_ban_announce() {
        let event = classify(&push(&[
            ("announce_channel", "Ban"),
            ("announce", "Someone was banned"),
        ]));
        assert_eq!(event.kind, EventKind::BanAnnounce);
        assert!(!event.urgent);
        assert_eq!(event.ticket, None);
        assert_eq!(event.body, "Someone was banned");
    }

    #[test]
    fn test_unclassified() {
        let event = classify(&push(&[("announce_channel", "ooc"), ("announce", "hi")]));
        assert_eq!(event.kind, EventKind::Unclassified);

        let event = classify(&push(&[("something", "else")]));
        assert_eq!(event.kind, EventKind::Unclassified);
    }

    #[test]
    fn test_unescape_html_encode_output() {
        assert_eq!(
            unescape_html("&lt;b&gt;Tom &amp; Jerry&lt;/b&gt; said &quot;hi&quot; &#39;twice&#39;"),
            "<b>Tom & Jerry</b> said \"hi\" 'twice'"
        );
        assert_eq!(unescape_html("&#8364;5 &#x2713;"), "\u{20ac}5 \u{2713}");
    }

    #[test]
    fn test_unescape_leaves_unknown_entities() {
        assert_eq!(unescape_html("a & b &bogus; &#x41;"), "a & b &bogus; A");
        assert_eq!(unescape_html("no entities"), "no entities");
    }
}
