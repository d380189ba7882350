//! Wire protocol - s-expression encoding of session and replication frames.
//!
//! Every frame is a u32 big-endian length prefix followed by an
//! s-expression payload. Messages are plists; the accessors below handle
//! both the `Value::Keyword` and `Value::Symbol(":key")` parse forms.
//! The replicated payload for a balloon is the raw stroke geometry, not
//! the derived object, so each peer reconstructs the balloon itself.

use anyhow::{anyhow, bail, Result};
use lexpr::Value;

use crate::tracking::Point;

/// Maximum frame payload size (256 KiB); larger frames are a protocol
/// violation.
pub const MAX_FRAME_SIZE: u32 = 262_144;

// ── Messages ───────────────────────────────────────────────

/// A shared-state-changing action, replicated between peers.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicatedEvent {
    /// A stroke closed and inflated; carries the stroke geometry.
    BalloonCreated { color: String, points: Vec<Point> },
    /// The whole object set was cleared.
    ClearAll,
}

/// Everything that can travel between two sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Guest's opening frame: offer a room code.
    Join { code: String },
    /// Host accepted the join.
    Accept,
    /// Host turned the join away.
    Reject { reason: String },
    /// A replicated event.
    Event(ReplicatedEvent),
}

// ── Encoding ───────────────────────────────────────────────

/// Encode a message as an s-expression payload.
pub fn encode(msg: &WireMessage) -> String {
    match msg {
        WireMessage::Join { code } => {
            format!("(:type :join :code \"{}\")", escape_string(code))
        }
        WireMessage::Accept => "(:type :accept)".to_string(),
        WireMessage::Reject { reason } => {
            format!("(:type :reject :reason \"{}\")", escape_string(reason))
        }
        WireMessage::Event(ReplicatedEvent::ClearAll) => "(:type :clear-all)".to_string(),
        WireMessage::Event(ReplicatedEvent::BalloonCreated { color, points }) => {
            let mut coords = String::new();
            for p in points {
                if !coords.is_empty() {
                    coords.push(' ');
                }
                coords.push_str(&format!("{} {}", p.x, p.y));
            }
            format!(
                "(:type :balloon-created :color \"{}\" :points ({}))",
                escape_string(color),
                coords,
            )
        }
    }
}

// ── Decoding ───────────────────────────────────────────────

/// Parse an s-expression payload into a message.
pub fn decode(raw: &str) -> Result<WireMessage> {
    let value = lexpr::from_str(raw).map_err(|e| anyhow!("malformed s-expression: {e}"))?;
    let msg_type =
        get_keyword(&value, "type").ok_or_else(|| anyhow!("message without :type"))?;

    match msg_type.as_str() {
        "join" => {
            let code =
                get_keyword(&value, "code").ok_or_else(|| anyhow!("join without :code"))?;
            Ok(WireMessage::Join { code })
        }
        "accept" => Ok(WireMessage::Accept),
        "reject" => Ok(WireMessage::Reject {
            reason: get_keyword(&value, "reason").unwrap_or_else(|| "unknown".to_string()),
        }),
        "clear-all" => Ok(WireMessage::Event(ReplicatedEvent::ClearAll)),
        "balloon-created" => {
            let color = get_keyword(&value, "color")
                .ok_or_else(|| anyhow!("balloon-created without :color"))?;
            let points_value = get_value(&value, "points")
                .ok_or_else(|| anyhow!("balloon-created without :points"))?;
            let coords: Vec<f32> = flatten_list(points_value)
                .into_iter()
                .map(number_as_f32)
                .collect::<Result<_>>()?;
            if coords.len() % 2 != 0 {
                bail!("odd coordinate count in :points");
            }
            let points = coords
                .chunks(2)
                .map(|pair| Point::new(pair[0], pair[1]))
                .collect();
            Ok(WireMessage::Event(ReplicatedEvent::BalloonCreated {
                color,
                points,
            }))
        }
        other => bail!("unknown message type: {other}"),
    }
}

// ── Helpers ────────────────────────────────────────────────

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn number_as_f32(value: &Value) -> Result<f32> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .or_else(|| n.as_i64().map(|i| i as f64))
            .map(|f| f as f32)
            .ok_or_else(|| anyhow!("unrepresentable number in :points")),
        other => bail!("non-numeric value in :points: {other}"),
    }
}

/// Extract the raw value following `:key` in an s-expression plist.
/// Walks cons pairs directly; handles both `Value::Keyword("key")` and
/// `Value::Symbol(":key")` forms.
fn get_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{key}");
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            if let Value::Cons(next) = pair.cdr() {
                return Some(next.car());
            }
            return None;
        }
        current = pair.cdr();
    }
    None
}

/// Extract a keyword/string/symbol value from a plist as a string.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let val = get_value(value, key)?;
    match val {
        Value::Keyword(v) => Some(v.to_string()),
        Value::Symbol(v) => {
            let s = v.to_string();
            Some(s.strip_prefix(':').unwrap_or(&s).to_string())
        }
        Value::String(v) => Some(v.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => Some(val.to_string()),
    }
}

/// Flatten a possibly nested list/cons structure into a Vec of leaf values.
fn flatten_list(value: &Value) -> Vec<&Value> {
    fn walk<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
        match v {
            Value::Cons(pair) => {
                walk(pair.car(), out);
                walk(pair.cdr(), out);
            }
            Value::Null => {}
            other => out.push(other),
        }
    }
    let mut result = Vec::new();
    walk(value, &mut result);
    result
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: WireMessage) {
        let encoded = encode(&msg);
        let decoded = decode(&encoded).unwrap_or_else(|e| panic!("{encoded}: {e}"));
        assert_eq!(decoded, msg);
    }

    #[test]
    fn join_round_trips() {
        round_trip(WireMessage::Join {
            code: "AB12CD".to_string(),
        });
    }

    #[test]
    fn accept_and_reject_round_trip() {
        round_trip(WireMessage::Accept);
        round_trip(WireMessage::Reject {
            reason: "invalid room code".to_string(),
        });
    }

    #[test]
    fn clear_all_round_trips() {
        round_trip(WireMessage::Event(ReplicatedEvent::ClearAll));
    }

    #[test]
    fn balloon_created_round_trips_with_fractional_coords() {
        round_trip(WireMessage::Event(ReplicatedEvent::BalloonCreated {
            color: "#ffb3ba".to_string(),
            points: vec![
                Point::new(100.5, 200.25),
                Point::new(-3.75, 0.0),
                Point::new(640.0, 480.0),
            ],
        }));
    }

    #[test]
    fn balloon_created_with_empty_points_round_trips() {
        round_trip(WireMessage::Event(ReplicatedEvent::BalloonCreated {
            color: "#baffc9".to_string(),
            points: vec![],
        }));
    }

    #[test]
    fn reject_reason_with_quotes_round_trips() {
        round_trip(WireMessage::Reject {
            reason: "code \"AB\" unknown".to_string(),
        });
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(decode("((").is_err());
        assert!(decode("(:no-type-here 1)").is_err());
        assert!(decode("(:type :warp-drive)").is_err());
    }

    #[test]
    fn join_requires_code() {
        assert!(decode("(:type :join)").is_err());
    }

    #[test]
    fn odd_coordinate_count_is_an_error() {
        assert!(decode("(:type :balloon-created :color \"#fff\" :points (1 2 3))").is_err());
    }

    #[test]
    fn non_numeric_points_are_an_error() {
        assert!(
            decode("(:type :balloon-created :color \"#fff\" :points (1 2 \"x\" 4))").is_err()
        );
    }
}
