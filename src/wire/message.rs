use crate::replica::{LogEntry, ReplicaId, Term};
use serde::{Deserialize, Serialize};

/// Envelope is the common header every message carries: who sent it, who it
/// is for, the sender's current leader hint, and a correlation id. The `type`
/// tag and per-type fields live in [Body] and are flattened alongside the
/// header on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: ReplicaId,
    pub dst: ReplicaId,
    pub leader: ReplicaId,
    #[serde(rename = "MID")]
    pub mid: String,
    #[serde(flatten)]
    pub body: Body,
}

/// All message types exchanged with clients and peers. Wire tags are exactly
/// the substrate's: `get`, `put`, `ok`, `fail`, `redirect`, `requestVote`,
/// `vote`, `append_entries_rpc`, `append_okay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Body {
    #[serde(rename = "get")]
    Get { key: String },

    #[serde(rename = "put")]
    Put { key: String, value: String },

    /// Success reply. Carries a value only when answering a `get`.
    #[serde(rename = "ok")]
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },

    #[serde(rename = "fail")]
    Fail,

    /// Non-leader's answer to client traffic; the `leader` header field
    /// points the client at where to retry.
    #[serde(rename = "redirect")]
    Redirect,

    #[serde(rename = "requestVote")]
    RequestVote {
        term: Term,
        /// Length of the candidate's log.
        length: u64,
        /// The candidate's newest log entry, or the empty sentinel when its
        /// log is empty.
        #[serde(default)]
        last_entry: Option<LogEntry>,
    },

    /// Vote grant, addressed to the candidate. Denial is silence.
    #[serde(rename = "vote")]
    Vote,

    #[serde(rename = "append_entries_rpc")]
    AppendEntries {
        updates: Vec<LogEntry>,
        /// Leader's commit index; -1 when nothing is committed yet.
        commit: i64,
        client_id: ReplicaId,
        client_mid: String,
        term: Term,
    },

    #[serde(rename = "append_okay")]
    AppendOkay {
        updates: Vec<LogEntry>,
        client_id: ReplicaId,
        client_mid: String,
    },
}

impl Body {
    /// The wire tag, for log lines.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Body::Get { .. } => "get",
            Body::Put { .. } => "put",
            Body::Ok { .. } => "ok",
            Body::Fail => "fail",
            Body::Redirect => "redirect",
            Body::RequestVote { .. } => "requestVote",
            Body::Vote => "vote",
            Body::AppendEntries { .. } => "append_entries_rpc",
            Body::AppendOkay { .. } => "append_okay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn envelope(body: Body) -> Envelope {
        Envelope {
            src: ReplicaId::new("0001"),
            dst: ReplicaId::new("0002"),
            leader: ReplicaId::new("0001"),
            mid: "abc123".to_string(),
            body,
        }
    }

    #[test]
    fn header_fields_use_wire_names() {
        let wire = serde_json::to_value(&envelope(Body::Fail)).unwrap();

        assert_eq!(wire["src"], "0001");
        assert_eq!(wire["dst"], "0002");
        assert_eq!(wire["leader"], "0001");
        assert_eq!(wire["MID"], "abc123");
        assert_eq!(wire["type"], "fail");
    }

    #[test]
    fn ok_reply_omits_value_for_put() {
        let wire = serde_json::to_value(&envelope(Body::Ok { value: None })).unwrap();
        assert!(wire.get("value").is_none());

        let wire = serde_json::to_value(&envelope(Body::Ok {
            value: Some("".to_string()),
        }))
        .unwrap();
        assert_eq!(wire["value"], "");
    }

    #[test]
    fn log_entries_travel_as_triples() {
        let wire = serde_json::to_value(&envelope(Body::AppendEntries {
            updates: vec![LogEntry::new("a", "1", Term::new(3))],
            commit: -1,
            client_id: ReplicaId::new("C001"),
            client_mid: "m1".to_string(),
            term: Term::new(3),
        }))
        .unwrap();

        assert_eq!(wire["type"], "append_entries_rpc");
        assert_eq!(wire["updates"], json!([["a", "1", 3]]));
        assert_eq!(wire["commit"], -1);
    }

    #[test]
    fn request_vote_empty_log_sentinel() {
        let wire = serde_json::to_value(&envelope(Body::RequestVote {
            term: Term::new(1),
            length: 0,
            last_entry: None,
        }))
        .unwrap();
        assert_eq!(wire["type"], "requestVote");
        assert_eq!(wire["last_entry"], Value::Null);

        // Inbound with the sentinel absent entirely still parses.
        let parsed: Envelope = serde_json::from_value(json!({
            "src": "0002", "dst": "0001", "leader": "FFFF", "MID": "m",
            "type": "requestVote", "term": 1, "length": 0
        }))
        .unwrap();
        assert_eq!(
            parsed.body,
            Body::RequestVote {
                term: Term::new(1),
                length: 0,
                last_entry: None
            }
        );
    }

    #[test]
    fn client_get_parses() {
        let parsed: Envelope = serde_json::from_value(json!({
            "src": "C001", "dst": "0001", "leader": "FFFF",
            "type": "get", "MID": "77fa2b", "key": "a"
        }))
        .unwrap();

        assert_eq!(parsed.src, ReplicaId::new("C001"));
        assert_eq!(parsed.body, Body::Get { key: "a".to_string() });
    }
}
