// crates/trustgate-daemon/src/ingress.rs
//
// Line-protocol ingress used by load generators and test proxies.
//
// Each line is a JSON frame `{"topic": "...", "payload": "..."}` where the
// payload is the wire message as a string. Every frame runs in its own task;
// replies are written back one JSON line per frame, in completion order, by
// a single writer task per connection. A reply slot is reserved before each
// line is read, so a peer that stops reading replies stops being read once
// `REPLY_QUEUE_DEPTH` replies are pending. The peer IP (not the port) is the
// sender key for rate limiting, so reconnecting does not reset a ban.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use trustgate_admission::Admission;
use trustgate_core::{ReasonCode, TrustGateError, MAX_WIRE_BYTES};

use crate::feedback::{handle_feedback, processed_topic, FeedbackOutcome};
use crate::shared::DaemonSharedState;

/// Longest accepted frame line. The payload is JSON inside a JSON string,
/// so escaping can roughly double its size.
pub const MAX_FRAME_BYTES: usize = 2 * MAX_WIRE_BYTES;

/// Frames per connection that may be in progress or awaiting the writer.
const REPLY_QUEUE_DEPTH: usize = 256;

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressFrame {
    pub topic: String,
    pub payload: String,
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressReply {
    pub topic: String,
    pub accepted: bool,
    pub score: f64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u64>,
    /// Topic the frame is forwarded under, when it is forwarded at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_topic: Option<String>,
    /// Relayed wire message for accepted frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relayed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackOutcome>,
}

impl IngressReply {
    fn from_admission(topic: &str, admission: &Admission) -> Self {
        let relayed = admission
            .relayed
            .as_ref()
            .and_then(|m| m.to_wire().to_bytes().ok())
            .and_then(|b| String::from_utf8(b).ok());
        Self {
            topic: topic.to_string(),
            accepted: admission.verdict.accepted,
            score: admission.verdict.score,
            reason: admission.verdict.reason.to_string(),
            snapshot_version: admission.snapshot_version,
            published_topic: admission.verdict.accepted.then(|| topic.to_string()),
            relayed,
            feedback: None,
        }
    }

    fn rejected(topic: &str, reason: ReasonCode) -> Self {
        Self {
            topic: topic.to_string(),
            accepted: false,
            score: 0.0,
            reason: reason.to_string(),
            snapshot_version: None,
            published_topic: None,
            relayed: None,
            feedback: None,
        }
    }

    fn from_feedback(shared: &DaemonSharedState, topic: &str, outcome: FeedbackOutcome) -> Self {
        let recorded = outcome == FeedbackOutcome::Recorded;
        Self {
            topic: topic.to_string(),
            accepted: recorded,
            score: 0.0,
            reason: "feedback".to_string(),
            snapshot_version: recorded.then(|| shared.snapshots.version()),
            published_topic: recorded.then(|| processed_topic(&shared.feedback_topic)),
            relayed: None,
            feedback: Some(outcome),
        }
    }

    /// Render as one newline-terminated JSON line.
    pub fn render(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut s) => {
                s.push('\n');
                s
            }
            Err(e) => format!("{{\"accepted\":false,\"reason\":\"internal\",\"error\":{:?}}}\n", e.to_string()),
        }
    }
}

/// Parse one frame line.
pub fn parse_frame(line: &[u8]) -> Result<IngressFrame, TrustGateError> {
    if line.len() > MAX_FRAME_BYTES {
        return Err(TrustGateError::MalformedMessage(format!(
            "frame of {} bytes exceeds {} byte limit",
            line.len(),
            MAX_FRAME_BYTES
        )));
    }
    serde_json::from_slice(line).map_err(|e| TrustGateError::MalformedMessage(e.to_string()))
}

/// Decide one frame from `sender`.
pub async fn process_frame(shared: &DaemonSharedState, sender: &str, line: &[u8]) -> IngressReply {
    let frame = match parse_frame(line) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("Bad frame from {}: {}", sender, e);
            // Let the gate count it: it still costs the sender a token.
            let admission = shared.gate.admit(sender, "", line);
            return IngressReply::from_admission("", &admission);
        }
    };

    if frame.topic == shared.feedback_topic {
        let outcome = handle_feedback(shared, sender, frame.payload.as_bytes()).await;
        return IngressReply::from_feedback(shared, &frame.topic, outcome);
    }

    let slot = match shared.gate.enter(sender) {
        Ok(slot) => slot,
        Err(reason) => return IngressReply::rejected(&frame.topic, reason),
    };
    let admission = slot.admit(&frame.topic, frame.payload.as_bytes());
    if admission.verdict.reason != ReasonCode::Accepted
        && admission.verdict.reason != ReasonCode::LocalOrigin
    {
        tracing::trace!("{} on {}: {}", sender, frame.topic, admission.verdict.reason);
    }
    IngressReply::from_admission(&frame.topic, &admission)
}

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, shared: DaemonSharedState) -> Result<(), TrustGateError> {
    let local = listener.local_addr()?;
    tracing::info!("Ingress listening on {}", local);
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let shared = shared.clone();
                tokio::spawn(async move {
                    let (read_half, write_half) = stream.into_split();
                    handle_connection(read_half, write_half, peer, shared).await;
                });
            }
            Err(e) => tracing::warn!("Accept failed: {}", e),
        }
    }
}

async fn handle_connection<R, W>(
    read_half: R,
    mut write_half: W,
    peer: SocketAddr,
    shared: DaemonSharedState,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tracing::debug!("Connection from {}", peer);
    let sender = peer.ip().to_string();
    let (tx, mut rx) = mpsc::channel::<String>(REPLY_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut reader = BufReader::new(read_half);
    loop {
        // Waits while every reply slot is taken.
        let Ok(reply_slot) = tx.clone().reserve_owned().await else {
            break;
        };

        let mut buf = Vec::new();
        let limit = (MAX_FRAME_BYTES + 1) as u64;
        match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Read from {} failed: {}", peer, e);
                break;
            }
        }

        if buf.last() != Some(&b'\n') && buf.len() > MAX_FRAME_BYTES {
            // No way to find the next frame boundary; drop the connection.
            tracing::warn!("Oversized frame from {}, closing connection", peer);
            reply_slot.send(IngressReply::rejected("", ReasonCode::MalformedMessage).render());
            break;
        }

        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        if buf.is_empty() {
            continue;
        }

        let shared = shared.clone();
        let sender = sender.clone();
        tokio::spawn(async move {
            let reply = process_frame(&shared, &sender, &buf).await;
            reply_slot.send(reply.render());
        });
    }

    drop(tx);
    let _ = writer.await;
    tracing::debug!("Connection from {} closed", peer);
}
