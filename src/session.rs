//! Continuous-capture session: binds camera frames to whichever user
//! identity was scanned most recently and feeds them to the orchestrator as
//! they arrive.
//!
//! The session is a single-writer state machine; the camera callback thread
//! is the only mutator. Events go out on the session's own channel rather
//! than a process-wide broadcast. Photos captured before any identity is
//! known stay buffered and bind to the identity current at submit time.

use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::pipeline::{BatchReport, Orchestrator};

/// Payload of a scanned identity token (QR).
#[derive(Debug, Deserialize)]
pub struct IdentityToken {
    pub user_id: String,
}

pub fn decode_identity_token(payload: &str) -> Option<IdentityToken> {
    serde_json::from_str(payload).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// A new identity token was scanned; the UI typically plays a
    /// notification sound on this.
    IdentityDetected { user_id: String },
    /// A submitted batch has fully settled (every image succeeded or
    /// failed).
    BatchSettled {
        user_id: String,
        report: BatchReport,
    },
}

pub struct CaptureSession {
    orchestrator: Arc<Orchestrator>,
    state: SessionState,
    identity: Option<String>,
    buffer: Vec<Bytes>,
    buffer_cap: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl CaptureSession {
    pub const DEFAULT_BUFFER_CAP: usize = 40;

    pub fn new(
        orchestrator: Arc<Orchestrator>,
        buffer_cap: usize,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                orchestrator,
                state: SessionState::Idle,
                identity: None,
                buffer: Vec::new(),
                buffer_cap,
                events,
            },
            rx,
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn start(&mut self) {
        self.state = SessionState::Capturing;
        self.buffer.clear();
        info!("capture session started");
    }

    /// Stops frame intake and drops unsubmitted photos. Batches already
    /// dispatched keep running; their `BatchSettled` events still arrive.
    pub fn stop(&mut self) {
        self.state = SessionState::Idle;
        self.buffer.clear();
        info!("capture session stopped");
    }

    /// Feeds a decoded QR payload from the frame scanner.
    pub fn push_qr(&mut self, payload: &str) {
        if self.state != SessionState::Capturing {
            return;
        }
        let Some(token) = decode_identity_token(payload) else {
            debug!("scanned token is not an identity payload");
            return;
        };
        info!(user_id = %token.user_id, "identity detected");
        self.identity = Some(token.user_id.clone());
        let _ = self.events.send(SessionEvent::IdentityDetected {
            user_id: token.user_id,
        });
        self.submit_buffered();
    }

    /// Feeds one captured photo. Submitted immediately when an identity is
    /// known; buffered otherwise, up to the cap.
    pub fn push_photo(&mut self, photo: Bytes) {
        if self.state != SessionState::Capturing {
            return;
        }
        if self.buffer.len() >= self.buffer_cap {
            debug!(cap = self.buffer_cap, "capture buffer full, dropping frame");
            return;
        }
        self.buffer.push(photo);
        if self.identity.is_some() {
            self.submit_buffered();
        }
    }

    /// Drains the buffer into a detached pipeline batch bound to the current
    /// identity. Draining (instead of re-reading the whole buffer each
    /// capture) keeps a photo from being uploaded more than once.
    fn submit_buffered(&mut self) {
        let Some(user_id) = self.identity.clone() else {
            return;
        };
        if self.buffer.is_empty() {
            return;
        }
        let images = std::mem::take(&mut self.buffer);
        let orchestrator = Arc::clone(&self.orchestrator);
        let events = self.events.clone();
        debug!(user_id = %user_id, count = images.len(), "submitting captured photos");
        tokio::spawn(async move {
            let report = orchestrator.process_batch(&user_id, images).await;
            info!(
                user_id = %user_id,
                ok = report.succeeded(),
                failed = report.failed(),
                "capture batch settled"
            );
            let _ = events.send(SessionEvent::BatchSettled { user_id, report });
        });
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use crate::pipeline::{PipelineOptions, PreprocessOptions};
    use crate::records::{MemoryStore, RecordStore};
    use crate::testutil::{fenced, png_bytes, FakeBlobs, ScriptedVision};
    use std::time::Duration;

    const RICE_REPLY: &str = r#"{"meals":[{"name":"rice","nutrients":"carbohydrate","weight":150,"label":"staple","remaining":0.2}]}"#;

    async fn session_fixture(
        cap: usize,
    ) -> (
        CaptureSession,
        mpsc::UnboundedReceiver<SessionEvent>,
        Arc<MemoryStore>,
        String,
    ) {
        let store = Arc::new(MemoryStore::new());
        let fid = store.create_facility("Sakura Home").await.unwrap();
        let uid = store.create_user("Tanaka", &fid).await.unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            Arc::new(FakeBlobs),
            Arc::new(ScriptedVision::new(fenced(RICE_REPLY))),
            PipelineOptions {
                preprocess: PreprocessOptions {
                    target_width: 64,
                    jpeg_quality: 60,
                },
                attach_backoff: Duration::from_millis(1),
                ..PipelineOptions::default()
            },
        ));
        let (session, rx) = CaptureSession::new(orchestrator, cap);
        (session, rx, store, uid)
    }

    fn qr_for(user_id: &str) -> String {
        format!(r#"{{"user_id":"{user_id}"}}"#)
    }

    #[tokio::test]
    async fn photos_wait_for_identity_then_submit() {
        let (mut session, mut rx, store, uid) = session_fixture(40).await;
        session.start();

        session.push_photo(png_bytes(80, 60));
        session.push_photo(png_bytes(80, 60));
        assert!(rx.try_recv().is_err(), "nothing submitted without identity");

        session.push_qr(&qr_for(&uid));
        match rx.recv().await.unwrap() {
            SessionEvent::IdentityDetected { user_id } => assert_eq!(user_id, uid),
            other => panic!("expected IdentityDetected, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SessionEvent::BatchSettled { user_id, report } => {
                assert_eq!(user_id, uid);
                assert_eq!(report.outcomes.len(), 2);
                assert_eq!(report.failed(), 0);
            }
            other => panic!("expected BatchSettled, got {other:?}"),
        }
        assert_eq!(store.list_images(&uid).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn photo_with_known_identity_submits_immediately() {
        let (mut session, mut rx, _store, uid) = session_fixture(40).await;
        session.start();
        session.push_qr(&qr_for(&uid));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::IdentityDetected { .. }
        ));

        session.push_photo(png_bytes(80, 60));
        match rx.recv().await.unwrap() {
            SessionEvent::BatchSettled { report, .. } => {
                assert_eq!(report.outcomes.len(), 1)
            }
            other => panic!("expected BatchSettled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn buffered_photos_bind_to_identity_at_submit_time() {
        let (mut session, mut rx, store, uid_a) = session_fixture(40).await;
        let uid_b = store.create_user("Suzuki", "f-other").await.unwrap();
        session.start();

        session.push_photo(png_bytes(80, 60));
        // Two scans before anything was submitted; the later one wins.
        session.push_qr(&qr_for(&uid_b));

        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::IdentityDetected { .. }
        ));
        match rx.recv().await.unwrap() {
            SessionEvent::BatchSettled { user_id, .. } => assert_eq!(user_id, uid_b),
            other => panic!("expected BatchSettled, got {other:?}"),
        }
        assert!(store.list_images(&uid_a).await.unwrap().is_empty());
        assert_eq!(store.list_images(&uid_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn buffer_cap_drops_extra_frames() {
        let (mut session, mut rx, _store, uid) = session_fixture(2).await;
        session.start();

        for _ in 0..5 {
            session.push_photo(png_bytes(80, 60));
        }
        session.push_qr(&qr_for(&uid));

        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::IdentityDetected { .. }
        ));
        match rx.recv().await.unwrap() {
            SessionEvent::BatchSettled { report, .. } => {
                assert_eq!(report.outcomes.len(), 2, "frames beyond the cap dropped")
            }
            other => panic!("expected BatchSettled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_clears_buffer_but_not_inflight_batches() {
        let (mut session, mut rx, store, uid) = session_fixture(40).await;
        session.start();
        session.push_qr(&qr_for(&uid));
        session.push_photo(png_bytes(80, 60));
        // Batch dispatched above; stop before it settles.
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);

        let mut settled = false;
        while let Some(event) = rx.recv().await {
            if let SessionEvent::BatchSettled { report, .. } = event {
                assert_eq!(report.failed(), 0);
                settled = true;
                break;
            }
        }
        assert!(settled, "in-flight batch survives stop");
        assert_eq!(store.list_images(&uid).await.unwrap().len(), 1);

        // Frames while idle are ignored.
        session.push_photo(png_bytes(80, 60));
        session.push_qr(&qr_for(&uid));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn undecodable_token_is_ignored() {
        let (mut session, mut rx, _store, _uid) = session_fixture(40).await;
        session.start();
        session.push_qr("not json");
        session.push_qr(r#"{"something_else": 1}"#);
        assert!(rx.try_recv().is_err());
        assert!(session.current_identity().is_none());
    }
}
