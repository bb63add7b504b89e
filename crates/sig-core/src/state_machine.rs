//! The per-session signaling state machine: the event dispatcher that ties
//! the repository, registry, validator, limiters, abuse guard, concurrency
//! cap, multiplexer, router, and audit log together into the five inbound
//! events a session can receive.
//!
//! Concurrent events for the same session are serialized with one
//! `tokio::sync::Mutex` per session id, acquired before the critical section
//! of any event that reads-then-writes session-scoped state (`join-room`,
//! `transfer-complete`) — a per-key lock rather than one global lock over
//! every session.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use sig_crypto::field_encryption::FieldCipher;

use crate::abuse_guard::AbuseGuard;
use crate::audit::{AuditLog, EntryFields, Level};
use crate::concurrency_cap::ConcurrencyCap;
use crate::error::{Result, SignalError};
use crate::events::{FileSize, OutboundEvent};
use crate::multiplexer::Multiplexer;
use crate::rate_limit::SignalLimiters;
use crate::registry::SessionRegistry;
use crate::repository::{SessionRepository, SessionStatus};
use crate::router::{self, RelayOutcome};
use crate::validation;

/// The signaling engine: owns every in-memory component and the repository
/// handle, and is the sole entry point inbound events are dispatched
/// through. Cloning is cheap — every field is an `Arc` or internally
/// `Arc`-backed — so a `SignalingEngine` is typically shared across every
/// connection handler via `Arc<SignalingEngine>` from the boundary adapter.
pub struct SignalingEngine {
    repository: Arc<dyn SessionRepository>,
    cipher: Option<Arc<FieldCipher>>,
    registry: Arc<SessionRegistry>,
    multiplexer: Multiplexer,
    limiters: SignalLimiters,
    concurrency_cap: Arc<ConcurrencyCap>,
    abuse_guard: Arc<AbuseGuard>,
    audit: Arc<AuditLog>,
    session_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl SignalingEngine {
    /// Construct an engine over the given repository, optional field
    /// cipher (absent only in the pass-through/non-production mode), and
    /// the shared abuse guard and audit log (shared because the boundary
    /// adapter's connection-accept path consults them too).
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        cipher: Option<Arc<FieldCipher>>,
        abuse_guard: Arc<AbuseGuard>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            repository,
            cipher,
            registry: Arc::new(SessionRegistry::new()),
            multiplexer: Multiplexer::new(),
            limiters: SignalLimiters::default(),
            concurrency_cap: Arc::new(ConcurrencyCap::new()),
            abuse_guard,
            audit,
            session_locks: DashMap::new(),
        }
    }

    /// The endpoint multiplexer, exposed so the boundary adapter can
    /// register a new connection's outbound sink and tear it down again on
    /// disconnect.
    #[must_use]
    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }

    /// The underlying repository trait object, exposed for the sweeper.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn SessionRepository> {
        &self.repository
    }

    /// The session registry, exposed (and shareable) for the sweeper's
    /// age-based purge.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The named rate limiters, exposed for the sweeper's 60s bucket sweep.
    #[must_use]
    pub fn limiters(&self) -> &SignalLimiters {
        &self.limiters
    }

    /// The per-IP concurrency cap, exposed (and shareable) so the sweeper
    /// can release reservations for sessions it purges.
    #[must_use]
    pub fn concurrency_cap(&self) -> &Arc<ConcurrencyCap> {
        &self.concurrency_cap
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn decrypt_field(&self, value: &str) -> String {
        match &self.cipher {
            Some(cipher) => cipher.decrypt(value),
            None => value.to_string(),
        }
    }

    async fn record_suspicious(
        &self,
        ip: IpAddr,
        endpoint_id: &str,
        session_id: Option<&str>,
        event: &'static str,
    ) {
        self.abuse_guard.record_suspicious(ip).await;
        self.audit.record(
            Level::Security,
            event,
            EntryFields {
                endpoint_id: Some(endpoint_id.to_string()),
                session_id: session_id.map(str::to_string),
                ip: Some(ip),
                details: None,
            },
        );
    }

    /// Handle `upload-init`: validate, gate, persist, and register a new
    /// session, replying `upload-created` on success or `error` otherwise.
    pub async fn upload_init(
        &self,
        endpoint_id: &str,
        ip: IpAddr,
        file_name: String,
        file_size: u64,
        file_type: String,
        file_hash: Option<String>,
    ) {
        match self
            .upload_init_inner(endpoint_id, ip, file_name, file_size, file_type, file_hash)
            .await
        {
            Ok((file_id, code, warnings)) => {
                self.multiplexer.send(
                    endpoint_id,
                    OutboundEvent::UploadCreated {
                        file_id,
                        one_time_code: code,
                        warnings,
                    },
                );
            }
            Err(err) => self.send_error(endpoint_id, &err),
        }
    }

    async fn upload_init_inner(
        &self,
        endpoint_id: &str,
        ip: IpAddr,
        file_name: String,
        file_size: u64,
        file_type: String,
        file_hash: Option<String>,
    ) -> Result<(String, String, Vec<String>)> {
        if !validation::validate_endpoint_id(endpoint_id) {
            return Err(SignalError::InvalidInput("endpoint id".into()));
        }

        let check = self.limiters.upload_init.check(endpoint_id.to_string());
        if !check.allowed {
            self.record_suspicious(ip, endpoint_id, None, "rate-limit-breach").await;
            return Err(SignalError::RateLimited {
                wait_secs: check.wait_secs(Instant::now()),
            });
        }

        let validated = validation::validate_upload(&file_name, file_size, &file_type)
            .map_err(|e| SignalError::InvalidInput(e.to_string().into()))?;

        self.concurrency_cap
            .check(ip)
            .map_err(|rejection| SignalError::SessionCapped {
                reason: rejection.reason().into(),
            })?;

        let (encrypted_name, encrypted_type) = match &self.cipher {
            Some(cipher) => (
                cipher
                    .encrypt(&validated.file_name)
                    .map_err(|e| SignalError::Internal(e.to_string().into()))?,
                cipher
                    .encrypt(&validated.file_type)
                    .map_err(|e| SignalError::Internal(e.to_string().into()))?,
            ),
            None => (validated.file_name.clone(), validated.file_type.clone()),
        };

        let file_id = match self
            .repository
            .create(encrypted_name, validated.file_size, encrypted_type, None, file_hash)
            .await
        {
            Ok(file_id) => file_id,
            Err(err) => {
                self.concurrency_cap.decrement(ip);
                return Err(err.into());
            }
        };

        let code = self.registry.register(file_id.clone(), endpoint_id.to_string(), ip);
        self.multiplexer.join(endpoint_id, &file_id);

        self.audit.record(
            Level::Info,
            "session-created",
            EntryFields {
                endpoint_id: Some(endpoint_id.to_string()),
                session_id: Some(file_id.clone()),
                ip: Some(ip),
                details: None,
            },
        );

        Ok((file_id, code, validated.warnings))
    }

    /// Handle `join-room`: verify the code, flip the session to `ACTIVE`,
    /// and reply `file-meta` to the joiner and `receiver-joined` to the
    /// sender, or `error` to the joiner alone.
    pub async fn join_room(&self, endpoint_id: &str, ip: IpAddr, file_id: String, code: String) {
        match self.join_room_inner(endpoint_id, ip, &file_id, &code).await {
            Ok((file_meta, sender_id)) => {
                self.multiplexer.send(endpoint_id, file_meta);
                self.multiplexer.send(
                    &sender_id,
                    OutboundEvent::ReceiverJoined {
                        receiver_id: endpoint_id.to_string(),
                    },
                );
            }
            Err(err) => self.send_error(endpoint_id, &err),
        }
    }

    async fn join_room_inner(
        &self,
        endpoint_id: &str,
        ip: IpAddr,
        file_id: &str,
        code: &str,
    ) -> Result<(OutboundEvent, String)> {
        if !validation::validate_endpoint_id(endpoint_id) {
            return Err(SignalError::InvalidInput("endpoint id".into()));
        }

        let check = self.limiters.join_room.check(endpoint_id.to_string());
        if !check.allowed {
            self.record_suspicious(ip, endpoint_id, Some(file_id), "rate-limit-breach").await;
            return Err(SignalError::RateLimited {
                wait_secs: check.wait_secs(Instant::now()),
            });
        }

        if !validation::validate_session_id(file_id) {
            self.record_suspicious(ip, endpoint_id, Some(file_id), "invalid-session-id").await;
            return Err(SignalError::InvalidInput("session id".into()));
        }

        let lock = self.session_lock(file_id);
        let _guard = lock.lock().await;

        let session = self
            .repository
            .find(file_id)
            .await?
            .ok_or(SignalError::NotFound)?;

        if session.status == SessionStatus::Completed {
            return Err(SignalError::AlreadyDownloaded);
        }

        let sender_id = self.registry.sender(file_id).ok_or(SignalError::SenderOffline)?;

        if self.registry.validate_code(file_id, code).is_err() {
            self.record_suspicious(ip, endpoint_id, Some(file_id), "invalid-code").await;
            return Err(SignalError::InvalidCode);
        }

        self.repository.set_status(file_id, SessionStatus::Active).await?;
        self.multiplexer.join(endpoint_id, file_id);

        let decrypted_name = self.decrypt_field(&session.encrypted_file_name);
        let decrypted_type = self.decrypt_field(&session.encrypted_file_type);

        let extension_dangerous = validation::is_dangerous_extension(&decrypted_name);
        let mime_dangerous = validation::is_suspicious_mime(&decrypted_type);
        let mut warnings = Vec::new();
        if extension_dangerous {
            if let Some(ext) = decrypted_name.rsplit('.').next() {
                warnings.push(format!("file extension '.{ext}' may be unsafe to open"));
            }
        }
        if mime_dangerous {
            warnings.push(format!("file type '{decrypted_type}' may be unsafe to open"));
        }

        let file_meta = OutboundEvent::FileMeta {
            file_name: decrypted_name,
            file_size: FileSize(session.file_size),
            file_type: decrypted_type,
            file_hash: session.file_hash.clone(),
            is_dangerous: extension_dangerous || mime_dangerous,
            warnings,
        };

        Ok((file_meta, sender_id))
    }

    /// Handle `signal`: relay an opaque negotiation payload from
    /// `from` to `target` within `file_id`'s room. Every failure mode is a
    /// silent drop per the propagation policy — nothing is ever sent back
    /// to `from` — except that an off-room attempt raises a suspicious
    /// event for `from`'s IP.
    pub async fn signal(&self, from: &str, ip: IpAddr, target: String, file_id: String, data: Value) {
        let outcome = router::relay(&self.multiplexer, from, &target, &file_id, data);
        match outcome {
            RelayOutcome::Delivered | RelayOutcome::TargetDisconnected => {}
            RelayOutcome::SenderNotInRoom | RelayOutcome::TargetNotInRoom => {
                self.record_suspicious(ip, from, Some(&file_id), "off-room-signal").await;
            }
        }
    }

    /// Handle `cancel-transfer`: forward `transfer-cancelled` to every other
    /// member of the room. No authorization check beyond room membership —
    /// either peer may cancel.
    pub async fn cancel_transfer(&self, from: &str, file_id: String, reason: Option<String>) {
        let reason = reason.unwrap_or_else(|| "transfer cancelled".to_string());
        for member in self.multiplexer.room_members(&file_id) {
            if member != from {
                self.multiplexer.send(
                    &member,
                    OutboundEvent::TransferCancelled {
                        reason: reason.clone(),
                    },
                );
            }
        }
    }

    /// Handle `transfer-complete`: delete the session row (the chosen
    /// resolution of the delete-vs-`COMPLETED` open question — see
    /// DESIGN.md), drop the registry entry, and release the sender's
    /// concurrency-cap reservation.
    pub async fn transfer_complete(&self, from: &str, file_id: String) {
        let lock = self.session_lock(&file_id);
        let _guard = lock.lock().await;

        let sender_ip = self.registry.sender_ip(&file_id);

        if let Err(err) = self.repository.delete(&file_id).await {
            tracing::warn!(%err, session_id = %file_id, from, "transfer-complete: repository delete failed");
        }
        self.registry.remove(&file_id);
        self.session_locks.remove(&file_id);

        if let Some(ip) = sender_ip {
            self.concurrency_cap.decrement(ip);
        }
    }

    /// Handle an endpoint's disconnect: tear down multiplexer state first,
    /// before the abuse guard's disconnect hook, notify any remaining room
    /// member, and apply the sender-recovery policy.
    pub async fn handle_disconnect(&self, endpoint_id: &str) {
        let Some((ip, sessions)) = self.multiplexer.disconnect(endpoint_id) else {
            return;
        };

        for session_id in sessions {
            for member in self.multiplexer.room_members(&session_id) {
                self.multiplexer.send(
                    &member,
                    OutboundEvent::TransferCancelled {
                        reason: "peer disconnected".to_string(),
                    },
                );
            }

            if self.registry.is_sender(&session_id, endpoint_id) {
                if let Ok(Some(session)) = self.repository.find(&session_id).await {
                    match session.status {
                        SessionStatus::Active => {
                            let _ = self
                                .repository
                                .set_status(&session_id, SessionStatus::Waiting)
                                .await;
                        }
                        SessionStatus::Waiting => {
                            if let Some(sender_ip) = self.registry.sender_ip(&session_id) {
                                self.concurrency_cap.decrement(sender_ip);
                            }
                            self.registry.remove(&session_id);
                        }
                        SessionStatus::Completed => {}
                    }
                }
            }
        }

        self.abuse_guard.track_disconnect(ip).await;
    }

    fn send_error(&self, endpoint_id: &str, err: &SignalError) {
        let invalid_code = matches!(err, SignalError::InvalidCode).then_some(true);
        self.multiplexer.send(
            endpoint_id,
            OutboundEvent::Error {
                message: err.client_message().to_string(),
                invalid_code,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemorySessionRepository;
    use std::net::Ipv4Addr;
    use tokio::sync::mpsc;

    fn ip() -> IpAddr {
        Ipv4Addr::new(198, 51, 100, 42).into()
    }

    fn engine() -> Arc<SignalingEngine> {
        Arc::new(SignalingEngine::new(
            Arc::new(MemorySessionRepository::new()),
            None,
            Arc::new(AbuseGuard::new()),
            Arc::new(AuditLog::new()),
        ))
    }

    fn connect(engine: &SignalingEngine, id: &str) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        engine.multiplexer().connect(id.to_string(), ip(), tx);
        rx
    }

    async fn do_upload_init(engine: &SignalingEngine, sender: &str) -> (String, String) {
        engine
            .upload_init(
                sender,
                ip(),
                "photo.jpg".to_string(),
                10_240,
                "image/jpeg".to_string(),
                None,
            )
            .await;
        (String::new(), String::new())
    }

    #[tokio::test]
    async fn happy_path_end_to_end() {
        let engine = engine();
        let mut e1_rx = connect(&engine, "e1");

        engine
            .upload_init(
                "e1",
                ip(),
                "photo.jpg".to_string(),
                10_240,
                "image/jpeg".to_string(),
                None,
            )
            .await;

        let (file_id, code) = match e1_rx.recv().await.unwrap() {
            OutboundEvent::UploadCreated {
                file_id,
                one_time_code,
                ..
            } => (file_id, one_time_code),
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(code.len(), 6);

        let mut e2_rx = connect(&engine, "e2");
        engine.join_room("e2", ip(), file_id.clone(), code).await;

        match e2_rx.recv().await.unwrap() {
            OutboundEvent::FileMeta { file_name, .. } => assert_eq!(file_name, "photo.jpg"),
            other => panic!("unexpected event: {other:?}"),
        }
        match e1_rx.recv().await.unwrap() {
            OutboundEvent::ReceiverJoined { receiver_id } => assert_eq!(receiver_id, "e2"),
            other => panic!("unexpected event: {other:?}"),
        }

        engine
            .signal(
                "e1",
                ip(),
                "e2".to_string(),
                file_id.clone(),
                serde_json::json!({"type": "offer", "sdp": "X"}),
            )
            .await;
        match e2_rx.recv().await.unwrap() {
            OutboundEvent::Signal { from, .. } => assert_eq!(from, "e1"),
            other => panic!("unexpected event: {other:?}"),
        }

        engine.transfer_complete("e2", file_id.clone()).await;
        assert!(engine.repository().find(&file_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_code_is_rejected_and_leaves_session_waiting() {
        let engine = engine();
        let mut e1_rx = connect(&engine, "e1");
        do_upload_init(&engine, "e1").await;
        let file_id = match e1_rx.recv().await.unwrap() {
            OutboundEvent::UploadCreated { file_id, .. } => file_id,
            other => panic!("unexpected: {other:?}"),
        };

        let mut e2_rx = connect(&engine, "e2");
        engine.join_room("e2", ip(), file_id.clone(), "WRONG1".to_string()).await;

        match e2_rx.recv().await.unwrap() {
            OutboundEvent::Error { invalid_code, .. } => assert_eq!(invalid_code, Some(true)),
            other => panic!("unexpected: {other:?}"),
        }

        let session = engine.repository().find(&file_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn code_replay_is_rejected() {
        let engine = engine();
        let mut e1_rx = connect(&engine, "e1");
        engine
            .upload_init(
                "e1",
                ip(),
                "photo.jpg".to_string(),
                10_240,
                "image/jpeg".to_string(),
                None,
            )
            .await;
        let (file_id, code) = match e1_rx.recv().await.unwrap() {
            OutboundEvent::UploadCreated {
                file_id,
                one_time_code,
                ..
            } => (file_id, one_time_code),
            other => panic!("unexpected: {other:?}"),
        };

        let mut e2_rx = connect(&engine, "e2");
        engine.join_room("e2", ip(), file_id.clone(), code.clone()).await;
        let _ = e2_rx.recv().await.unwrap();
        let _ = e1_rx.recv().await.unwrap();

        let mut e3_rx = connect(&engine, "e3");
        engine.join_room("e3", ip(), file_id, code).await;
        match e3_rx.recv().await.unwrap() {
            OutboundEvent::Error { invalid_code, .. } => assert_eq!(invalid_code, Some(true)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn off_room_signal_is_silently_dropped_and_audited() {
        let engine = engine();
        let mut e1_rx = connect(&engine, "e1");
        do_upload_init(&engine, "e1").await;
        let file_id = match e1_rx.recv().await.unwrap() {
            OutboundEvent::UploadCreated { file_id, .. } => file_id,
            other => panic!("unexpected: {other:?}"),
        };

        connect(&engine, "e3");
        engine
            .signal("e3", ip(), "e1".to_string(), file_id, serde_json::json!({}))
            .await;

        assert!(e1_rx.try_recv().is_err());
        assert_eq!(engine.abuse_guard.suspicious_count(ip()).await, 1);
    }

    #[tokio::test]
    async fn dangerous_extension_flags_warnings_on_both_sides() {
        let engine = engine();
        let mut e1_rx = connect(&engine, "e1");
        engine
            .upload_init(
                "e1",
                ip(),
                "setup.exe".to_string(),
                1024,
                "application/octet-stream".to_string(),
                None,
            )
            .await;
        let (file_id, code, warnings) = match e1_rx.recv().await.unwrap() {
            OutboundEvent::UploadCreated {
                file_id,
                one_time_code,
                warnings,
            } => (file_id, one_time_code, warnings),
            other => panic!("unexpected: {other:?}"),
        };
        assert!(!warnings.is_empty());

        let mut e2_rx = connect(&engine, "e2");
        engine.join_room("e2", ip(), file_id, code).await;
        match e2_rx.recv().await.unwrap() {
            OutboundEvent::FileMeta {
                is_dangerous,
                warnings,
                ..
            } => {
                assert!(is_dangerous);
                assert!(!warnings.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sender_disconnect_while_active_resets_session_to_waiting() {
        let engine = engine();
        let mut e1_rx = connect(&engine, "e1");
        do_upload_init(&engine, "e1").await;
        let (file_id, code) = match e1_rx.recv().await.unwrap() {
            OutboundEvent::UploadCreated {
                file_id,
                one_time_code,
                ..
            } => (file_id, one_time_code),
            other => panic!("unexpected: {other:?}"),
        };

        connect(&engine, "e2");
        engine.join_room("e2", ip(), file_id.clone(), code).await;

        engine.handle_disconnect("e1").await;

        let session = engine.repository().find(&file_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Waiting);
    }
}
