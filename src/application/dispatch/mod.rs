//! Central system dispatch
//!
//! Entry point for OCPP-J text arriving from a charge point connection and
//! for requests the central system sends to charge points. Every inbound
//! Call is answered with a CallResult or a CallError; nothing raised while
//! handling a message tears the connection down.

mod commands;
mod sweeper;
mod v16;
mod v201;

pub use commands::{CommandDispatcher, ResetKind};
pub use sweeper::{spawn_sweeper, sweep_once};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::charge_point::SharedChargePointManager;
use crate::application::codec::{catalog, ActionPayloadCodec, CatalogError, CodecError};
use crate::application::errors::{ErrorCodeResolver, ResolverCheckError, RpcErrorCode};
use crate::application::ports::{MessageTransport, TransportError};
use crate::application::queue::{PendingActionMessage, RequestError, SharedActionMessageQueue};
use crate::application::session::SharedChargeSessionManager;
use crate::domain::{Action, ClientIdentity, Direction, OcppVersion};
use crate::support::ocpp_frame::OcppFrame;

/// Failures that keep the central system from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Action catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Error code table: {0}")]
    ErrorCodes(#[from] ResolverCheckError),
}

/// Runtime knobs of the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Heartbeat interval handed out in BootNotification responses
    pub heartbeat_interval_secs: u32,
    /// How long `send_request` waits for the charge point
    pub response_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 300,
            response_timeout: Duration::from_secs(30),
        }
    }
}

/// Why an inbound Call was answered with a CallError
#[derive(Debug, Clone, Error)]
#[error("{code}: {description}")]
pub struct CallFailure {
    pub code: RpcErrorCode,
    pub description: String,
    pub details: Value,
}

impl CallFailure {
    fn new(code: RpcErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            details: json!({}),
        }
    }
}

impl From<CodecError> for CallFailure {
    fn from(err: CodecError) -> Self {
        Self {
            code: err.rpc_error(),
            description: err.to_string(),
            details: err.details(),
        }
    }
}

/// Actions that touch authorization or transactions and are refused to
/// identities whose registration is not accepted.
fn requires_accepted_registration(action: Action) -> bool {
    matches!(
        action,
        Action::Authorize
            | Action::StartTransaction
            | Action::StopTransaction
            | Action::MeterValues
            | Action::TransactionEvent
    )
}

/// Wire spelling of a serde-serialized enum value
fn wire_name<T: Serialize + fmt::Debug>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(name)) => name,
        _ => format!("{:?}", value),
    }
}

/// Decode a request, run `handler` on it and encode its response.
fn exchange<Req, Resp>(
    codec: &ActionPayloadCodec,
    action: Action,
    payload: Option<&Value>,
    handler: impl FnOnce(Req) -> Resp,
) -> Result<Value, CodecError>
where
    Req: DeserializeOwned + 'static,
    Resp: Serialize + 'static,
{
    let request = codec.decode_required::<Req>(action, Direction::Request, payload)?;
    let response = handler(request);
    codec.encode(action, Direction::Response, &response)
}

fn not_handled(version: OcppVersion, action: Action) -> CodecError {
    CodecError::UnsupportedAction {
        version,
        action: action.name().to_string(),
        known: true,
    }
}

pub struct CentralSystem {
    v16: ActionPayloadCodec,
    v201: ActionPayloadCodec,
    queue: SharedActionMessageQueue,
    charge_points: SharedChargePointManager,
    sessions: SharedChargeSessionManager,
    transport: Arc<dyn MessageTransport>,
    settings: DispatchSettings,
    message_counter: AtomicU64,
}

impl CentralSystem {
    /// Build the action catalogs, check the error code tables and wire the
    /// managers together.
    pub fn new(
        queue: SharedActionMessageQueue,
        charge_points: SharedChargePointManager,
        sessions: SharedChargeSessionManager,
        transport: Arc<dyn MessageTransport>,
        settings: DispatchSettings,
    ) -> Result<Self, StartupError> {
        for version in OcppVersion::ALL {
            ErrorCodeResolver::for_version(*version).verify()?;
        }

        let v16 = ActionPayloadCodec::new(Arc::new(catalog::v16()?));
        let v201 = ActionPayloadCodec::new(Arc::new(catalog::v201()?));
        info!(
            v16_actions = v16.catalog().actions().len(),
            v201_actions = v201.catalog().actions().len(),
            "Action catalogs loaded"
        );

        Ok(Self {
            v16,
            v201,
            queue,
            charge_points,
            sessions,
            transport,
            settings,
            message_counter: AtomicU64::new(1),
        })
    }

    pub fn codec(&self, version: OcppVersion) -> &ActionPayloadCodec {
        match version {
            OcppVersion::V16 => &self.v16,
            OcppVersion::V201 => &self.v201,
        }
    }

    pub fn queue(&self) -> &SharedActionMessageQueue {
        &self.queue
    }

    pub fn charge_points(&self) -> &SharedChargePointManager {
        &self.charge_points
    }

    pub fn sessions(&self) -> &SharedChargeSessionManager {
        &self.sessions
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    // ── Inbound ────────────────────────────────────────────

    /// Handle one text frame from `client`. Returns the frame to send back,
    /// if any.
    pub fn handle_text(&self, client: &ClientIdentity, text: &str) -> Option<String> {
        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    charge_point_id = client.charge_point_id(),
                    error = %e,
                    raw = text,
                    "Malformed OCPP-J frame"
                );
                // malformed CallResult and CallError frames get no reply
                let unique_id = OcppFrame::recover_unique_id(text)?;
                let failure = CallFailure::new(e.rpc_error(), e.to_string());
                return Some(self.call_error(client, unique_id, failure));
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => Some(self.handle_call(client, unique_id, &action, &payload)),

            OcppFrame::CallResult { unique_id, payload } => {
                self.handle_call_result(client, &unique_id, payload);
                None
            }

            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                self.handle_call_error(client, &unique_id, &error_code, error_description, error_details);
                None
            }
        }
    }

    fn handle_call(
        &self,
        client: &ClientIdentity,
        unique_id: String,
        action: &str,
        payload: &Value,
    ) -> String {
        debug!(
            charge_point_id = client.charge_point_id(),
            message_id = unique_id.as_str(),
            action,
            "Received Call"
        );
        metrics::counter!("ocpp_calls_total", "action" => action.to_string()).increment(1);

        match self.process_call(client, action, payload) {
            Ok(payload) => OcppFrame::CallResult { unique_id, payload }.serialize(),
            Err(failure) => {
                warn!(
                    charge_point_id = client.charge_point_id(),
                    message_id = unique_id.as_str(),
                    action,
                    code = %failure.code,
                    error = failure.description.as_str(),
                    "Call rejected"
                );
                self.call_error(client, unique_id, failure)
            }
        }
    }

    fn process_call(
        &self,
        client: &ClientIdentity,
        action: &str,
        payload: &Value,
    ) -> Result<Value, CallFailure> {
        let codec = self.codec(client.protocol);
        let action = codec.resolve(action)?;

        if requires_accepted_registration(action)
            && !self.charge_points.is_charge_point_registration_accepted(client)
        {
            return Err(CallFailure::new(
                RpcErrorCode::SecurityError,
                format!("{} requires an accepted registration", action),
            ));
        }

        let response = match client.protocol {
            OcppVersion::V16 => v16::handle(self, client, codec, action, Some(payload)),
            OcppVersion::V201 => v201::handle(self, client, codec, action, Some(payload)),
        }?;
        Ok(response)
    }

    fn call_error(&self, client: &ClientIdentity, unique_id: String, failure: CallFailure) -> String {
        let code = ErrorCodeResolver::for_version(client.protocol).error_code_for_rpc_error(failure.code);
        metrics::counter!("ocpp_call_errors_total", "code" => code.name()).increment(1);
        OcppFrame::CallError {
            unique_id,
            error_code: code.name().to_string(),
            error_description: failure.description,
            error_details: failure.details,
        }
        .serialize()
    }

    fn handle_call_result(&self, client: &ClientIdentity, unique_id: &str, payload: Value) {
        match self.queue.poll_pending_message_by_id(client, unique_id) {
            Some(pending) => {
                debug!(
                    charge_point_id = client.charge_point_id(),
                    message_id = unique_id,
                    action = pending.action.name(),
                    "Received CallResult"
                );
                if !pending.complete(Ok(payload)) {
                    debug!(message_id = unique_id, "Nobody waiting for CallResult");
                }
            }
            None => warn!(
                charge_point_id = client.charge_point_id(),
                message_id = unique_id,
                "CallResult for unknown request"
            ),
        }
    }

    fn handle_call_error(
        &self,
        client: &ClientIdentity,
        unique_id: &str,
        error_code: &str,
        description: String,
        details: Value,
    ) {
        let resolver = ErrorCodeResolver::for_version(client.protocol);
        let code = match resolver.error_code_for_name(error_code) {
            Ok(code) => code,
            Err(e) => {
                warn!(
                    charge_point_id = client.charge_point_id(),
                    message_id = unique_id,
                    error = %e,
                    "CallError with unknown error code"
                );
                resolver.error_code_for_rpc_error(RpcErrorCode::GenericError)
            }
        };

        match self.queue.poll_pending_message_by_id(client, unique_id) {
            Some(pending) => {
                warn!(
                    charge_point_id = client.charge_point_id(),
                    message_id = unique_id,
                    action = pending.action.name(),
                    code = code.name(),
                    description = description.as_str(),
                    "Received CallError"
                );
                pending.complete(Err(RequestError::CallError {
                    code: code.name().to_string(),
                    description,
                    details,
                }));
            }
            None => warn!(
                charge_point_id = client.charge_point_id(),
                message_id = unique_id,
                code = code.name(),
                "CallError for unknown request"
            ),
        }
    }

    /// Drop the pending requests of a client whose connection went away,
    /// along with status reports it sent without booting.
    pub fn client_disconnected(&self, client: &ClientIdentity) {
        self.charge_points.discard_early_statuses(client);
        let discarded = self.queue.discard_client(client);
        if !discarded.is_empty() {
            info!(
                charge_point_id = client.charge_point_id(),
                count = discarded.len(),
                "Discarding pending requests of closed connection"
            );
        }
        for pending in discarded {
            pending.complete(Err(RequestError::Discarded));
        }
    }

    // ── Outbound ───────────────────────────────────────────

    fn next_message_id(&self) -> String {
        format!("CS-{}", self.message_counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Send a request to `client` and wait for its decoded response.
    pub async fn send_request<Req, Resp>(
        &self,
        client: &ClientIdentity,
        action: Action,
        request: &Req,
    ) -> Result<Resp, RequestError>
    where
        Req: Serialize + 'static,
        Resp: DeserializeOwned + 'static,
    {
        let codec = self.codec(client.protocol);
        let payload = codec
            .encode(action, Direction::Request, request)
            .map_err(|e| RequestError::InvalidRequest(e.to_string()))?;

        let message_id = self.next_message_id();
        let (pending, reply) =
            PendingActionMessage::new(client.clone(), message_id.clone(), action, payload.clone())
                .awaiting_reply();
        self.queue.add_pending_message(pending);

        let frame = OcppFrame::Call {
            unique_id: message_id.clone(),
            action: action.name().to_string(),
            payload,
        }
        .serialize();

        info!(
            charge_point_id = client.charge_point_id(),
            message_id = message_id.as_str(),
            action = action.name(),
            "Sending request"
        );

        let started = Instant::now();
        if let Err(e) = self.transport.send(client, frame).await {
            self.queue.poll_pending_message_by_id(client, &message_id);
            return Err(match e {
                TransportError::NotConnected(_) => RequestError::NotConnected(client.to_string()),
                other => RequestError::SendFailed(other.to_string()),
            });
        }

        let outcome = match tokio::time::timeout(self.settings.response_timeout, reply).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RequestError::Discarded),
            Err(_) => {
                self.queue.poll_pending_message_by_id(client, &message_id);
                warn!(
                    charge_point_id = client.charge_point_id(),
                    message_id = message_id.as_str(),
                    action = action.name(),
                    "Request timed out"
                );
                Err(RequestError::Timeout)
            }
        };
        metrics::histogram!("ocpp_command_latency_seconds", "action" => action.name())
            .record(started.elapsed().as_secs_f64());

        let payload = outcome?;
        codec
            .decode_required::<Resp>(action, Direction::Response, Some(&payload))
            .map_err(|e| RequestError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::charge_point::{ChargePointManager, StaticRegistrationPolicy};
    use crate::application::ports::recorder::RecordingTransport;
    use crate::application::queue::ActionMessageQueue;
    use crate::application::session::{ChargeSessionManager, InMemoryIdTagStore};
    use crate::domain::{AuthorizationStatus, RegistrationStatus};
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) struct Harness {
        pub central: Arc<CentralSystem>,
        pub transport: Arc<RecordingTransport>,
        pub outbox: UnboundedReceiver<(ClientIdentity, String)>,
    }

    pub(crate) fn harness() -> Harness {
        harness_with(RegistrationStatus::Accepted, Duration::from_secs(5))
    }

    pub(crate) fn harness_with(status: RegistrationStatus, timeout: Duration) -> Harness {
        let tags = InMemoryIdTagStore::new(false);
        tags.set_status("GOOD", AuthorizationStatus::Accepted);
        tags.set_status("BLOCKED", AuthorizationStatus::Blocked);

        let (transport, outbox) = RecordingTransport::new();
        let transport = Arc::new(transport);
        let central = CentralSystem::new(
            ActionMessageQueue::shared(),
            Arc::new(ChargePointManager::new(Arc::new(StaticRegistrationPolicy::new(status)))),
            Arc::new(ChargeSessionManager::new(Arc::new(tags))),
            transport.clone(),
            DispatchSettings {
                heartbeat_interval_secs: 120,
                response_timeout: timeout,
            },
        )
        .unwrap();

        Harness {
            central: Arc::new(central),
            transport,
            outbox,
        }
    }

    /// Send a Call and return the parsed reply frame.
    pub(crate) fn call(central: &CentralSystem, client: &ClientIdentity, action: &str, payload: Value) -> OcppFrame {
        let text = json!([2, "m-1", action, payload]).to_string();
        let reply = central.handle_text(client, &text).unwrap();
        OcppFrame::parse(&reply).unwrap()
    }

    pub(crate) fn result_payload(frame: OcppFrame) -> Value {
        match frame {
            OcppFrame::CallResult { payload, .. } => payload,
            other => panic!("expected CallResult, got {other:?}"),
        }
    }

    pub(crate) fn error_code(frame: OcppFrame) -> String {
        match frame {
            OcppFrame::CallError { error_code, .. } => error_code,
            other => panic!("expected CallError, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frames() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");

        assert!(h.central.handle_text(&cp, "not json").is_none());

        let reply = h.central.handle_text(&cp, r#"[2,"id-7",17,{}]"#).unwrap();
        let frame = OcppFrame::parse(&reply).unwrap();
        assert_eq!(frame.unique_id(), "id-7");
        assert_eq!(error_code(frame), "FormationViolation");

        let cp201 = ClientIdentity::v201("CP001");
        let reply = h.central.handle_text(&cp201, r#"[9,"id-8"]"#).unwrap();
        assert_eq!(error_code(OcppFrame::parse(&reply).unwrap()), "MessageTypeNotSupported");
    }

    #[test]
    fn test_malformed_replies_are_not_answered() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        assert!(h.central.handle_text(&cp, r#"[4,"CS-1",17]"#).is_none());
        assert!(h.central.handle_text(&cp, r#"[3,17,{}]"#).is_none());

        let cp201 = ClientIdentity::v201("CP001");
        assert!(h.central.handle_text(&cp201, r#"[4,"CS-1",17]"#).is_none());
    }

    #[test]
    fn test_unknown_and_unsupported_actions() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        assert_eq!(error_code(call(&h.central, &cp, "FlyToTheMoon", json!({}))), "NotImplemented");
        assert_eq!(error_code(call(&h.central, &cp, "TransactionEvent", json!({}))), "NotSupported");

        // CS-initiated action sent by the station
        assert_eq!(error_code(call(&h.central, &cp, "Reset", json!({"type": "Soft"}))), "NotSupported");
    }

    #[test]
    fn test_schema_violation_reply() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        let frame = call(&h.central, &cp, "BootNotification", json!({"chargePointVendor": "ACME"}));
        match frame {
            OcppFrame::CallError {
                error_code,
                error_description,
                error_details,
                ..
            } => {
                assert_eq!(error_code, "OccurenceConstraintViolation");
                assert!(error_description.contains("chargePointModel"));
                assert_eq!(error_details["violations"][0]["pointer"], "/chargePointModel");
            }
            other => panic!("expected CallError, got {other:?}"),
        }

        let cp201 = ClientIdentity::v201("CP001");
        let frame = call(&h.central, &cp201, "BootNotification", json!({}));
        assert_eq!(error_code(frame), "OccurrenceConstraintViolation");
    }

    #[test]
    fn test_transaction_actions_require_accepted_registration() {
        let h = harness_with(RegistrationStatus::Pending, Duration::from_secs(5));
        let cp = ClientIdentity::v16("CP001");

        let frame = call(&h.central, &cp, "Authorize", json!({"idTag": "GOOD"}));
        assert_eq!(error_code(frame), "SecurityError");

        let boot = result_payload(call(
            &h.central,
            &cp,
            "BootNotification",
            json!({"chargePointVendor": "ACME", "chargePointModel": "X"}),
        ));
        assert_eq!(boot["status"], "Pending");

        // still pending
        let frame = call(&h.central, &cp, "Authorize", json!({"idTag": "GOOD"}));
        assert_eq!(error_code(frame), "SecurityError");

        // always processed
        result_payload(call(&h.central, &cp, "Heartbeat", json!({})));

        h.central
            .charge_points()
            .set_registration_status(&cp, RegistrationStatus::Accepted);
        let auth = result_payload(call(&h.central, &cp, "Authorize", json!({"idTag": "GOOD"})));
        assert_eq!(auth["idTagInfo"]["status"], "Accepted");
    }

    #[tokio::test]
    async fn test_send_request_round_trip() {
        use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
        use rust_ocpp::v1_6::types::ResetRequestStatus;

        let mut h = harness();
        let cp = ClientIdentity::v16("CP001");

        let central = h.central.clone();
        let client = cp.clone();
        let request = tokio::spawn(async move {
            central
                .send_request::<ResetRequest, ResetResponse>(
                    &client,
                    Action::Reset,
                    &ResetRequest {
                        kind: ResetRequestStatus::Hard,
                    },
                )
                .await
        });

        let (to, text) = h.outbox.recv().await.unwrap();
        assert_eq!(to, cp);
        let frame = OcppFrame::parse(&text).unwrap();
        let unique_id = frame.unique_id().to_string();
        assert!(unique_id.starts_with("CS-"));
        match &frame {
            OcppFrame::Call { action, payload, .. } => {
                assert_eq!(action, "Reset");
                assert_eq!(payload, &json!({"type": "Hard"}));
            }
            other => panic!("expected Call, got {other:?}"),
        }
        assert!(h.central.queue().pending_message_queue(&cp).contains(&unique_id));

        let reply = json!([3, unique_id, {"status": "Accepted"}]).to_string();
        assert!(h.central.handle_text(&cp, &reply).is_none());

        let response = request.await.unwrap().unwrap();
        assert_eq!(wire_name(&response.status), "Accepted");
        assert!(h.central.queue().pending_message_queue(&cp).is_empty());
    }

    #[tokio::test]
    async fn test_send_request_call_error_and_unknown_code() {
        use rust_ocpp::v2_0_1::messages::request_stop_transaction::{
            RequestStopTransactionRequest, RequestStopTransactionResponse,
        };

        let mut h = harness();
        let cp = ClientIdentity::v201("CP001");

        for (sent_code, expected) in [("InternalError", "InternalError"), ("Bogus", "GenericError")] {
            let central = h.central.clone();
            let client = cp.clone();
            let request = tokio::spawn(async move {
                central
                    .send_request::<RequestStopTransactionRequest, RequestStopTransactionResponse>(
                        &client,
                        Action::RequestStopTransaction,
                        &RequestStopTransactionRequest {
                            transaction_id: "tx-1".into(),
                        },
                    )
                    .await
            });

            let (_, text) = h.outbox.recv().await.unwrap();
            let unique_id = OcppFrame::parse(&text).unwrap().unique_id().to_string();
            let reply = json!([4, unique_id, sent_code, "nope", {}]).to_string();
            h.central.handle_text(&cp, &reply);

            match request.await.unwrap() {
                Err(RequestError::CallError { code, description, .. }) => {
                    assert_eq!(code, expected);
                    assert_eq!(description, "nope");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_request_failures() {
        use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
        use rust_ocpp::v1_6::types::ResetRequestStatus;

        let h = harness_with(RegistrationStatus::Accepted, Duration::from_millis(50));
        let cp = ClientIdentity::v16("CP001");
        let request = ResetRequest {
            kind: ResetRequestStatus::Soft,
        };

        let err = h
            .central
            .send_request::<ResetRequest, ResetResponse>(&cp, Action::Reset, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Timeout));
        assert!(h.central.queue().pending_message_queue(&cp).is_empty());

        h.transport.disconnect(&cp);
        let err = h
            .central
            .send_request::<ResetRequest, ResetResponse>(&cp, Action::Reset, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::NotConnected(_)));
        assert!(h.central.queue().pending_message_queue(&cp).is_empty());

        // action not carried by 1.6
        let err = h
            .central
            .send_request::<ResetRequest, ResetResponse>(&cp, Action::RequestStopTransaction, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_invalid_response_payload() {
        use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
        use rust_ocpp::v1_6::types::ResetRequestStatus;

        let mut h = harness();
        let cp = ClientIdentity::v16("CP001");
        let central = h.central.clone();
        let client = cp.clone();
        let request = tokio::spawn(async move {
            central
                .send_request::<ResetRequest, ResetResponse>(
                    &client,
                    Action::Reset,
                    &ResetRequest {
                        kind: ResetRequestStatus::Soft,
                    },
                )
                .await
        });

        let (_, text) = h.outbox.recv().await.unwrap();
        let unique_id = OcppFrame::parse(&text).unwrap().unique_id().to_string();
        h.central
            .handle_text(&cp, &json!([3, unique_id, {"status": "Maybe"}]).to_string());

        assert!(matches!(
            request.await.unwrap(),
            Err(RequestError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_discards_pending() {
        use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
        use rust_ocpp::v1_6::types::ResetRequestStatus;

        let mut h = harness();
        let cp = ClientIdentity::v16("CP001");
        let central = h.central.clone();
        let client = cp.clone();
        let request = tokio::spawn(async move {
            central
                .send_request::<ResetRequest, ResetResponse>(
                    &client,
                    Action::Reset,
                    &ResetRequest {
                        kind: ResetRequestStatus::Soft,
                    },
                )
                .await
        });

        h.outbox.recv().await.unwrap();
        h.central.client_disconnected(&cp);
        assert!(matches!(request.await.unwrap(), Err(RequestError::Discarded)));
    }

    #[test]
    fn test_disconnect_forgets_statuses_of_unbooted_client() {
        let h = harness();
        let cp = ClientIdentity::v16("CP-NOBOOT");
        let status = json!({"connectorId": 1, "errorCode": "NoError", "status": "Available"});
        result_payload(call(&h.central, &cp, "StatusNotification", status));

        h.central.client_disconnected(&cp);
        assert_eq!(h.central.charge_points().discard_early_statuses(&cp), 0);

        let boot = json!({"chargePointVendor": "ACME", "chargePointModel": "X"});
        result_payload(call(&h.central, &cp, "BootNotification", boot));
        let registration = h.central.charge_points().get_registration(&cp).unwrap();
        assert!(registration.connector(0, 1).is_none());
    }

    #[test]
    fn test_result_for_unknown_request_is_ignored() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        assert!(h
            .central
            .handle_text(&cp, r#"[3,"CS-999",{"status":"Accepted"}]"#)
            .is_none());
        assert!(h
            .central
            .handle_text(&cp, r#"[4,"CS-999","GenericError","",{}]"#)
            .is_none());
    }
}
