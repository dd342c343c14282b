//! Version-aware commands sent to charge points
//!
//! Each command picks the message type of the client's protocol version
//! and returns the wire status the charge point answered with.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use rust_ocpp::v1_6::messages::remote_start_transaction::{
    RemoteStartTransactionRequest, RemoteStartTransactionResponse,
};
use rust_ocpp::v1_6::messages::remote_stop_transaction::{
    RemoteStopTransactionRequest, RemoteStopTransactionResponse,
};
use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
use rust_ocpp::v1_6::types::ResetRequestStatus;
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use rust_ocpp::v2_0_1::enumerations::id_token_enum_type::IdTokenEnumType;
use rust_ocpp::v2_0_1::enumerations::reset_enum_type::ResetEnumType;
use rust_ocpp::v2_0_1::messages::request_start_transaction::{
    RequestStartTransactionRequest, RequestStartTransactionResponse,
};
use rust_ocpp::v2_0_1::messages::request_stop_transaction::{
    RequestStopTransactionRequest, RequestStopTransactionResponse,
};
use rust_ocpp::v2_0_1::messages::reset as reset_v201;
use tracing::info;

use super::{wire_name, CentralSystem};
use crate::application::queue::RequestError;
use crate::domain::{Action, ClientIdentity, OcppVersion};

/// Reset type (version-agnostic).
///
/// Maps to: v1.6 `Hard`/`Soft`, v2.0.1 `Immediate`/`OnIdle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft,
    Hard,
}

pub struct CommandDispatcher {
    central: Arc<CentralSystem>,
    remote_start_ids: AtomicI32,
}

impl CommandDispatcher {
    pub fn new(central: Arc<CentralSystem>) -> Self {
        Self {
            central,
            remote_start_ids: AtomicI32::new(1),
        }
    }

    /// Ask the charge point to start a transaction for `id_tag`.
    /// `connector_id` is the EVSE id for 2.0.1 stations.
    pub async fn remote_start(
        &self,
        client: &ClientIdentity,
        id_tag: &str,
        connector_id: Option<u32>,
    ) -> Result<String, RequestError> {
        info!(
            charge_point_id = client.charge_point_id(),
            id_tag,
            ?connector_id,
            "Remote start"
        );

        match client.protocol {
            OcppVersion::V16 => {
                let request = RemoteStartTransactionRequest {
                    connector_id: connector_id.and_then(|c| c.try_into().ok()),
                    id_tag: id_tag.to_string(),
                    charging_profile: None,
                };
                let response: RemoteStartTransactionResponse = self
                    .central
                    .send_request(client, Action::RemoteStartTransaction, &request)
                    .await?;
                Ok(wire_name(&response.status))
            }
            OcppVersion::V201 => {
                let request = RequestStartTransactionRequest {
                    evse_id: connector_id.and_then(|c| i32::try_from(c).ok()),
                    remote_start_id: self.remote_start_ids.fetch_add(1, Ordering::SeqCst),
                    id_token: IdTokenType {
                        id_token: id_tag.to_string(),
                        kind: IdTokenEnumType::Central,
                        additional_info: None,
                    },
                    charging_profile: None,
                    group_id_token: None,
                };
                let response: RequestStartTransactionResponse = self
                    .central
                    .send_request(client, Action::RequestStartTransaction, &request)
                    .await?;
                Ok(wire_name(&response.status))
            }
        }
    }

    /// Ask the charge point to stop a transaction. 1.6 transaction ids
    /// must be numeric.
    pub async fn remote_stop(
        &self,
        client: &ClientIdentity,
        transaction_id: &str,
    ) -> Result<String, RequestError> {
        info!(
            charge_point_id = client.charge_point_id(),
            transaction_id,
            "Remote stop"
        );

        match client.protocol {
            OcppVersion::V16 => {
                let transaction_id = transaction_id.parse().map_err(|_| {
                    RequestError::InvalidRequest(format!(
                        "transaction id {} is not numeric",
                        transaction_id
                    ))
                })?;
                let request = RemoteStopTransactionRequest { transaction_id };
                let response: RemoteStopTransactionResponse = self
                    .central
                    .send_request(client, Action::RemoteStopTransaction, &request)
                    .await?;
                Ok(wire_name(&response.status))
            }
            OcppVersion::V201 => {
                let request = RequestStopTransactionRequest {
                    transaction_id: transaction_id.to_string(),
                };
                let response: RequestStopTransactionResponse = self
                    .central
                    .send_request(client, Action::RequestStopTransaction, &request)
                    .await?;
                Ok(wire_name(&response.status))
            }
        }
    }

    pub async fn reset(&self, client: &ClientIdentity, kind: ResetKind) -> Result<String, RequestError> {
        info!(charge_point_id = client.charge_point_id(), ?kind, "Reset");

        match client.protocol {
            OcppVersion::V16 => {
                let kind = match kind {
                    ResetKind::Soft => ResetRequestStatus::Soft,
                    ResetKind::Hard => ResetRequestStatus::Hard,
                };
                let response: ResetResponse = self
                    .central
                    .send_request(client, Action::Reset, &ResetRequest { kind })
                    .await?;
                Ok(wire_name(&response.status))
            }
            OcppVersion::V201 => {
                let request_type = match kind {
                    ResetKind::Hard => ResetEnumType::Immediate,
                    ResetKind::Soft => ResetEnumType::OnIdle,
                };
                let request = reset_v201::ResetRequest {
                    request_type,
                    evse_id: None,
                };
                let response: reset_v201::ResetResponse = self
                    .central
                    .send_request(client, Action::Reset, &request)
                    .await?;
                Ok(wire_name(&response.status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::harness;
    use super::*;
    use crate::support::ocpp_frame::OcppFrame;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Play the charge point: read the next Call, answer it with `reply`.
    async fn answer(
        central: &CentralSystem,
        outbox: &mut UnboundedReceiver<(ClientIdentity, String)>,
        reply: Value,
    ) -> (String, Value) {
        let (client, text) = outbox.recv().await.unwrap();
        let (unique_id, action, payload) = match OcppFrame::parse(&text).unwrap() {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => (unique_id, action, payload),
            other => panic!("expected Call, got {other:?}"),
        };
        let result = json!([3, unique_id, reply]).to_string();
        central.handle_text(&client, &result);
        (action, payload)
    }

    #[tokio::test]
    async fn test_remote_start_per_version() {
        let mut h = harness();
        let commands = Arc::new(CommandDispatcher::new(h.central.clone()));

        let cp = ClientIdentity::v16("CP001");
        let task = {
            let commands = commands.clone();
            let cp = cp.clone();
            tokio::spawn(async move { commands.remote_start(&cp, "GOOD", Some(2)).await })
        };
        let (action, payload) = answer(&h.central, &mut h.outbox, json!({"status": "Accepted"})).await;
        assert_eq!(action, "RemoteStartTransaction");
        assert_eq!(payload["idTag"], "GOOD");
        assert_eq!(payload["connectorId"], 2);
        assert_eq!(task.await.unwrap().unwrap(), "Accepted");

        let cs = ClientIdentity::v201("CS-1");
        for expected_id in [1, 2] {
            let task = {
                let commands = commands.clone();
                let cs = cs.clone();
                tokio::spawn(async move { commands.remote_start(&cs, "GOOD", None).await })
            };
            let (action, payload) =
                answer(&h.central, &mut h.outbox, json!({"status": "Rejected"})).await;
            assert_eq!(action, "RequestStartTransaction");
            assert_eq!(payload["remoteStartId"], expected_id);
            assert_eq!(payload["idToken"]["type"], "Central");
            assert_eq!(task.await.unwrap().unwrap(), "Rejected");
        }
    }

    #[tokio::test]
    async fn test_remote_stop() {
        let mut h = harness();
        let commands = Arc::new(CommandDispatcher::new(h.central.clone()));
        let cp = ClientIdentity::v16("CP001");

        let err = commands.remote_stop(&cp, "tx-abc").await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidRequest(_)));

        let task = {
            let commands = commands.clone();
            let cp = cp.clone();
            tokio::spawn(async move { commands.remote_stop(&cp, "42").await })
        };
        let (action, payload) = answer(&h.central, &mut h.outbox, json!({"status": "Accepted"})).await;
        assert_eq!(action, "RemoteStopTransaction");
        assert_eq!(payload, json!({"transactionId": 42}));
        assert_eq!(task.await.unwrap().unwrap(), "Accepted");

        let cs = ClientIdentity::v201("CS-1");
        let task = {
            let commands = commands.clone();
            let cs = cs.clone();
            tokio::spawn(async move { commands.remote_stop(&cs, "tx-abc").await })
        };
        let (action, payload) = answer(&h.central, &mut h.outbox, json!({"status": "Accepted"})).await;
        assert_eq!(action, "RequestStopTransaction");
        assert_eq!(payload, json!({"transactionId": "tx-abc"}));
        assert_eq!(task.await.unwrap().unwrap(), "Accepted");
    }

    #[tokio::test]
    async fn test_reset_maps_kinds() {
        let mut h = harness();
        let commands = Arc::new(CommandDispatcher::new(h.central.clone()));

        let cases = [
            (ClientIdentity::v16("CP001"), ResetKind::Soft, "Soft"),
            (ClientIdentity::v201("CS-1"), ResetKind::Hard, "Immediate"),
            (ClientIdentity::v201("CS-1"), ResetKind::Soft, "OnIdle"),
        ];
        for (client, kind, wire) in cases {
            let task = {
                let commands = commands.clone();
                tokio::spawn(async move { commands.reset(&client, kind).await })
            };
            let (action, payload) =
                answer(&h.central, &mut h.outbox, json!({"status": "Accepted"})).await;
            assert_eq!(action, "Reset");
            assert_eq!(payload["type"], wire);
            assert_eq!(task.await.unwrap().unwrap(), "Accepted");
        }
    }

    #[tokio::test]
    async fn test_command_to_disconnected_client() {
        let h = harness();
        let commands = CommandDispatcher::new(h.central.clone());
        let cp = ClientIdentity::v16("CP009");
        h.transport.disconnect(&cp);

        let err = commands.reset(&cp, ResetKind::Hard).await.unwrap_err();
        assert!(matches!(err, RequestError::NotConnected(_)));
        assert!(h.central.queue().pending_message_queue(&cp).is_empty());
    }
}
