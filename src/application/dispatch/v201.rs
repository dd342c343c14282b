//! OCPP 2.0.1 action handlers
//!
//! `TransactionEvent` carries the whole transaction lifecycle: `Started`
//! opens a session under the station's transaction id, `Updated` appends
//! readings and `Ended` closes it. Sessions are keyed by EVSE; the
//! connector inside the EVSE is not tracked separately.

use chrono::Utc;
use rust_ocpp::v2_0_1::datatypes::id_token_info_type::IdTokenInfoType;
use rust_ocpp::v2_0_1::datatypes::meter_value_type::MeterValueType;
use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::data_transfer_status_enum_type::DataTransferStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::registration_status_enum_type::RegistrationStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::transaction_event_enum_type::TransactionEventEnumType;
use rust_ocpp::v2_0_1::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v2_0_1::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v2_0_1::messages::datatransfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v2_0_1::messages::heartbeat::{HeartbeatRequest, HeartbeatResponse};
use rust_ocpp::v2_0_1::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v2_0_1::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v2_0_1::messages::transaction_event::{
    TransactionEventRequest, TransactionEventResponse,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{exchange, not_handled, wire_name, CentralSystem};
use crate::application::codec::{ActionPayloadCodec, CodecError};
use crate::application::session::SessionError;
use crate::domain::{
    Action, AuthorizationInfo, AuthorizationStatus, ChargePointInfo, ClientIdentity,
    ConnectorStatusSnapshot, OcppVersion, RegistrationStatus, SampledValue, SessionEndInfo,
    SessionStartInfo,
};

/// EVSE assumed when a transaction event names none
const DEFAULT_EVSE: u32 = 1;

pub(super) fn handle(
    cs: &CentralSystem,
    client: &ClientIdentity,
    codec: &ActionPayloadCodec,
    action: Action,
    payload: Option<&Value>,
) -> Result<Value, CodecError> {
    match action {
        Action::BootNotification => exchange(codec, action, payload, |req| boot_notification(cs, client, req)),
        Action::Heartbeat => exchange(codec, action, payload, |_: HeartbeatRequest| heartbeat(cs, client)),
        Action::Authorize => exchange(codec, action, payload, |req| authorize(cs, client, req)),
        Action::StatusNotification => {
            exchange(codec, action, payload, |req| status_notification(cs, client, req))
        }
        Action::MeterValues => exchange(codec, action, payload, |req| meter_values(cs, client, req)),
        Action::TransactionEvent => {
            exchange(codec, action, payload, |req| transaction_event(cs, client, req))
        }
        Action::DataTransfer => exchange(codec, action, payload, |req| data_transfer(client, req)),
        other => Err(not_handled(OcppVersion::V201, other)),
    }
}

fn registration_status(status: RegistrationStatus) -> RegistrationStatusEnumType {
    match status {
        RegistrationStatus::Accepted => RegistrationStatusEnumType::Accepted,
        RegistrationStatus::Pending => RegistrationStatusEnumType::Pending,
        RegistrationStatus::Rejected => RegistrationStatusEnumType::Rejected,
    }
}

fn id_token_info(info: &AuthorizationInfo) -> IdTokenInfoType {
    let status = match info.status {
        AuthorizationStatus::Accepted => AuthorizationStatusEnumType::Accepted,
        AuthorizationStatus::Blocked => AuthorizationStatusEnumType::Blocked,
        AuthorizationStatus::Expired => AuthorizationStatusEnumType::Expired,
        AuthorizationStatus::Invalid => AuthorizationStatusEnumType::Invalid,
        AuthorizationStatus::ConcurrentTx => AuthorizationStatusEnumType::ConcurrentTx,
    };
    IdTokenInfoType {
        status,
        cache_expiry_date_time: info.expiry_date,
        charging_priority: None,
        language1: None,
        evse_id: None,
        language2: None,
        group_id_token: None,
        personal_message: None,
    }
}

fn readings(meter_values: &[MeterValueType]) -> Vec<SampledValue> {
    meter_values
        .iter()
        .flat_map(|mv| {
            mv.sampled_value.iter().map(move |s| SampledValue {
                timestamp: mv.timestamp,
                measurand: s.measurand.as_ref().map(wire_name),
                value: s.value.to_string(),
                unit: s.unit_of_measure.as_ref().and_then(|u| u.unit.clone()),
                context: s.context.as_ref().map(wire_name),
                phase: s.phase.as_ref().map(wire_name),
                location: s.location.as_ref().map(wire_name),
            })
        })
        .collect()
}

/// Last energy register value among `readings`, in Wh.
fn energy_register(readings: &[SampledValue]) -> Option<i64> {
    readings.iter().rev().find_map(SampledValue::energy_register_wh)
}

fn boot_notification(
    cs: &CentralSystem,
    client: &ClientIdentity,
    req: BootNotificationRequest,
) -> BootNotificationResponse {
    let station = req.charging_station;
    let (iccid, imsi) = match station.modem {
        Some(modem) => (modem.iccid, modem.imsi),
        None => (None, None),
    };
    let info = ChargePointInfo {
        vendor: station.vendor_name,
        model: station.model,
        serial_number: station.serial_number,
        firmware_version: station.firmware_version,
        iccid,
        imsi,
        meter_type: None,
        meter_serial_number: None,
    };
    debug!(
        charge_point_id = client.charge_point_id(),
        reason = wire_name(&req.reason).as_str(),
        "Boot reason"
    );
    let registration = cs.charge_points().register_charge_point(client, info);

    let status = if registration.disabled {
        RegistrationStatus::Rejected
    } else {
        registration.status
    };
    BootNotificationResponse {
        current_time: Utc::now(),
        interval: cs
            .settings()
            .heartbeat_interval_secs
            .try_into()
            .unwrap_or(300),
        status: registration_status(status),
        status_info: None,
    }
}

fn heartbeat(cs: &CentralSystem, client: &ClientIdentity) -> HeartbeatResponse {
    if !cs.charge_points().heartbeat(client) {
        debug!(charge_point_id = client.charge_point_id(), "Heartbeat before BootNotification");
    }
    HeartbeatResponse {
        current_time: Utc::now(),
    }
}

fn authorize(cs: &CentralSystem, client: &ClientIdentity, req: AuthorizeRequest) -> AuthorizeResponse {
    let id_token = req.id_token.id_token;
    let info = cs.sessions().authorizer().authorize(client, &id_token);
    info!(
        charge_point_id = client.charge_point_id(),
        id_token = id_token.as_str(),
        status = %info.status,
        "Authorize"
    );
    AuthorizeResponse {
        certificate_status: None,
        id_token_info: id_token_info(&info),
    }
}

fn status_notification(
    cs: &CentralSystem,
    client: &ClientIdentity,
    req: StatusNotificationRequest,
) -> StatusNotificationResponse {
    let snapshot = ConnectorStatusSnapshot {
        evse_id: Some(u32::try_from(req.evse_id).unwrap_or(0)),
        connector_id: u32::try_from(req.connector_id).unwrap_or(0),
        status: wire_name(&req.connector_status),
        error_code: None,
        info: None,
        vendor_id: None,
        vendor_error_code: None,
        timestamp: req.timestamp,
    };
    cs.charge_points().update_charge_point_status(client, snapshot);
    StatusNotificationResponse {}
}

fn meter_values(cs: &CentralSystem, client: &ClientIdentity, req: MeterValuesRequest) -> MeterValuesResponse {
    let evse_id = u32::try_from(req.evse_id).unwrap_or(0);
    // EVSE 0 is the main meter
    if evse_id == 0 {
        debug!(charge_point_id = client.charge_point_id(), "Main meter values ignored");
        return MeterValuesResponse {};
    }

    let values = readings(&req.meter_value);
    if let Err(e) = cs
        .sessions()
        .add_charging_session_readings(client, Some(evse_id), None, values)
    {
        warn!(
            charge_point_id = client.charge_point_id(),
            evse_id,
            error = %e,
            "Meter values not attributed to a session"
        );
    }
    MeterValuesResponse {}
}

fn transaction_event(
    cs: &CentralSystem,
    client: &ClientIdentity,
    req: TransactionEventRequest,
) -> TransactionEventResponse {
    let transaction_id = req.transaction_info.transaction_id.clone();
    let id_token = req.id_token.as_ref().map(|t| t.id_token.clone());
    let values = req.meter_value.as_deref().map(readings).unwrap_or_default();

    info!(
        charge_point_id = client.charge_point_id(),
        event_type = wire_name(&req.event_type).as_str(),
        trigger_reason = wire_name(&req.trigger_reason).as_str(),
        transaction_id = transaction_id.as_str(),
        "TransactionEvent"
    );

    let authorization = match req.event_type {
        TransactionEventEnumType::Started => {
            let evse_id = req
                .evse
                .as_ref()
                .and_then(|e| u32::try_from(e.id).ok())
                .unwrap_or(DEFAULT_EVSE);
            let mut start = SessionStartInfo::new(client.clone(), evse_id)
                .with_transaction_id(transaction_id.clone());
            start.evse_id = Some(evse_id);
            start.timestamp = req.timestamp;
            start.reservation_id = req.reservation_id.and_then(|r| i32::try_from(r).ok());
            start.meter_start = energy_register(&values);
            start.id_tag = id_token.clone();

            match cs.sessions().start_charging_session(start) {
                Ok(session) => {
                    if !values.is_empty() {
                        append_readings(cs, client, &transaction_id, values);
                    }
                    session.authorization
                }
                Err(SessionError::Authorization { info, .. }) => Some(info),
                Err(e) => {
                    warn!(
                        charge_point_id = client.charge_point_id(),
                        transaction_id = transaction_id.as_str(),
                        error = %e,
                        "Transaction start refused"
                    );
                    let status = match e {
                        SessionError::ConnectorBusy { .. } => AuthorizationStatus::ConcurrentTx,
                        _ => AuthorizationStatus::Invalid,
                    };
                    id_token.as_ref().map(|_| AuthorizationInfo::with_status(status))
                }
            }
        }

        TransactionEventEnumType::Updated => {
            if !values.is_empty() {
                append_readings(cs, client, &transaction_id, values);
            }
            authorize_token(cs, client, id_token.as_deref())
        }

        TransactionEventEnumType::Ended => {
            let meter_stop = energy_register(&values);
            if !values.is_empty() {
                append_readings(cs, client, &transaction_id, values);
            }

            let mut end = SessionEndInfo::new(client.clone(), transaction_id.clone());
            end.timestamp = req.timestamp;
            end.meter_stop = meter_stop;
            end.reason = req.transaction_info.stopped_reason.as_ref().map(wire_name);
            end.id_tag = id_token.clone();

            match cs.sessions().end_charging_session(end) {
                Ok(authorization) => authorization,
                Err(e) => {
                    warn!(
                        charge_point_id = client.charge_point_id(),
                        transaction_id = transaction_id.as_str(),
                        error = %e,
                        "Transaction end for unknown session"
                    );
                    authorize_token(cs, client, id_token.as_deref())
                }
            }
        }
    };

    TransactionEventResponse {
        total_cost: None,
        charging_priority: None,
        id_token_info: authorization.as_ref().map(id_token_info),
        updated_personal_message: None,
    }
}

fn authorize_token(cs: &CentralSystem, client: &ClientIdentity, id_token: Option<&str>) -> Option<AuthorizationInfo> {
    id_token.map(|id_token| cs.sessions().authorizer().authorize(client, id_token))
}

fn append_readings(cs: &CentralSystem, client: &ClientIdentity, transaction_id: &str, values: Vec<SampledValue>) {
    if let Err(e) = cs.sessions().add_transaction_readings(client, transaction_id, values) {
        warn!(
            charge_point_id = client.charge_point_id(),
            transaction_id,
            error = %e,
            "Dropping transaction readings"
        );
    }
}

fn data_transfer(client: &ClientIdentity, req: DataTransferRequest) -> DataTransferResponse {
    info!(
        charge_point_id = client.charge_point_id(),
        vendor_id = req.vendor_id.as_str(),
        message_id = ?req.message_id,
        "DataTransfer"
    );
    DataTransferResponse {
        status: DataTransferStatusEnumType::UnknownVendorId,
        data: None,
        status_info: None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, error_code, harness, result_payload, Harness};
    use crate::domain::ClientIdentity;
    use serde_json::{json, Value};

    fn boot(h: &Harness, cp: &ClientIdentity) {
        let payload = result_payload(call(
            &h.central,
            cp,
            "BootNotification",
            json!({
                "reason": "PowerUp",
                "chargingStation": {
                    "vendorName": "ACME",
                    "model": "Duo-50",
                    "serialNumber": "SN-9",
                    "modem": {"iccid": "8931", "imsi": "2620"}
                }
            }),
        ));
        assert_eq!(payload["status"], "Accepted");
        assert_eq!(payload["interval"], 120);
    }

    fn event(cp: &ClientIdentity, h: &Harness, body: Value) -> Value {
        result_payload(call(&h.central, cp, "TransactionEvent", body))
    }

    fn energy(value: &str, ts: &str) -> Value {
        json!([{
            "timestamp": ts,
            "sampledValue": [{
                "value": value.parse::<i64>().unwrap(),
                "measurand": "Energy.Active.Import.Register",
                "unitOfMeasure": {"unit": "Wh"}
            }]
        }])
    }

    #[test]
    fn test_boot_records_modem() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        boot(&h, &cp);

        let registration = h.central.charge_points().get_registration(&cp).unwrap();
        assert_eq!(registration.info.vendor, "ACME");
        assert_eq!(registration.info.iccid.as_deref(), Some("8931"));
        assert_eq!(registration.info.imsi.as_deref(), Some("2620"));
        // the 1.6 identity with the same id is a different station
        assert!(h.central.charge_points().get_registration(&ClientIdentity::v16("CS-1")).is_none());
    }

    #[test]
    fn test_status_notification_keyed_by_evse() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        boot(&h, &cp);

        result_payload(call(
            &h.central,
            &cp,
            "StatusNotification",
            json!({"timestamp": "2024-05-01T10:00:00Z", "connectorStatus": "Occupied", "evseId": 2, "connectorId": 1}),
        ));
        let registration = h.central.charge_points().get_registration(&cp).unwrap();
        assert_eq!(registration.connector(2, 1).unwrap().status, "Occupied");
        assert!(registration.connector(0, 1).is_none());
    }

    #[test]
    fn test_authorize() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        boot(&h, &cp);

        let payload = result_payload(call(
            &h.central,
            &cp,
            "Authorize",
            json!({"idToken": {"idToken": "GOOD", "type": "ISO14443"}}),
        ));
        assert_eq!(payload["idTokenInfo"]["status"], "Accepted");
    }

    #[test]
    fn test_transaction_lifecycle() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        boot(&h, &cp);

        let started = event(&cp, &h, json!({
            "eventType": "Started",
            "timestamp": "2024-05-01T10:00:00Z",
            "triggerReason": "Authorized",
            "seqNo": 0,
            "transactionInfo": {"transactionId": "tx-abc"},
            "evse": {"id": 1, "connectorId": 1},
            "idToken": {"idToken": "GOOD", "type": "ISO14443"},
            "meterValue": energy("10000", "2024-05-01T10:00:00Z")
        }));
        assert_eq!(started["idTokenInfo"]["status"], "Accepted");

        let session = h.central.sessions().get_active_charging_session(&cp, "tx-abc").unwrap();
        assert_eq!(session.evse_id, Some(1));
        assert_eq!(session.start.meter_start, Some(10000));

        result_payload(call(
            &h.central,
            &cp,
            "MeterValues",
            json!({"evseId": 1, "meterValue": energy("12000", "2024-05-01T10:30:00Z")}),
        ));

        let updated = event(&cp, &h, json!({
            "eventType": "Updated",
            "timestamp": "2024-05-01T10:45:00Z",
            "triggerReason": "MeterValuePeriodic",
            "seqNo": 1,
            "transactionInfo": {"transactionId": "tx-abc", "chargingState": "Charging"},
            "meterValue": energy("13000", "2024-05-01T10:45:00Z")
        }));
        assert!(updated["idTokenInfo"].is_null());

        let ended = event(&cp, &h, json!({
            "eventType": "Ended",
            "timestamp": "2024-05-01T11:00:00Z",
            "triggerReason": "EVCommunicationLost",
            "seqNo": 2,
            "transactionInfo": {"transactionId": "tx-abc", "stoppedReason": "EVDisconnected"},
            "meterValue": energy("15000", "2024-05-01T11:00:00Z")
        }));
        assert!(ended["idTokenInfo"].is_null());

        let session = h.central.sessions().get_charging_session(session.id).unwrap();
        assert!(!session.is_active());
        let values: Vec<_> = session.readings.iter().map(|r| r.energy_register_wh().unwrap()).collect();
        assert_eq!(values, [10000, 12000, 13000, 15000]);
        assert_eq!(session.energy_consumed(), Some(5000));
        assert_eq!(session.end.as_ref().unwrap().reason.as_deref(), Some("EVDisconnected"));
    }

    #[test]
    fn test_start_denials() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        boot(&h, &cp);

        let started = |tx: &str, token: &str| {
            json!({
                "eventType": "Started",
                "timestamp": "2024-05-01T10:00:00Z",
                "triggerReason": "Authorized",
                "seqNo": 0,
                "transactionInfo": {"transactionId": tx},
                "evse": {"id": 1},
                "idToken": {"idToken": token, "type": "ISO14443"}
            })
        };

        let blocked = event(&cp, &h, started("tx-1", "BLOCKED"));
        assert_eq!(blocked["idTokenInfo"]["status"], "Blocked");
        assert!(h.central.sessions().get_active_charging_sessions(Some(&cp)).is_empty());

        event(&cp, &h, started("tx-2", "GOOD"));
        let busy = event(&cp, &h, started("tx-3", "GOOD"));
        assert_eq!(busy["idTokenInfo"]["status"], "ConcurrentTx");
        assert_eq!(h.central.sessions().get_active_charging_sessions(Some(&cp)).len(), 1);
    }

    #[test]
    fn test_remote_started_transaction_without_token() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        boot(&h, &cp);

        let started = event(&cp, &h, json!({
            "eventType": "Started",
            "timestamp": "2024-05-01T10:00:00Z",
            "triggerReason": "RemoteStart",
            "seqNo": 0,
            "transactionInfo": {"transactionId": "tx-r", "remoteStartId": 4},
            "evse": {"id": 2}
        }));
        assert!(started["idTokenInfo"].is_null());
        let session = h.central.sessions().get_active_charging_session(&cp, "tx-r").unwrap();
        assert_eq!(session.start.id_tag, None);
        assert_eq!(session.evse_id, Some(2));
    }

    #[test]
    fn test_main_meter_and_unknown_end_are_confirmed() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        boot(&h, &cp);

        let payload = result_payload(call(
            &h.central,
            &cp,
            "MeterValues",
            json!({"evseId": 0, "meterValue": energy("1", "2024-05-01T10:00:00Z")}),
        ));
        assert_eq!(payload, json!({}));

        let ended = event(&cp, &h, json!({
            "eventType": "Ended",
            "timestamp": "2024-05-01T11:00:00Z",
            "triggerReason": "StopAuthorized",
            "seqNo": 5,
            "transactionInfo": {"transactionId": "ghost"},
            "idToken": {"idToken": "BLOCKED", "type": "ISO14443"}
        }));
        assert_eq!(ended["idTokenInfo"]["status"], "Blocked");
    }

    #[test]
    fn test_transaction_event_requires_accepted_registration() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-2");
        let frame = call(&h.central, &cp, "TransactionEvent", json!({
            "eventType": "Started",
            "timestamp": "2024-05-01T10:00:00Z",
            "triggerReason": "Authorized",
            "seqNo": 0,
            "transactionInfo": {"transactionId": "tx-1"}
        }));
        assert_eq!(error_code(frame), "SecurityError");
    }

    #[test]
    fn test_data_transfer_unknown_vendor() {
        let h = harness();
        let cp = ClientIdentity::v201("CS-1");
        let payload = result_payload(call(&h.central, &cp, "DataTransfer", json!({"vendorId": "com.acme"})));
        assert_eq!(payload["status"], "UnknownVendorId");
    }
}
