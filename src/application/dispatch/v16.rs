//! OCPP 1.6 action handlers

use chrono::Utc;
use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::heart_beat::{HeartbeatRequest, HeartbeatResponse};
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types as ocpp;
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
        Action::StartTransaction => {
            exchange(codec, action, payload, |req| start_transaction(cs, client, req))
        }
        Action::StopTransaction => exchange(codec, action, payload, |req| stop_transaction(cs, client, req)),
        Action::MeterValues => exchange(codec, action, payload, |req| meter_values(cs, client, req)),
        Action::DataTransfer => exchange(codec, action, payload, |req| data_transfer(client, req)),
        other => Err(not_handled(OcppVersion::V16, other)),
    }
}

fn registration_status(status: RegistrationStatus) -> ocpp::RegistrationStatus {
    match status {
        RegistrationStatus::Accepted => ocpp::RegistrationStatus::Accepted,
        RegistrationStatus::Pending => ocpp::RegistrationStatus::Pending,
        RegistrationStatus::Rejected => ocpp::RegistrationStatus::Rejected,
    }
}

fn id_tag_info(info: &AuthorizationInfo) -> ocpp::IdTagInfo {
    let status = match info.status {
        AuthorizationStatus::Accepted => ocpp::AuthorizationStatus::Accepted,
        AuthorizationStatus::Blocked => ocpp::AuthorizationStatus::Blocked,
        AuthorizationStatus::Expired => ocpp::AuthorizationStatus::Expired,
        AuthorizationStatus::Invalid => ocpp::AuthorizationStatus::Invalid,
        AuthorizationStatus::ConcurrentTx => ocpp::AuthorizationStatus::ConcurrentTx,
    };
    ocpp::IdTagInfo {
        status,
        expiry_date: info.expiry_date,
        parent_id_tag: info.parent_id_tag.clone(),
    }
}

fn readings(meter_values: &[ocpp::MeterValue]) -> Vec<SampledValue> {
    meter_values
        .iter()
        .flat_map(|mv| {
            mv.sampled_value.iter().map(move |s| SampledValue {
                timestamp: mv.timestamp,
                measurand: s.measurand.as_ref().map(wire_name),
                value: s.value.clone(),
                unit: s.unit.as_ref().map(wire_name),
                context: s.context.as_ref().map(wire_name),
                phase: s.phase.as_ref().map(wire_name),
                location: s.location.as_ref().map(wire_name),
            })
        })
        .collect()
}

fn boot_notification(
    cs: &CentralSystem,
    client: &ClientIdentity,
    req: BootNotificationRequest,
) -> BootNotificationResponse {
    let info = ChargePointInfo {
        vendor: req.charge_point_vendor,
        model: req.charge_point_model,
        serial_number: req.charge_point_serial_number.or(req.charge_box_serial_number),
        firmware_version: req.firmware_version,
        iccid: req.iccid,
        imsi: req.imsi,
        meter_type: req.meter_type,
        meter_serial_number: req.meter_serial_number,
    };
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
    let info = cs.sessions().authorizer().authorize(client, &req.id_tag);
    info!(
        charge_point_id = client.charge_point_id(),
        id_tag = req.id_tag.as_str(),
        status = %info.status,
        "Authorize"
    );
    AuthorizeResponse {
        id_tag_info: id_tag_info(&info),
    }
}

fn status_notification(
    cs: &CentralSystem,
    client: &ClientIdentity,
    req: StatusNotificationRequest,
) -> StatusNotificationResponse {
    let snapshot = ConnectorStatusSnapshot {
        evse_id: None,
        connector_id: u32::try_from(req.connector_id).unwrap_or(0),
        status: wire_name(&req.status),
        error_code: Some(wire_name(&req.error_code)),
        info: req.info,
        vendor_id: req.vendor_id,
        vendor_error_code: req.vendor_error_code,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
    };
    cs.charge_points().update_charge_point_status(client, snapshot);
    StatusNotificationResponse {}
}

fn start_transaction(
    cs: &CentralSystem,
    client: &ClientIdentity,
    req: StartTransactionRequest,
) -> StartTransactionResponse {
    let mut start = SessionStartInfo::new(client.clone(), u32::try_from(req.connector_id).unwrap_or(0))
        .with_id_tag(req.id_tag.clone())
        .with_meter_start(i64::from(req.meter_start));
    start.reservation_id = req.reservation_id.and_then(|r| i32::try_from(r).ok());
    start.timestamp = req.timestamp;

    let denied = |status: AuthorizationStatus| StartTransactionResponse {
        transaction_id: 0,
        id_tag_info: id_tag_info(&AuthorizationInfo::with_status(status)),
    };

    match cs.sessions().start_charging_session(start) {
        Ok(session) => {
            let authorization = session
                .authorization
                .unwrap_or_else(|| AuthorizationInfo::with_status(AuthorizationStatus::Accepted));
            StartTransactionResponse {
                transaction_id: session.transaction_id.parse().unwrap_or(0),
                id_tag_info: id_tag_info(&authorization),
            }
        }
        Err(SessionError::Authorization { info, .. }) => StartTransactionResponse {
            transaction_id: 0,
            id_tag_info: id_tag_info(&info),
        },
        Err(e @ SessionError::ConnectorBusy { .. }) => {
            warn!(charge_point_id = client.charge_point_id(), error = %e, "StartTransaction refused");
            denied(AuthorizationStatus::ConcurrentTx)
        }
        Err(e) => {
            warn!(charge_point_id = client.charge_point_id(), error = %e, "StartTransaction refused");
            denied(AuthorizationStatus::Invalid)
        }
    }
}

fn stop_transaction(
    cs: &CentralSystem,
    client: &ClientIdentity,
    req: StopTransactionRequest,
) -> StopTransactionResponse {
    let transaction_id = req.transaction_id.to_string();

    let data = req.transaction_data.as_deref().map(readings).unwrap_or_default();
    if !data.is_empty() {
        if let Err(e) = cs.sessions().add_transaction_readings(client, &transaction_id, data) {
            warn!(
                charge_point_id = client.charge_point_id(),
                transaction_id = transaction_id.as_str(),
                error = %e,
                "Dropping transaction data"
            );
        }
    }

    let mut end = SessionEndInfo::new(client.clone(), transaction_id.clone())
        .with_meter_stop(i64::from(req.meter_stop));
    end.timestamp = req.timestamp;
    if let Some(reason) = &req.reason {
        end = end.with_reason(wire_name(reason));
    }
    if let Some(id_tag) = &req.id_tag {
        end = end.with_id_tag(id_tag.clone());
    }

    let authorization = match cs.sessions().end_charging_session(end) {
        Ok(authorization) => authorization,
        Err(e) => {
            warn!(
                charge_point_id = client.charge_point_id(),
                transaction_id = transaction_id.as_str(),
                error = %e,
                "StopTransaction for unknown session"
            );
            req.id_tag
                .as_ref()
                .map(|id_tag| cs.sessions().authorizer().authorize(client, id_tag))
        }
    };

    StopTransactionResponse {
        id_tag_info: authorization.as_ref().map(id_tag_info),
    }
}

fn meter_values(cs: &CentralSystem, client: &ClientIdentity, req: MeterValuesRequest) -> MeterValuesResponse {
    let connector_id = u32::try_from(req.connector_id).unwrap_or(0);
    let values = readings(&req.meter_value);

    let result = match req.transaction_id {
        Some(transaction_id) => {
            cs.sessions()
                .add_transaction_readings(client, &transaction_id.to_string(), values)
        }
        // connector 0 is the main meter
        None if connector_id == 0 => {
            debug!(charge_point_id = client.charge_point_id(), "Main meter values ignored");
            return MeterValuesResponse {};
        }
        None => cs
            .sessions()
            .add_charging_session_readings(client, None, Some(connector_id), values),
    };

    if let Err(e) = result {
        warn!(
            charge_point_id = client.charge_point_id(),
            connector_id,
            error = %e,
            "Meter values not attributed to a session"
        );
    }
    MeterValuesResponse {}
}

fn data_transfer(client: &ClientIdentity, req: DataTransferRequest) -> DataTransferResponse {
    info!(
        charge_point_id = client.charge_point_id(),
        vendor_id = req.vendor_string.as_str(),
        message_id = ?req.message_id,
        "DataTransfer"
    );
    DataTransferResponse {
        status: ocpp::DataTransferStatus::UnknownVendorId,
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, error_code, harness, result_payload};
    use crate::domain::ClientIdentity;
    use serde_json::json;

    fn boot(h: &super::super::tests::Harness, cp: &ClientIdentity) {
        let payload = result_payload(call(
            &h.central,
            cp,
            "BootNotification",
            json!({
                "chargePointVendor": "ACME",
                "chargePointModel": "Fast-22",
                "chargePointSerialNumber": "SN-1",
                "firmwareVersion": "1.0.3"
            }),
        ));
        assert_eq!(payload["status"], "Accepted");
        assert_eq!(payload["interval"], 120);
    }

    fn start(h: &super::super::tests::Harness, cp: &ClientIdentity, connector: u32, id_tag: &str) -> serde_json::Value {
        result_payload(call(
            &h.central,
            cp,
            "StartTransaction",
            json!({
                "connectorId": connector,
                "idTag": id_tag,
                "meterStart": 1000,
                "timestamp": "2024-05-01T10:00:00Z"
            }),
        ))
    }

    #[test]
    fn test_boot_registers_charge_point() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        boot(&h, &cp);

        let registration = h.central.charge_points().get_registration(&cp).unwrap();
        assert_eq!(registration.info.vendor, "ACME");
        assert_eq!(registration.info.serial_number.as_deref(), Some("SN-1"));
        assert!(h.central.charge_points().is_charge_point_registration_accepted(&cp));
    }

    #[test]
    fn test_heartbeat_and_status_notification() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");

        let payload = result_payload(call(&h.central, &cp, "Heartbeat", json!({})));
        assert!(payload["currentTime"].is_string());

        result_payload(call(
            &h.central,
            &cp,
            "StatusNotification",
            json!({"connectorId": 1, "errorCode": "NoError", "status": "Available"}),
        ));
        boot(&h, &cp);

        let registration = h.central.charge_points().get_registration(&cp).unwrap();
        let connector = registration.connector(0, 1).unwrap();
        assert_eq!(connector.status, "Available");
        assert_eq!(connector.error_code.as_deref(), Some("NoError"));
    }

    #[test]
    fn test_authorize() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        boot(&h, &cp);

        let payload = result_payload(call(&h.central, &cp, "Authorize", json!({"idTag": "BLOCKED"})));
        assert_eq!(payload["idTagInfo"]["status"], "Blocked");
        let payload = result_payload(call(&h.central, &cp, "Authorize", json!({"idTag": "WHO"})));
        assert_eq!(payload["idTagInfo"]["status"], "Invalid");
    }

    #[test]
    fn test_transaction_lifecycle() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        boot(&h, &cp);

        let started = start(&h, &cp, 1, "GOOD");
        assert_eq!(started["idTagInfo"]["status"], "Accepted");
        let transaction_id = started["transactionId"].as_i64().unwrap();
        assert!((1..=65_535).contains(&transaction_id));

        result_payload(call(
            &h.central,
            &cp,
            "MeterValues",
            json!({
                "connectorId": 1,
                "meterValue": [{
                    "timestamp": "2024-05-01T10:05:00Z",
                    "sampledValue": [
                        {"value": "1500", "measurand": "Energy.Active.Import.Register", "unit": "Wh"},
                        {"value": "7200", "measurand": "Power.Active.Import", "unit": "W"}
                    ]
                }]
            }),
        ));

        let stopped = result_payload(call(
            &h.central,
            &cp,
            "StopTransaction",
            json!({
                "transactionId": transaction_id,
                "idTag": "GOOD",
                "meterStop": 4000,
                "timestamp": "2024-05-01T11:00:00Z",
                "reason": "EVDisconnected",
                "transactionData": [{
                    "timestamp": "2024-05-01T10:59:00Z",
                    "sampledValue": [{"value": "3990"}]
                }]
            }),
        ));
        assert_eq!(stopped["idTagInfo"]["status"], "Accepted");

        assert!(h.central.sessions().get_active_charging_sessions(Some(&cp)).is_empty());
        assert!(h.central.sessions().get_active_charging_sessions(None).is_empty());
    }

    #[test]
    fn test_ended_session_keeps_readings() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        boot(&h, &cp);

        let transaction_id = start(&h, &cp, 1, "GOOD")["transactionId"].as_i64().unwrap();
        let session = h
            .central
            .sessions()
            .get_active_charging_session(&cp, &transaction_id.to_string())
            .unwrap();

        result_payload(call(
            &h.central,
            &cp,
            "MeterValues",
            json!({
                "connectorId": 1,
                "transactionId": transaction_id,
                "meterValue": [{"timestamp": "2024-05-01T10:05:00Z", "sampledValue": [{"value": "2.5", "unit": "kWh"}]}]
            }),
        ));
        result_payload(call(
            &h.central,
            &cp,
            "StopTransaction",
            json!({"transactionId": transaction_id, "meterStop": 3500, "timestamp": "2024-05-01T11:00:00Z", "reason": "Local"}),
        ));

        let ended = h.central.sessions().get_charging_session(session.id).unwrap();
        assert!(!ended.is_active());
        assert_eq!(ended.readings.len(), 1);
        assert!(ended.readings[0].unit.as_deref().unwrap().eq_ignore_ascii_case("kWh"));
        assert_eq!(ended.readings[0].energy_register_wh(), Some(2500));
        assert_eq!(ended.end.as_ref().unwrap().reason.as_deref(), Some("Local"));
        assert_eq!(ended.energy_consumed(), Some(2500));
    }

    #[test]
    fn test_start_denials() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        boot(&h, &cp);

        let denied = start(&h, &cp, 1, "BLOCKED");
        assert_eq!(denied["transactionId"], 0);
        assert_eq!(denied["idTagInfo"]["status"], "Blocked");

        start(&h, &cp, 1, "GOOD");
        let busy = start(&h, &cp, 1, "GOOD");
        assert_eq!(busy["transactionId"], 0);
        assert_eq!(busy["idTagInfo"]["status"], "ConcurrentTx");
    }

    #[test]
    fn test_unattributed_meter_values_are_confirmed() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        boot(&h, &cp);

        let payload = result_payload(call(
            &h.central,
            &cp,
            "MeterValues",
            json!({"connectorId": 2, "meterValue": [{"timestamp": "2024-05-01T10:05:00Z", "sampledValue": [{"value": "1"}]}]}),
        ));
        assert_eq!(payload, json!({}));

        let stopped = result_payload(call(
            &h.central,
            &cp,
            "StopTransaction",
            json!({"transactionId": 77, "idTag": "GOOD", "meterStop": 1, "timestamp": "2024-05-01T11:00:00Z"}),
        ));
        assert_eq!(stopped["idTagInfo"]["status"], "Accepted");
    }

    #[test]
    fn test_data_transfer_unknown_vendor() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        let payload = result_payload(call(
            &h.central,
            &cp,
            "DataTransfer",
            json!({"vendorId": "com.acme", "messageId": "hello"}),
        ));
        assert_eq!(payload["status"], "UnknownVendorId");
    }

    #[test]
    fn test_invalid_status_value() {
        let h = harness();
        let cp = ClientIdentity::v16("CP001");
        let frame = call(
            &h.central,
            &cp,
            "StatusNotification",
            json!({"connectorId": 1, "errorCode": "NoError", "status": "Sleeping"}),
        );
        assert_eq!(error_code(frame), "PropertyConstraintViolation");
    }
}
