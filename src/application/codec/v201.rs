//! OCPP 2.0.1 action catalog

use rust_ocpp::v2_0_1::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v2_0_1::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v2_0_1::messages::datatransfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v2_0_1::messages::heartbeat::{HeartbeatRequest, HeartbeatResponse};
use rust_ocpp::v2_0_1::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v2_0_1::messages::request_start_transaction::{
    RequestStartTransactionRequest, RequestStartTransactionResponse,
};
use rust_ocpp::v2_0_1::messages::request_stop_transaction::{
    RequestStopTransactionRequest, RequestStopTransactionResponse,
};
use rust_ocpp::v2_0_1::messages::reset::{ResetRequest, ResetResponse};
use rust_ocpp::v2_0_1::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v2_0_1::messages::transaction_event::{
    TransactionEventRequest, TransactionEventResponse,
};

use super::catalog::{ActionCatalog, CatalogError};
use crate::domain::{Action, OcppVersion};

macro_rules! schema {
    ($name:literal) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/schemas/v201/", $name, ".json"))
    };
}

/// Build the OCPP 2.0.1 catalog (draft-06 schemas).
pub fn v201() -> Result<ActionCatalog, CatalogError> {
    Ok(ActionCatalog::builder(OcppVersion::V201)
        .register::<AuthorizeRequest, AuthorizeResponse>(
            Action::Authorize,
            schema!("AuthorizeRequest"),
            schema!("AuthorizeResponse"),
        )?
        .register::<BootNotificationRequest, BootNotificationResponse>(
            Action::BootNotification,
            schema!("BootNotificationRequest"),
            schema!("BootNotificationResponse"),
        )?
        .register::<DataTransferRequest, DataTransferResponse>(
            Action::DataTransfer,
            schema!("DataTransferRequest"),
            schema!("DataTransferResponse"),
        )?
        .register::<HeartbeatRequest, HeartbeatResponse>(
            Action::Heartbeat,
            schema!("HeartbeatRequest"),
            schema!("HeartbeatResponse"),
        )?
        .register::<MeterValuesRequest, MeterValuesResponse>(
            Action::MeterValues,
            schema!("MeterValuesRequest"),
            schema!("MeterValuesResponse"),
        )?
        .register::<StatusNotificationRequest, StatusNotificationResponse>(
            Action::StatusNotification,
            schema!("StatusNotificationRequest"),
            schema!("StatusNotificationResponse"),
        )?
        .register::<TransactionEventRequest, TransactionEventResponse>(
            Action::TransactionEvent,
            schema!("TransactionEventRequest"),
            schema!("TransactionEventResponse"),
        )?
        .register::<RequestStartTransactionRequest, RequestStartTransactionResponse>(
            Action::RequestStartTransaction,
            schema!("RequestStartTransactionRequest"),
            schema!("RequestStartTransactionResponse"),
        )?
        .register::<RequestStopTransactionRequest, RequestStopTransactionResponse>(
            Action::RequestStopTransaction,
            schema!("RequestStopTransactionRequest"),
            schema!("RequestStopTransactionResponse"),
        )?
        .register::<ResetRequest, ResetResponse>(
            Action::Reset,
            schema!("ResetRequest"),
            schema!("ResetResponse"),
        )?
        .build())
}
