//! OCPP 1.6 action catalog

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::heart_beat::{HeartbeatRequest, HeartbeatResponse};
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::remote_start_transaction::{
    RemoteStartTransactionRequest, RemoteStartTransactionResponse,
};
use rust_ocpp::v1_6::messages::remote_stop_transaction::{
    RemoteStopTransactionRequest, RemoteStopTransactionResponse,
};
use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};

use super::catalog::{ActionCatalog, CatalogError};
use crate::domain::{Action, OcppVersion};

macro_rules! schema {
    ($name:literal) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/schemas/v16/", $name, ".json"))
    };
}

/// Build the OCPP 1.6 catalog (draft-04 schemas).
pub fn v16() -> Result<ActionCatalog, CatalogError> {
    Ok(ActionCatalog::builder(OcppVersion::V16)
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
        .register::<StartTransactionRequest, StartTransactionResponse>(
            Action::StartTransaction,
            schema!("StartTransactionRequest"),
            schema!("StartTransactionResponse"),
        )?
        .register::<StatusNotificationRequest, StatusNotificationResponse>(
            Action::StatusNotification,
            schema!("StatusNotificationRequest"),
            schema!("StatusNotificationResponse"),
        )?
        .register::<StopTransactionRequest, StopTransactionResponse>(
            Action::StopTransaction,
            schema!("StopTransactionRequest"),
            schema!("StopTransactionResponse"),
        )?
        .register::<RemoteStartTransactionRequest, RemoteStartTransactionResponse>(
            Action::RemoteStartTransaction,
            schema!("RemoteStartTransactionRequest"),
            schema!("RemoteStartTransactionResponse"),
        )?
        .register::<RemoteStopTransactionRequest, RemoteStopTransactionResponse>(
            Action::RemoteStopTransaction,
            schema!("RemoteStopTransactionRequest"),
            schema!("RemoteStopTransactionResponse"),
        )?
        .register::<ResetRequest, ResetResponse>(
            Action::Reset,
            schema!("ResetRequest"),
            schema!("ResetResponse"),
        )?
        .build())
}
