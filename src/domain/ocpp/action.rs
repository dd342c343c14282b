//! OCPP action names and message directions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a payload is the request or the response half of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Suffix used by schema and type names (`BootNotificationRequest`).
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Response => "Response",
        }
    }

    pub fn for_result(for_result: bool) -> Self {
        if for_result {
            Self::Response
        } else {
            Self::Request
        }
    }
}

/// Which side of the connection sends the request of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Initiator {
    ChargePoint,
    CentralSystem,
}

impl Initiator {
    /// Role segment of the schema URN.
    pub fn role(&self) -> &'static str {
        match self {
            Self::ChargePoint => "Cp",
            Self::CentralSystem => "Cs",
        }
    }
}

/// Known OCPP actions across both protocol generations.
///
/// Whether an action is usable on a given connection is decided by the
/// codec catalog of that connection's version, not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    Authorize,
    BootNotification,
    DataTransfer,
    Heartbeat,
    MeterValues,
    StartTransaction,
    StatusNotification,
    StopTransaction,
    TransactionEvent,
    RemoteStartTransaction,
    RemoteStopTransaction,
    RequestStartTransaction,
    RequestStopTransaction,
    Reset,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Self::Authorize,
        Self::BootNotification,
        Self::DataTransfer,
        Self::Heartbeat,
        Self::MeterValues,
        Self::StartTransaction,
        Self::StatusNotification,
        Self::StopTransaction,
        Self::TransactionEvent,
        Self::RemoteStartTransaction,
        Self::RemoteStopTransaction,
        Self::RequestStartTransaction,
        Self::RequestStopTransaction,
        Self::Reset,
    ];

    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authorize => "Authorize",
            Self::BootNotification => "BootNotification",
            Self::DataTransfer => "DataTransfer",
            Self::Heartbeat => "Heartbeat",
            Self::MeterValues => "MeterValues",
            Self::StartTransaction => "StartTransaction",
            Self::StatusNotification => "StatusNotification",
            Self::StopTransaction => "StopTransaction",
            Self::TransactionEvent => "TransactionEvent",
            Self::RemoteStartTransaction => "RemoteStartTransaction",
            Self::RemoteStopTransaction => "RemoteStopTransaction",
            Self::RequestStartTransaction => "RequestStartTransaction",
            Self::RequestStopTransaction => "RequestStopTransaction",
            Self::Reset => "Reset",
        }
    }

    /// DataTransfer may be sent by either side; it is filed under the
    /// charge point role like the other station-originated messages.
    pub fn initiator(&self) -> Initiator {
        match self {
            Self::RemoteStartTransaction
            | Self::RemoteStopTransaction
            | Self::RequestStartTransaction
            | Self::RequestStopTransaction
            | Self::Reset => Initiator::CentralSystem,
            _ => Initiator::ChargePoint,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when an action name is not part of [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown OCPP action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|a| a.name() == s)
            .copied()
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for action in Action::ALL {
            assert_eq!(action.name().parse::<Action>().unwrap(), *action);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "FlyToTheMoon".parse::<Action>().unwrap_err();
        assert_eq!(err, UnknownAction("FlyToTheMoon".into()));
        assert!("bootnotification".parse::<Action>().is_err());
    }

    #[test]
    fn initiator_roles() {
        assert_eq!(Action::BootNotification.initiator().role(), "Cp");
        assert_eq!(Action::RequestStopTransaction.initiator().role(), "Cs");
    }

    #[test]
    fn direction_from_result_flag() {
        assert_eq!(Direction::for_result(true), Direction::Response);
        assert_eq!(Direction::for_result(false).suffix(), "Request");
    }
}
