//! Registration policy port

use crate::domain::{ChargePointInfo, ChargePointRegistration, ClientIdentity, RegistrationStatus};

/// Decides the registration status of booting charge points.
pub trait RegistrationPolicy: Send + Sync {
    /// Status given to an identity seen for the first time.
    fn initial_status(&self, identity: &ClientIdentity, info: &ChargePointInfo) -> RegistrationStatus;

    /// Transition applied when a known identity boots again; `None` keeps
    /// the current status.
    fn on_reregistration(
        &self,
        _registration: &ChargePointRegistration,
        _info: &ChargePointInfo,
    ) -> Option<RegistrationStatus> {
        None
    }
}

/// Policy that hands every new identity the same status.
///
/// Pending stations are promoted to the default status when they boot again,
/// so changing the configured default takes effect on the next boot.
#[derive(Debug, Clone, Copy)]
pub struct StaticRegistrationPolicy {
    default_status: RegistrationStatus,
}

impl StaticRegistrationPolicy {
    pub fn new(default_status: RegistrationStatus) -> Self {
        Self { default_status }
    }

    pub fn accept_all() -> Self {
        Self::new(RegistrationStatus::Accepted)
    }
}

impl Default for StaticRegistrationPolicy {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl RegistrationPolicy for StaticRegistrationPolicy {
    fn initial_status(&self, _identity: &ClientIdentity, _info: &ChargePointInfo) -> RegistrationStatus {
        self.default_status
    }

    fn on_reregistration(
        &self,
        registration: &ChargePointRegistration,
        _info: &ChargePointInfo,
    ) -> Option<RegistrationStatus> {
        (registration.status == RegistrationStatus::Pending
            && self.default_status != RegistrationStatus::Pending)
            .then_some(self.default_status)
    }
}
