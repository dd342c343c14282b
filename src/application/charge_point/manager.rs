//! Charge point registration state

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use super::RegistrationPolicy;
use crate::domain::{
    ChargePointInfo, ChargePointRegistration, ClientIdentity, ConnectorKey,
    ConnectorStatusSnapshot, RegistrationStatus,
};

/// Registration table for charge point identities
pub struct ChargePointManager {
    registrations: DashMap<ClientIdentity, ChargePointRegistration>,
    /// Connector snapshots reported before the identity booted
    early_statuses: DashMap<ClientIdentity, BTreeMap<ConnectorKey, ConnectorStatusSnapshot>>,
    policy: Arc<dyn RegistrationPolicy>,
}

pub type SharedChargePointManager = Arc<ChargePointManager>;

impl ChargePointManager {
    pub fn new(policy: Arc<dyn RegistrationPolicy>) -> Self {
        Self {
            registrations: DashMap::new(),
            early_statuses: DashMap::new(),
            policy,
        }
    }

    /// Create or update the registration of `identity`.
    pub fn register_charge_point(
        &self,
        identity: &ClientIdentity,
        info: ChargePointInfo,
    ) -> ChargePointRegistration {
        match self.registrations.entry(identity.clone()) {
            Entry::Occupied(mut entry) => {
                let registration = entry.get_mut();
                if let Some(status) = self.policy.on_reregistration(registration, &info) {
                    if status != registration.status {
                        info!(
                            charge_point_id = identity.charge_point_id(),
                            from = %registration.status,
                            to = %status,
                            "Registration status changed on boot"
                        );
                    }
                    registration.transition(status);
                }
                registration.update_info(info);
                registration.clone()
            }
            Entry::Vacant(entry) => {
                let status = self.policy.initial_status(identity, &info);
                let mut registration = ChargePointRegistration::new(identity.clone(), info, status);
                if let Some((_, snapshots)) = self.early_statuses.remove(identity) {
                    registration.connectors.extend(snapshots);
                }
                info!(
                    charge_point_id = identity.charge_point_id(),
                    protocol = %identity.protocol,
                    vendor = registration.info.vendor.as_str(),
                    model = registration.info.model.as_str(),
                    status = %status,
                    "Charge point registered"
                );
                entry.insert(registration).clone()
            }
        }
    }

    pub fn is_charge_point_registration_accepted(&self, identity: &ClientIdentity) -> bool {
        self.registrations
            .get(identity)
            .map(|r| r.is_accepted())
            .unwrap_or(false)
    }

    /// Record a connector snapshot. Snapshots for identities that have not
    /// booted yet are kept and attached once they register.
    pub fn update_charge_point_status(
        &self,
        identity: &ClientIdentity,
        snapshot: ConnectorStatusSnapshot,
    ) {
        debug!(
            charge_point_id = identity.charge_point_id(),
            connector_id = snapshot.connector_id,
            evse_id = ?snapshot.evse_id,
            status = snapshot.status.as_str(),
            "Connector status"
        );

        // Holding the registration entry keeps a concurrent boot from
        // draining the early snapshots between the miss and the insert.
        match self.registrations.entry(identity.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().record_connector_status(snapshot),
            Entry::Vacant(_) => {
                self.early_statuses
                    .entry(identity.clone())
                    .or_default()
                    .insert(snapshot.key(), snapshot);
            }
        }
    }

    /// Drop the connector snapshots an identity reported without booting.
    /// Called when its connection closes.
    pub fn discard_early_statuses(&self, identity: &ClientIdentity) -> usize {
        match self.early_statuses.remove(identity) {
            Some((_, snapshots)) => {
                debug!(
                    charge_point_id = identity.charge_point_id(),
                    count = snapshots.len(),
                    "Dropping status reports of unregistered charge point"
                );
                snapshots.len()
            }
            None => 0,
        }
    }

    /// Administrative status override. `None` for unknown identities.
    pub fn set_registration_status(
        &self,
        identity: &ClientIdentity,
        status: RegistrationStatus,
    ) -> Option<ChargePointRegistration> {
        let mut registration = self.registrations.get_mut(identity)?;
        info!(
            charge_point_id = identity.charge_point_id(),
            from = %registration.status,
            to = %status,
            "Registration status set"
        );
        registration.transition(status);
        Some(registration.clone())
    }

    pub fn set_disabled(
        &self,
        identity: &ClientIdentity,
        disabled: bool,
    ) -> Option<ChargePointRegistration> {
        let mut registration = self.registrations.get_mut(identity)?;
        registration.disabled = disabled;
        info!(
            charge_point_id = identity.charge_point_id(),
            disabled,
            "Charge point availability set"
        );
        Some(registration.clone())
    }

    /// Returns `false` for unknown identities.
    pub fn heartbeat(&self, identity: &ClientIdentity) -> bool {
        match self.registrations.get_mut(identity) {
            Some(mut registration) => {
                registration.update_heartbeat();
                true
            }
            None => false,
        }
    }

    pub fn get_registration(&self, identity: &ClientIdentity) -> Option<ChargePointRegistration> {
        self.registrations.get(identity).map(|r| r.clone())
    }

    pub fn registrations(&self) -> Vec<ChargePointRegistration> {
        let mut all: Vec<_> = self.registrations.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| a.identity.cmp(&b.identity));
        all
    }
}
