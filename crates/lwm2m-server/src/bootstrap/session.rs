//! Bootstrap session lifecycle.
//!
//! `begin` authorizes the client and opens a session. Writes accumulate
//! into the session's [`BootstrapConfig`] until `finalize` runs the
//! consistency checks and commits it. Sessions are owned values, driven
//! by the transport through `&mut` borrows.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lwm2m_core::{ContentFormat, ResponseCode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checker::ConsistencyChecker;
use super::config::{AclConfig, BootstrapConfig, OscoreObject, ServerConfig, ServerSecurity};
use crate::clock::SharedClock;
use crate::config::bootstrap::REJECTION_CODE;
use crate::config::BootstrapSessionConfig;
use crate::error::BootstrapError;
use crate::event::{EventBus, Lwm2mEvent};
use crate::identity::Identity;
use crate::security::{SecurityChecker, SecurityInfo, SecurityStore};

/// Fields of a Bootstrap-Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub endpoint: String,
    pub preferred_content_format: Option<ContentFormat>,
}

impl BootstrapRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            preferred_content_format: None,
        }
    }

    pub fn with_preferred_content_format(mut self, format: ContentFormat) -> Self {
        self.preferred_content_format = Some(format);
        self
    }
}

/// Decision of a [`BootstrapAuthorizer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// Application data travels with the session
    Approved {
        application_data: Option<serde_json::Value>,
    },
    Declined,
}

impl Authorization {
    pub fn approved() -> Self {
        Authorization::Approved {
            application_data: None,
        }
    }
}

pub trait BootstrapAuthorizer: Send + Sync {
    fn authorize(&self, request: &BootstrapRequest, identity: &Identity) -> Authorization;
}

/// Approves peers whose identity matches the security info stored for
/// their endpoint.
pub struct SecurityStoreAuthorizer {
    store: Arc<dyn SecurityStore>,
    checker: SecurityChecker,
}

impl SecurityStoreAuthorizer {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self {
            store,
            checker: SecurityChecker,
        }
    }

    fn infos_for(&self, endpoint: &str, identity: &Identity) -> Vec<SecurityInfo> {
        let by_credential = match identity {
            Identity::Psk { identity, .. } => self.store.get_by_psk_identity(identity),
            Identity::Oscore { recipient_id, .. } => {
                self.store.get_by_oscore_recipient_id(recipient_id)
            }
            Identity::Unsecure { .. } | Identity::Rpk { .. } | Identity::X509 { .. } => None,
        };
        // A credential registered for another endpoint does not count
        by_credential
            .filter(|info| info.endpoint == endpoint)
            .or_else(|| self.store.get_by_endpoint(endpoint))
            .into_iter()
            .collect()
    }
}

impl BootstrapAuthorizer for SecurityStoreAuthorizer {
    fn authorize(&self, request: &BootstrapRequest, identity: &Identity) -> Authorization {
        let infos = self.infos_for(&request.endpoint, identity);
        if self
            .checker
            .check_security_infos(&request.endpoint, identity, &infos)
        {
            Authorization::approved()
        } else {
            Authorization::Declined
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Timeout,
    Cancelled,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Timeout => f.write_str("timeout"),
            FailureCause::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accumulating,
    Finalized,
    Failed(FailureCause),
}

/// One authorized bootstrap exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSession {
    pub id: Uuid,
    pub endpoint: String,
    pub identity: Identity,
    /// Format for the writes, the client preference or TLV
    pub content_format: ContentFormat,
    pub application_data: Option<serde_json::Value>,
    config: BootstrapConfig,
    state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl BootstrapSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_accumulating(&self) -> bool {
        self.state == SessionState::Accumulating
    }

    /// Configuration accumulated so far.
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    Started(BootstrapSession),
    /// The authorizer declined; answer the request with `code`
    Rejected { code: ResponseCode },
}

pub struct BootstrapSessionManager {
    authorizer: Arc<dyn BootstrapAuthorizer>,
    checker: Arc<dyn ConsistencyChecker>,
    clock: SharedClock,
    config: BootstrapSessionConfig,
    events: Option<EventBus>,
}

impl BootstrapSessionManager {
    pub fn new(
        authorizer: Arc<dyn BootstrapAuthorizer>,
        checker: Arc<dyn ConsistencyChecker>,
        clock: SharedClock,
    ) -> Self {
        Self {
            authorizer,
            checker,
            clock,
            config: BootstrapSessionConfig::default(),
            events: None,
        }
    }

    pub fn with_config(mut self, config: BootstrapSessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Authorize a Bootstrap-Request and open a session. A declined
    /// request yields [`BootstrapOutcome::Rejected`] and nothing else runs.
    pub fn begin(&self, request: BootstrapRequest, identity: Identity) -> BootstrapOutcome {
        let application_data = match self.authorizer.authorize(&request, &identity) {
            Authorization::Approved { application_data } => application_data,
            Authorization::Declined => {
                info!(endpoint = %request.endpoint, identity = %identity, "Bootstrap declined");
                self.publish(Lwm2mEvent::BootstrapRejected {
                    endpoint: request.endpoint,
                    code: REJECTION_CODE.to_string(),
                    timestamp: self.clock.now().timestamp(),
                });
                return BootstrapOutcome::Rejected {
                    code: REJECTION_CODE,
                };
            }
        };

        let now = self.clock.now();
        let session = BootstrapSession {
            id: Uuid::new_v4(),
            endpoint: request.endpoint,
            identity,
            content_format: request
                .preferred_content_format
                .unwrap_or(ContentFormat::Tlv),
            application_data,
            config: BootstrapConfig::default(),
            state: SessionState::Accumulating,
            created_at: now,
            last_activity: now,
        };
        info!(endpoint = %session.endpoint, session = %session.id, "Bootstrap started");
        self.publish(Lwm2mEvent::BootstrapStarted {
            session_id: session.id.to_string(),
            endpoint: session.endpoint.clone(),
            timestamp: now.timestamp(),
        });
        BootstrapOutcome::Started(session)
    }

    pub fn write_server(
        &self,
        session: &mut BootstrapSession,
        instance_id: u16,
        server: ServerConfig,
    ) -> Result<(), BootstrapError> {
        self.accumulate(session, "server", |config| {
            config.servers.insert(instance_id, server);
        })
    }

    pub fn write_security(
        &self,
        session: &mut BootstrapSession,
        instance_id: u16,
        security: ServerSecurity,
    ) -> Result<(), BootstrapError> {
        self.accumulate(session, "security", |config| {
            config.security.insert(instance_id, security);
        })
    }

    pub fn write_oscore(
        &self,
        session: &mut BootstrapSession,
        instance_id: u16,
        oscore: OscoreObject,
    ) -> Result<(), BootstrapError> {
        self.accumulate(session, "oscore", |config| {
            config.oscore.insert(instance_id, oscore);
        })
    }

    pub fn write_acl(
        &self,
        session: &mut BootstrapSession,
        instance_id: u16,
        acl: AclConfig,
    ) -> Result<(), BootstrapError> {
        self.accumulate(session, "acl", |config| {
            config.acls.insert(instance_id, acl);
        })
    }

    /// Record a Bootstrap-Delete of `path`.
    pub fn delete(
        &self,
        session: &mut BootstrapSession,
        path: impl Into<String>,
    ) -> Result<(), BootstrapError> {
        let path = path.into();
        self.accumulate(session, "delete", |config| config.to_delete.push(path))
    }

    /// Check the accumulated configuration and commit it. On consistency
    /// errors the session keeps accumulating so the writes can be fixed.
    pub fn finalize(
        &self,
        session: &mut BootstrapSession,
    ) -> Result<BootstrapConfig, BootstrapError> {
        ensure_accumulating(session, "finalize")?;

        let errors = self.checker.check(&session.config);
        if !errors.is_empty() {
            warn!(
                endpoint = %session.endpoint,
                session = %session.id,
                errors = errors.len(),
                "Bootstrap finalize refused"
            );
            return Err(BootstrapError::Inconsistent(errors));
        }

        session.state = SessionState::Finalized;
        session.last_activity = self.clock.now();
        info!(endpoint = %session.endpoint, session = %session.id, "Bootstrap finalized");
        self.publish(Lwm2mEvent::BootstrapFinalized {
            session_id: session.id.to_string(),
            endpoint: session.endpoint.clone(),
            timestamp: session.last_activity.timestamp(),
        });
        Ok(session.config.clone())
    }

    /// Fail the session if it has been idle longer than the configured
    /// timeout. Returns whether it timed out now.
    pub fn check_timeout(&self, session: &mut BootstrapSession) -> bool {
        if !session.is_accumulating() {
            return false;
        }
        let Ok(timeout) = chrono::Duration::from_std(self.config.timeout) else {
            return false;
        };
        if self.clock.now() - session.last_activity <= timeout {
            return false;
        }
        self.fail(session, FailureCause::Timeout);
        true
    }

    pub fn cancel(&self, session: &mut BootstrapSession) -> Result<(), BootstrapError> {
        ensure_accumulating(session, "cancel")?;
        self.fail(session, FailureCause::Cancelled);
        Ok(())
    }

    fn accumulate<F>(
        &self,
        session: &mut BootstrapSession,
        operation: &str,
        write: F,
    ) -> Result<(), BootstrapError>
    where
        F: FnOnce(&mut BootstrapConfig),
    {
        ensure_accumulating(session, operation)?;
        write(&mut session.config);
        session.last_activity = self.clock.now();
        debug!(session = %session.id, operation, "Bootstrap write");
        Ok(())
    }

    fn fail(&self, session: &mut BootstrapSession, cause: FailureCause) {
        session.state = SessionState::Failed(cause);
        warn!(
            endpoint = %session.endpoint,
            session = %session.id,
            cause = %cause,
            "Bootstrap failed"
        );
        self.publish(Lwm2mEvent::BootstrapFailed {
            session_id: session.id.to_string(),
            endpoint: session.endpoint.clone(),
            cause: cause.to_string(),
            timestamp: self.clock.now().timestamp(),
        });
    }

    fn publish(&self, event: Lwm2mEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn ensure_accumulating(
    session: &BootstrapSession,
    operation: &str,
) -> Result<(), BootstrapError> {
    match session.state {
        SessionState::Accumulating => Ok(()),
        state => Err(BootstrapError::InvalidState(format!(
            "cannot {} session {} in state {:?}",
            operation, session.id, state
        ))),
    }
}
