use thiserror::Error;

/// Last recorded reason a tunnel start attempt failed.
///
/// A value of this type is kept by the tunnel host and served over the
/// control socket, so a client can ask "why did the last attempt fail"
/// after the daemon side already gave up.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
pub enum FaultCode {
    /// No start attempt has failed since the host was created.
    #[default]
    #[error("no error recorded")]
    NoError,

    /// The saved configuration was missing or did not validate.
    #[error("saved tunnel configuration is invalid")]
    InvalidSavedConfiguration,

    /// One or more peer hostnames could not be resolved.
    #[error("DNS resolution failed for: {}", hostnames.join(", "))]
    DnsResolutionFailed { hostnames: Vec<String> },

    /// The engine refused to bring up the data plane.
    #[error("tunnel engine could not be started")]
    EngineStartFailed,

    /// The host rejected the derived network settings.
    #[error("network settings were rejected")]
    NetworkSettingsRejected,
}

/// Requests a control client can send to a running tunnel host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ask for the last recorded start failure.
    RetrieveLastError,
}

/// Responses a tunnel host sends back over the control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Carries the host's current [`FaultCode`].
    LastError(FaultCode),
}
