//! Error code resolution between the generic RPC taxonomy and the wire codes
//! of each protocol version.

mod rpc;
mod v16;
mod v201;

pub use rpc::RpcErrorCode;
pub use v16::V16ErrorCode;
pub use v201::V201ErrorCode;

use std::fmt;

use thiserror::Error;

use crate::domain::OcppVersion;

/// A version-specific CallError code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    V16(V16ErrorCode),
    V201(V201ErrorCode),
}

impl ErrorCode {
    /// Wire name carried in the `errorCode` slot of a CallError frame
    pub fn name(&self) -> &'static str {
        match self {
            Self::V16(code) => code.name(),
            Self::V201(code) => code.name(),
        }
    }

    pub fn version(&self) -> OcppVersion {
        match self {
            Self::V16(_) => OcppVersion::V16,
            Self::V201(_) => OcppVersion::V201,
        }
    }

    /// Generic classification of this code
    pub fn rpc_error(&self) -> RpcErrorCode {
        match self {
            Self::V16(code) => code.to_rpc(),
            Self::V201(code) => code.to_rpc(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown {version} error code: {name}")]
pub struct UnknownErrorCodeError {
    pub version: OcppVersion,
    pub name: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{version} error code {code:?} does not round-trip through its wire name")]
pub struct ResolverCheckError {
    pub version: OcppVersion,
    pub code: RpcErrorCode,
}

/// Per-version error code table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCodeResolver {
    version: OcppVersion,
}

impl ErrorCodeResolver {
    pub fn for_version(version: OcppVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> OcppVersion {
        self.version
    }

    pub fn error_code_for_rpc_error(&self, rpc: RpcErrorCode) -> ErrorCode {
        match self.version {
            OcppVersion::V16 => ErrorCode::V16(V16ErrorCode::from_rpc(rpc)),
            OcppVersion::V201 => ErrorCode::V201(V201ErrorCode::from_rpc(rpc)),
        }
    }

    pub fn error_code_for_name(&self, name: &str) -> Result<ErrorCode, UnknownErrorCodeError> {
        let found = match self.version {
            OcppVersion::V16 => V16ErrorCode::ALL
                .iter()
                .find(|c| c.name() == name)
                .map(|c| ErrorCode::V16(*c)),
            OcppVersion::V201 => V201ErrorCode::ALL
                .iter()
                .find(|c| c.name() == name)
                .map(|c| ErrorCode::V201(*c)),
        };

        found.ok_or_else(|| UnknownErrorCodeError {
            version: self.version,
            name: name.to_string(),
        })
    }

    /// Startup self-check: every mapped code must resolve back from its wire name.
    pub fn verify(&self) -> Result<(), ResolverCheckError> {
        for rpc in RpcErrorCode::ALL {
            let code = self.error_code_for_rpc_error(*rpc);
            match self.error_code_for_name(code.name()) {
                Ok(resolved) if resolved == code => {}
                _ => {
                    return Err(ResolverCheckError {
                        version: self.version,
                        code: *rpc,
                    })
                }
            }
        }
        Ok(())
    }
}
