use crate::layer::Layer;
use thiserror::Error;

/// Errors raised while assembling a schema. Every variant is a case of invalid
/// schema construction and is reported before any resolution happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// An id does not fit the range allowed for its kind
    #[error("{kind} id {id} in '{scope}' is out of range (max {max})")]
    IdOutOfRange {
        kind: &'static str,
        id: u32,
        max: u32,
        scope: String,
    },

    /// The name is reserved for generated files
    #[error("namespace name '{name}' is reserved")]
    ReservedName { name: String },

    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    /// `nullable` applied to a type that is already nullable
    #[error("nullable cannot wrap another nullable ({inner})")]
    DoubleNullable { inner: String },

    #[error("profile 0 of record '{record}' is implicit and cannot be declared")]
    ReservedProfile { record: String },

    #[error("profile {profile} of record '{record}' requires undeclared field {field}")]
    UnknownProfileField {
        record: String,
        profile: u16,
        field: u16,
    },

    #[error("duplicate {kind} id {id} in '{scope}'")]
    DuplicateId {
        kind: &'static str,
        id: u32,
        scope: String,
    },

    #[error("duplicate {kind} name '{name}' in '{scope}'")]
    DuplicateName {
        kind: &'static str,
        name: String,
        scope: String,
    },

    /// Services declared in a layer below `svc`
    #[error("namespace '{namespace}' is in layer '{layer}'; services require layer 'svc' or higher")]
    ServicesNotAllowed { namespace: String, layer: Layer },

    /// Service groups declared outside the `deploy` layer
    #[error("namespace '{namespace}' is in layer '{layer}'; service groups are only allowed in 'deploy'")]
    ServiceGroupsNotAllowed { namespace: String, layer: Layer },

    /// `reopen` named a namespace that was never declared
    #[error("namespace '{name}' has not been declared")]
    UnknownNamespace { name: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;
