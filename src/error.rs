use thiserror::Error;

/// Why a wizard stage did not complete. The message is shown to the operator
/// as is, and the stage is offered again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("Please enter both email and API key.")]
    MissingCredentials,

    #[error("Invalid credentials or no domains found on account.")]
    InvalidCredentials,

    #[error("Saved credentials are invalid or no domains found on account.")]
    SavedCredentialsRejected,

    #[error("Please select at least one domain.")]
    NoDomainSelected,

    #[error("Domain {0} is not on this account.")]
    UnknownDomain(String),

    #[error("No DNS records found for selected domains.")]
    NoRecords,

    #[error("Please select at least one DNS record.")]
    NoRecordSelected,

    #[error("DNS record {name} in zone {zone_id} is not under the selected domains.")]
    UnknownRecord { zone_id: String, name: String },

    #[error("Failed to detect current IP address.")]
    NoExternalIp,
}
