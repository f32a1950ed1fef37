/// Encrypted artifacts and the release condition they are bound to.
///
/// An artifact is produced once by the threshold-encryption layer and is
/// handed to the commit pipeline as-is. Nothing in this crate inspects the
/// ciphertext; the condition is carried only so the trace can describe it.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommitError;

/// Largest uint256 has 78 decimal digits.
const MAX_UINT256_DIGITS: usize = 78;
const UINT256_MAX: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

/// On-chain dossier identifier (a uint256 kept in canonical decimal form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DossierId(String);

impl DossierId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DossierId {
    type Err = CommitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommitError::InvalidInput(format!(
                "dossier id must be a decimal integer, got {s:?}"
            )));
        }

        let trimmed = s.trim_start_matches('0');
        let canonical = if trimmed.is_empty() { "0" } else { trimmed };

        // Equal-length decimal strings compare like the numbers they encode.
        if canonical.len() > MAX_UINT256_DIGITS
            || (canonical.len() == MAX_UINT256_DIGITS && canonical > UINT256_MAX)
        {
            return Err(CommitError::InvalidInput(format!(
                "dossier id {s} does not fit in uint256"
            )));
        }

        Ok(Self(canonical.to_string()))
    }
}

impl From<u64> for DossierId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl TryFrom<String> for DossierId {
    type Error = CommitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DossierId> for String {
    fn from(id: DossierId) -> Self {
        id.0
    }
}

impl fmt::Display for DossierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 20-byte EVM account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = CommitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| CommitError::InvalidInput(format!("invalid address {s:?}: {e}")))?;

        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = CommitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Which on-chain rule releases the dossier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Released once the owner stops checking in for the configured interval.
    NoActivity,
}

/// Release condition attached to an artifact.
///
/// This is a description only. Whether the condition currently holds is
/// decided by the dossier contract, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCondition {
    pub kind: ConditionKind,
    pub dossier_id: DossierId,
    pub user_address: Address,
    /// Human-readable check-in interval, e.g. "30 days".
    pub duration_description: String,
}

impl AccessCondition {
    pub fn no_activity(
        dossier_id: DossierId,
        user_address: Address,
        duration_description: impl Into<String>,
    ) -> Self {
        Self {
            kind: ConditionKind::NoActivity,
            dossier_id,
            user_address,
            duration_description: duration_description.into(),
        }
    }

    /// One-line rendering used in trace records.
    pub fn describe(&self) -> String {
        match self.kind {
            ConditionKind::NoActivity => format!(
                "Dossier #{} — released after {} of inactivity",
                self.dossier_id, self.duration_description
            ),
        }
    }
}

/// Ciphertext plus everything needed to locate and decrypt it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedArtifact {
    pub ciphertext: Vec<u8>,
    pub original_file_name: String,
    pub description: String,
    /// Opaque reference to the threshold-encryption capsule.
    pub capsule_uri: String,
    pub condition: AccessCondition,
}

impl EncryptedArtifact {
    /// File name used for uploads: the original name with an `.encrypted` suffix.
    pub fn upload_file_name(&self) -> String {
        if self.original_file_name.is_empty() {
            "artifact.encrypted".to_string()
        } else {
            format!("{}.encrypted", self.original_file_name)
        }
    }
}
