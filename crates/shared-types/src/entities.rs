//! # Domain Entities
//!
//! The canonical signal, the decision envelope read back from Core, and the
//! closed enumerations every subsystem agrees on.
//!
//! All enumerations are closed: an unknown value fails at the type boundary
//! (`FromStr` / serde) instead of deep in business logic.

use crate::errors::FieldProblem;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque identifier of the entity a signal concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Maximum accepted length in characters.
    pub const MAX_LEN: usize = 128;

    /// Parse a subject identifier.
    ///
    /// Rejects empty values, values over [`Self::MAX_LEN`] characters and
    /// values containing whitespace or control characters.
    pub fn parse(raw: &str) -> Result<Self, FieldProblem> {
        if raw.is_empty() {
            return Err(FieldProblem::Empty);
        }
        if raw.chars().count() > Self::MAX_LEN {
            return Err(FieldProblem::TooLong);
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(FieldProblem::InvalidFormat);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SubjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Identifier of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random request identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = FieldProblem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| FieldProblem::InvalidFormat)
    }
}

// =============================================================================
// OPAQUE CODES
// =============================================================================

/// Opaque enumerated reason code. Never free text.
///
/// Format: an uppercase ASCII letter followed by 1..=63 uppercase letters,
/// digits or underscores (e.g. `CHEAT_DETECTED_001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReasonCode(String);

impl ReasonCode {
    pub const MAX_LEN: usize = 64;

    pub fn parse(raw: &str) -> Result<Self, FieldProblem> {
        let bytes = raw.as_bytes();
        if bytes.len() < 2 || bytes.len() > Self::MAX_LEN {
            return Err(FieldProblem::InvalidFormat);
        }
        if !bytes[0].is_ascii_uppercase() {
            return Err(FieldProblem::InvalidFormat);
        }
        let valid_tail = bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || *b == b'_');
        if !valid_tail {
            return Err(FieldProblem::InvalidFormat);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ReasonCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// CLOSED ENUMERATIONS
// =============================================================================

/// Implements `as_str`, `Display` and `FromStr` for a closed enumeration.
macro_rules! closed_enum {
    ($ty:ident { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            /// All members of the enumeration.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = FieldProblem;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text $(| $alias)* => Ok($ty::$variant),)+
                    _ => Err(FieldProblem::UnknownVariant),
                }
            }
        }
    };
}

/// Producing domain of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductContext {
    Assistant,
    Game,
    Finance,
    /// Learning platform.
    #[serde(alias = "learning")]
    Gurukul,
    Infra,
    Workflow,
}

closed_enum!(ProductContext {
    Assistant => "assistant",
    Game => "game",
    Finance => "finance",
    Gurukul => "gurukul" | "learning",
    Infra => "infra",
    Workflow => "workflow",
});

/// Recommended outcome carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Allow,
    Nudge,
    Restrict,
    Escalate,
}

closed_enum!(SignalKind {
    Allow => "allow",
    Nudge => "nudge",
    Restrict => "restrict",
    Escalate => "escalate",
});

/// Irreversible actions that always require an explicit Core decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Death,
    Rebirth,
    AccessGating,
    ProgressionLock,
    Restriction,
}

closed_enum!(ActionType {
    Death => "death",
    Rebirth => "rebirth",
    AccessGating => "access_gating",
    ProgressionLock => "progression_lock",
    Restriction => "restriction",
});

impl ActionType {
    /// Signal kind emitted when this action is put up for authorization.
    pub fn signal_kind(&self) -> SignalKind {
        match self {
            ActionType::Death => SignalKind::Escalate,
            ActionType::Rebirth => SignalKind::Allow,
            ActionType::AccessGating | ActionType::ProgressionLock | ActionType::Restriction => {
                SignalKind::Restrict
            }
        }
    }

    /// Severity used when the producer does not supply one.
    pub fn default_severity(&self) -> f64 {
        match self {
            ActionType::Death => 0.95,
            ActionType::Rebirth => 0.1,
            ActionType::AccessGating => 0.8,
            ActionType::ProgressionLock => 0.7,
            ActionType::Restriction => 0.85,
        }
    }

    /// Reason code used when the producer does not supply one.
    pub fn default_reason_code(&self) -> &'static str {
        match self {
            ActionType::Death => "DEATH_THRESHOLD_REACHED",
            ActionType::Rebirth => "REBIRTH_ELIGIBILITY",
            ActionType::AccessGating => "ACCESS_CONTROL_NEEDED",
            ActionType::ProgressionLock => "PROGRESSION_LOCK_NEEDED",
            ActionType::Restriction => "RESTRICTION_NEEDED",
        }
    }
}

/// Core's verdict on an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

closed_enum!(Decision {
    Allow => "ALLOW",
    Deny => "DENY",
});

/// Lifecycle state of an authorization request.
///
/// ```text
/// [PENDING] ──ALLOW──→ [ALLOWED]
///     │
///     ├──DENY──→ [DENIED]
///     ├──deadline──→ [TIMED_OUT]
///     └──owner cancel──→ [CANCELLED]
/// ```
///
/// Exactly one terminal transition per request; no transition leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationState {
    Pending,
    Allowed,
    Denied,
    TimedOut,
    Cancelled,
}

closed_enum!(AuthorizationState {
    Pending => "PENDING",
    Allowed => "ALLOWED",
    Denied => "DENIED",
    TimedOut => "TIMED_OUT",
    Cancelled => "CANCELLED",
});

impl AuthorizationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuthorizationState::Pending)
    }

    /// Only PENDING may move, and only to a terminal state.
    pub fn can_transition_to(&self, next: AuthorizationState) -> bool {
        matches!(self, AuthorizationState::Pending) && next.is_terminal()
    }

    /// An effect may be applied if and only if the request was allowed.
    pub fn permits_effect(&self) -> bool {
        matches!(self, AuthorizationState::Allowed)
    }
}

impl From<Decision> for AuthorizationState {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allow => AuthorizationState::Allowed,
            Decision::Deny => AuthorizationState::Denied,
        }
    }
}

// =============================================================================
// NONCE & SIGNATURE
// =============================================================================

/// 128-bit random token assigned at signing time. Hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nonce([u8; Nonce::LEN]);

impl Nonce {
    pub const LEN: usize = 16;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for logs and audit payloads.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({}..)", self.short())
    }
}

impl FromStr for Nonce {
    type Err = FieldProblem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| FieldProblem::InvalidFormat)?;
        let array: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| FieldProblem::InvalidFormat)?;
        Ok(Self(array))
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Integrity tag over the canonical unsigned fields. Hex on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureTag(Vec<u8>);

impl SignatureTag {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for SignatureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureTag({} bytes)", self.0.len())
    }
}

impl FromStr for SignatureTag {
    type Err = FieldProblem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| FieldProblem::InvalidFormat)?;
        if bytes.is_empty() {
            return Err(FieldProblem::Empty);
        }
        Ok(Self(bytes))
    }
}

impl Serialize for SignatureTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SignatureTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// SIGNAL
// =============================================================================

/// Producer-built signal before signing.
///
/// Carries every envelope field except the ones assigned at signing time
/// (`nonce`, `signature`, `created_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDraft {
    pub subject_id: SubjectId,
    pub context: ProductContext,
    pub kind: SignalKind,
    pub severity: f64,
    pub reason_code: ReasonCode,
    /// Seconds the signal stays valid after `created_at`.
    pub ttl: u64,
    /// True only for irreversible-action signals.
    pub requires_ack: bool,
}

/// The canonical, signed message unit.
///
/// Immutable once signed: there are no setters, and any change to the
/// underlying envelope invalidates the signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    draft: SignalDraft,
    nonce: Nonce,
    created_at: u64,
    signature: SignatureTag,
}

impl Signal {
    /// Assemble a signal from its parts. Only the security manager and the
    /// envelope validator are expected to call this.
    pub fn from_parts(
        draft: SignalDraft,
        nonce: Nonce,
        created_at: u64,
        signature: SignatureTag,
    ) -> Self {
        Self {
            draft,
            nonce,
            created_at,
            signature,
        }
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.draft.subject_id
    }

    pub fn context(&self) -> ProductContext {
        self.draft.context
    }

    pub fn kind(&self) -> SignalKind {
        self.draft.kind
    }

    pub fn severity(&self) -> f64 {
        self.draft.severity
    }

    pub fn reason_code(&self) -> &ReasonCode {
        &self.draft.reason_code
    }

    pub fn ttl(&self) -> u64 {
        self.draft.ttl
    }

    pub fn requires_ack(&self) -> bool {
        self.draft.requires_ack
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn signature(&self) -> &SignatureTag {
        &self.signature
    }

    /// The unsigned portion of the signal.
    pub fn draft(&self) -> &SignalDraft {
        &self.draft
    }

    /// Reference used by authorization requests and audit entries.
    pub fn signal_ref(&self) -> SignalRef {
        SignalRef {
            subject_id: self.draft.subject_id.clone(),
            nonce: self.nonce,
        }
    }
}

/// Pointer to a signal without carrying the signal itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalRef {
    pub subject_id: SubjectId,
    pub nonce: Nonce,
}

/// An irreversible action put up for authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: ActionType,
    pub draft: SignalDraft,
}

impl ActionRequest {
    /// Build the request from the action's default kind, severity and reason.
    pub fn for_action(
        subject_id: SubjectId,
        context: ProductContext,
        action_type: ActionType,
        ttl: u64,
    ) -> Self {
        let reason_code = ReasonCode(action_type.default_reason_code().to_string());
        Self {
            action_type,
            draft: SignalDraft {
                subject_id,
                context,
                kind: action_type.signal_kind(),
                severity: action_type.default_severity(),
                reason_code,
                ttl,
                requires_ack: true,
            },
        }
    }

    /// Wrap a producer-built draft. The draft always requires acknowledgment.
    pub fn new(action_type: ActionType, mut draft: SignalDraft) -> Self {
        draft.requires_ack = true;
        Self { action_type, draft }
    }
}

// =============================================================================
// DECISION ENVELOPE
// =============================================================================

/// Decision read back from Core through the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEnvelope {
    pub request_id: RequestId,
    pub decision: Decision,
    /// Unix seconds at which Core issued the decision.
    pub issued_at: u64,
}
