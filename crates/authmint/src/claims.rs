//! ID token claim validation
//!
//! Decoding yields [`UnverifiedClaims`]; the only way to obtain a [`Token`] is
//! [`ClaimValidator::validate`], which runs a fixed, ordered rule list and
//! stops at the first violation.
//!
//! Rule order:
//!
//! 1. `key_id`: the header names a key (custom tokens are told apart here)
//! 2. `algorithm`: the header announces RS256
//! 3. `audience`: `aud` is the project id
//! 4. `issuer`: `iss` is the project's issuer
//! 5. `issued_at`: `iat` is not in the future
//! 6. `expiry`: `exp` is not in the past
//! 7. `subject_present`: `sub` is non-empty
//! 8. `subject_length`: `sub` is at most 128 characters

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::clock::Clock;
use crate::codec::{ALGORITHM, JwtHeader};
use crate::error::VerifyError;

/// Audience of every custom token, and the marker that identifies one
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Issuer of ID tokens is this prefix followed by the project id
pub const ID_TOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Longest accepted subject or uid, in characters
pub const MAX_UID_LENGTH: usize = 128;

/// Payload of a decoded token that has not been validated
///
/// Fields absent from the JSON take their zero value, so a missing claim fails
/// the matching rule rather than the decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnverifiedClaims {
    #[serde(default)]
    iss: String,
    #[serde(default)]
    aud: String,
    #[serde(default)]
    iat: i64,
    #[serde(default)]
    exp: i64,
    #[serde(default)]
    sub: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl UnverifiedClaims {
    /// `iss` claim
    pub fn issuer(&self) -> &str {
        &self.iss
    }

    /// `aud` claim
    pub fn audience(&self) -> &str {
        &self.aud
    }

    /// `iat` claim
    pub fn issued_at(&self) -> i64 {
        self.iat
    }

    /// `exp` claim
    pub fn expires_at(&self) -> i64 {
        self.exp
    }

    /// `sub` claim
    pub fn subject(&self) -> &str {
        &self.sub
    }

    /// Every other payload field
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// A verified ID token
///
/// Only produced by [`ClaimValidator::validate`] after every rule has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    issuer: String,
    audience: String,
    issued_at: i64,
    expires_at: i64,
    subject: String,
    uid: String,
    claims: Map<String, Value>,
}

impl Token {
    fn from_verified(claims: UnverifiedClaims) -> Self {
        let mut extra = claims.extra;
        // `uid` always mirrors `sub`
        extra.remove("uid");
        Self {
            uid: claims.sub.clone(),
            issuer: claims.iss,
            audience: claims.aud,
            issued_at: claims.iat,
            expires_at: claims.exp,
            subject: claims.sub,
            claims: extra,
        }
    }

    /// `iss` claim
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `aud` claim, the project id
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// `iat` claim, seconds since the Unix epoch
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// `exp` claim, seconds since the Unix epoch
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// `sub` claim
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// User id of the account the token belongs to
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Payload fields not modeled above
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Look up one extra claim
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("iss", &self.issuer)?;
        map.serialize_entry("aud", &self.audience)?;
        map.serialize_entry("exp", &self.expires_at)?;
        map.serialize_entry("iat", &self.issued_at)?;
        map.serialize_entry("sub", &self.subject)?;
        map.serialize_entry("uid", &self.uid)?;
        for (name, value) in &self.claims {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct RuleInput<'a> {
    header: &'a JwtHeader,
    claims: &'a UnverifiedClaims,
    project_id: &'a str,
    issuer: &'a str,
    now: i64,
}

struct Rule {
    name: &'static str,
    violated: fn(&RuleInput<'_>) -> bool,
    error: fn(&RuleInput<'_>) -> VerifyError,
}

const RULES: &[Rule] = &[
    Rule {
        name: "key_id",
        violated: key_id_missing,
        error: key_id_error,
    },
    Rule {
        name: "algorithm",
        violated: algorithm_unsupported,
        error: algorithm_error,
    },
    Rule {
        name: "audience",
        violated: audience_mismatch,
        error: audience_error,
    },
    Rule {
        name: "issuer",
        violated: issuer_mismatch,
        error: issuer_error,
    },
    Rule {
        name: "issued_at",
        violated: issued_in_future,
        error: issued_at_error,
    },
    Rule {
        name: "expiry",
        violated: expired,
        error: expiry_error,
    },
    Rule {
        name: "subject_present",
        violated: subject_empty,
        error: empty_subject_error,
    },
    Rule {
        name: "subject_length",
        violated: subject_too_long,
        error: subject_length_error,
    },
];

fn key_id_missing(input: &RuleInput<'_>) -> bool {
    has_no_key_id(input.header)
}

fn key_id_error(input: &RuleInput<'_>) -> VerifyError {
    no_key_id_error(input.claims)
}

fn has_no_key_id(header: &JwtHeader) -> bool {
    header.key_id().is_none()
}

/// Custom tokens carry no key id, so their audience tells them apart
fn no_key_id_error(claims: &UnverifiedClaims) -> VerifyError {
    if claims.aud == CUSTOM_TOKEN_AUDIENCE {
        VerifyError::WrongTokenType
    } else {
        VerifyError::MissingKeyId
    }
}

fn algorithm_unsupported(input: &RuleInput<'_>) -> bool {
    input.header.alg != ALGORITHM
}

fn algorithm_error(input: &RuleInput<'_>) -> VerifyError {
    VerifyError::UnsupportedAlgorithm {
        found: input.header.alg.clone(),
    }
}

fn audience_mismatch(input: &RuleInput<'_>) -> bool {
    input.claims.aud != input.project_id
}

fn audience_error(input: &RuleInput<'_>) -> VerifyError {
    VerifyError::AudienceMismatch {
        expected: input.project_id.to_string(),
        actual: input.claims.aud.clone(),
    }
}

fn issuer_mismatch(input: &RuleInput<'_>) -> bool {
    input.claims.iss != input.issuer
}

fn issuer_error(input: &RuleInput<'_>) -> VerifyError {
    VerifyError::IssuerMismatch {
        expected: input.issuer.to_string(),
        actual: input.claims.iss.clone(),
    }
}

fn issued_in_future(input: &RuleInput<'_>) -> bool {
    input.claims.iat > input.now
}

fn issued_at_error(input: &RuleInput<'_>) -> VerifyError {
    VerifyError::IssuedInFuture {
        issued_at: input.claims.iat,
        now: input.now,
    }
}

fn expired(input: &RuleInput<'_>) -> bool {
    input.claims.exp < input.now
}

fn expiry_error(input: &RuleInput<'_>) -> VerifyError {
    VerifyError::Expired {
        expired_at: input.claims.exp,
        now: input.now,
    }
}

fn subject_empty(input: &RuleInput<'_>) -> bool {
    input.claims.sub.is_empty()
}

fn empty_subject_error(_: &RuleInput<'_>) -> VerifyError {
    VerifyError::EmptySubject
}

fn subject_too_long(input: &RuleInput<'_>) -> bool {
    input.claims.sub.chars().count() > MAX_UID_LENGTH
}

fn subject_length_error(input: &RuleInput<'_>) -> VerifyError {
    VerifyError::SubjectTooLong {
        length: input.claims.sub.chars().count(),
    }
}

/// Structural check run before any key is fetched
///
/// A token without a key id can never pass signature verification, so this
/// reports the same error the `key_id` rule would, without a network round trip.
pub(crate) fn check_key_id(header: &JwtHeader, claims: &UnverifiedClaims) -> Result<(), VerifyError> {
    if has_no_key_id(header) {
        return Err(no_key_id_error(claims));
    }
    Ok(())
}

/// Applies the ID token rules for one project
#[derive(Debug, Clone)]
pub struct ClaimValidator {
    project_id: String,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl ClaimValidator {
    /// Create a validator for `project_id`, reading time from `clock`
    pub fn new(project_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let project_id = project_id.into();
        let issuer = format!("{ID_TOKEN_ISSUER_PREFIX}{project_id}");
        Self {
            project_id,
            issuer,
            clock,
        }
    }

    /// Project id tokens must be issued for
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Issuer tokens must carry
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Names of the rules in evaluation order
    pub fn rule_names() -> impl Iterator<Item = &'static str> {
        RULES.iter().map(|rule| rule.name)
    }

    /// Run every rule in order and convert the claims into a trusted [`Token`]
    ///
    /// # Errors
    ///
    /// Returns the error of the first rule the token violates.
    pub fn validate(&self, header: &JwtHeader, claims: UnverifiedClaims) -> Result<Token, VerifyError> {
        let input = RuleInput {
            header,
            claims: &claims,
            project_id: &self.project_id,
            issuer: &self.issuer,
            now: self.clock.unix_now(),
        };

        if let Some(rule) = RULES.iter().find(|rule| (rule.violated)(&input)) {
            let error = (rule.error)(&input);
            debug!(rule = rule.name, error = %error, "ID token rejected");
            return Err(error);
        }

        Ok(Token::from_verified(claims))
    }
}
