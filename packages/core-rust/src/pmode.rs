//! Processing Mode (PMode) value types and structural validation.
//!
//! A [`PMode`] governs how one message exchange is carried out: which
//! [`Mep`] and [`MepBinding`] apply and which parties take part. The record
//! itself is a plain value; ownership and persistence belong to the PMode
//! store in the server crate.
//!
//! Validation enforces six structural invariants, checked in this order:
//!
//! 1. the ID is present
//! 2. the MEP binding is present
//! 3. the MEP is present
//! 4. a present initiator carries an ID value and a role
//! 5. a present responder carries an ID value and a role
//! 6. at least one of initiator and responder is present
//!
//! Blank strings count as absent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mep::{Mep, MepBinding};

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// PModeParty
// ---------------------------------------------------------------------------

/// One side of an exchange, identified by a party ID and the role it plays.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PModeParty {
    /// Optional scheme of the party ID (e.g. `urn:oasis:names:tc:ebcore:partyid-type:...`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
}

impl PModeParty {
    /// Creates a party with an untyped ID value and a role.
    #[must_use]
    pub fn new(id_value: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id_type: None,
            id_value: Some(id_value.into()),
            role: Some(role.into()),
        }
    }

    #[must_use]
    pub fn with_id_type(mut self, id_type: impl Into<String>) -> Self {
        self.id_type = Some(id_type.into());
        self
    }

    fn check(&self, side: PartySide, errors: &mut Vec<PModeValidationError>) {
        if !has_text(self.id_value.as_deref()) {
            errors.push(PModeValidationError::MissingPartyId { side });
        }
        if !has_text(self.role.as_deref()) {
            errors.push(PModeValidationError::MissingPartyRole { side });
        }
    }
}

/// Which party of a PMode a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartySide {
    Initiator,
    Responder,
}

impl fmt::Display for PartySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartySide::Initiator => f.write_str("initiator"),
            PartySide::Responder => f.write_str("responder"),
        }
    }
}

// ---------------------------------------------------------------------------
// PModeValidationError
// ---------------------------------------------------------------------------

/// A violated structural invariant. Always fatal for the validated PMode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PModeValidationError {
    #[error("no PMode ID present")]
    MissingId,
    #[error("no PMode MEP binding present (push, pull, sync)")]
    MissingMepBinding,
    #[error("no PMode MEP present")]
    MissingMep,
    #[error("no PMode {side} ID present")]
    MissingPartyId { side: PartySide },
    #[error("no PMode {side} role present")]
    MissingPartyRole { side: PartySide },
    #[error("PMode is missing initiator and/or responder")]
    MissingParties,
}

// ---------------------------------------------------------------------------
// PMode
// ---------------------------------------------------------------------------

/// Processing Mode: the configuration governing one kind of message exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PMode {
    /// Unique key within the store. Blank means absent.
    pub id: String,
    /// Optional `eb:AgreementRef` value.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agreement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mep: Option<Mep>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mep_binding: Option<MepBinding>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub initiator: Option<PModeParty>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub responder: Option<PModeParty>,
}

impl PMode {
    /// Creates a PMode with the given ID and every other field unset.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_id(&self) -> bool {
        has_text(Some(self.id.as_str()))
    }

    /// Checks the structural invariants and reports the first violation.
    ///
    /// # Errors
    ///
    /// Returns the first [`PModeValidationError`] in invariant order.
    pub fn validate(&self) -> Result<(), PModeValidationError> {
        match self.violations().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Checks the structural invariants and reports every violation, in invariant order.
    #[must_use]
    pub fn violations(&self) -> Vec<PModeValidationError> {
        let mut errors = Vec::new();

        if !self.has_id() {
            errors.push(PModeValidationError::MissingId);
        }
        if self.mep_binding.is_none() {
            errors.push(PModeValidationError::MissingMepBinding);
        }
        if self.mep.is_none() {
            errors.push(PModeValidationError::MissingMep);
        }
        if let Some(initiator) = &self.initiator {
            initiator.check(PartySide::Initiator, &mut errors);
        }
        if let Some(responder) = &self.responder {
            responder.check(PartySide::Responder, &mut errors);
        }
        if self.initiator.is_none() && self.responder.is_none() {
            errors.push(PModeValidationError::MissingParties);
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn valid_pmode() -> PMode {
        PMode {
            id: "pm-1".to_string(),
            agreement: None,
            mep: Some(Mep::OneWay),
            mep_binding: Some(MepBinding::Push),
            initiator: Some(PModeParty::new("sender", "http://example.org/roles/sender")),
            responder: Some(PModeParty::new("receiver", "http://example.org/roles/receiver")),
        }
    }

    #[test]
    fn valid_pmode_passes() {
        assert_eq!(valid_pmode().validate(), Ok(()));
        assert!(valid_pmode().violations().is_empty());
    }

    #[test]
    fn single_party_is_enough() {
        let mut pmode = valid_pmode();
        pmode.initiator = None;
        assert!(pmode.validate().is_ok());

        let mut pmode = valid_pmode();
        pmode.responder = None;
        assert!(pmode.validate().is_ok());
    }

    #[test]
    fn each_invariant_fails_in_isolation() {
        let mut p = valid_pmode();
        p.id = "  ".to_string();
        assert_eq!(p.validate(), Err(PModeValidationError::MissingId));

        let mut p = valid_pmode();
        p.mep_binding = None;
        assert_eq!(p.validate(), Err(PModeValidationError::MissingMepBinding));

        let mut p = valid_pmode();
        p.mep = None;
        assert_eq!(p.validate(), Err(PModeValidationError::MissingMep));

        let mut p = valid_pmode();
        p.initiator.as_mut().unwrap().id_value = None;
        assert_eq!(
            p.validate(),
            Err(PModeValidationError::MissingPartyId {
                side: PartySide::Initiator
            })
        );

        let mut p = valid_pmode();
        p.initiator.as_mut().unwrap().role = Some(String::new());
        assert_eq!(
            p.validate(),
            Err(PModeValidationError::MissingPartyRole {
                side: PartySide::Initiator
            })
        );

        let mut p = valid_pmode();
        p.responder.as_mut().unwrap().id_value = None;
        assert_eq!(
            p.validate(),
            Err(PModeValidationError::MissingPartyId {
                side: PartySide::Responder
            })
        );

        let mut p = valid_pmode();
        p.responder.as_mut().unwrap().role = None;
        assert_eq!(
            p.validate(),
            Err(PModeValidationError::MissingPartyRole {
                side: PartySide::Responder
            })
        );

        let mut p = valid_pmode();
        p.initiator = None;
        p.responder = None;
        assert_eq!(p.validate(), Err(PModeValidationError::MissingParties));
    }

    #[test]
    fn first_violation_follows_invariant_order() {
        let pmode = PMode::new("");
        assert_eq!(pmode.validate(), Err(PModeValidationError::MissingId));
        assert_eq!(
            pmode.violations(),
            vec![
                PModeValidationError::MissingId,
                PModeValidationError::MissingMepBinding,
                PModeValidationError::MissingMep,
                PModeValidationError::MissingParties,
            ]
        );
    }

    #[test]
    fn error_messages_name_the_party() {
        let err = PModeValidationError::MissingPartyRole {
            side: PartySide::Responder,
        };
        assert_eq!(err.to_string(), "no PMode responder role present");
    }

    #[test]
    fn json_omits_unset_fields() {
        let json = serde_json::to_value(PMode::new("bare")).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "bare" }));

        let full = serde_json::to_value(valid_pmode()).unwrap();
        assert_eq!(full["mep"], "oneway");
        assert_eq!(full["mepBinding"], "push");
        assert_eq!(full["initiator"]["idValue"], "sender");
    }

    fn arb_text() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            Just(Some(" ".to_string())),
            "[a-z]{1,8}".prop_map(Some),
        ]
    }

    fn arb_party() -> impl Strategy<Value = Option<PModeParty>> {
        prop::option::of((arb_text(), arb_text()).prop_map(|(id_value, role)| PModeParty {
            id_type: None,
            id_value,
            role,
        }))
    }

    fn arb_pmode() -> impl Strategy<Value = PMode> {
        (
            arb_text(),
            prop::option::of(prop::sample::select(Mep::ALL.to_vec())),
            prop::option::of(prop::sample::select(MepBinding::ALL.to_vec())),
            arb_party(),
            arb_party(),
        )
            .prop_map(|(id, mep, mep_binding, initiator, responder)| PMode {
                id: id.unwrap_or_default(),
                agreement: None,
                mep,
                mep_binding,
                initiator,
                responder,
            })
    }

    fn party_complete(party: Option<&PModeParty>) -> bool {
        party.map_or(true, |p| {
            p.id_value.as_deref().is_some_and(|v| !v.trim().is_empty())
                && p.role.as_deref().is_some_and(|v| !v.trim().is_empty())
        })
    }

    proptest! {
        #[test]
        fn validate_succeeds_iff_all_invariants_hold(pmode in arb_pmode()) {
            let holds = !pmode.id.trim().is_empty()
                && pmode.mep_binding.is_some()
                && pmode.mep.is_some()
                && party_complete(pmode.initiator.as_ref())
                && party_complete(pmode.responder.as_ref())
                && (pmode.initiator.is_some() || pmode.responder.is_some());
            prop_assert_eq!(pmode.validate().is_ok(), holds);
            prop_assert_eq!(pmode.violations().is_empty(), holds);
        }
    }
}
