//! Ordered field lookups over loosely typed JSON responses.
//!
//! Remote services disagree on where they put issued credentials. Each lookup
//! is a priority-ordered list of probes; the first probe that finds a
//! non-empty string wins.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldProbe {
    /// `response[object][field]`
    Nested(&'static str, &'static str),
    /// `response[field]`
    TopLevel(&'static str),
}

impl FieldProbe {
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a str> {
        let found = match *self {
            FieldProbe::Nested(object, field) => value.get(object)?.get(field)?,
            FieldProbe::TopLevel(field) => value.get(field)?,
        };
        found.as_str().filter(|s| !s.trim().is_empty())
    }
}

pub const CREDENTIAL_PROBES: &[FieldProbe] = &[
    FieldProbe::Nested("agent", "api_key"),
    FieldProbe::TopLevel("api_key"),
    FieldProbe::TopLevel("token"),
    FieldProbe::TopLevel("access_token"),
    FieldProbe::TopLevel("key"),
];

pub const ACTIVATION_URL_PROBES: &[FieldProbe] = &[
    FieldProbe::Nested("agent", "claim_url"),
    FieldProbe::TopLevel("claim_url"),
    FieldProbe::TopLevel("activation_url"),
    FieldProbe::TopLevel("verification_url"),
];

pub fn probe<'a>(value: &'a Value, probes: &[FieldProbe]) -> Option<&'a str> {
    probes.iter().find_map(|p| p.lookup(value))
}
