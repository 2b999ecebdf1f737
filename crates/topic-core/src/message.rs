//! Topic requests and decoded responses

use std::collections::BTreeMap;
use std::str::FromStr;

/// A single world-topic query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRequest {
    query: String,
    params: Vec<(String, Option<String>)>,
    authenticated: bool,
}

impl TopicRequest {
    /// Query by verb, e.g. `status` or `whoIs`
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
            authenticated: false,
        }
    }

    /// Server status summary
    pub fn status() -> Self {
        Self::new("status")
    }

    /// List of connected players
    pub fn who_is() -> Self {
        Self::new("whoIs")
    }

    /// List of online admins
    pub fn get_admins() -> Self {
        Self::new("getAdmins")
    }

    /// Resolve an account identifier to a ckey (requires the comms key)
    pub fn identify_uuid(uuid: impl Into<String>) -> Self {
        Self::new("identify_uuid")
            .authenticated()
            .param("uuid", uuid)
    }

    /// Attach the comms key when encoding
    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    /// Add a value-less parameter
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.params.push((name.into(), None));
        self
    }

    /// Add a `name=value` parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), Some(value.into())));
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn params(&self) -> &[(String, Option<String>)] {
        &self.params
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Flat field map decoded from a topic reply or push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicResponse {
    fields: BTreeMap<String, String>,
}

impl TopicResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field unless it is already present.
    ///
    /// Repeated keys keep their first value.
    pub fn insert_first(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(key.into())
            .or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Parse a field, `None` when missing or unparsable
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TopicResponse {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut response = Self::new();
        for (key, value) in iter {
            response.insert_first(key, value);
        }
        response
    }
}
