//! The request/response envelope: an order-preserving mapping of string keys to
//! arbitrary JSON values (§3). `serde_json::Map` with the `preserve_order` feature
//! gives us exactly this for free, so the envelope is a thin newtype around it
//! rather than a bespoke structure.
//!
//! Ownership follows the dispatch lifecycle in the design doc: an endpoint owns
//! its envelope from `parse` until the response is emitted, rewriting it in place
//! rather than deep-copying, except where `prepare_payload` produces a new one.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    pub fn new() -> Self {
        Envelope(Map::new())
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Envelope(match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        }))
    }

    pub fn from_query_string(query: &str) -> Self {
        let mut map = Map::new();
        for pair in query.split('&').filter(|s| !s.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            let key = urlencoding_decode(key);
            let value = urlencoding_decode(value);
            map.insert(key, Value::String(value));
        }
        Envelope(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True iff every name in `required` is present and not JSON `null`.
    pub fn missing_required(&self, required: &[&str]) -> Option<String> {
        required
            .iter()
            .find(|name| !matches!(self.0.get(**name), Some(v) if !v.is_null()))
            .map(|name| name.to_string())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.0).unwrap_or_default()
    }

    /// Prepend a `{role: "system", content: <text>}` message to the `messages`
    /// array, creating the array if absent. Used by system-prompt injection
    /// (§4.5 step 7).
    pub fn prepend_system_message(&mut self, content: String) {
        let messages = self
            .0
            .entry("messages")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = messages {
            let mut rebuilt = Vec::with_capacity(list.len() + 1);
            rebuilt.push(serde_json::json!({"role": "system", "content": content}));
            rebuilt.append(list);
            *list = rebuilt;
        }
    }
}

impl From<Map<String, Value>> for Envelope {
    fn from(map: Map<String, Value>) -> Self {
        Envelope(map)
    }
}

fn urlencoding_decode(input: &str) -> String {
    percent_decode(input.replace('+', " ").as_bytes())
}

/// Minimal percent-decoding sufficient for query strings; we don't pull in a
/// dedicated crate for this since the gateway never needs to *encode* a URL.
fn percent_decode(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Single-pass, left-to-right substitution of literal placeholder tokens
/// (`##NAME##`) in a prompt template. Deliberately not a general templating
/// engine (§9 design notes).
pub fn substitute_placeholders(template: &str, map: &[(String, String)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    'outer: while !rest.is_empty() {
        for (token, value) in map {
            if let Some(stripped) = rest.strip_prefix(token.as_str()) {
                result.push_str(value);
                rest = stripped;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            result.push(c);
        }
        rest = chars.as_str();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_object_json() {
        let env = Envelope::from_json_bytes(br#"{"model":"m","messages":[]}"#).unwrap();
        assert_eq!(env.get_str("model"), Some("m"));
    }

    #[test]
    fn missing_required_reports_first_absent() {
        let env = Envelope::from_json_bytes(br#"{"a": 1}"#).unwrap();
        assert_eq!(env.missing_required(&["a", "b"]), Some("b".to_string()));
        assert_eq!(env.missing_required(&["a"]), None);
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let env = Envelope::from_json_bytes(br#"{"a": null}"#).unwrap();
        assert_eq!(env.missing_required(&["a"]), Some("a".to_string()));
    }

    #[test]
    fn substitution_is_single_pass_and_idempotent_on_foreign_tokens() {
        let out = substitute_placeholders(
            "Q##NUM##: ##QUESTION##",
            &[
                ("##NUM##".to_string(), "1".to_string()),
                ("##QUESTION##".to_string(), "what time is it".to_string()),
            ],
        );
        assert_eq!(out, "Q1: what time is it");

        let no_placeholders = substitute_placeholders("plain text", &[]);
        assert_eq!(no_placeholders, "plain text");

        // Applying the same map twice to already-substituted text is a no-op
        // because none of the replacement values contain a token.
        let twice = substitute_placeholders(&out, &[("##NUM##".to_string(), "1".to_string())]);
        assert_eq!(twice, out);
    }

    #[test]
    fn prepend_system_message_preserves_existing_messages() {
        let mut env =
            Envelope::from_json_bytes(br#"{"messages":[{"role":"user","content":"hi"}]}"#)
                .unwrap();
        env.prepend_system_message("system text".to_string());
        let messages = env.get("messages").unwrap().as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn query_string_parsing_decodes_percent_escapes() {
        let env = Envelope::from_query_string("language=en&q=hello%20world");
        assert_eq!(env.get_str("q"), Some("hello world"));
        assert_eq!(env.get_str("language"), Some("en"));
    }
}
