// src/admin/form.rs
use crate::registry::Toggle;

/// Decoded admin form fields, from the query string and/or a urlencoded body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ToggleForm {
    fields: Vec<(String, String)>,
}

impl ToggleForm {
    pub fn parse(query: Option<&str>, body: &[u8]) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        if let Some(query) = query {
            fields.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }
        fields.extend(url::form_urlencoded::parse(body).into_owned());
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the JSON view was requested (`out=json`).
    pub fn wants_json(&self) -> bool {
        self.get("out") == Some("json")
    }

    /// A form is a write when it carries `apply` or any per-index flag.
    pub fn is_update(&self) -> bool {
        self.fields.iter().any(|(k, _)| {
            k == "apply" || index_of(k, "active").is_some() || index_of(k, "default").is_some()
        })
    }

    /// Desired flags for `len` registry entries; an absent flag means false.
    pub fn toggles(&self, len: usize) -> Vec<Toggle> {
        let mut toggles = vec![Toggle::default(); len];
        for (key, value) in &self.fields {
            if !is_set(value) {
                continue;
            }
            if let Some(idx) = index_of(key, "active").filter(|i| *i < len) {
                toggles[idx].active = true;
            } else if let Some(idx) = index_of(key, "default").filter(|i| *i < len) {
                toggles[idx].default = true;
            }
        }
        toggles
    }
}

/// `name[3]` -> `Some(3)`.
fn index_of(key: &str, name: &str) -> Option<usize> {
    key.strip_prefix(name)?
        .strip_prefix('[')?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn is_set(value: &str) -> bool {
    matches!(value, "1" | "on" | "true")
}
