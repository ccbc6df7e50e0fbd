use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{PalaverError, Result};

// =============================================================================
// Model catalog
// =============================================================================

/// A completion model the backend accepts, with its total context window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    /// Prompt plus response tokens the model can handle in one call.
    pub context_window: u32,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, context_window: u32) -> Self {
        Self {
            id: id.into(),
            context_window,
        }
    }
}

/// The set of models a user may switch between.
///
/// Serialized as a plain array so it maps onto `[[models]]` tables in the
/// configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog(Vec<ModelSpec>);

impl ModelCatalog {
    pub fn new(models: Vec<ModelSpec>) -> Self {
        Self(models)
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.0.iter().find(|m| m.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest `max_tokens` allowed for `id` once `reserve` tokens are set
    /// aside for replayed history.
    pub fn token_ceiling(&self, id: &str, reserve: u32) -> Result<u32> {
        let spec = self.get(id).ok_or_else(|| PalaverError::NotFound {
            what: "model",
            name: id.to_string(),
        })?;
        Ok(spec.context_window.saturating_sub(reserve))
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self(vec![
            ModelSpec::new("text-davinci-003", 4097),
            ModelSpec::new("text-curie-001", 2049),
            ModelSpec::new("text-babbage-001", 2049),
            ModelSpec::new("text-ada-001", 2049),
            ModelSpec::new("code-davinci-002", 8001),
        ])
    }
}

// =============================================================================
// Query configuration
// =============================================================================

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const TOP_P_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const N_RANGE: RangeInclusive<u32> = 1..=10;

/// Keys accepted by [`QueryConfig::set`], in display order.
pub const QUERY_KEYS: [&str; 8] = [
    "model",
    "max_tokens",
    "temperature",
    "top_p",
    "n",
    "stream",
    "stop",
    "user",
];

/// Parameters sent with every completion request.
///
/// Fields are public for reading; mutation from user input goes through the
/// setters, each of which checks its bound before touching the value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub n: u32,
    pub stream: bool,
    /// Written as `"none"` when cleared, since TOML has no null.
    #[serde(with = "stop_field")]
    pub stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: "text-davinci-003".to_string(),
            max_tokens: 512,
            temperature: 0.9,
            top_p: 1.0,
            n: 1,
            stream: false,
            stop: Some("\n".to_string()),
            user: None,
        }
    }
}

impl QueryConfig {
    /// Switch to another catalog model.
    ///
    /// Rejected when the current `max_tokens` would not fit the new model.
    pub fn set_model(&mut self, model: &str, catalog: &ModelCatalog, reserve: u32) -> Result<()> {
        let ceiling = catalog.token_ceiling(model, reserve)?;
        if self.max_tokens > ceiling {
            return Err(PalaverError::Validation(format!(
                "max_tokens {} exceeds the ceiling of {} for model {} \
                 (context window minus {} reserved for history); lower max_tokens first",
                self.max_tokens, ceiling, model, reserve
            )));
        }
        self.model = model.to_string();
        Ok(())
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32, catalog: &ModelCatalog, reserve: u32) -> Result<()> {
        let ceiling = catalog.token_ceiling(&self.model, reserve)?;
        if !(1..=ceiling).contains(&max_tokens) {
            return Err(PalaverError::Validation(format!(
                "max_tokens must be within [1, {ceiling}] for model {}, got {max_tokens}",
                self.model
            )));
        }
        self.max_tokens = max_tokens;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        check_unit_range("temperature", &TEMPERATURE_RANGE, temperature)?;
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_top_p(&mut self, top_p: f64) -> Result<()> {
        check_unit_range("top_p", &TOP_P_RANGE, top_p)?;
        self.top_p = top_p;
        Ok(())
    }

    pub fn set_n(&mut self, n: u32) -> Result<()> {
        if !N_RANGE.contains(&n) {
            return Err(PalaverError::Validation(format!(
                "n must be within [{}, {}], got {n}",
                N_RANGE.start(),
                N_RANGE.end()
            )));
        }
        self.n = n;
        Ok(())
    }

    pub fn set_stream(&mut self, stream: bool) {
        self.stream = stream;
    }

    pub fn set_stop(&mut self, stop: Option<String>) {
        self.stop = stop;
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    /// Set one field from its textual form, as typed by a user.
    ///
    /// Unknown keys are a `NotFound` error; unparsable or out-of-range
    /// values are a `Validation` error naming the key.
    pub fn set(&mut self, key: &str, value: &str, catalog: &ModelCatalog, reserve: u32) -> Result<()> {
        match key {
            "model" => self.set_model(value, catalog, reserve),
            "max_tokens" => {
                let n = parse_value::<u32>(key, value, "a positive integer")?;
                self.set_max_tokens(n, catalog, reserve)
            }
            "temperature" => {
                let t = parse_value::<f64>(key, value, "a number")?;
                self.set_temperature(t)
            }
            "top_p" => {
                let p = parse_value::<f64>(key, value, "a number")?;
                self.set_top_p(p)
            }
            "n" => {
                let n = parse_value::<u32>(key, value, "a positive integer")?;
                self.set_n(n)
            }
            "stream" => {
                self.set_stream(parse_flag(key, value)?);
                Ok(())
            }
            "stop" => {
                self.set_stop(optional_text(value));
                Ok(())
            }
            "user" => {
                self.set_user(optional_text(value));
                Ok(())
            }
            _ => Err(PalaverError::NotFound {
                what: "config key",
                name: key.to_string(),
            }),
        }
    }

    /// Apply several `key=value` updates as one unit.
    ///
    /// Updates are applied in order to a copy; `self` changes only if all
    /// of them succeed.
    pub fn set_many<'a, I>(&mut self, updates: I, catalog: &ModelCatalog, reserve: u32) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut staged = self.clone();
        for (key, value) in updates {
            staged.set(key, value, catalog, reserve)?;
        }
        *self = staged;
        Ok(())
    }

    /// Check every field against the bounds the setters enforce.
    pub fn validate(&self, catalog: &ModelCatalog, reserve: u32) -> Result<()> {
        let mut probe = Self {
            max_tokens: 1,
            ..self.clone()
        };
        probe.set_model(&self.model, catalog, reserve)?;
        probe.set_max_tokens(self.max_tokens, catalog, reserve)?;
        probe.set_temperature(self.temperature)?;
        probe.set_top_p(self.top_p)?;
        probe.set_n(self.n)?;
        Ok(())
    }

    /// `(key, value)` pairs for display, in [`QUERY_KEYS`] order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("model", self.model.clone()),
            ("max_tokens", self.max_tokens.to_string()),
            ("temperature", self.temperature.to_string()),
            ("top_p", self.top_p.to_string()),
            ("n", self.n.to_string()),
            ("stream", self.stream.to_string()),
            ("stop", display_optional(self.stop.as_deref())),
            ("user", display_optional(self.user.as_deref())),
        ]
    }
}

/// Parse a boolean flag as users tend to type it.
pub fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(PalaverError::Validation(format!(
            "{key} expects true/false, got '{value}'"
        ))),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, expected: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| PalaverError::Validation(format!("{key} expects {expected}, got '{value}'")))
}

fn check_unit_range(key: &str, range: &RangeInclusive<f64>, value: f64) -> Result<()> {
    // NaN fails `contains`, so it is rejected here too.
    if !range.contains(&value) {
        return Err(PalaverError::Validation(format!(
            "{key} must be within [{}, {}], got {value}",
            range.start(),
            range.end()
        )));
    }
    Ok(())
}

fn optional_text(value: &str) -> Option<String> {
    if value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

mod stop_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or("none"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(super::optional_text(&raw))
    }
}

fn display_optional(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("{v:?}"),
        None => "none".to_string(),
    }
}
