//! Placeholder resolver table

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Produces a fresh value for one placeholder occurrence
pub type Resolver = fn() -> String;

const FIRST_NAMES: &[&str] = &[
    "Ava", "Liam", "Mia", "Noah", "Zoe", "Ethan", "Lena", "Omar", "Priya", "Mateo", "Yuki", "Sara",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Garcia", "Chen", "Novak", "Okafor", "Silva", "Kowalski", "Tanaka", "Muller", "Haddad",
];
const CITIES: &[&str] = &[
    "Lisbon", "Toronto", "Osaka", "Nairobi", "Berlin", "Austin", "Melbourne", "Bogota", "Oslo",
];
const COUNTRIES: &[&str] = &[
    "Portugal", "Canada", "Japan", "Kenya", "Germany", "United States", "Australia", "Colombia",
    "Norway",
];
const COMPANIES: &[&str] = &[
    "Acme Corp", "Globex", "Initech", "Umbrella Labs", "Stark Industries", "Hooli", "Vandelay",
];
const DOMAINS: &[&str] = &["example.com", "example.org", "mail.test", "demo.dev"];
const WORDS: &[&str] = &[
    "alpha", "bravo", "cobalt", "delta", "ember", "falcon", "granite", "harbor", "indigo", "juniper",
    "kestrel", "lumen", "meadow", "nimbus", "orbit", "prism",
];

fn pick(list: &[&'static str]) -> &'static str {
    list.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

fn uuid() -> String {
    Uuid::new_v4().to_string()
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn date() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn unix() -> String {
    Utc::now().timestamp().to_string()
}

fn random_int() -> String {
    rand::thread_rng().gen_range(0..=1000).to_string()
}

fn random_float() -> String {
    format!("{:.2}", rand::thread_rng().gen_range(0.0..1000.0))
}

fn boolean() -> String {
    rand::thread_rng().gen_bool(0.5).to_string()
}

fn first_name() -> String {
    pick(FIRST_NAMES).to_string()
}

fn last_name() -> String {
    pick(LAST_NAMES).to_string()
}

fn full_name() -> String {
    format!("{} {}", pick(FIRST_NAMES), pick(LAST_NAMES))
}

fn email() -> String {
    let n: u16 = rand::thread_rng().gen_range(1..1000);
    format!(
        "{}.{}{}@{}",
        pick(FIRST_NAMES).to_lowercase(),
        pick(LAST_NAMES).to_lowercase(),
        n,
        pick(DOMAINS)
    )
}

fn phone() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "+1-{:03}-{:03}-{:04}",
        rng.gen_range(200..1000),
        rng.gen_range(200..1000),
        rng.gen_range(0..10000)
    )
}

fn city() -> String {
    pick(CITIES).to_string()
}

fn country() -> String {
    pick(COUNTRIES).to_string()
}

fn company() -> String {
    pick(COMPANIES).to_string()
}

fn word() -> String {
    pick(WORDS).to_string()
}

fn sentence() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(4..9);
    let words: Vec<&str> = (0..len).map(|_| pick(WORDS)).collect();
    let mut sentence = words.join(" ");
    if let Some(first) = sentence.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    sentence.push('.');
    sentence
}

fn url() -> String {
    format!("https://{}/{}/{}", pick(DOMAINS), pick(WORDS), uuid_short())
}

fn uuid_short() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn ipv4() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}.{}.{}.{}",
        rng.gen_range(1..224),
        rng.gen_range(0..256),
        rng.gen_range(0..256),
        rng.gen_range(1..255)
    )
}

static STANDARD: Lazy<Arc<PlaceholderTable>> = Lazy::new(|| {
    Arc::new(
        PlaceholderTable::new()
            .with("uuid", uuid)
            .with("timestamp", timestamp)
            .with("date", date)
            .with("unix", unix)
            .with("randomInt", random_int)
            .with("randomFloat", random_float)
            .with("boolean", boolean)
            .with("firstName", first_name)
            .with("lastName", last_name)
            .with("name", full_name)
            .with("email", email)
            .with("phone", phone)
            .with("city", city)
            .with("country", country)
            .with("company", company)
            .with("word", word)
            .with("sentence", sentence)
            .with("url", url)
            .with("ipv4", ipv4),
    )
});

/// Token name to resolver mapping. Read-only once built.
#[derive(Clone, Default)]
pub struct PlaceholderTable {
    resolvers: BTreeMap<String, Resolver>,
}

impl PlaceholderTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table of built-in tokens
    pub fn standard() -> Arc<Self> {
        STANDARD.clone()
    }

    pub fn with(mut self, token: impl Into<String>, resolver: Resolver) -> Self {
        self.resolvers.insert(token.into(), resolver);
        self
    }

    pub fn contains(&self, token: &str) -> bool {
        self.resolvers.contains_key(token)
    }

    /// Fresh value for `token`, `None` when the token is unknown
    pub fn resolve(&self, token: &str) -> Option<String> {
        self.resolvers.get(token).map(|resolve| resolve())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for PlaceholderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tokens()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_tokens_resolve() {
        let table = PlaceholderTable::standard();
        for token in table.tokens() {
            let value = table.resolve(token).unwrap();
            assert!(!value.is_empty(), "{} resolved to an empty string", token);
        }
        assert!(table.resolve("nope").is_none());
    }

    #[test]
    fn test_uuid_is_fresh_each_call() {
        let table = PlaceholderTable::standard();
        let values: HashSet<_> = (0..50).map(|_| table.resolve("uuid").unwrap()).collect();
        assert_eq!(values.len(), 50);
    }

    #[test]
    fn test_value_shapes() {
        let table = PlaceholderTable::standard();
        let n: u32 = table.resolve("randomInt").unwrap().parse().unwrap();
        assert!(n <= 1000);
        assert!(table.resolve("email").unwrap().contains('@'));
        assert!(matches!(table.resolve("boolean").unwrap().as_str(), "true" | "false"));
        assert!(table.resolve("sentence").unwrap().ends_with('.'));
        assert!(chrono::DateTime::parse_from_rfc3339(&table.resolve("timestamp").unwrap()).is_ok());
    }
}
