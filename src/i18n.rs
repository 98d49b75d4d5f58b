//! Italian and English message catalogs.
//!
//! Catalogs are nested JSON embedded at build time and flattened to dotted
//! keys (`Contribute.alerts.success`). Placeholders look like `{count}`.
//! A key missing from a catalog renders as the key itself.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    It,
    En,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Locale::It => "it",
            Locale::En => "en",
        }
    }

    /// The language the switcher offers
    pub fn other(self) -> Locale {
        match self {
            Locale::It => Locale::En,
            Locale::En => Locale::It,
        }
    }

    /// Locale of a request path: `en` when it starts with `/en`, else `it`
    pub fn from_path(path: &str) -> Locale {
        if path == "/en" || path.starts_with("/en/") {
            Locale::En
        } else {
            Locale::It
        }
    }

    /// Split `/{locale}/rest` into the locale and `/rest`
    pub fn strip_prefix(path: &str) -> Option<(Locale, &str)> {
        let trimmed = path.strip_prefix('/')?;
        let (first, rest) = match trimmed.find('/') {
            Some(i) => (&trimmed[..i], &trimmed[i..]),
            None => (trimmed, ""),
        };
        let locale = first.parse().ok()?;
        Some((locale, if rest.is_empty() { "/" } else { rest }))
    }
}

impl FromStr for Locale {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "it" => Ok(Locale::It),
            "en" => Ok(Locale::En),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Catalog = HashMap<String, String>;

fn load(raw: &str) -> Catalog {
    let value: serde_json::Value =
        serde_json::from_str(raw).expect("embedded message catalog should be valid JSON");
    let mut out = HashMap::new();
    flatten("", &value, &mut out);
    out
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Catalog) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

static IT: LazyLock<Catalog> = LazyLock::new(|| load(include_str!("../messages/it.json")));
static EN: LazyLock<Catalog> = LazyLock::new(|| load(include_str!("../messages/en.json")));

fn catalog(locale: Locale) -> &'static Catalog {
    match locale {
        Locale::It => &IT,
        Locale::En => &EN,
    }
}

/// Look up a message
pub fn t(locale: Locale, key: &str) -> String {
    catalog(locale)
        .get(key)
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

pub fn has(locale: Locale, key: &str) -> bool {
    catalog(locale).contains_key(key)
}

/// Look up a message and fill its `{name}` placeholders
pub fn tr(locale: Locale, key: &str, args: &[(&str, &str)]) -> String {
    let mut msg = t(locale, key);
    for (name, value) in args {
        msg = msg.replace(&format!("{{{name}}}"), value);
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogs_share_keys() {
        let mut it: Vec<_> = IT.keys().collect();
        let mut en: Vec<_> = EN.keys().collect();
        it.sort();
        en.sort();
        assert_eq!(it, en);
    }

    #[test]
    fn lookup_interpolates_and_falls_back() {
        assert_eq!(
            tr(Locale::En, "Contribute.alerts.success", &[("count", "3")]),
            "3 videos uploaded successfully!"
        );
        assert_eq!(t(Locale::It, "Navbar.contribute"), "Contribuisci");
        assert_eq!(t(Locale::It, "Nope.missing"), "Nope.missing");
        assert!(has(Locale::En, "Admin.approved"));
        assert!(!has(Locale::En, "Admin"));
    }

    #[test]
    fn locale_from_paths() {
        assert_eq!(Locale::from_path("/en/contribuisci"), Locale::En);
        assert_eq!(Locale::from_path("/en"), Locale::En);
        assert_eq!(Locale::from_path("/english"), Locale::It);
        assert_eq!(Locale::from_path("/it/admin"), Locale::It);

        assert_eq!(
            Locale::strip_prefix("/en/community"),
            Some((Locale::En, "/community"))
        );
        assert_eq!(Locale::strip_prefix("/it"), Some((Locale::It, "/")));
        assert_eq!(Locale::strip_prefix("/contribuisci"), None);
        assert_eq!(Locale::It.other(), Locale::En);
    }
}
