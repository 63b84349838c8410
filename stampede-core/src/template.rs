use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::session::SessionState;

/// A template referenced a session key that was never set for this user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session key `{key}` is not set")]
pub struct UnresolvedReference {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Session(String),
}

/// A string with `${key}` session references. `$$` is a literal `$`.
///
/// Parsed once at load time; rendering only substitutes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidTemplate {
            template: raw.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }

            match chars.peek() {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut key = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' | '$' => return Err(invalid("nested reference")),
                            c => key.push(c),
                        }
                    }
                    if !closed {
                        return Err(invalid("unterminated `${` reference"));
                    }
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(invalid("empty `${}` reference"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Session(key.to_string()));
                }
                _ => literal.push('$'),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// A template that renders to `value` verbatim.
    pub fn literal(value: impl Into<String>) -> Self {
        let value = value.into();
        let segments = if value.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Literal(value.clone())]
        };
        Self {
            raw: value.replace('$', "$$"),
            segments,
        }
    }

    /// A template that renders to the current value of `key`.
    pub fn session(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            raw: format!("${{{key}}}"),
            segments: vec![Segment::Session(key)],
        }
    }

    /// The source text this template was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    pub fn references(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Session(key) => Some(key.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, session: &SessionState) -> Result<Cow<'_, str>, UnresolvedReference> {
        match self.segments.as_slice() {
            [] => Ok(Cow::Borrowed("")),
            [Segment::Literal(s)] => Ok(Cow::Borrowed(s.as_str())),
            segments => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(s) => out.push_str(s),
                        Segment::Session(key) => {
                            let value = session
                                .get(key)
                                .ok_or_else(|| UnresolvedReference { key: key.clone() })?;
                            out.push_str(value);
                        }
                    }
                }
                Ok(Cow::Owned(out))
            }
        }
    }
}

impl FromStr for Template {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Ordered header name/value templates. Names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderTemplate {
    entries: Vec<(String, Template)>,
}

impl HeaderTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Template) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert, replacing any same-named entry in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Template) {
        let name = name.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// `other` layered over `self`: same-named headers from `other` win.
    #[must_use]
    pub fn merge(&self, other: &HeaderTemplate) -> HeaderTemplate {
        let mut merged = self.clone();
        for (name, value) in &other.entries {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Template)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(
        &self,
        session: &SessionState,
    ) -> Result<Vec<(String, String)>, UnresolvedReference> {
        self.entries
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.render(session)?.into_owned())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn session(pairs: &[(&str, &str)]) -> SessionState {
        let mut s = SessionState::new();
        for (k, v) in pairs {
            s.set(*k, *v);
        }
        s
    }

    #[test]
    fn literal_only_template_renders_borrowed() {
        let t = Template::parse("/static/js/main.js").unwrap();
        assert!(t.is_literal());
        assert!(matches!(
            t.render(&SessionState::new()).unwrap(),
            Cow::Borrowed("/static/js/main.js")
        ));
    }

    #[test]
    fn references_are_substituted() {
        let t = Template::parse("Bearer ${authToken}").unwrap();
        assert_eq!(t.references().collect::<Vec<_>>(), vec!["authToken"]);

        let s = session(&[("authToken", "X")]);
        assert_eq!(t.render(&s).unwrap(), "Bearer X");
    }

    #[test]
    fn missing_key_is_unresolved_reference() {
        let t = Template::parse("/users/${ userId }/profile").unwrap();
        let err = t.render(&SessionState::new()).unwrap_err();
        assert_eq!(
            err,
            UnresolvedReference {
                key: "userId".to_string()
            }
        );
    }

    #[test]
    fn dollar_escapes_and_lone_dollars_are_literal() {
        let t = Template::parse("cost: $$5 or $6").unwrap();
        assert!(t.is_literal());
        assert_eq!(t.render(&SessionState::new()).unwrap(), "cost: $5 or $6");
    }

    #[test]
    fn malformed_references_fail_to_parse() {
        for raw in ["${", "abc ${token", "${}", "${ }", "${a${b}}"] {
            assert!(
                matches!(
                    Template::parse(raw),
                    Err(ConfigError::InvalidTemplate { .. })
                ),
                "expected parse failure for {raw:?}"
            );
        }
    }

    #[test]
    fn literal_constructor_round_trips_through_parse() {
        let t = Template::literal("W/\"31d-$x\"");
        assert_eq!(Template::parse(t.as_str()).unwrap(), t);
        assert_eq!(
            Template::session("lastEtag").render(&session(&[("lastEtag", "v1")])).unwrap(),
            "v1"
        );
    }

    #[test]
    fn header_merge_overrides_case_insensitively() {
        let base = HeaderTemplate::new()
            .with("Accept", Template::literal("*/*"))
            .with("User-Agent", Template::literal("stampede"));
        let step = HeaderTemplate::new()
            .with("accept", Template::literal("application/json"))
            .with("authorization", Template::session("authToken"));

        let merged = base.merge(&step);
        assert_eq!(merged.len(), 3);
        assert_eq!(
            merged.get("ACCEPT").map(Template::as_str),
            Some("application/json")
        );

        let rendered = merged.render(&session(&[("authToken", "t")])).unwrap();
        assert_eq!(
            rendered,
            vec![
                ("accept".to_string(), "application/json".to_string()),
                ("User-Agent".to_string(), "stampede".to_string()),
                ("authorization".to_string(), "t".to_string()),
            ]
        );
    }
}
