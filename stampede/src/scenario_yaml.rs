use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use stampede_core::{
    BodySource, ConfigError, ExtractionRule, FixtureLoader, FsFixtureLoader, HeaderTemplate,
    HttpProtocol, InjectionMode, JitterPolicy, RequestStep, ScenarioDefinition, Template,
    WorkloadProfile, load_fixture, load_fixture_template,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioDocYaml {
    /// Scenario name (metrics `scenario` tag). Defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub protocol: ProtocolYaml,

    /// Named header sets, referenced from steps by name.
    #[serde(default)]
    pub headers: BTreeMap<String, HeaderListYaml>,

    #[serde(default)]
    pub workload: WorkloadYaml,

    pub steps: Vec<StepYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ProtocolYaml {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub headers: HeaderListYaml,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct WorkloadYaml {
    /// constant-rate | constant-rate-randomized
    #[serde(default)]
    pub mode: Option<String>,

    #[serde(default)]
    pub rate_per_second: Option<f64>,

    #[serde(default)]
    pub duration: Option<YamlDuration>,

    /// uniform | poisson
    #[serde(default)]
    pub jitter: Option<String>,

    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StepYaml {
    Pause(PauseYaml),
    Request(RequestYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PauseYaml {
    pub pause: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    pub name: String,

    #[serde(default)]
    pub method: Option<String>,

    pub url: String,

    /// Names of header sets, applied in order.
    #[serde(default)]
    pub headers: Vec<String>,

    /// Inline headers, applied over the named sets.
    #[serde(default)]
    pub header: HeaderListYaml,

    #[serde(default)]
    pub body: Option<BodyYaml>,

    #[serde(default)]
    pub extract: Vec<ExtractYaml>,

    #[serde(default)]
    pub resources: Vec<RequestYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct BodyYaml {
    #[serde(default)]
    pub text: Option<String>,

    /// Fixture path, relative to the scenario document.
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub json: Option<serde_yaml::Value>,

    /// Treat a `file` body as a `${key}` template instead of raw bytes.
    #[serde(default)]
    pub template: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ExtractYaml {
    #[serde(default)]
    pub header: Option<String>,

    #[serde(default)]
    pub json: Option<String>,

    #[serde(default)]
    pub status: bool,

    pub into: String,
}

/// Header name/value pairs in document order.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderListYaml(Vec<(String, String)>);

impl<'de> Deserialize<'de> for HeaderListYaml {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let raw = serde_yaml::Mapping::deserialize(deserializer)?;
        let mut out = Vec::with_capacity(raw.len());
        for (k, v) in raw {
            let name = scalar_string(k)
                .ok_or_else(|| D::Error::custom("header names must be strings"))?;
            let value = scalar_string(v).ok_or_else(|| {
                D::Error::custom(format!("header `{name}` must have a scalar value"))
            })?;
            out.push((name, value));
        }
        Ok(Self(out))
    }
}

fn scalar_string(v: serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|e| E::custom(format!("invalid duration {v}: {e}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Workload values given on the command line; each one wins over the document.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WorkloadOverrides {
    pub rate: Option<f64>,
    pub duration: Option<Duration>,
    pub mode: Option<InjectionMode>,
    pub jitter: Option<JitterPolicy>,
    pub seed: Option<u64>,
}

impl WorkloadYaml {
    /// `Ok(None)` when neither the document nor the overrides give a rate and a duration.
    pub(crate) fn resolve(
        &self,
        overrides: &WorkloadOverrides,
    ) -> anyhow::Result<Option<WorkloadProfile>> {
        let mode = match (overrides.mode, &self.mode) {
            (Some(mode), _) => mode,
            (None, Some(raw)) => InjectionMode::from_str(raw.trim())
                .map_err(|_| ConfigError::InvalidMode(raw.clone()))?,
            (None, None) => InjectionMode::default(),
        };
        let jitter = match (overrides.jitter, &self.jitter) {
            (Some(jitter), _) => jitter,
            (None, Some(raw)) => JitterPolicy::from_str(raw.trim())
                .map_err(|_| ConfigError::InvalidJitter(raw.clone()))?,
            (None, None) => JitterPolicy::default(),
        };

        let rate = overrides.rate.or(self.rate_per_second);
        let duration = overrides
            .duration
            .or(self.duration.map(YamlDuration::into_inner));
        let (Some(rate_per_second), Some(duration)) = (rate, duration) else {
            return Ok(None);
        };

        let profile = WorkloadProfile {
            mode,
            rate_per_second,
            duration,
            jitter,
            seed: overrides.seed.or(self.seed),
        };
        profile.validate()?;
        Ok(Some(profile))
    }
}

/// A scenario document converted into engine types, fixtures loaded.
#[derive(Debug, Clone)]
pub(crate) struct LoadedScenario {
    pub scenario: ScenarioDefinition,
    pub protocol: HttpProtocol,
    pub workload: WorkloadYaml,
}

pub(crate) async fn load_scenario(
    path: &Path,
    base_url_override: Option<&str>,
) -> anyhow::Result<LoadedScenario> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;

    let doc: ScenarioDocYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let loader = FsFixtureLoader::new(root);

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string();

    let loaded = doc_into_scenario(doc, default_name, base_url_override, &loader)
        .with_context(|| format!("invalid scenario: {}", path.display()))?;
    loaded.scenario.validate(&loaded.protocol)?;
    Ok(loaded)
}

fn doc_into_scenario(
    doc: ScenarioDocYaml,
    default_name: String,
    base_url_override: Option<&str>,
    loader: &dyn FixtureLoader,
) -> anyhow::Result<LoadedScenario> {
    let ScenarioDocYaml {
        name,
        protocol,
        headers,
        workload,
        steps,
    } = doc;

    let mut http = HttpProtocol::new();
    if let Some(base_url) = base_url_override.or(protocol.base_url.as_deref()) {
        http = http.with_base_url(base_url)?;
    }
    http.default_headers = header_template(&protocol.headers)?;

    let header_sets = headers
        .iter()
        .map(|(name, list)| Ok((name.as_str(), header_template(list)?)))
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

    let mut scenario = ScenarioDefinition::new(name.unwrap_or(default_name));
    for step in steps {
        scenario = match step {
            StepYaml::Pause(p) => scenario.pause(p.pause.into_inner()),
            StepYaml::Request(r) => {
                let name = r.name.clone();
                let step = request_step(r, &header_sets, loader)
                    .with_context(|| format!("step `{name}`"))?;
                scenario.request(step)
            }
        };
    }

    Ok(LoadedScenario {
        scenario,
        protocol: http,
        workload,
    })
}

fn header_template(list: &HeaderListYaml) -> Result<HeaderTemplate, ConfigError> {
    list.0.iter().try_fold(HeaderTemplate::new(), |h, (name, value)| {
        Ok(h.with(name.as_str(), Template::parse(value)?))
    })
}

fn request_step(
    r: RequestYaml,
    header_sets: &BTreeMap<&str, HeaderTemplate>,
    loader: &dyn FixtureLoader,
) -> anyhow::Result<RequestStep> {
    let method = match r.method.as_deref() {
        None => http::Method::GET,
        Some(raw) => http::Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(raw.to_string()))?,
    };

    let mut headers = HeaderTemplate::new();
    for set in &r.headers {
        let named = header_sets
            .get(set.as_str())
            .ok_or_else(|| ConfigError::UnknownHeaderSet(set.clone()))?;
        headers = headers.merge(named);
    }
    headers = headers.merge(&header_template(&r.header)?);

    let body = match r.body {
        Some(body) => body_source(body, loader)?,
        None => BodySource::Empty,
    };

    let extract = r
        .extract
        .into_iter()
        .map(extraction_rule)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut step = RequestStep::new(&r.name, method, Template::parse(&r.url)?)
        .with_headers(headers)
        .with_body(body)
        .with_extract(extract);

    for resource in r.resources {
        let name = resource.name.clone();
        let resource = request_step(resource, header_sets, loader)
            .with_context(|| format!("resource `{name}`"))?;
        step = step.with_resource(resource);
    }
    Ok(step)
}

fn body_source(body: BodyYaml, loader: &dyn FixtureLoader) -> anyhow::Result<BodySource> {
    match (body.text, body.file, body.json) {
        (Some(text), None, None) => Ok(BodySource::Template(Template::parse(&text)?)),
        (None, Some(file), None) if body.template => Ok(load_fixture_template(loader, &file)?),
        (None, Some(file), None) => Ok(load_fixture(loader, &file)?),
        (None, None, Some(json)) => {
            let text = serde_json::to_string(&json).context("body `json` is not valid JSON")?;
            Ok(BodySource::Template(Template::parse(&text)?))
        }
        _ => anyhow::bail!("body must set exactly one of `text`, `file` or `json`"),
    }
}

fn extraction_rule(e: ExtractYaml) -> anyhow::Result<ExtractionRule> {
    match (e.header, e.json, e.status) {
        (Some(header), None, false) => Ok(ExtractionRule::header(header, e.into)),
        (None, Some(path), false) => Ok(ExtractionRule::json(&path, e.into)?),
        (None, None, true) => Ok(ExtractionRule::status(e.into)),
        _ => anyhow::bail!(
            "extract rule for `{}` must set exactly one of `header`, `json` or `status`",
            e.into
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use stampede_core::{ExtractSource, Step};

    const BROWSE: &str = r#"
name: browse
protocol:
  baseUrl: http://localhost:8080/
  headers:
    accept: "*/*"
    user-agent: stampede
headers:
  json:
    content-type: application/json
  authenticated:
    authorization: "Bearer ${authToken}"
workload:
  mode: randomized
  ratePerSecond: 2.5
  duration: 30s
  seed: 42
steps:
  - name: home
    url: /
    extract:
      - header: ETag
        into: homeEtag
    resources:
      - name: app.js
        url: /static/app.js
      - name: app.css
        url: /static/app.css
  - pause: 1.5
  - name: login
    method: post
    url: /login
    headers: [json]
    body:
      json:
        username: ann
        password: secret
    extract:
      - json: $.token
        into: authToken
      - status: true
        into: loginStatus
  - pause: 500ms
  - name: profile
    url: /profile
    headers: [json, authenticated]
    header:
      x-trace: "7"
"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    async fn load(contents: &str) -> anyhow::Result<LoadedScenario> {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "scenario.yaml", contents);
        load_scenario(&path, None).await
    }

    fn request(loaded: &LoadedScenario, idx: usize) -> &RequestStep {
        match &loaded.scenario.steps[idx] {
            Step::Request(r) => r,
            Step::Pause(p) => panic!("step {idx} is a pause of {:?}", p.duration),
        }
    }

    #[tokio::test]
    async fn loads_a_full_document() {
        let loaded = load(BROWSE).await.unwrap();

        assert_eq!(loaded.scenario.name, "browse");
        assert_eq!(loaded.scenario.steps.len(), 5);
        assert_eq!(loaded.scenario.request_count(), 5);
        assert_eq!(loaded.protocol.base_url(), Some("http://localhost:8080"));
        assert_eq!(loaded.protocol.default_headers.len(), 2);

        let home = request(&loaded, 0);
        assert_eq!(home.method, http::Method::GET);
        assert_eq!(home.resources.len(), 2);
        assert_eq!(
            home.extract[0].source,
            ExtractSource::Header("ETag".to_string())
        );

        assert!(matches!(
            loaded.scenario.steps[1],
            Step::Pause(p) if p.duration == Duration::from_millis(1500)
        ));

        let login = request(&loaded, 2);
        assert_eq!(login.method, http::Method::POST);
        assert_eq!(
            login.headers.get("Content-Type").map(Template::as_str),
            Some("application/json")
        );
        match &login.body {
            BodySource::Template(t) => {
                let json: serde_json::Value = serde_json::from_str(t.as_str()).unwrap();
                assert_eq!(json["username"], "ann");
            }
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(login.extract.len(), 2);
        assert_eq!(login.extract[1].source, ExtractSource::Status);

        let profile = request(&loaded, 4);
        assert_eq!(profile.headers.len(), 3);
        assert_eq!(
            profile.headers.get("authorization").map(|t| t.references().collect::<Vec<_>>()),
            Some(vec!["authToken"])
        );
        assert_eq!(profile.headers.get("x-trace").map(Template::as_str), Some("7"));
    }

    #[tokio::test]
    async fn workload_overrides_win_over_the_document() {
        let loaded = load(BROWSE).await.unwrap();

        let doc = loaded
            .workload
            .resolve(&WorkloadOverrides::default())
            .unwrap()
            .unwrap();
        assert_eq!(doc.mode, InjectionMode::ConstantRateRandomized);
        assert_eq!(doc.rate_per_second, 2.5);
        assert_eq!(doc.duration, Duration::from_secs(30));
        assert_eq!(doc.jitter, JitterPolicy::UniformInBucket);
        assert_eq!(doc.seed, Some(42));

        let overridden = loaded
            .workload
            .resolve(&WorkloadOverrides {
                rate: Some(10.0),
                duration: Some(Duration::from_secs(5)),
                mode: Some(InjectionMode::ConstantRate),
                jitter: Some(JitterPolicy::Poisson),
                seed: Some(1),
            })
            .unwrap()
            .unwrap();
        assert_eq!(overridden.mode, InjectionMode::ConstantRate);
        assert_eq!(overridden.rate_per_second, 10.0);
        assert_eq!(overridden.duration, Duration::from_secs(5));
        assert_eq!(overridden.jitter, JitterPolicy::Poisson);
        assert_eq!(overridden.seed, Some(1));
    }

    #[test]
    fn missing_workload_is_not_an_error_until_run() {
        let workload = WorkloadYaml::default();
        assert!(workload.resolve(&WorkloadOverrides::default()).unwrap().is_none());

        let bad = WorkloadYaml {
            rate_per_second: Some(0.0),
            duration: Some(YamlDuration(Duration::from_secs(1))),
            ..WorkloadYaml::default()
        };
        assert!(bad.resolve(&WorkloadOverrides::default()).is_err());

        let bad_mode = WorkloadYaml {
            mode: Some("closed".to_string()),
            ..WorkloadYaml::default()
        };
        let err = bad_mode.resolve(&WorkloadOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn file_bodies_load_relative_to_the_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bodies")).unwrap();
        write(dir.path(), "bodies/avatar.bin", "\u{0}\u{1}raw");
        write(dir.path(), "bodies/comment.json", r#"{"user":"${userName}"}"#);
        let path = write(
            dir.path(),
            "upload.yaml",
            r#"
protocol:
  baseUrl: http://localhost
steps:
  - name: upload
    method: PUT
    url: /avatar
    body:
      file: bodies/avatar.bin
  - name: comment
    method: POST
    url: /comments
    body:
      file: bodies/comment.json
      template: true
"#,
        );

        let loaded = load_scenario(&path, None).await.unwrap();
        assert_eq!(loaded.scenario.name, "upload");

        match &request(&loaded, 0).body {
            BodySource::Bytes(b) => assert_eq!(&b[..], b"\x00\x01raw"),
            other => panic!("unexpected body {other:?}"),
        }
        match &request(&loaded, 1).body {
            BodySource::Template(t) => {
                assert_eq!(t.references().collect::<Vec<_>>(), vec!["userName"]);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_fixture_is_a_config_error() {
        let err = load(
            r#"
steps:
  - name: upload
    url: http://localhost/upload
    body:
      file: nope.bin
"#,
        )
        .await
        .unwrap_err();
        let config = err.downcast_ref::<ConfigError>();
        assert!(matches!(config, Some(ConfigError::Fixture { .. })), "{err:#}");
    }

    #[tokio::test]
    async fn rejects_authoring_mistakes() {
        let unknown_set = load(
            r#"
steps:
  - name: a
    url: http://localhost/
    headers: [nope]
"#,
        )
        .await
        .unwrap_err();
        assert!(format!("{unknown_set:#}").contains("unknown header set `nope`"));

        let relative = load(
            r#"
steps:
  - name: a
    url: /relative
"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            relative.downcast_ref::<ConfigError>(),
            Some(ConfigError::RelativeUrlWithoutBase { .. })
        ));

        let nested = load(
            r#"
steps:
  - name: a
    url: http://localhost/
    resources:
      - name: b
        url: http://localhost/b
        resources:
          - name: c
            url: http://localhost/c
"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            nested.downcast_ref::<ConfigError>(),
            Some(ConfigError::NestedResources(_))
        ));

        let two_bodies = load(
            r#"
steps:
  - name: a
    url: http://localhost/
    body:
      text: hi
      json: {}
"#,
        )
        .await
        .unwrap_err();
        assert!(format!("{two_bodies:#}").contains("exactly one of"));

        let typo = load(
            r#"
steps:
  - name: a
    url: http://localhost/
    extrct: []
"#,
        )
        .await;
        assert!(typo.is_err());
    }

    #[tokio::test]
    async fn base_url_override_replaces_the_document_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "s.yaml", BROWSE);
        let loaded = load_scenario(&path, Some("https://staging.example.com"))
            .await
            .unwrap();
        assert_eq!(
            loaded.protocol.base_url(),
            Some("https://staging.example.com")
        );
    }

    #[test]
    fn yaml_duration_accepts_strings_and_numbers() {
        let parse =
            |s: &str| serde_yaml::from_str::<YamlDuration>(s).map(YamlDuration::into_inner);
        assert_eq!(parse("4").unwrap(), Duration::from_secs(4));
        assert_eq!(parse("0.25").unwrap(), Duration::from_millis(250));
        assert_eq!(parse("\"750ms\"").unwrap(), Duration::from_millis(750));
        assert!(parse("-1").is_err());
        assert!(parse("\"soon\"").is_err());
        assert!(parse("1.0e+20").is_err());
        assert!(parse(".inf").is_err());
    }

    #[test]
    fn oversized_workload_duration_is_a_config_error() {
        for duration in ["18446744073709551615", "\"400days\""] {
            let workload: WorkloadYaml =
                serde_yaml::from_str(&format!("ratePerSecond: 1\nduration: {duration}\n"))
                    .unwrap();
            let err = workload
                .resolve(&WorkloadOverrides::default())
                .unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<ConfigError>(),
                    Some(ConfigError::InvalidDuration)
                ),
                "{duration}: {err:#}"
            );
        }
    }

    #[tokio::test]
    async fn huge_pause_is_rejected_at_load() {
        let err = load(
            r#"
protocol:
  baseUrl: http://localhost
steps:
  - pause: 1.0e+20
  - name: home
    url: /
"#,
        )
        .await
        .err()
        .unwrap();
        assert!(format!("{err:#}").contains("failed to parse YAML"), "{err:#}");
    }
}
