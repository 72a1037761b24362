//! CLI configuration
//!
//! Values are layered: defaults, then an optional config file, then
//! `FHIR_TREE__*` environment variables, then command line flags.

use anyhow::Context;
use ferrum_tree::{EventResponse, RendererEventConfig, RendererEventType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const ENV_PREFIX: &str = "FHIR_TREE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Keep going after a file fails to build
    pub continue_on_fail: bool,

    /// Extension URL prefixes that may be missing from the input directory
    pub permitted_missing_extension_prefixes: Vec<String>,

    pub events: EventSettings,

    pub logging: LoggingConfig,
}

/// Event responses keyed by event name, e.g. `MISSING_TYPE_LINK = "throw"`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub strict: bool,
    pub responses: BTreeMap<String, EventResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this binary when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Command line values that win over every other source
#[derive(Debug, Default)]
pub struct Overrides {
    pub continue_on_fail: bool,
    pub strict: bool,
    pub log_level: Option<String>,
    pub log_json: bool,
}

impl CliConfig {
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(::config::File::from(path.to_path_buf()));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("permitted_missing_extension_prefixes")
                .try_parsing(true),
        );

        let mut config: CliConfig = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if overrides.continue_on_fail {
            config.continue_on_fail = true;
        }
        if overrides.strict {
            config.events.strict = true;
        }
        if let Some(level) = &overrides.log_level {
            config.logging.level = level.clone();
        }
        if overrides.log_json {
            config.logging.json = true;
        }

        Ok(config)
    }

    /// Event responses with names checked against the known event types
    pub fn event_config(&self) -> anyhow::Result<RendererEventConfig> {
        let mut event_config = RendererEventConfig {
            strict: self.events.strict,
            ..RendererEventConfig::default()
        };
        for (name, response) in &self.events.responses {
            let kind = parse_event_type(name)
                .with_context(|| format!("Unknown event type '{}' in configuration", name))?;
            event_config = event_config.with_response(kind, *response);
        }
        Ok(event_config)
    }
}

/// Event names are matched case-insensitively since config keys may be folded
fn parse_event_type(name: &str) -> Option<RendererEventType> {
    RendererEventType::ALL
        .into_iter()
        .find(|kind| kind.to_string().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_ignore_case() {
        assert_eq!(
            parse_event_type("missing_type_link"),
            Some(RendererEventType::MissingTypeLink)
        );
        assert_eq!(
            parse_event_type("FIXEDVALUE_WITH_LINKED_NODE"),
            Some(RendererEventType::FixedValueWithLinkedNode)
        );
        assert_eq!(parse_event_type("NOT_AN_EVENT"), None);
    }

    #[test]
    fn overrides_win() {
        let mut config = CliConfig::default();
        config
            .events
            .responses
            .insert("link_references_itself".into(), EventResponse::LogWarning);
        config.events.strict = true;

        let events = config.event_config().unwrap();
        assert!(events.strict);
        assert_eq!(
            events.responses.get(&RendererEventType::LinkReferencesItself),
            Some(&EventResponse::LogWarning)
        );
    }

    #[test]
    fn unknown_event_names_are_rejected() {
        let mut config = CliConfig::default();
        config
            .events
            .responses
            .insert("SOMETHING_ELSE".into(), EventResponse::Ignore);

        assert!(config.event_config().is_err());
    }
}
