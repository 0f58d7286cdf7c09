//! JSON configuration for filter chains and routing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use relay_filters::{
    CompositeFilter, ForwardHeaderFilter, KeywordReplaceFilter, MappedNameResolver, MessageFilter,
    PassThroughFilter, PublicLinkResolver, RedactUrlFilter, RestrictedBypassFilter, SkipAllFilter,
    SkipUrlFilter, SkipWithKeywordsFilter, DEFAULT_HEADER_TEMPLATE,
};
use relay_message::UrlMatcher;
use serde::Deserialize;

use crate::routing::{Direction, RoutingTable, SendMode};

pub const SCHEMA_VERSION: u32 = 1;

/// Top-level relay configuration document.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub schema_version: u32,
    /// Named filter chains referenced by directions. Chains run in order.
    #[serde(default)]
    pub filter_chains: BTreeMap<String, Vec<FilterSpec>>,
    pub directions: Vec<DirectionConfig>,
}

#[derive(Debug, Deserialize)]
pub struct DirectionConfig {
    pub source: i64,
    #[serde(default)]
    pub source_topic: Option<i64>,
    pub targets: Vec<TargetConfig>,
    #[serde(default = "default_mode")]
    pub mode: SendMode,
    /// Name of a chain from `filter_chains`; omitted means no filtering.
    #[serde(default)]
    pub filters: Option<String>,
    #[serde(default)]
    pub disable_edit: bool,
    #[serde(default)]
    pub disable_delete: bool,
}

fn default_mode() -> SendMode {
    SendMode::Copy
}

#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub chat: i64,
    #[serde(default)]
    pub topic: Option<i64>,
}

/// One filter stage as written in configuration.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    PassThrough,
    SkipAll,
    SkipWithKeywords {
        keywords: Vec<String>,
    },
    SkipUrls {
        #[serde(default)]
        skip_mentions: bool,
    },
    RedactUrls {
        #[serde(default = "default_placeholder")]
        placeholder: String,
        #[serde(default)]
        redact_mentions: bool,
        #[serde(default)]
        blacklist: Vec<String>,
        #[serde(default)]
        whitelist: Vec<String>,
    },
    ReplaceKeywords {
        keywords: BTreeMap<String, String>,
        #[serde(default)]
        raw_patterns: bool,
    },
    ForwardHeader {
        #[serde(default = "default_header_template")]
        template: String,
        /// Display-name overrides by chat id.
        #[serde(default)]
        channel_names: HashMap<i64, String>,
    },
    RestrictedBypass,
}

fn default_placeholder() -> String {
    relay_filters::redact::DEFAULT_PLACEHOLDER.to_string()
}

fn default_header_template() -> String {
    DEFAULT_HEADER_TEMPLATE.to_string()
}

/// Parses and validates a configuration document.
pub fn parse_config(raw: &str) -> anyhow::Result<RelayConfig> {
    let config: RelayConfig =
        serde_json::from_str(raw).context("relay config is not valid JSON")?;
    if config.schema_version != SCHEMA_VERSION {
        bail!(
            "unsupported relay config schema_version {} (expected {SCHEMA_VERSION})",
            config.schema_version
        );
    }
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<RelayConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read relay config {}", path.display()))?;
    parse_config(&raw)
}

fn validate(config: &RelayConfig) -> anyhow::Result<()> {
    if config.directions.is_empty() {
        bail!("relay config declares no directions");
    }
    for direction in &config.directions {
        if direction.targets.is_empty() {
            bail!("direction from {} has no targets", direction.source);
        }
        let mut seen: Vec<(i64, Option<i64>)> = Vec::new();
        for target in &direction.targets {
            let key = (target.chat, target.topic);
            if seen.contains(&key) {
                bail!(
                    "direction from {} lists target {} twice",
                    direction.source,
                    target.chat
                );
            }
            seen.push(key);
            if target.chat == direction.source && target.topic == direction.source_topic {
                bail!("direction from {} routes back into itself", direction.source);
            }
        }
        if let Some(name) = &direction.filters {
            if !config.filter_chains.contains_key(name) {
                bail!(
                    "direction from {} references unknown filter chain '{name}'",
                    direction.source
                );
            }
        }
    }
    Ok(())
}

/// Builds the runtime routing table from a validated configuration.
pub fn build_routing_table(config: &RelayConfig) -> anyhow::Result<RoutingTable> {
    let mut chains: BTreeMap<&str, Arc<dyn MessageFilter>> = BTreeMap::new();
    for (name, specs) in &config.filter_chains {
        let chain =
            build_chain(specs).with_context(|| format!("building filter chain '{name}'"))?;
        chains.insert(name, chain);
    }

    let mut directions = Vec::new();
    for direction in &config.directions {
        let filters: Arc<dyn MessageFilter> = match &direction.filters {
            Some(name) => match chains.get(name.as_str()) {
                Some(chain) => chain.clone(),
                None => bail!("unknown filter chain '{name}'"),
            },
            None => Arc::new(PassThroughFilter),
        };
        for target in &direction.targets {
            directions.push(Direction {
                source_chat: direction.source,
                source_topic: direction.source_topic,
                dest_chat: target.chat,
                dest_topic: target.topic,
                mode: direction.mode,
                filters: filters.clone(),
                allow_edit: !direction.disable_edit,
                allow_delete: !direction.disable_delete,
            });
        }
    }
    Ok(RoutingTable::new(directions))
}

fn build_chain(specs: &[FilterSpec]) -> anyhow::Result<Arc<dyn MessageFilter>> {
    let mut filters = Vec::with_capacity(specs.len());
    for spec in specs {
        filters.push(build_filter(spec)?);
    }
    Ok(Arc::new(CompositeFilter::new(filters)))
}

fn build_filter(spec: &FilterSpec) -> anyhow::Result<Arc<dyn MessageFilter>> {
    Ok(match spec {
        FilterSpec::PassThrough => Arc::new(PassThroughFilter),
        FilterSpec::SkipAll => Arc::new(SkipAllFilter),
        FilterSpec::SkipWithKeywords { keywords } => {
            Arc::new(SkipWithKeywordsFilter::new(keywords)?)
        }
        FilterSpec::SkipUrls { skip_mentions } => Arc::new(SkipUrlFilter::new(*skip_mentions)),
        FilterSpec::RedactUrls {
            placeholder,
            redact_mentions,
            blacklist,
            whitelist,
        } => Arc::new(RedactUrlFilter::new(
            UrlMatcher::new(blacklist.clone(), whitelist.clone()),
            placeholder.clone(),
            *redact_mentions,
        )),
        FilterSpec::ReplaceKeywords {
            keywords,
            raw_patterns,
        } => Arc::new(KeywordReplaceFilter::new(keywords, *raw_patterns)?),
        FilterSpec::ForwardHeader {
            template,
            channel_names,
        } => Arc::new(ForwardHeaderFilter::new(
            template.clone(),
            Arc::new(MappedNameResolver::new(channel_names.clone())),
            Arc::new(PublicLinkResolver),
        )),
        FilterSpec::RestrictedBypass => Arc::new(RestrictedBypassFilter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "schema_version": 1,
        "filter_chains": {
            "clean": [
                {"type": "redact_urls", "whitelist": ["ours.test"]},
                {"type": "replace_keywords", "keywords": {"acme": "example"}},
                {"type": "forward_header"}
            ],
            "silence": [{"type": "skip_all"}]
        },
        "directions": [
            {
                "source": -100,
                "targets": [{"chat": -201}, {"chat": -202, "topic": 5}],
                "filters": "clean"
            },
            {
                "source": -101,
                "targets": [{"chat": -201}],
                "mode": "forward",
                "disable_delete": true
            }
        ]
    }"#;

    #[test]
    fn functional_valid_config_builds_a_routing_table() {
        let config = parse_config(VALID).expect("config parses");
        let table = build_routing_table(&config).expect("table builds");
        assert_eq!(table.source_chats(), vec![-101, -100]);
        assert_eq!(table.directions_for(-100).len(), 2);

        let forwarded = &table.directions_for(-101)[0];
        assert_eq!(forwarded.mode, SendMode::Forward);
        assert!(forwarded.allow_edit);
        assert!(!forwarded.allow_delete);
    }

    #[test]
    fn unit_unknown_schema_version_is_rejected() {
        let error = parse_config(r#"{"schema_version": 2, "directions": []}"#)
            .expect_err("must reject");
        assert!(error.to_string().contains("schema_version"));
    }

    #[test]
    fn unit_unknown_filter_chain_is_rejected() {
        let raw = r#"{
            "schema_version": 1,
            "directions": [
                {"source": -1, "targets": [{"chat": -2}], "filters": "missing"}
            ]
        }"#;
        let error = parse_config(raw).expect_err("must reject");
        assert!(error.to_string().contains("unknown filter chain"));
    }

    #[test]
    fn unit_duplicate_target_is_rejected() {
        let raw = r#"{
            "schema_version": 1,
            "directions": [
                {"source": -1, "targets": [{"chat": -2}, {"chat": -2}]}
            ]
        }"#;
        assert!(parse_config(raw).is_err());
    }

    #[test]
    fn unit_self_referential_direction_is_rejected() {
        let raw = r#"{
            "schema_version": 1,
            "directions": [
                {"source": -1, "targets": [{"chat": -1}]}
            ]
        }"#;
        assert!(parse_config(raw).is_err());
    }

    #[test]
    fn regression_bad_keyword_pattern_fails_at_build_not_at_runtime() {
        let raw = r#"{
            "schema_version": 1,
            "filter_chains": {
                "broken": [
                    {"type": "replace_keywords", "keywords": {"(oops": "x"}, "raw_patterns": true}
                ]
            },
            "directions": [
                {"source": -1, "targets": [{"chat": -2}], "filters": "broken"}
            ]
        }"#;
        let config = parse_config(raw).expect("config parses");
        assert!(build_routing_table(&config).is_err());
    }
}
