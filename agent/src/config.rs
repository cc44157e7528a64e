use std::path::Path;

use serde_json::Value;

const RECORD_UNTIL_FULL: &str = "record-until-full";
const RECORD_CONTINUOUSLY: &str = "record-continuously";
const RECORD_AS_MUCH_AS_POSSIBLE: &str = "record-as-much-as-possible";

/// How the buffer behaves as it fills.
///
/// Only [`RecordUntilFull`] changes behavior today (new events are dropped
/// at capacity); the other modes are stored and reported as-is.
///
/// [`RecordUntilFull`]: TraceRecordMode::RecordUntilFull
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraceRecordMode {
    /// Record until the trace buffer is full.
    #[default]
    RecordUntilFull,
    /// Record until the user ends the trace, treating the buffer as a ring.
    RecordContinuously,
    /// Record until the trace buffer is full, with a huge buffer size.
    RecordAsMuchAsPossible,
    /// Echo to console. Events are discarded.
    EchoToConsole,
}

/// Recording configuration: mode, feature switches, category lists.
#[derive(Clone, Debug)]
pub struct TraceConfig {
    pub record_mode: TraceRecordMode,
    pub enable_sampling: bool,
    pub enable_systrace: bool,
    pub enable_argument_filter: bool,
    included_categories: Vec<String>,
    excluded_categories: Vec<String>,
}

impl Default for TraceConfig {
    /// The built-in config: record-until-full with only `v8` included.
    fn default() -> Self {
        let mut config = TraceConfig::empty();
        config.add_included_category("v8");
        config
    }
}

impl TraceConfig {
    fn empty() -> Self {
        TraceConfig {
            record_mode: TraceRecordMode::RecordUntilFull,
            enable_sampling: false,
            enable_systrace: false,
            enable_argument_filter: false,
            included_categories: Vec::new(),
            excluded_categories: Vec::new(),
        }
    }

    pub fn add_included_category(&mut self, group: &str) {
        self.included_categories.push(group.to_owned());
    }

    pub fn add_excluded_category(&mut self, group: &str) {
        self.excluded_categories.push(group.to_owned());
    }

    /// A group is enabled when it appears in the included list and not in
    /// the excluded list. Matching is exact whole-string comparison; there
    /// is no glob expansion.
    pub fn is_category_group_enabled(&self, group: &str) -> bool {
        if self.excluded_categories.iter().any(|c| c == group) {
            return false;
        }
        self.included_categories.iter().any(|c| c == group)
    }

    /// Builds a config from a JSON document.
    ///
    /// Unknown top-level keys are ignored and a document that does not
    /// parse as a JSON object yields the default config. The `enable_*`
    /// switches follow the upstream parser: a nonzero number reads as
    /// true, everything else (including boolean literals) as false.
    pub fn from_json(text: &str) -> Self {
        let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(text) else {
            return TraceConfig::default();
        };
        let mut config = TraceConfig::empty();
        config.record_mode = match doc.get("record_mode").and_then(Value::as_str) {
            Some(RECORD_UNTIL_FULL) => TraceRecordMode::RecordUntilFull,
            Some(RECORD_CONTINUOUSLY) => TraceRecordMode::RecordContinuously,
            Some(RECORD_AS_MUCH_AS_POSSIBLE) => TraceRecordMode::RecordAsMuchAsPossible,
            _ => TraceRecordMode::RecordUntilFull,
        };
        config.enable_sampling = number_switch(doc.get("enable_sampling"));
        config.enable_systrace = number_switch(doc.get("enable_systrace"));
        config.enable_argument_filter = number_switch(doc.get("enable_argument_filter"));
        append_categories(doc.get("included_categories"), &mut config.included_categories);
        append_categories(doc.get("excluded_categories"), &mut config.excluded_categories);
        config
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(TraceConfig::from_json(&std::fs::read_to_string(path)?))
    }
}

fn number_switch(value: Option<&Value>) -> bool {
    value.and_then(Value::as_f64).is_some_and(|n| n != 0.0)
}

fn append_categories(value: Option<&Value>, list: &mut Vec<String>) {
    if let Some(Value::Array(items)) = value {
        for item in items {
            if let Some(group) = item.as_str() {
                list.push(group.to_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TEST_CONFIG: &str = r#"{"record_mode":"record-until-full","enable_sampling":1,"enable_systrace":0,"enable_argument_filter":1,"included_categories":["v8.cpu_profile","v8.cpu_profile.hires"],"excluded_categories":["v8.runtime"]}"#;

    #[test]
    fn parses_the_full_document() {
        let config = TraceConfig::from_json(TEST_CONFIG);
        assert_eq!(config.record_mode, TraceRecordMode::RecordUntilFull);
        assert!(config.enable_sampling);
        assert!(!config.enable_systrace);
        assert!(config.enable_argument_filter);
        assert!(config.is_category_group_enabled("v8.cpu_profile"));
        assert!(config.is_category_group_enabled("v8.cpu_profile.hires"));
        assert!(!config.is_category_group_enabled("v8"));
        assert!(!config.is_category_group_enabled("v8.runtime"));
    }

    #[test]
    fn default_config_enables_only_v8() {
        let config = TraceConfig::default();
        assert_eq!(config.record_mode, TraceRecordMode::RecordUntilFull);
        assert!(!config.enable_sampling);
        assert!(!config.enable_systrace);
        assert!(!config.enable_argument_filter);
        assert!(config.is_category_group_enabled("v8"));
        assert!(!config.is_category_group_enabled("v8.cpu_profile"));
        assert!(!config.is_category_group_enabled("node"));
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let mut config = TraceConfig::empty();
        config.add_included_category("A");
        config.add_included_category("B.c");
        config.add_excluded_category("B.c.x");
        assert!(config.is_category_group_enabled("A"));
        assert!(config.is_category_group_enabled("B.c"));
        assert!(!config.is_category_group_enabled("B.c.x"));
        assert!(!config.is_category_group_enabled("B"));

        config.add_excluded_category("A");
        assert!(!config.is_category_group_enabled("A"));
    }

    #[rstest]
    #[case::nonzero_number(r#"{"enable_sampling":2}"#, true)]
    #[case::zero_number(r#"{"enable_sampling":0}"#, false)]
    #[case::boolean_literal_reads_false(r#"{"enable_sampling":true}"#, false)]
    #[case::string_reads_false(r#"{"enable_sampling":"1"}"#, false)]
    #[case::missing_reads_false(r#"{}"#, false)]
    fn switches_are_truthy_numbers_only(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(TraceConfig::from_json(text).enable_sampling, expected);
    }

    #[rstest]
    #[case(r#"{"record_mode":"record-continuously"}"#, TraceRecordMode::RecordContinuously)]
    #[case(
        r#"{"record_mode":"record-as-much-as-possible"}"#,
        TraceRecordMode::RecordAsMuchAsPossible
    )]
    #[case(r#"{"record_mode":"bogus"}"#, TraceRecordMode::RecordUntilFull)]
    #[case(r#"{}"#, TraceRecordMode::RecordUntilFull)]
    fn record_mode_defaults_to_until_full(#[case] text: &str, #[case] expected: TraceRecordMode) {
        assert_eq!(TraceConfig::from_json(text).record_mode, expected);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config =
            TraceConfig::from_json(r#"{"unknown":true,"included_categories":["node"],"x":[1]}"#);
        assert!(config.is_category_group_enabled("node"));
        assert!(!config.is_category_group_enabled("v8"));
    }

    #[test]
    fn malformed_input_yields_the_default_config() {
        for text in ["", "not json", "[1,2,3]", "42"] {
            let config = TraceConfig::from_json(text);
            assert!(config.is_category_group_enabled("v8"), "input: {text:?}");
        }
    }

    #[test]
    fn non_string_categories_are_skipped() {
        let config = TraceConfig::from_json(r#"{"included_categories":["v8",1,null,"node"]}"#);
        assert!(config.is_category_group_enabled("v8"));
        assert!(config.is_category_group_enabled("node"));
    }
}
