use std::fs;
use std::path::Path;

use rdmamon_common::{RawInterceptConfig, NUM_RESOURCES, NUM_VERBS};

use crate::verbs::{Resource, Verb};

/// Threshold ceilings loaded from the line-oriented config file.
///
/// Two independent tables: a live-count ceiling per resource kind and a
/// calls-per-second ceiling per verb. A value of zero disables that entry.
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionConfig {
    max_resource_count: [u64; NUM_RESOURCES],
    max_frequency: [u64; NUM_VERBS],
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl InterceptionConfig {
    /// Config with every ceiling disabled. This is the fallback when the
    /// config file is missing or unreadable; monitoring still runs, it just
    /// never flags anything.
    pub fn disabled() -> Self {
        Self {
            max_resource_count: [0; NUM_RESOURCES],
            max_frequency: [0; NUM_VERBS],
        }
    }

    pub fn resource_ceiling(&self, resource: Resource) -> u64 {
        self.max_resource_count[resource.index()]
    }

    pub fn frequency_ceiling(&self, verb: Verb) -> u64 {
        self.max_frequency[verb.index()]
    }

    /// Load thresholds from `path`. Every failure mode short of a crash is
    /// non-fatal: an unreadable file degrades to all-disabled, bad lines are
    /// warned about and skipped.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::parse(&text);
                log::info!("thresholds loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!(
                    "cannot read threshold config {}: {e}; all ceilings disabled",
                    path.display()
                );
                Self::disabled()
            }
        }
    }

    /// Parse config text. Grammar: one `<NAME> <INTEGER>` assignment per
    /// line; `#` starts a comment line; blank lines are ignored. NAME is
    /// matched against the resource name table first, then the verb table.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::disabled();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let (name, value) = match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(name), Some(value), None) => (name, value),
                _ => {
                    log::warn!("config line {}: expected '<NAME> <VALUE>', got {line:?}", lineno + 1);
                    continue;
                }
            };

            let ceiling: u64 = match value.parse() {
                Ok(v) => v,
                Err(_) => {
                    log::warn!("config line {}: non-numeric ceiling {value:?}", lineno + 1);
                    continue;
                }
            };

            if let Some(resource) = Resource::from_config_name(name) {
                config.max_resource_count[resource.index()] = ceiling;
            } else if let Some(verb) = Verb::from_config_name(name) {
                config.max_frequency[verb.index()] = ceiling;
            } else {
                log::warn!("config line {}: unknown name {name:?}, skipped", lineno + 1);
            }
        }

        config
    }

    /// Mirror of this config in the layout the instrumentation layer's
    /// config map expects.
    pub fn to_raw(&self) -> RawInterceptConfig {
        RawInterceptConfig {
            max_resource_count: self.max_resource_count,
            max_frequency: self.max_frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_fills_both_tables() {
        let config = InterceptionConfig::parse(
            "# ceilings\nQP_COUNT 500\nQP_CREATE 200\nMR_REG 50\n",
        );
        assert_eq!(config.resource_ceiling(Resource::QueuePair), 500);
        assert_eq!(config.frequency_ceiling(Verb::QpCreate), 200);
        assert_eq!(config.frequency_ceiling(Verb::MrReg), 50);
        // Untouched entries stay disabled.
        assert_eq!(config.resource_ceiling(Resource::MemoryRegion), 0);
        assert_eq!(config.frequency_ceiling(Verb::GidQuery), 0);
    }

    #[test]
    fn bad_lines_are_skipped_not_fatal() {
        let config = InterceptionConfig::parse(
            "QP_COUNT 10\n\
             NOT_A_NAME 5\n\
             QP_CREATE ten\n\
             PD_COUNT 1 extra\n\
             CQ_COUNT 7\n",
        );
        assert_eq!(config.resource_ceiling(Resource::QueuePair), 10);
        assert_eq!(config.resource_ceiling(Resource::CompletionQueue), 7);
        // The malformed lines changed nothing.
        assert_eq!(config.frequency_ceiling(Verb::QpCreate), 0);
        assert_eq!(config.resource_ceiling(Resource::ProtectionDomain), 0);
    }

    #[test]
    fn parse_is_idempotent() {
        let text = "QP_COUNT 500\nCM_SEND_REQ 25\n# tail comment\n";
        assert_eq!(InterceptionConfig::parse(text), InterceptionConfig::parse(text));
    }

    #[test]
    fn empty_text_means_all_disabled() {
        let config = InterceptionConfig::parse("");
        assert_eq!(config, InterceptionConfig::disabled());
    }

    #[test]
    fn missing_file_falls_back_to_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = InterceptionConfig::load(&dir.path().join("no-such.conf"));
        assert_eq!(config, InterceptionConfig::disabled());
    }

    #[test]
    fn load_reads_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rdmamon.conf");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "MR_COUNT 64").unwrap();
        writeln!(f, "GID_QUERY 1000").unwrap();
        drop(f);

        let config = InterceptionConfig::load(&path);
        assert_eq!(config.resource_ceiling(Resource::MemoryRegion), 64);
        assert_eq!(config.frequency_ceiling(Verb::GidQuery), 1000);
    }

    #[test]
    fn raw_mirror_matches_tables() {
        let config = InterceptionConfig::parse("QP_COUNT 9\nQP_DESTROY 3\n");
        let raw = config.to_raw();
        assert_eq!(raw.max_resource_count[Resource::QueuePair.index()], 9);
        assert_eq!(raw.max_frequency[Verb::QpDestroy.index()], 3);
    }
}
