//! Collector implementations

pub mod command;

pub use command::{parse_posts, CommandCollector, DEFAULT_COMMAND_TIMEOUT};

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::registry::SourceRegistry;

/// Build a registry holding every configured scraper command
pub fn registry_from_config(config: &RegistryConfig) -> SourceRegistry {
    let registry = SourceRegistry::with_recovery_interval(config.recovery_interval);

    for collector in &config.collectors {
        registry.register(
            Arc::new(CommandCollector::from_config(collector)),
            collector.enabled,
            collector.priority,
        );
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;
    use crate::models::Source;

    #[test]
    fn test_registry_from_config() {
        let config = RegistryConfig {
            collectors: vec![
                CollectorConfig {
                    name: "x".into(),
                    source: Source::X,
                    command: "python3".into(),
                    args: vec!["scraper_cli.py".into(), "x".into()],
                    enabled: false,
                    priority: 1,
                },
                CollectorConfig {
                    name: "reddit".into(),
                    source: Source::Reddit,
                    command: "python3".into(),
                    args: vec!["scraper_cli.py".into(), "reddit".into()],
                    enabled: true,
                    priority: 0,
                },
            ],
            ..Default::default()
        };

        let registry = registry_from_config(&config);
        assert_eq!(registry.len(), 2);

        let eligible = registry.eligible_collectors();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].name(), "reddit");

        let snapshot = registry.health_snapshot();
        assert_eq!(snapshot[0].name, "reddit");
        assert!(!snapshot[1].enabled);
    }
}
