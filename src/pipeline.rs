//! # Merge Pipeline
//!
//! The orchestrator that turns remote subscriptions and operator
//! documents into one engine config. Stage order is fixed:
//!
//! 1. fetch every enabled subscription (failures recorded, not fatal)
//! 2. deduplicate the combined node list
//! 3. compose the base template with the nodes
//! 4. apply the site policy layer
//! 5. deep-merge the static override document
//! 6. run the transform script in the sandbox
//! 7. normalize deployment-owned runtime settings
//! 8. sanitize proxy groups against the final node list
//! 9. filter rules (GEOIP strip, when enabled)
//! 10. back up the previous config and persist the new one
//!
//! Runs are mutually exclusive per [`MergeRunner`]: a trigger while a
//! run is in flight fails fast with [`Error::RunInProgress`] instead of
//! queueing. Fatal stage errors abort before anything replaces the
//! previous config; a backup failure is reported but never blocks the
//! write.

use std::path::PathBuf;
use std::sync::Mutex;

use log::{info, warn};
use serde_yaml::{Mapping, Value};

use crate::dedup::{self, ProxyNode};
use crate::document::{self, GROUPS_KEY, PROXIES_KEY, RULES_KEY};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::settings::Settings;
use crate::{fetch, groups, overlay, persist, policy, rules, runtime, sandbox, subscription, template};

/// One subscription that failed during the fetch stage.
#[derive(Debug, Clone)]
pub struct SubscriptionFailure {
    pub name: String,
    pub reason: String,
}

/// Per-subscription fetch summary for a successful source.
#[derive(Debug, Clone)]
pub struct SubscriptionFetch {
    pub name: String,
    /// Node count after prefixing and filtering, before deduplication.
    pub fetched_node_count: usize,
}

/// What a completed run did, for callers and operators.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Enabled subscriptions considered this run.
    pub enabled_subscription_count: usize,
    /// Node count after deduplication.
    pub merged_node_count: usize,
    /// Per-subscription fetch summaries, in declaration order.
    pub fetched: Vec<SubscriptionFetch>,
    /// Per-subscription failures; the run continued without these sources.
    pub subscription_errors: Vec<SubscriptionFailure>,
    /// Backup failure, when the previous config could not be copied.
    pub backup_error: Option<String>,
    /// Where the previous config was backed up, when one existed.
    pub backup_path: Option<PathBuf>,
}

/// Owns the settings and the run-level mutual exclusion.
pub struct MergeRunner {
    settings: Settings,
    run_lock: Mutex<()>,
}

impl MergeRunner {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Execute one full merge run.
    ///
    /// Fails fast with [`Error::RunInProgress`] when another run holds
    /// the lock; never blocks waiting for it. A poisoned lock (a prior
    /// run panicked) is reported as its own error rather than a
    /// perpetual busy signal.
    pub fn run(&self) -> Result<RunReport> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::WouldBlock) => return Err(Error::RunInProgress),
            Err(std::sync::TryLockError::Poisoned(_)) => {
                return Err(Error::LockPoisoned {
                    context: "merge run lock".to_string(),
                })
            }
        };
        self.execute()
    }

    fn execute(&self) -> Result<RunReport> {
        let paths = &self.settings.paths;
        let rt = &self.settings.runtime;
        paths.ensure_dirs()?;

        let mut report = RunReport::default();

        // Stage 1: fetch.
        let subs = subscription::load_subscriptions(&paths.subs_config)?;
        let enabled: Vec<_> = subs.into_iter().filter(|sub| sub.enabled).collect();
        report.enabled_subscription_count = enabled.len();
        info!("merge run started: {} enabled subscription(s)", enabled.len());

        let fetcher = Fetcher::new(rt.request_timeout)?;
        let mut all_nodes: Vec<ProxyNode> = Vec::new();
        for sub in &enabled {
            let name = sub.display_name();
            match fetcher.fetch(sub) {
                Ok(fetched) => {
                    self.snapshot_fetched(sub, &fetched);
                    report.fetched.push(SubscriptionFetch {
                        name,
                        fetched_node_count: fetched.nodes.len(),
                    });
                    all_nodes.extend(fetched.nodes);
                }
                Err(err) => {
                    warn!("{}", err);
                    report.subscription_errors.push(SubscriptionFailure {
                        name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        // Stage 2: dedup.
        let nodes = dedup::deduplicate(all_nodes);
        report.merged_node_count = nodes.len();
        info!("deduplicated to {} node(s)", nodes.len());

        // Stage 3: template composition.
        let base_template =
            document::load_yaml_or(&paths.template_file, template::default_template());
        let mut config = template::compose(&base_template, &nodes)?;

        // Stages 4-5: operator layers.
        let node_names = dedup::node_names(&nodes);
        let site_policy =
            document::load_yaml_or(&paths.site_policy_file, Value::Mapping(Mapping::new()));
        config = policy::apply(&config, &site_policy, &node_names)?;

        let override_doc =
            document::load_yaml_or(&paths.override_file, Value::Mapping(Mapping::new()));
        config = overlay::deep_merge(&config, &override_doc)?;

        // Stage 6: transform script.
        let script = document::load_text_or_empty(&paths.override_script_file);
        config = sandbox::apply_script(&config, &script, rt)?;

        // Stage 7: runtime normalization.
        config = runtime::normalize(&config, rt)?;

        // Stages 8-9: final sanitation over whatever the layers produced.
        let root = document::expect_mapping_mut(&mut config, "document root")?;
        let final_nodes: Vec<ProxyNode> = document::sequence_or_empty(root, PROXIES_KEY)
            .iter()
            .filter_map(Value::as_mapping)
            .cloned()
            .collect();
        let final_names = dedup::node_names(&final_nodes);
        let group_list = document::sequence_or_empty(root, GROUPS_KEY);
        document::set(
            root,
            GROUPS_KEY,
            Value::Sequence(groups::sanitize_groups(&group_list, &final_names)),
        );
        if rt.disable_geoip {
            let rule_list = document::sequence_or_empty(root, RULES_KEY);
            document::set(
                root,
                RULES_KEY,
                Value::Sequence(rules::strip_geoip_rules(rule_list)),
            );
        }

        // Stage 10: backup, then persist.
        match persist::backup_existing(&paths.config_file, &paths.backup_dir) {
            Ok(backup_path) => report.backup_path = backup_path,
            Err(err) => {
                warn!("backup failed, continuing: {}", err);
                report.backup_error = Some(err.to_string());
            }
        }
        persist::write_config(&config, &paths.config_file)?;

        info!(
            "merge run finished: {} node(s), {} subscription failure(s)",
            report.merged_node_count,
            report.subscription_errors.len()
        );
        Ok(report)
    }

    /// Snapshot one subscription's fetch results for inspection.
    ///
    /// The snapshot is a debugging side effect; a write failure is logged
    /// and never costs the run the already-fetched nodes.
    fn snapshot_fetched(&self, sub: &subscription::Subscription, fetched: &fetch::FetchedNodes) {
        let name = sub.display_name();
        if let Err(err) =
            fetch::write_snapshot(&self.settings.paths.subs_dir, &name, &fetched.nodes)
        {
            warn!("failed to snapshot subscription '{}': {}", name, err);
        }
        if sub.save_raw {
            if let Err(err) = fetch::write_raw(&self.settings.paths.subs_dir, &name, &fetched.raw)
            {
                warn!("failed to save raw payload for '{}': {}", name, err);
            }
        }
    }
}
