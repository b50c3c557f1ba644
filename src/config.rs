use std::time::Duration;

use crate::error::{Result, TailError};

/// One configured watch target.
///
/// `task` may be empty, which means "the allocation's default task": the
/// stream worker resolves it to the allocation's first task name at spawn
/// time. Job specs are parsed once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub job: String,
    pub task: String,
}

impl JobSpec {
    /// Parse a single `job:task` entry. The separator is mandatory even when
    /// the task is left empty; an entry without it aborts startup.
    pub fn parse(entry: &str) -> Result<Self> {
        let (job, task) = entry
            .split_once(':')
            .ok_or_else(|| TailError::InvalidJobSpec(entry.to_string()))?;
        if job.is_empty() {
            return Err(TailError::InvalidJobSpec(entry.to_string()));
        }
        Ok(Self {
            job: job.to_string(),
            task: task.to_string(),
        })
    }
}

/// Parse a comma-separated list of `job:task` entries.
pub fn parse_job_specs(input: &str) -> Result<Vec<JobSpec>> {
    let specs = input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(JobSpec::parse)
        .collect::<Result<Vec<_>>>()?;
    if specs.is_empty() {
        return Err(TailError::NoJobsConfigured);
    }
    Ok(specs)
}

/// Runtime settings for the watch supervisor and its pollers.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Interval between allocation discovery polls.
    pub poll_interval: Duration,
    /// Upper bound for the discovery retry backoff. Listing failures back off
    /// exponentially from `poll_interval` up to this cap and reset on the
    /// first success.
    pub max_backoff: Duration,
    /// How long a released allocation ID stays unclaimable. Avoids an
    /// immediate re-watch of an allocation whose stream just ended while the
    /// backend still lists it as running. Zero disables the cooldown.
    pub claim_cooldown: Duration,
    /// Capacity of the bounded queue in front of the sink. When it fills,
    /// stream workers block on send rather than dropping lines.
    pub sink_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            claim_cooldown: Duration::from_secs(10),
            sink_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_spec() {
        let spec = JobSpec::parse("svc:worker").unwrap();
        assert_eq!(spec.job, "svc");
        assert_eq!(spec.task, "worker");
    }

    #[test]
    fn parse_spec_with_empty_task() {
        let spec = JobSpec::parse("svc:").unwrap();
        assert_eq!(spec.job, "svc");
        assert!(spec.task.is_empty());
    }

    #[test]
    fn parse_spec_missing_separator() {
        let err = JobSpec::parse("svc").unwrap_err();
        assert!(matches!(err, TailError::InvalidJobSpec(s) if s == "svc"));
    }

    #[test]
    fn parse_spec_empty_job() {
        assert!(JobSpec::parse(":worker").is_err());
    }

    #[test]
    fn parse_spec_list() {
        let specs = parse_job_specs("svc:worker, api:server").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].job, "svc");
        assert_eq!(specs[1].job, "api");
        assert_eq!(specs[1].task, "server");
    }

    #[test]
    fn parse_spec_list_rejects_missing_separator() {
        // Second entry has no separator, the whole list is rejected.
        let err = parse_job_specs("jobA:taskA,jobB").unwrap_err();
        assert!(matches!(err, TailError::InvalidJobSpec(s) if s == "jobB"));
    }

    #[test]
    fn parse_spec_list_rejects_empty_input() {
        assert!(matches!(
            parse_job_specs(""),
            Err(TailError::NoJobsConfigured)
        ));
        assert!(matches!(
            parse_job_specs(" , "),
            Err(TailError::NoJobsConfigured)
        ));
    }

    #[test]
    fn watch_config_default() {
        let cfg = WatchConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.max_backoff, Duration::from_secs(60));
        assert_eq!(cfg.claim_cooldown, Duration::from_secs(10));
        assert_eq!(cfg.sink_capacity, 256);
    }
}
