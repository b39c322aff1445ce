//! Spawns simulated users and keeps them busy until the run time is up.

use crate::client::ApiClient;
use crate::session::{HarnessContext, UserSession};
use crate::tasks::{ListsSequence, SequenceEnd, StatsSequence, TaskSequence, TestsSequence};
use futures::future::join_all;
use loadtest_common::config::GroupWeights;
use loadtest_common::{Config, LoadResult};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Class of simulated users bound to one task sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserGroup {
    Tests,
    Lists,
    Stats,
}

impl UserGroup {
    pub const ALL: [UserGroup; 3] = [UserGroup::Tests, UserGroup::Lists, UserGroup::Stats];

    pub fn weight(&self, weights: &GroupWeights) -> u32 {
        match self {
            UserGroup::Tests => weights.tests,
            UserGroup::Lists => weights.lists,
            UserGroup::Stats => weights.stats,
        }
    }

    pub fn sequence(&self) -> Box<dyn TaskSequence> {
        match self {
            UserGroup::Tests => Box::new(TestsSequence),
            UserGroup::Lists => Box::new(ListsSequence),
            UserGroup::Stats => Box::new(StatsSequence),
        }
    }
}

impl fmt::Display for UserGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserGroup::Tests => write!(f, "TestsGroup"),
            UserGroup::Lists => write!(f, "ListsGroup"),
            UserGroup::Stats => write!(f, "StatsGroup"),
        }
    }
}

/// Assign `count` users to groups in proportion to their weights
///
/// Uses smooth weighted round-robin, so groups are interleaved in spawn
/// order and every full cycle of `sum(weights)` users matches the weights
/// exactly. Groups with weight 0 never get users.
pub fn assign_groups(count: usize, weights: &GroupWeights) -> Vec<UserGroup> {
    let total: i64 = UserGroup::ALL
        .iter()
        .map(|g| i64::from(g.weight(weights)))
        .sum();
    if total == 0 {
        return Vec::new();
    }

    let mut current = [0i64; 3];
    let mut assigned = Vec::with_capacity(count);
    for _ in 0..count {
        let mut best = 0;
        for (i, group) in UserGroup::ALL.iter().enumerate() {
            current[i] += i64::from(group.weight(weights));
            if current[i] > current[best] {
                best = i;
            }
        }
        current[best] -= total;
        assigned.push(UserGroup::ALL[best]);
    }
    assigned
}

/// Counts collected over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub users_started: u64,
    pub sequences_completed: u64,
    pub sequences_interrupted: u64,
}

#[derive(Default)]
struct RunCounters {
    users_started: AtomicU64,
    sequences_completed: AtomicU64,
    sequences_interrupted: AtomicU64,
}

impl RunCounters {
    fn summary(&self) -> RunSummary {
        RunSummary {
            users_started: self.users_started.load(Ordering::Relaxed),
            sequences_completed: self.sequences_completed.load(Ordering::Relaxed),
            sequences_interrupted: self.sequences_interrupted.load(Ordering::Relaxed),
        }
    }
}

/// Runs a population of simulated users against the target API
pub struct LoadRunner {
    config: Config,
    ctx: HarnessContext,
}

impl LoadRunner {
    pub fn new(config: Config, ctx: HarnessContext) -> Self {
        Self { config, ctx }
    }

    /// Run until the configured run time elapses
    pub async fn run(&self) -> LoadResult<RunSummary> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the configured run time elapses or `shutdown` resolves
    ///
    /// On shutdown, users finish their current call, log out and exit.
    pub async fn run_until<F>(&self, shutdown: F) -> LoadResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        let run_time = self.config.run_time()?;
        let deadline = Instant::now() + run_time;
        let counters = Arc::new(RunCounters::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        info!(
            "Running {} users for {} against {}",
            self.config.users.count,
            humanize(run_time),
            self.config.target.host
        );

        let users = self.spawn_users(deadline, stop_rx, Arc::clone(&counters));
        tokio::pin!(users);
        tokio::pin!(shutdown);

        let interrupted = tokio::select! {
            result = &mut users => {
                result?;
                false
            }
            _ = &mut shutdown => true,
        };

        if interrupted {
            info!("Shutdown requested, stopping users");
            let _ = stop_tx.send(true);
            users.await?;
        }

        let summary = counters.summary();
        info!(
            "Run finished: {} users, {} sequences completed, {} interrupted",
            summary.users_started, summary.sequences_completed, summary.sequences_interrupted
        );
        Ok(summary)
    }

    async fn spawn_users(
        &self,
        deadline: Instant,
        mut stop: watch::Receiver<bool>,
        counters: Arc<RunCounters>,
    ) -> LoadResult<()> {
        let groups = assign_groups(self.config.users.count, &self.config.weights);
        let spawn_interval = self.config.spawn_interval()?;
        let timeout = Duration::from_secs(self.config.target.request_timeout_secs);
        let think_time = self.config.think_time();

        let mut handles = Vec::with_capacity(groups.len());
        for (index, group) in groups.into_iter().enumerate() {
            if index > 0 && !pause(spawn_interval, deadline, &mut stop).await {
                break;
            }
            if is_stopped(&stop) || Instant::now() >= deadline {
                break;
            }

            let client = ApiClient::new(&self.config.target.host, timeout)?;
            let user = SimulatedUser {
                id: index,
                group,
                session: UserSession::new(self.ctx.clone(), client),
                think_time,
                deadline,
                stop: stop.clone(),
                counters: Arc::clone(&counters),
            };

            counters.users_started.fetch_add(1, Ordering::Relaxed);
            debug!("Spawning user {} in {}", index, group);
            handles.push(tokio::spawn(user.run()));
        }

        info!("Spawned {} users", handles.len());

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("User task failed: {}", e);
            }
        }
        Ok(())
    }
}

struct SimulatedUser {
    id: usize,
    group: UserGroup,
    session: UserSession,
    think_time: (Duration, Duration),
    deadline: Instant,
    stop: watch::Receiver<bool>,
    counters: Arc<RunCounters>,
}

impl SimulatedUser {
    async fn run(mut self) {
        let sequence = self.group.sequence();
        self.session.start().await;

        while !is_stopped(&self.stop) && Instant::now() < self.deadline {
            match sequence.run(&self.session).await {
                SequenceEnd::Completed => {
                    self.counters
                        .sequences_completed
                        .fetch_add(1, Ordering::Relaxed);
                }
                SequenceEnd::Interrupted(reason) => {
                    debug!("User {} {} sequence interrupted: {}", self.id, sequence.name(), reason);
                    self.counters
                        .sequences_interrupted
                        .fetch_add(1, Ordering::Relaxed);
                }
            }

            let (min, max) = self.think_time;
            if !pause(random_between(min, max), self.deadline, &mut self.stop).await {
                break;
            }
        }

        self.session.stop().await;
    }
}

/// Sleep for `duration`, cut short by the deadline or a stop signal
///
/// Returns false when the run should end.
async fn pause(duration: Duration, deadline: Instant, stop: &mut watch::Receiver<bool>) -> bool {
    let wake = (Instant::now() + duration).min(deadline);
    tokio::select! {
        _ = sleep_until(wake) => Instant::now() < deadline,
        _ = stop.changed() => false,
    }
}

fn is_stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

fn random_between(min: Duration, max: Duration) -> Duration {
    let (min, max) = (min.as_millis() as u64, max.as_millis() as u64);
    if min >= max {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

fn humanize(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadtest_common::{CredentialQueue, EventLog, LoadError, TraceLog};
    use std::collections::HashMap;

    fn weights(tests: u32, lists: u32, stats: u32) -> GroupWeights {
        GroupWeights {
            tests,
            lists,
            stats,
        }
    }

    fn tally(groups: &[UserGroup]) -> HashMap<UserGroup, usize> {
        let mut counts = HashMap::new();
        for group in groups {
            *counts.entry(*group).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_assign_groups_matches_default_weights() {
        let groups = assign_groups(70, &GroupWeights::default());
        let counts = tally(&groups);
        assert_eq!(groups.len(), 70);
        assert_eq!(counts[&UserGroup::Tests], 40);
        assert_eq!(counts[&UserGroup::Lists], 20);
        assert_eq!(counts[&UserGroup::Stats], 10);
    }

    #[test]
    fn test_assign_groups_interleaves() {
        let groups = assign_groups(7, &GroupWeights::default());
        assert_eq!(tally(&groups[..7])[&UserGroup::Tests], 4);
        // The heaviest group never takes more than two spawn slots in a row
        assert!(groups
            .windows(3)
            .all(|w| !(w[0] == w[1] && w[1] == w[2])));
        assert_eq!(groups[0], UserGroup::Tests);
    }

    #[test]
    fn test_assign_groups_skips_zero_weight() {
        let groups = assign_groups(10, &weights(0, 1, 1));
        let counts = tally(&groups);
        assert!(!counts.contains_key(&UserGroup::Tests));
        assert_eq!(counts[&UserGroup::Lists], 5);
        assert_eq!(counts[&UserGroup::Stats], 5);

        assert!(assign_groups(10, &weights(0, 0, 0)).is_empty());
    }

    #[test]
    fn test_small_population_favours_heaviest_group() {
        assert_eq!(assign_groups(1, &GroupWeights::default()), vec![UserGroup::Tests]);
        assert!(assign_groups(0, &GroupWeights::default()).is_empty());
    }

    #[test]
    fn test_group_sequences() {
        assert_eq!(UserGroup::Tests.sequence().name(), "tests");
        assert_eq!(UserGroup::Lists.sequence().name(), "lists");
        assert_eq!(UserGroup::Stats.sequence().name(), "stats");
        assert_eq!(UserGroup::Stats.to_string(), "StatsGroup");
    }

    #[test]
    fn test_random_between_bounds() {
        let (min, max) = (Duration::from_millis(1000), Duration::from_millis(2000));
        for _ in 0..200 {
            let pause = random_between(min, max);
            assert!(pause >= min && pause <= max);
        }
        assert_eq!(random_between(max, min), max);
    }

    #[tokio::test]
    async fn test_run_rejects_unusable_spawn_rate() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = HarnessContext::new(
            Arc::new(CredentialQueue::new()),
            TraceLog::with_file_name(dir.path(), "trace.log"),
            EventLog::new("load_test"),
        );
        let mut config = Config::default();
        config.users.spawn_rate = 1e-30;

        let result = LoadRunner::new(config, ctx).run().await;

        assert!(matches!(result, Err(LoadError::Config(_))));
        assert!(!dir.path().join("trace.log").exists());
    }

    #[test]
    fn test_assign_groups_with_huge_weights() {
        let groups = assign_groups(4, &weights(u32::MAX, u32::MAX, 0));
        let counts = tally(&groups);
        assert_eq!(counts[&UserGroup::Tests], 2);
        assert_eq!(counts[&UserGroup::Lists], 2);
    }

    #[tokio::test]
    async fn test_pause_stops_at_deadline() {
        let (_tx, mut rx) = watch::channel(false);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!pause(Duration::from_secs(5), deadline, &mut rx).await);
    }

    #[tokio::test]
    async fn test_pause_stops_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        let deadline = Instant::now() + Duration::from_secs(60);
        tx.send(true).unwrap();
        assert!(!pause(Duration::from_secs(5), deadline, &mut rx).await);
    }

    #[tokio::test]
    async fn test_pause_returns_true_before_deadline() {
        let (_tx, mut rx) = watch::channel(false);
        let deadline = Instant::now() + Duration::from_secs(60);
        assert!(pause(Duration::from_millis(5), deadline, &mut rx).await);
    }
}
