//! Command Scheduler Implementation

use obd_protocol::{mode, Command, Connection, DecodedResponse, ObdError};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the command scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sampling rate for commands added without one (default: 5.0)
    pub base_rate_hz: f64,
    /// Consecutive failures before a command is parked (0 = never)
    pub max_failures: u8,
    /// Extra delay per consecutive failure in milliseconds
    pub retry_backoff_ms: u64,
    /// Upper bound for the failure back-off in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_rate_hz: 5.0,
            max_failures: 3,
            retry_backoff_ms: 100,
            max_backoff_ms: 5000,
        }
    }
}

/// A watched command with priority and timing info
#[derive(Debug, Clone)]
pub struct ScheduledCommand {
    pub command: Command,
    /// Current sampling rate in Hz
    pub rate_hz: f64,
    /// Next scheduled query time
    pub next_query: Instant,
    /// Priority (higher = more important)
    pub priority: u8,
    /// Consecutive failure count
    pub failures: u8,
}

impl ScheduledCommand {
    pub fn new(command: Command, rate_hz: f64) -> Self {
        let priority = sampling_priority(&command);
        Self {
            command,
            rate_hz,
            next_query: Instant::now(),
            priority,
            failures: 0,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Calculate interval between queries
    pub fn interval(&self) -> Duration {
        if self.rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / self.rate_hz)
        } else {
            Duration::from_secs(1)
        }
    }

    /// Schedule next query, stretched by the failure back-off
    pub fn schedule_next(&mut self, config: &SchedulerConfig) {
        let backoff_ms = config
            .retry_backoff_ms
            .saturating_mul(1u64 << self.failures.min(16))
            .min(config.max_backoff_ms);
        let backoff = if self.failures == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(backoff_ms)
        };
        self.next_query = Instant::now() + self.interval() + backoff;
    }
}

/// Engine speed and vehicle speed first, other live data next
fn sampling_priority(command: &Command) -> u8 {
    match (command.mode, command.name.as_ref()) {
        (mode::CURRENT_DATA, "RPM" | "SPEED" | "ENGINE_LOAD" | "THROTTLE_POS") => 3,
        (mode::CURRENT_DATA, _) => 2,
        _ => 1,
    }
}

impl Eq for ScheduledCommand {}

impl PartialEq for ScheduledCommand {
    fn eq(&self, other: &Self) -> bool {
        self.next_query == other.next_query && self.priority == other.priority
    }
}

impl Ord for ScheduledCommand {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior (earliest time first)
        // Then by priority (higher priority first)
        other
            .next_query
            .cmp(&self.next_query)
            .then_with(|| self.priority.cmp(&other.priority))
    }
}

impl PartialOrd for ScheduledCommand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Stops a running scheduler from another task
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        info!("Stopping command scheduler");
        self.stopped.store(true, AtomicOrdering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(AtomicOrdering::Acquire)
    }
}

/// Polls watched commands through a shared connection
pub struct CommandScheduler {
    queue: BinaryHeap<ScheduledCommand>,
    /// Commands that failed `max_failures` times in a row
    parked: Vec<ScheduledCommand>,
    config: SchedulerConfig,
    stop: StopHandle,
}

impl CommandScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            queue: BinaryHeap::new(),
            parked: Vec::new(),
            config,
            stop: StopHandle::default(),
        }
    }

    /// Watch a command at the base rate
    pub fn watch(&mut self, command: Command) {
        let rate = self.config.base_rate_hz;
        self.watch_at(command, rate);
    }

    pub fn watch_at(&mut self, command: Command, rate_hz: f64) {
        debug!("Watching {} at {} Hz", command.name, rate_hz);
        self.queue.push(ScheduledCommand::new(command, rate_hz));
    }

    pub fn push(&mut self, scheduled: ScheduledCommand) {
        self.queue.push(scheduled);
    }

    /// Stop watching a command; returns whether it was watched
    pub fn unwatch(&mut self, name: &str) -> bool {
        let before = self.queue.len() + self.parked.len();
        self.queue.retain(|item| item.command.name != name);
        self.parked.retain(|item| item.command.name != name);
        before != self.queue.len() + self.parked.len()
    }

    /// Names of the commands taken out of the rotation after repeated failures
    pub fn parked(&self) -> impl Iterator<Item = &str> + '_ {
        self.parked.iter().map(|item| item.command.name.as_ref())
    }

    /// Put a parked command back into the rotation with a clean record
    pub fn resume(&mut self, name: &str) -> bool {
        let Some(index) = self.parked.iter().position(|item| item.command.name == name) else {
            return false;
        };
        let mut item = self.parked.swap_remove(index);
        info!("Resuming {}", name);
        item.failures = 0;
        item.next_query = Instant::now();
        self.queue.push(item);
        true
    }

    /// Change the sampling rate of a watched command
    pub fn set_rate(&mut self, name: &str, new_rate_hz: f64) {
        let items: Vec<_> = self.queue.drain().collect();
        for mut item in items {
            if item.command.name == name {
                debug!("Setting {} rate to {} Hz", name, new_rate_hz);
                item.rate_hz = new_rate_hz;
            }
            self.queue.push(item);
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop the scheduler
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_stopped()
    }

    /// Commands in the rotation, parked ones excluded
    pub fn command_count(&self) -> usize {
        self.queue.len()
    }

    /// Run the scheduler loop until stopped.
    ///
    /// Responses are sent without blocking and dropped when the channel is
    /// full. Per-command failures are counted and backed off, and a command
    /// is parked after `max_failures` in a row. Losing the connection ends
    /// the loop with an error; parking the last command ends it cleanly.
    pub async fn run(
        &mut self,
        connection: &Connection,
        response_tx: mpsc::Sender<DecodedResponse>,
    ) -> Result<(), ObdError> {
        info!("Starting command scheduler with {} command(s)", self.queue.len());

        while !self.stop.is_stopped() {
            let Some(mut scheduled) = self.queue.pop() else {
                break;
            };

            // Wait until it's time
            let now = Instant::now();
            if scheduled.next_query > now {
                let notified = self.stop.notify.notified();
                tokio::select! {
                    _ = tokio::time::sleep_until(scheduled.next_query) => {}
                    _ = notified => {
                        self.queue.push(scheduled);
                        break;
                    }
                }
                if self.stop.is_stopped() {
                    self.queue.push(scheduled);
                    break;
                }
            }

            match connection.query(&scheduled.command).await {
                Ok(responses) => {
                    scheduled.failures = 0;
                    for response in responses {
                        if response_tx.try_send(response).is_err() {
                            debug!("Response channel full, dropping {}", scheduled.command.name);
                        }
                    }
                }
                Err(
                    e @ (ObdError::ProtocolError { .. }
                    | ObdError::MalformedData(_)
                    | ObdError::AdapterUnresponsive(_)),
                ) => {
                    scheduled.failures = scheduled.failures.saturating_add(1);
                    warn!(
                        "{} query failed (attempt {}): {}",
                        scheduled.command.name, scheduled.failures, e
                    );
                    if self.config.max_failures > 0 && scheduled.failures >= self.config.max_failures {
                        warn!(
                            "{} failed {} times in a row, parking it",
                            scheduled.command.name, scheduled.failures
                        );
                        self.parked.push(scheduled);
                        continue;
                    }
                }
                Err(e) => {
                    warn!("Scheduler stopping: {}", e);
                    self.queue.push(scheduled);
                    return Err(e);
                }
            }

            // Reschedule
            scheduled.schedule_next(&self.config);
            self.queue.push(scheduled);
        }

        info!("Command scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{registry, ConnectOptions, MockAdapter};

    fn command(name: &str) -> Command {
        registry().by_name(name).unwrap().clone()
    }

    async fn connected(adapter: &MockAdapter) -> Arc<Connection> {
        let conn = Connection::open(Box::new(adapter.clone()), ConnectOptions::default())
            .await
            .unwrap();
        Arc::new(conn)
    }

    #[test]
    fn test_scheduled_command_ordering() {
        let now = Instant::now();
        let mut rpm = ScheduledCommand::new(command("RPM"), 5.0);
        let mut vin = ScheduledCommand::new(command("VIN"), 1.0);

        rpm.next_query = now;
        vin.next_query = now;
        assert!(rpm > vin); // Higher priority

        vin.next_query = now - Duration::from_millis(10);
        assert!(vin > rpm); // Earlier
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = SchedulerConfig::default();
        let mut item = ScheduledCommand::new(command("SPEED"), 10.0);
        item.schedule_next(&config);
        assert!(item.next_query - Instant::now() <= Duration::from_millis(100));

        // 100 ms interval plus 100 ms << 2
        item.failures = 2;
        item.schedule_next(&config);
        assert!(item.next_query - Instant::now() >= Duration::from_millis(450));

        item.failures = 30;
        item.schedule_next(&config);
        assert!(item.next_query - Instant::now() <= item.interval() + Duration::from_millis(5000));
    }

    #[test]
    fn test_watch_and_unwatch() {
        let mut scheduler = CommandScheduler::new(SchedulerConfig::default());
        scheduler.watch(command("RPM"));
        scheduler.watch_at(command("COOLANT_TEMP"), 0.5);
        scheduler.set_rate("RPM", 10.0);
        assert_eq!(scheduler.command_count(), 2);
        assert!(scheduler.unwatch("RPM"));
        assert!(!scheduler.unwatch("RPM"));
        assert_eq!(scheduler.command_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_delivers_responses_until_stopped() {
        let conn = connected(&MockAdapter::can_vehicle()).await;
        let mut scheduler = CommandScheduler::new(SchedulerConfig::default());
        scheduler.watch(command("RPM"));
        scheduler.watch_at(command("SPEED"), 1.0);
        let stop = scheduler.stop_handle();
        let (tx, mut rx) = mpsc::channel(16);

        let task_conn = conn.clone();
        let task = tokio::spawn(async move {
            let result = scheduler.run(&task_conn, tx).await;
            (scheduler, result)
        });

        let mut names = Vec::new();
        for _ in 0..4 {
            let response = rx.recv().await.unwrap();
            names.push(response.command.name.to_string());
        }
        stop.stop();
        let (scheduler, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.command_count(), 2);
        assert!(names.contains(&"RPM".to_string()));
        assert!(names.contains(&"SPEED".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_command_is_parked() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connected(&adapter).await;
        adapter.respond("010D", &["7E8 07 41 0D"]);

        let mut scheduler = CommandScheduler::new(SchedulerConfig::default());
        scheduler.watch_at(command("SPEED"), 10.0);
        scheduler.watch_at(command("RPM"), 1.0);
        let stop = scheduler.stop_handle();
        let (tx, mut rx) = mpsc::channel(16);
        let task_conn = conn.clone();
        let task = tokio::spawn(async move {
            let result = scheduler.run(&task_conn, tx).await;
            (scheduler, result)
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        stop.stop();
        let (mut scheduler, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(scheduler.parked().collect::<Vec<_>>(), vec!["SPEED"]);
        assert_eq!(scheduler.command_count(), 1);
        // Three queries, each sent once plus one retry
        assert_eq!(adapter.writes().iter().filter(|w| *w == "010D").count(), 6);
        while let Ok(response) = rx.try_recv() {
            assert_eq!(response.command.name, "RPM");
        }

        assert!(scheduler.resume("SPEED"));
        assert!(!scheduler.resume("SPEED"));
        assert_eq!(scheduler.command_count(), 2);
        let item = scheduler.queue.iter().find(|i| i.command.name == "SPEED").unwrap();
        assert_eq!(item.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parking_last_command_ends_run() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connected(&adapter).await;
        adapter.respond("010D", &["7E8 07 41 0D"]);

        let mut scheduler = CommandScheduler::new(SchedulerConfig::default());
        scheduler.watch_at(command("SPEED"), 10.0);
        let (tx, _rx) = mpsc::channel(4);
        assert!(scheduler.run(&conn, tx).await.is_ok());
        assert_eq!(scheduler.command_count(), 0);
        assert!(scheduler.unwatch("SPEED"));
        assert_eq!(scheduler.parked().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_command_backs_off() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connected(&adapter).await;
        adapter.respond("010D", &["7E8 07 41 0D"]);

        // Never parked
        let mut scheduler = CommandScheduler::new(SchedulerConfig {
            max_failures: 0,
            ..SchedulerConfig::default()
        });
        scheduler.watch_at(command("SPEED"), 10.0);
        let stop = scheduler.stop_handle();
        let (tx, _rx) = mpsc::channel(4);
        let task_conn = conn.clone();
        let task = tokio::spawn(async move {
            let result = scheduler.run(&task_conn, tx).await;
            (scheduler, result)
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        stop.stop();
        let (mut scheduler, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(scheduler.parked().count(), 0);
        let item = scheduler.queue.pop().unwrap();
        assert!(item.failures >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_ends_run() {
        let adapter = MockAdapter::can_vehicle();
        let conn = connected(&adapter).await;
        adapter.set_broken(true);

        let mut scheduler = CommandScheduler::new(SchedulerConfig::default());
        scheduler.watch(command("RPM"));
        let (tx, _rx) = mpsc::channel(4);
        let result = scheduler.run(&conn, tx).await;
        assert!(matches!(result, Err(ObdError::Transport(_))));
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let conn = connected(&MockAdapter::can_vehicle()).await;
        let mut scheduler = CommandScheduler::new(SchedulerConfig {
            base_rate_hz: 1000.0,
            ..SchedulerConfig::default()
        });
        scheduler.watch(command("SPEED"));
        let stop = scheduler.stop_handle();
        let (tx, mut rx) = mpsc::channel(1);
        let task_conn = conn.clone();
        let task = tokio::spawn(async move { scheduler.run(&task_conn, tx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();
        assert!(task.await.unwrap().is_ok());
        assert!(rx.recv().await.is_some());
    }
}
