use anyhow::{Context as _, Result};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serde::Deserialize;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;

use crate::{
    discord::{report_error, Error},
    extensions::{Extension, ExtensionKind, LoadContext},
    settings::Settings,
    task::Task,
};

pub const NAME: &str = "monitoring";

/// `builtins.monitoring` in the settings file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub enabled: bool,
    /// Push endpoint of the status page, e.g. `https://status.example/api/push/`
    pub push_url: String,
    /// Token of this bot's monitor, appended to `push_url`.
    pub push_monitor: String,
    pub interval_secs: u64,
    pub start_attempts: u32,
    pub start_delay_secs: u64,
    /// Consecutive failed pushes before giving up.
    pub max_failures: u32,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            push_url: String::new(),
            push_monitor: String::new(),
            interval_secs: 20,
            start_attempts: 5,
            start_delay_secs: 5,
            max_failures: 6,
        }
    }
}

impl MonitoringSettings {
    pub fn ping_url(&self, ping_ms: u128) -> String {
        format!(
            "{}{}?status=up&msg=OK&ping={}",
            self.push_url, self.push_monitor, ping_ms
        )
    }
}

/// Counts consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCounter {
    consecutive: u32,
    max: u32,
}

impl FailureCounter {
    /// `max` is at least one.
    pub fn new(max: u32) -> Self {
        Self {
            consecutive: 0,
            max: max.max(1),
        }
    }

    /// Records a push and tells whether to give up.
    pub fn record(&mut self, success: bool) -> bool {
        if success {
            self.consecutive = 0;
        } else {
            self.consecutive += 1;
        }
        self.consecutive >= self.max
    }
}

/// Whether the status page accepted a push.
fn check_response(status: u16, body: &serde_json::Value) -> Result<()> {
    if status != 200 {
        anyhow::bail!("status page answered {}", status);
    }
    match body.get("ok").and_then(serde_json::Value::as_bool) {
        Some(true) => Ok(()),
        _ => anyhow::bail!("status page refused the push: {}", body),
    }
}

/// Mean heartbeat latency of the shards which measured one, in milliseconds.
fn gateway_ping_ms(latencies: impl IntoIterator<Item = Option<Duration>>) -> u128 {
    let known: Vec<Duration> = latencies.into_iter().flatten().collect();
    if known.is_empty() {
        return 0;
    }
    let total: Duration = known.iter().sum();
    (total.as_secs_f64() * 1000.0 / known.len() as f64).round() as u128
}

struct Pusher {
    client: reqwest::Client,
    settings: MonitoringSettings,
    shard_manager: Option<Arc<serenity::ShardManager>>,
}

impl Pusher {
    async fn latency_ms(&self) -> u128 {
        match &self.shard_manager {
            Some(shard_manager) => {
                let runners = shard_manager.runners.lock().await;
                gateway_ping_ms(runners.values().map(|runner| runner.latency))
            }
            None => 0,
        }
    }

    async fn push(&self) -> Result<()> {
        let ping = self.latency_ms().await;
        let response = self
            .client
            .get(self.settings.ping_url(ping))
            .send()
            .await
            .context("Failed to reach the status page")?;
        let status = response.status().as_u16();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        check_response(status, &body)
    }
}

/// Reports the bot's health to an uptime status page.
#[derive(Default)]
pub struct Monitoring {
    task: Mutex<Option<Task>>,
}

impl Monitoring {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Extension for Monitoring {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Builtin
    }

    fn icon(&self) -> &'static str {
        "📡"
    }

    async fn on_load(&self, ctx: &LoadContext) -> Result<(), Error> {
        let settings: MonitoringSettings = ctx.settings.extension(ExtensionKind::Builtin, NAME)?;
        if !settings.enabled {
            log::info!("Monitoring is disabled");
            return Ok(());
        }
        if settings.push_url.is_empty() || settings.push_monitor.is_empty() {
            anyhow::bail!("push_url and push_monitor are required to monitor the bot");
        }

        let pusher = Pusher {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            settings,
            shard_manager: ctx.shard_manager.clone(),
        };
        let task = Task::new(heartbeat(
            pusher,
            Arc::clone(&ctx.settings),
            ctx.http.clone(),
        ));

        if let Some(previous) = self.task.lock().await.replace(task) {
            previous.cancel().await;
        }
        Ok(())
    }

    async fn on_unload(&self) -> Result<(), Error> {
        if let Some(task) = self.task.lock().await.take() {
            task.cancel().await;
        }
        Ok(())
    }
}

async fn heartbeat(
    pusher: Pusher,
    settings: Arc<Settings>,
    http: Option<Arc<serenity::Http>>,
) {
    let report = |message: String| {
        let settings = Arc::clone(&settings);
        let http = http.clone();
        async move {
            log::error!("{}", message);
            if let Some(http) = http {
                report_error(&http, &settings, &message).await;
            }
        }
    };

    let attempts = pusher.settings.start_attempts.max(1);
    let mut started = false;
    for attempt in 1..=attempts {
        match pusher.push().await {
            Ok(()) => {
                started = true;
                break;
            }
            Err(e) => {
                log::warn!("Monitoring push {}/{} failed: {:#}", attempt, attempts, e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_secs(pusher.settings.start_delay_secs)).await;
                }
            }
        }
    }
    if !started {
        report(format!(
            "Monitoring could not start after {} attempts",
            attempts
        ))
        .await;
        return;
    }
    log::info!("Monitoring started");

    let mut failures = FailureCounter::new(pusher.settings.max_failures);
    let mut interval = tokio::time::interval(Duration::from_secs(pusher.settings.interval_secs.max(1)));
    // The first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let result = pusher.push().await;
        if let Err(e) = &result {
            log::warn!("Monitoring push failed: {:#}", e);
        }
        if failures.record(result.is_ok()) {
            report(format!(
                "Monitoring stopped after {} failed pushes in a row",
                pusher.settings.max_failures.max(1)
            ))
            .await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_url_format() {
        let settings = MonitoringSettings {
            push_url: "https://status.example/api/push/".to_string(),
            push_monitor: "abc123".to_string(),
            ..MonitoringSettings::default()
        };
        assert_eq!(
            settings.ping_url(42),
            "https://status.example/api/push/abc123?status=up&msg=OK&ping=42"
        );
    }

    #[test]
    fn responses() {
        assert!(check_response(200, &json!({"ok": true})).is_ok());
        assert!(check_response(200, &json!({"ok": false, "msg": "monitor not found"})).is_err());
        assert!(check_response(200, &json!({})).is_err());
        assert!(check_response(404, &json!({"ok": true})).is_err());
    }

    #[test]
    fn ping_is_mean_gateway_latency() {
        assert_eq!(gateway_ping_ms(vec![None]), 0);
        assert_eq!(gateway_ping_ms(Vec::new()), 0);
        assert_eq!(
            gateway_ping_ms(vec![Some(Duration::from_millis(40)), None]),
            40
        );
        assert_eq!(
            gateway_ping_ms(vec![
                Some(Duration::from_micros(40_400)),
                Some(Duration::from_millis(61)),
            ]),
            51
        );
    }

    #[test]
    fn zero_max_failures_still_keeps_going_on_success() {
        let mut counter = FailureCounter::new(0);
        assert!(!counter.record(true));
        assert!(!counter.record(true));
        assert!(counter.record(false));
    }

    #[test]
    fn gives_up_after_consecutive_failures_only() {
        let mut counter = FailureCounter::new(6);
        for _ in 0..5 {
            assert!(!counter.record(false));
        }
        assert!(!counter.record(true));
        for _ in 0..5 {
            assert!(!counter.record(false));
        }
        assert!(counter.record(false));
    }

    #[test]
    fn settings_defaults_fill_partial_section() {
        let mut settings = Settings::default();
        settings.builtins.insert(
            NAME.to_string(),
            serde_yaml::from_str("enabled: true\npush_monitor: abc").unwrap(),
        );

        let monitoring: MonitoringSettings = settings
            .extension(ExtensionKind::Builtin, NAME)
            .unwrap();
        assert!(monitoring.enabled);
        assert_eq!(monitoring.push_monitor, "abc");
        assert_eq!(monitoring.interval_secs, 20);
        assert_eq!(monitoring.max_failures, 6);
    }

    #[tokio::test]
    async fn disabled_monitoring_loads_idle() {
        let monitoring = Monitoring::new();
        let ctx = LoadContext::new(Arc::new(Settings::default()), None);

        monitoring.on_load(&ctx).await.unwrap();
        assert!(monitoring.task.lock().await.is_none());
        monitoring.on_unload().await.unwrap();
    }

    #[tokio::test]
    async fn enabled_without_endpoint_fails() {
        let mut settings = Settings::default();
        settings.builtins.insert(
            NAME.to_string(),
            serde_yaml::from_str("enabled: true").unwrap(),
        );
        let ctx = LoadContext::new(Arc::new(settings), None);

        assert!(Monitoring::new().on_load(&ctx).await.is_err());
    }
}
