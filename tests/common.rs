// tests/common.rs
#![allow(dead_code)]

use rzactor::{EventId, Msg, Stage, StageConfig, SystemEvent};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{error::TryRecvError, Receiver};

static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG env variable
    let default_filter = "rzactor=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_thread_names(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// Small config that keeps shutdown fast in tests.
pub fn test_config() -> StageConfig {
  StageConfig::new()
    .pump_count(2)
    .poll_timeout(Duration::from_millis(20))
    .mailbox_capacity(64)
    .termination_timeout(Duration::from_secs(2))
}

// Helper to create a stage
pub fn test_stage() -> Stage {
  test_stage_with(test_config())
}

pub fn test_stage_with(config: StageConfig) -> Stage {
  setup_tracing();
  Stage::new(config).expect("Failed to create test stage")
}

pub fn ev(name: &str) -> EventId {
  EventId::from(name)
}

pub fn msg(text: &'static str) -> Msg {
  Msg::from_static(text.as_bytes())
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  loop {
    if cond() {
      return true;
    }
    if Instant::now() >= deadline {
      return false;
    }
    thread::sleep(Duration::from_millis(2));
  }
}

// --- Helper function to wait for specific monitor event ---
pub fn wait_for_monitor_event(
  monitor_rx: &mut Receiver<SystemEvent>,
  timeout: Duration,
  check_event: impl Fn(&SystemEvent) -> bool,
) -> Result<SystemEvent, String> {
  let deadline = Instant::now() + timeout;
  loop {
    match monitor_rx.try_recv() {
      Ok(event) => {
        println!("Monitor received: {:?}", event);
        if check_event(&event) {
          return Ok(event);
        }
      }
      Err(TryRecvError::Empty) | Err(TryRecvError::Lagged(_)) => {
        if Instant::now() >= deadline {
          return Err(format!("Timeout waiting for specific monitor event after {:?}", timeout));
        }
        thread::sleep(Duration::from_millis(2));
      }
      Err(TryRecvError::Closed) => return Err("Monitor channel closed unexpectedly".to_string()),
    }
  }
}
