// benches/send_throughput.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rzactor::{
  Actor, ActorContext, ActorOptions, AtomicSender, EventId, Mailbox, Msg, Stage, StageConfig, SubscriptionTable,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// --- Benchmarking Constants ---
const NUM_MESSAGES: usize = 10_000;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const PAYLOAD_SIZE: usize = 64;

// --- Sender straight into mailboxes, no pumps ---
fn atomic_send_fanout(c: &mut Criterion) {
  let mut group = c.benchmark_group("AtomicSender_Fanout");

  for fanout in [1usize, 4, 16].iter() {
    group.throughput(Throughput::Elements((NUM_MESSAGES * fanout) as u64));
    let bench_id = BenchmarkId::from_parameter(format!("{}dst", fanout));

    group.bench_with_input(bench_id, fanout, |b, &fanout| {
      let table: Arc<SubscriptionTable<EventId, Msg>> = Arc::new(SubscriptionTable::new());
      let event = EventId::from("bench");
      let mailboxes: Vec<Arc<Mailbox<EventId, Msg>>> = (0..fanout)
        .map(|_| {
          let mailbox = Arc::new(Mailbox::new(NUM_MESSAGES));
          table.subscribe(event.clone(), mailbox.clone());
          mailbox
        })
        .collect();
      let sender = AtomicSender::new(table.clone());
      let payload = Msg::from_vec(vec![0u8; PAYLOAD_SIZE]);

      b.iter(|| {
        for _ in 0..NUM_MESSAGES {
          assert!(sender.send_async(event.clone(), black_box(payload.clone())));
        }
        for mailbox in &mailboxes {
          while let Some(entry) = mailbox.poll_oldest() {
            black_box(entry);
          }
        }
      });
    });
  }
  group.finish();
}

/// Counts what it receives.
struct Counter {
  received: Arc<AtomicUsize>,
}

impl Actor<EventId, Msg> for Counter {
  fn on_message(&mut self, _ctx: &ActorContext<'_, EventId, Msg>, _event: EventId, msg: Msg) {
    black_box(msg.data());
    self.received.fetch_add(1, Ordering::Relaxed);
  }
}

// --- End to end: send_sync through a running stage ---
fn stage_pump_throughput(c: &mut Criterion) {
  let mut group = c.benchmark_group("Stage_Pump_Throughput");

  for pumps in [1usize, 2, 4].iter() {
    group.throughput(Throughput::Elements((NUM_MESSAGES * 4) as u64));
    let bench_id = BenchmarkId::from_parameter(format!("{}pumps", pumps));

    group.bench_with_input(bench_id, pumps, |b, &pumps| {
      b.iter_custom(|iters| {
        let config = StageConfig::new()
          .pump_count(pumps)
          .poll_timeout(Duration::from_millis(10))
          .mailbox_capacity(1024);
        let stage: Stage = Stage::new(config).expect("Bench stage creation failed");
        let received = Arc::new(AtomicUsize::new(0));
        for n in 0..4 {
          let id = stage
            .register(
              format!("counter-{}", n),
              Counter {
                received: received.clone(),
              },
              ActorOptions::new(),
            )
            .expect("Bench actor registration failed");
          stage.subscribe(id, EventId::from("bench")).expect("Bench subscribe failed");
        }
        stage.start().expect("Bench stage start failed");

        let sender = stage.sender();
        let event = EventId::from("bench");
        let payload = Msg::from_vec(vec![0u8; PAYLOAD_SIZE]);
        let expected = NUM_MESSAGES * 4 * iters as usize;

        let start = Instant::now();
        for _ in 0..iters {
          for _ in 0..NUM_MESSAGES {
            assert!(sender.send_sync(event.clone(), payload.clone(), SEND_TIMEOUT));
          }
        }
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while received.load(Ordering::Relaxed) < expected {
          assert!(Instant::now() < deadline, "Bench drain timed out");
          thread::yield_now();
        }
        let elapsed = start.elapsed();

        stage.shutdown().expect("Bench stage shutdown failed");
        elapsed
      });
    });
  }
  group.finish();
}

criterion_group!(benches, atomic_send_fanout, stage_pump_throughput);
criterion_main!(benches);
