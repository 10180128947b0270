//! Synthetic workload driven by the CLI.
//!
//! Each job simulates one frame of a UI loop: a handful of nested,
//! instrumented methods that sleep for a fixed cost. Every `slow_every`th
//! job also decodes an "image" that takes longer than the evil threshold.

use std::sync::Arc;
use std::time::Duration;

use methodbeat::analysis::{find_evil_methods, EvilMethod};
use methodbeat::domain::MethodId;
use methodbeat::looper::current_thread_id;
use methodbeat::MethodBeat;

const HANDLE_FRAME: MethodId = MethodId(1);
const MEASURE: MethodId = MethodId(2);
const LAYOUT: MethodId = MethodId(3);
const DRAW: MethodId = MethodId(4);
const DECODE_IMAGE: MethodId = MethodId(5);

const NAMES: [(MethodId, &str); 5] = [
    (HANDLE_FRAME, "handle_frame"),
    (MEASURE, "measure"),
    (LAYOUT, "layout"),
    (DRAW, "draw"),
    (DECODE_IMAGE, "decode_image"),
];

pub fn method_name(method: MethodId) -> &'static str {
    NAMES.iter().find(|(id, _)| *id == method).map_or("?", |(_, name)| name)
}

/// Outcome of one job, sent back to the driver.
#[derive(Debug)]
pub struct JobReport {
    pub job: u64,
    pub records: usize,
    pub evil: Vec<EvilMethod>,
}

pub struct Workload {
    tracer: Arc<MethodBeat>,
    slow_every: u64,
    slow_cost: Duration,
}

impl Workload {
    pub fn new(tracer: Arc<MethodBeat>, slow_every: u64) -> Self {
        let threshold = tracer.config().evil_method_threshold_ms;
        let slow_cost = Duration::from_millis(threshold + threshold / 4 + 10);
        Self { tracer, slow_every, slow_cost }
    }

    /// Run one frame on the calling thread and analyse what it recorded.
    pub fn run_job(&self, job: u64) -> JobReport {
        let begin = self.tracer.mark(format!("job-{job}"));

        self.traced(HANDLE_FRAME, || {
            self.traced(MEASURE, || self.traced(LAYOUT, || sleep_ms(2)));
            self.traced(DRAW, || {
                sleep_ms(3);
                if self.slow_every > 0 && job % self.slow_every == self.slow_every - 1 {
                    self.traced(DECODE_IMAGE, || std::thread::sleep(self.slow_cost));
                }
            });
        });

        let Some(begin) = begin else {
            return JobReport { job, records: 0, evil: Vec::new() };
        };
        let records = self.tracer.copy_between(&begin, None);
        begin.release();

        let threshold = self.tracer.config().evil_method_threshold_ms;
        JobReport { job, records: records.len(), evil: find_evil_methods(&records, threshold) }
    }

    fn traced<R>(&self, method: MethodId, body: impl FnOnce() -> R) -> R {
        let thread = current_thread_id();
        self.tracer.record_enter(method, thread);
        let result = body();
        self.tracer.record_exit(method, thread);
        result
    }
}

fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}
