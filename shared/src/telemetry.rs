use std::time::{Duration, Instant};

/// Wall-clock timer for one pipeline stage.
pub struct Telemetry {
    stage: &'static str,
    start: Instant,
}

impl Telemetry {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Logs the stage duration and consumes the timer.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::info!(
            stage = self.stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "stage finished"
        );
        elapsed
    }
}
