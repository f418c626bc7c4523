use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Wall-clock timer that logs how long a dashboard pass took.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        debug!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  {} (took {:.2?})", self.label, self.elapsed());
    }
}

/// Compact statement amount: `391.04B`, `-1.25M`, `950`.
pub fn fmt_amount(value: f64) -> String {
    const SCALES: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];

    let abs = value.abs();
    for (scale, suffix) in SCALES {
        if abs >= scale {
            return format!("{:.2}{}", value / scale, suffix);
        }
    }
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
