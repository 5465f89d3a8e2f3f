//! Audio fingerprint probe.
//!
//! Drives a muted triangle oscillator through a single processing buffer and
//! sums the absolute sample magnitudes. The oscillator tone is fixed; the
//! environment's tone bias stands in for the host audio stack's rounding
//! behavior. The pipeline tears down exactly once whether the render
//! completes or the probe times out.

use std::time::Duration;

/// Samples rendered per probe, one processing buffer's worth.
const BUFFER_SIZE: usize = 4096;
/// Oscillator frequency in Hz.
const OSCILLATOR_HZ: f64 = 10_000.0;
/// How long the collector waits before abandoning the probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Render characteristics of the host audio stack.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioQuirks {
    pub sample_rate: u32,
    /// Per-host gain applied inside the processing chain, near 1.0.
    pub tone_bias: f64,
}

impl Default for AudioQuirks {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            tone_bias: 1.0,
        }
    }
}

/// Oscillator-analyser-processor chain with close-once teardown.
#[derive(Debug)]
pub struct AudioPipeline {
    sample_rate: u32,
    tone_bias: f64,
    closed: bool,
}

impl AudioPipeline {
    pub fn new(quirks: &AudioQuirks) -> Self {
        Self {
            sample_rate: quirks.sample_rate,
            tone_bias: quirks.tone_bias,
            closed: false,
        }
    }

    /// Render one buffer and tear the pipeline down. `None` once closed or
    /// when the chain cannot produce samples.
    pub fn render(&mut self) -> Option<f64> {
        if self.closed {
            return None;
        }
        if self.sample_rate == 0 {
            self.close();
            return None;
        }

        let mut sum = 0.0;
        for i in 0..BUFFER_SIZE {
            let phase = (i as f64 * OSCILLATOR_HZ / self.sample_rate as f64).fract();
            let sawtooth = phase * 2.0 - 1.0;
            let triangle = 2.0 * sawtooth.abs() - 1.0;
            sum += (triangle * self.tone_bias).abs();
        }
        self.close();
        Some(sum)
    }

    /// Idempotent teardown.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run the probe off the async thread with the standard timeout.
pub async fn measure(quirks: &AudioQuirks) -> Option<f64> {
    measure_with_timeout(quirks, PROBE_TIMEOUT).await
}

pub(crate) async fn measure_with_timeout(quirks: &AudioQuirks, timeout: Duration) -> Option<f64> {
    if timeout.is_zero() {
        return None;
    }
    let quirks = quirks.clone();
    let render = tokio::task::spawn_blocking(move || AudioPipeline::new(&quirks).render());
    match tokio::time::timeout(timeout, render).await {
        Ok(Ok(signal)) => signal,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_deterministic_and_positive() {
        let quirks = AudioQuirks::default();
        let first = AudioPipeline::new(&quirks).render().unwrap();
        let second = AudioPipeline::new(&quirks).render().unwrap();
        assert_eq!(first, second);
        assert!(first > 0.0);
    }

    #[test]
    fn tone_bias_shifts_the_signal() {
        let stock = AudioPipeline::new(&AudioQuirks::default()).render().unwrap();
        let biased = AudioPipeline::new(&AudioQuirks {
            tone_bias: 0.97,
            ..AudioQuirks::default()
        })
        .render()
        .unwrap();
        assert_ne!(stock, biased);
    }

    #[test]
    fn close_is_idempotent_and_blocks_render() {
        let mut pipeline = AudioPipeline::new(&AudioQuirks::default());
        pipeline.close();
        pipeline.close();
        assert!(pipeline.is_closed());
        assert!(pipeline.render().is_none());
    }

    #[test]
    fn silent_stack_yields_none() {
        let mut pipeline = AudioPipeline::new(&AudioQuirks {
            sample_rate: 0,
            ..AudioQuirks::default()
        });
        assert!(pipeline.render().is_none());
        assert!(pipeline.is_closed());
    }

    #[tokio::test]
    async fn probe_times_out_to_none() {
        let signal = measure_with_timeout(&AudioQuirks::default(), Duration::ZERO).await;
        assert!(signal.is_none());
    }

    #[tokio::test]
    async fn probe_resolves_within_the_timeout() {
        let signal = measure(&AudioQuirks::default()).await;
        assert!(signal.is_some());
    }
}
