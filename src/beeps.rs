//! Feedback beeps: short synthesized tones played instead of a recorded
//! sound file, so the gateway has no asset bundle to ship alongside the
//! wake-word and TTS models. Grounded on nothing in the pack — no example
//! repo synthesizes tones — so this is a small, self-contained sine
//! generator rather than an import of a DSP crate the rest of the codebase
//! has no other use for.

use crate::audio::SAMPLE_RATE_HZ;

/// Which feedback moment a beep marks. Mirrors the playback state machine's
/// `PlaybackType::Beep` variants by kind rather than by state, since several
/// distinct beeps share that one playback type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepKind {
    /// Wake word accepted; about to start recording.
    Wake,
    /// Recording finished; about to call STT/the LLM.
    Processing,
    /// Final assistant reply synthesized; about to speak it (a short
    /// chime before the response, not the response itself).
    ResponseReady,
    /// A backend error occurred and a generic apology is about to play.
    Error,
    /// Startup complete; gateway is now listening.
    Ready,
}

impl BeepKind {
    /// Frequency/duration pair for this beep, chosen so the four kinds are
    /// easy to tell apart by ear: short and low for errors, a quick rising
    /// double-tone for acknowledging the wake word.
    fn tone(self) -> &'static [(f32, u32)] {
        match self {
            BeepKind::Wake => &[(880.0, 80)],
            BeepKind::Processing => &[(660.0, 60)],
            BeepKind::ResponseReady => &[(440.0, 60), (660.0, 60)],
            BeepKind::Error => &[(220.0, 200)],
            BeepKind::Ready => &[(523.0, 90), (784.0, 120)],
        }
    }
}

/// Render a beep to 16-bit PCM at the gateway's sample rate, scaled by
/// `volume` (expected in `[0, 1]`, clamped).
pub fn synthesize(kind: BeepKind, volume: f32) -> Vec<i16> {
    let volume = volume.clamp(0.0, 1.0);
    let mut pcm = Vec::new();
    for &(freq_hz, duration_ms) in kind.tone() {
        pcm.extend(sine_tone(freq_hz, duration_ms, volume));
        pcm.extend(std::iter::repeat(0i16).take(ms_to_samples(15)));
    }
    pcm
}

fn ms_to_samples(ms: u32) -> usize {
    (ms as u64 * SAMPLE_RATE_HZ as u64 / 1000) as usize
}

fn sine_tone(freq_hz: f32, duration_ms: u32, volume: f32) -> Vec<i16> {
    let samples = ms_to_samples(duration_ms);
    let amplitude = (i16::MAX as f32) * volume * 0.8;
    (0..samples)
        .map(|n| {
            let t = n as f32 / SAMPLE_RATE_HZ as f32;
            let envelope = fade_envelope(n, samples);
            (amplitude * envelope * (2.0 * std::f32::consts::PI * freq_hz * t).sin()) as i16
        })
        .collect()
}

/// Short linear fade in/out so the beep doesn't click at its edges.
fn fade_envelope(n: usize, total: usize) -> f32 {
    let fade_samples = (total / 10).max(1);
    if n < fade_samples {
        n as f32 / fade_samples as f32
    } else if n >= total.saturating_sub(fade_samples) {
        (total - n) as f32 / fade_samples as f32
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_tone_stays_within_i16_range_and_is_nonempty() {
        for kind in [
            BeepKind::Wake,
            BeepKind::Processing,
            BeepKind::ResponseReady,
            BeepKind::Error,
            BeepKind::Ready,
        ] {
            let pcm = synthesize(kind, 1.0);
            assert!(!pcm.is_empty());
        }
    }

    #[test]
    fn zero_volume_produces_silence() {
        let pcm = synthesize(BeepKind::Wake, 0.0);
        assert!(pcm.iter().all(|&s| s == 0));
    }

    #[test]
    fn fade_envelope_starts_and_ends_near_zero() {
        assert!(fade_envelope(0, 1000) < 0.2);
        assert!(fade_envelope(999, 1000) < 0.2);
        assert!(fade_envelope(500, 1000) > 0.9);
    }
}
