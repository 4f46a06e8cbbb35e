//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Clamp a f64 to the f32 range and downcast, returning 0.0 for non-finite values.
#[must_use]
pub fn clamp_f64_to_f32(value: f64) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let min = cast::<f32, f64>(f32::MIN).unwrap_or(f64::MIN);
    let max = cast::<f32, f64>(f32::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max);
    cast::<f64, f32>(clamped).unwrap_or(0.0)
}

/// Convert a millisecond span into seconds for physics integration.
#[must_use]
pub fn ms_to_secs(ms: u64) -> f32 {
    let millis = cast::<u64, f64>(ms).unwrap_or(0.0);
    clamp_f64_to_f32(millis / 1_000.0)
}

/// Convert seconds back into whole milliseconds, flooring and clamping at zero.
#[must_use]
pub fn secs_to_ms(secs: f32) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    cast::<f64, u64>((f64::from(secs) * 1_000.0).floor()).unwrap_or(u64::MAX)
}

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Integer percentage of `part` over `whole`, clamped to `0..=100`.
#[must_use]
pub fn percent_of(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 100;
    }
    let pct = part.saturating_mul(100) / whole;
    cast::<u64, u8>(pct.min(100)).unwrap_or(100)
}

/// Uniform draw in `[-magnitude, magnitude]`, tolerant of a zero magnitude.
#[must_use]
pub fn symmetric_draw<R: rand::Rng + ?Sized>(rng: &mut R, magnitude: f32) -> f32 {
    if !magnitude.is_finite() || magnitude <= 0.0 {
        return 0.0;
    }
    rng.gen_range(-magnitude..=magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn clamp_handles_non_finite() {
        assert!((clamp_f64_to_f32(f64::NAN) - 0.0).abs() < f32::EPSILON);
        assert!((clamp_f64_to_f32(f64::from(f32::MAX) * 2.0) - f32::MAX).abs() < f32::EPSILON);
    }

    #[test]
    fn millisecond_conversions() {
        assert!((ms_to_secs(1_500) - 1.5).abs() < f32::EPSILON);
        assert_eq!(secs_to_ms(0.25), 250);
        assert_eq!(secs_to_ms(-3.0), 0);
        assert_eq!(secs_to_ms(f32::NAN), 0);
    }

    #[test]
    fn percent_clamps() {
        assert_eq!(percent_of(50, 200), 25);
        assert_eq!(percent_of(500, 200), 100);
        assert_eq!(percent_of(1, 0), 100);
    }

    #[test]
    fn symmetric_draw_respects_bounds() {
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..64 {
            let value = symmetric_draw(&mut rng, 3.0);
            assert!((-3.0..=3.0).contains(&value));
        }
        assert!(symmetric_draw(&mut rng, 0.0).abs() < f32::EPSILON);
    }
}
