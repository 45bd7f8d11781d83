//! Open-loop position estimate: motors run at constant speed, so position is
//! the time integral of the heading over the full-travel duration.

use super::{clamp_position, Heading};

/// Percentage travelled in `elapsed_ms` toward `heading`.
pub fn advance(heading: Heading, elapsed_ms: u32, travel_time_ms: u32) -> f32 {
    debug_assert!(travel_time_ms > 0, "travel time must be positive");
    heading.sign() * (elapsed_ms as f32 * 100.0) / travel_time_ms as f32
}

/// Applies one segment of motion to `position` and clamps the result.
pub fn integrate(position: f32, heading: Heading, elapsed_ms: u32, travel_time_ms: u32) -> f32 {
    clamp_position(position + advance(heading, elapsed_ms, travel_time_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_travel_is_hundred_percent() {
        assert_eq!(advance(Heading::Open, 30_000, 30_000), 100.0);
        assert_eq!(advance(Heading::Close, 30_000, 30_000), -100.0);
    }

    #[test]
    fn test_one_second_of_ten_second_travel() {
        assert_eq!(advance(Heading::Open, 1_000, 10_000), 10.0);
    }

    #[test]
    fn test_integrate_clamps_both_ends() {
        assert_eq!(integrate(95.0, Heading::Open, 5_000, 10_000), 100.0);
        assert_eq!(integrate(3.0, Heading::Close, 5_000, 10_000), 0.0);
        assert_eq!(integrate(40.0, Heading::Close, 1_000, 10_000), 30.0);
    }

    #[test]
    fn test_zero_elapsed_keeps_position() {
        assert_eq!(integrate(42.5, Heading::Open, 0, 30_000), 42.5);
    }
}
