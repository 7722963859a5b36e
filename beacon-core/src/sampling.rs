//! Sampling decisions.

/// A source of uniformly distributed random numbers in `[0, 1)`.
pub trait Sampler: Send + Sync + 'static {
    /// Returns the next random number.
    fn sample(&self) -> f32;
}

/// Draws from the thread-local random number generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn sample(&self) -> f32 {
        rand::random::<f32>()
    }
}

/// Returns a random boolean with a probability defined by `rate`.
///
/// Rates at or above `1.0` always pass and rates at or below `0.0` never do,
/// without consulting the sampler.
pub fn sample_should_send(sampler: &dyn Sampler, rate: f32) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 {
        false
    } else {
        sampler.sample() < rate
    }
}
