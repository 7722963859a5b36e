use std::fmt;
use std::sync::Arc;

use crate::logger::Logger;
use crate::platform::Platform;
use crate::sampling::{RandomSampler, Sampler};
use crate::transport::Transport;

/// The collaborators a collector works with.
///
/// Both collectors take one of these; a [`Beacon`](crate::Beacon) builds it
/// from its options and hands clones to each.
#[derive(Clone)]
pub struct Pipeline {
    /// Delivers requests.
    pub transport: Arc<dyn Transport>,
    /// The host the collector reads from.
    pub platform: Arc<dyn Platform>,
    /// Where failures are reported.
    pub logger: Logger,
    /// Decides whether a collector is active.
    pub sampler: Arc<dyn Sampler>,
}

impl Pipeline {
    /// Creates a pipeline with the default logger and a random sampler.
    pub fn new(transport: Arc<dyn Transport>, platform: Arc<dyn Platform>) -> Self {
        Pipeline {
            transport,
            platform,
            logger: Logger::default(),
            sampler: Arc::new(RandomSampler),
        }
    }

    /// Replaces the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Replaces the sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}
