use std::time::Duration;

/// Configuration for the scheduler.
///
/// Both parameters are supplied at construction and immutable thereafter.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// How long a fetch may remain unanswered before the next untried
    /// announcer is asked instead.
    pub request_timeout: Duration,

    /// Upper bound on the number of outstanding items associated with a
    /// single peer. Announces beyond the bound are silently dropped, which
    /// indirectly bounds every internal data structure.
    pub max_per_peer: usize,
}
