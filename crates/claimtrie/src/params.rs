use std::fmt::Debug;
use std::sync::Arc;

/// Blocks of continuous control per block of takeover delay.
pub const PROPORTIONAL_DELAY_FACTOR: u32 = 32;

/// Upper bound of the takeover delay, about one week of blocks.
pub const MAX_TAKEOVER_DELAY: u32 = 4032;

/// Network the trie follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Delay policy applied to challengers of a controlled name.
///
/// The result is part of consensus. A new policy must come with a new
/// [`TakeoverDelay::version`] so that nodes can tell the rules apart.
pub trait TakeoverDelay: Debug + Send + Sync {
    /// Version of the policy.
    fn version(&self) -> u32;

    /// Returns the number of blocks a challenger arriving at `height` waits, given
    /// the height at which the incumbent took control.
    fn delay(&self, last_takeover_height: u32, height: u32) -> u32;
}

/// One block of delay per `factor` blocks of incumbency, capped at `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProportionalDelay {
    pub factor: u32,
    pub cap: u32,
}

impl Default for ProportionalDelay {
    fn default() -> Self {
        Self {
            factor: PROPORTIONAL_DELAY_FACTOR,
            cap: MAX_TAKEOVER_DELAY,
        }
    }
}

impl TakeoverDelay for ProportionalDelay {
    fn version(&self) -> u32 {
        1
    }

    fn delay(&self, last_takeover_height: u32, height: u32) -> u32 {
        let blocks_of_ownership = height.saturating_sub(last_takeover_height);
        (blocks_of_ownership / self.factor.max(1)).min(self.cap)
    }
}

/// Number of applied blocks whose undo records are kept in the store.
pub const DEFAULT_REORG_DEPTH: u32 = 288;

/// Consensus parameters of the claim trie.
#[derive(Debug, Clone)]
pub struct ClaimTrieParams {
    pub network: Network,
    /// Number of blocks after which records created before the fork expire.
    pub original_expiration_time: u32,
    /// Number of blocks after which records expire once the fork is active.
    /// Never shorter than `original_expiration_time`.
    pub extended_expiration_time: u32,
    /// First open height using `extended_expiration_time`.
    pub extended_expiration_fork_height: u32,
    /// Takeover delay policy.
    pub takeover_delay: Arc<dyn TakeoverDelay>,
    /// Deepest disconnect supported from the store. Older undo records are
    /// pruned on flush.
    pub reorg_depth: u32,
}

impl ClaimTrieParams {
    /// Constructs a new instance of [`ClaimTrieParams`].
    pub fn new(network: Network) -> Self {
        let (original, extended, fork_height) = match network {
            Network::Mainnet => (262974, 2102400, 400155),
            Network::Testnet => (262974, 2102400, 278160),
            Network::Regtest => (500, 600, 800),
        };
        Self {
            network,
            original_expiration_time: original,
            extended_expiration_time: extended,
            extended_expiration_fork_height: fork_height,
            takeover_delay: Arc::new(ProportionalDelay::default()),
            reorg_depth: DEFAULT_REORG_DEPTH,
        }
    }

    /// Replaces the takeover delay policy.
    pub fn with_takeover_delay(mut self, takeover_delay: impl TakeoverDelay + 'static) -> Self {
        self.takeover_delay = Arc::new(takeover_delay);
        self
    }

    /// Uses `expiration_time` on both sides of the expiration fork.
    pub fn with_expiration_time(mut self, expiration_time: u32) -> Self {
        self.original_expiration_time = expiration_time;
        self.extended_expiration_time = expiration_time;
        self
    }

    /// Extends the expiration time to `extended_expiration_time` from open
    /// height `fork_height` on.
    pub fn with_expiration_fork(mut self, fork_height: u32, extended_expiration_time: u32) -> Self {
        self.extended_expiration_fork_height = fork_height;
        self.extended_expiration_time = extended_expiration_time.max(self.original_expiration_time);
        self
    }

    pub fn with_reorg_depth(mut self, reorg_depth: u32) -> Self {
        self.reorg_depth = reorg_depth;
        self
    }

    /// Expiration time of records created at open height `height`.
    pub fn expiration_time_at(&self, height: u32) -> u32 {
        if height < self.extended_expiration_fork_height {
            self.original_expiration_time
        } else {
            self.extended_expiration_time
        }
    }

    /// Blocks added to every pending expiration when the fork activates.
    pub fn expiration_extension(&self) -> u32 {
        self.extended_expiration_time
            .saturating_sub(self.original_expiration_time)
    }

    /// Height at which a record created at `height` expires, seen from open
    /// height `open_height`.
    ///
    /// Records still scheduled when the fork activates are extended with it, so
    /// a record created before the fork keeps the original time only if it
    /// expires before the fork.
    pub fn expiration_height(&self, height: u32, open_height: u32) -> u32 {
        let original = height.saturating_add(self.original_expiration_time);
        if original < self.extended_expiration_fork_height {
            original
        } else {
            height.saturating_add(self.expiration_time_at(open_height))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_delay() {
        let policy = ProportionalDelay::default();
        assert_eq!(policy.delay(100, 100), 0);
        assert_eq!(policy.delay(100, 131), 0);
        assert_eq!(policy.delay(100, 132), 1);
        assert_eq!(policy.delay(0, 32 * 10_000), MAX_TAKEOVER_DELAY);
        // Heights before the takeover never underflow.
        assert_eq!(policy.delay(200, 100), 0);
    }

    #[test]
    fn test_network_params() {
        let mainnet = ClaimTrieParams::new(Network::Mainnet);
        assert_eq!(mainnet.expiration_time_at(400154), 262974);
        assert_eq!(mainnet.expiration_time_at(400155), 2102400);
        assert_eq!(mainnet.reorg_depth, DEFAULT_REORG_DEPTH);

        let regtest = ClaimTrieParams::new(Network::Regtest);
        assert_eq!(regtest.expiration_height(10, 10), 510);
        assert_eq!(regtest.expiration_extension(), 100);
        assert_eq!(regtest.takeover_delay.version(), 1);

        let custom = regtest.with_takeover_delay(ProportionalDelay { factor: 1, cap: 10 });
        assert_eq!(custom.takeover_delay.delay(0, 50), 10);
    }

    #[test]
    fn test_expiration_height_across_fork() {
        let params = ClaimTrieParams::new(Network::Regtest)
            .with_expiration_time(50)
            .with_expiration_fork(100, 150);
        // Expires before the fork.
        assert_eq!(params.expiration_height(40, 120), 90);
        // Still scheduled at the fork, extended with the queue.
        assert_eq!(params.expiration_height(60, 120), 210);
        assert_eq!(params.expiration_height(60, 90), 110);
        // Created after the fork.
        assert_eq!(params.expiration_height(120, 120), 270);

        let flat = params.with_expiration_time(30);
        assert_eq!(flat.expiration_extension(), 0);
        assert_eq!(flat.expiration_height(120, 120), 150);
    }
}
