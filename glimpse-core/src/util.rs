use num_traits::{One, WrappingAdd};
use std::{mem, time::Duration};

pub const NET_CONNECT_TIMEOUT: Duration = Duration::from_millis(4 * 1000);

pub fn default_ureq_agent_builder(
    timeout: Duration,
) -> ureq::config::ConfigBuilder<ureq::typestate::AgentScope> {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .timeout_connect(Some(NET_CONNECT_TIMEOUT.min(timeout)))
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Sequence<T>(T);

impl<T: One + WrappingAdd> Sequence<T> {
    pub fn new(value: T) -> Self {
        Sequence(value)
    }

    pub fn advance(&mut self) -> T {
        let next = self.0.wrapping_add(&T::one());
        mem::replace(&mut self.0, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_hands_out_consecutive_values() {
        let mut seq = Sequence::new(7u64);
        assert_eq!(seq.advance(), 7);
        assert_eq!(seq.advance(), 8);
        assert_eq!(seq.advance(), 9);
    }

    #[test]
    fn sequence_wraps_around() {
        let mut seq = Sequence::new(u8::MAX);
        assert_eq!(seq.advance(), u8::MAX);
        assert_eq!(seq.advance(), 0);
    }
}
